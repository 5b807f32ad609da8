use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use tracing::debug;

use crate::config::MetmarConfig;
use crate::error::ServiceError;

/// Retrieves raw upstream documents.
pub trait Fetch {
    fn get(&self, url: &str) -> Result<Vec<u8>, ServiceError>;
}

pub struct UpstreamClient {
    client: Client,
    user_agent: String,
}

impl UpstreamClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build upstream HTTP client")?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }

    pub fn from_config(config: &MetmarConfig) -> Result<Self> {
        Self::new(&config.user_agent(), config.timeout())
    }
}

impl Fetch for UpstreamClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, ServiceError> {
        debug!(url, "fetching upstream document");
        let response = self
            .client
            .get(url)
            .header("User-Agent", self.user_agent.clone())
            .send()
            .map_err(|error| ServiceError::Fetch(format!("{url}: {error}")))?;
        let status = response.status();
        if status != StatusCode::OK {
            return Err(ServiceError::Fetch(format!("{status} fetching {url}")));
        }
        let body = response
            .bytes()
            .map_err(|error| ServiceError::Fetch(format!("failed to read body of {url}: {error}")))?;
        debug!(url, bytes = body.len(), "fetched upstream document");
        Ok(body.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::UpstreamClient;
    use crate::config::MetmarConfig;

    #[test]
    fn client_builds_from_default_config() {
        let client = UpstreamClient::from_config(&MetmarConfig::default()).expect("client");
        assert!(!client.user_agent.is_empty());
    }

    #[test]
    fn client_keeps_the_given_user_agent() {
        let client = UpstreamClient::new("metmar-test/1.0", Duration::from_secs(1)).expect("client");
        assert_eq!(client.user_agent, "metmar-test/1.0");
    }
}
