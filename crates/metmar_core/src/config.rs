use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::bulletin::BulletinSchema;
use crate::html::ZoneMarkup;

pub const DEFAULT_CONFIG_FILENAME: &str = "metmar.toml";
pub const DEFAULT_HTTP_ADDR: &str = "127.0.0.1:5000";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/4.0 (compatible; MSIE 7.0; Windows NT 6.0)";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_INDEX_TITLE: &str = "Marine weather forecasts in Brest area";
pub const DEFAULT_GALE_TEMPLATE: &str = "scripts/main.html";
pub const DEFAULT_SCRIPTS_DIR: &str = "scripts";

const COASTAL_URL_PATTERN: &str =
    "http://www.meteofrance.com/mf3-rpc-portlet/rest/bulletins/cote/{id}/bulletinsMarineMetropole";
const COASTAL_AREA_COUNT: u32 = 9;
const METROPOLE_AREA_ID: u32 = 3;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct MetmarConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub upstream: UpstreamSection,
    #[serde(default)]
    pub areas: AreasSection,
    #[serde(default)]
    pub bulletin: BulletinSection,
    #[serde(default)]
    pub gale: GaleSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ServerSection {
    pub http: Option<String>,
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct UpstreamSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SourceSchema {
    SingleArea,
    CoastalPair,
    Html,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct AreasSection {
    pub schema: Option<SourceSchema>,
    pub title: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<AreaEndpoint>,
    pub html_url: Option<String>,
    pub markup: Option<ZoneMarkup>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AreaEndpoint {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct BulletinSection {
    pub url: Option<String>,
    pub schema: Option<BulletinSchema>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct GaleSection {
    pub template: Option<String>,
    pub scripts_dir: Option<String>,
}

/// Where the area service gets its reports from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForecastSource {
    /// One JSON document per area, decoded with `schema`.
    Json {
        schema: BulletinSchema,
        endpoints: Vec<AreaEndpoint>,
    },
    /// One HTML page holding every area.
    Html { url: String, markup: ZoneMarkup },
}

impl MetmarConfig {
    pub fn http_addr(&self) -> String {
        self.server
            .http
            .clone()
            .unwrap_or_else(|| DEFAULT_HTTP_ADDR.to_string())
    }

    /// Route prefix without trailing slash, empty when serving at the root.
    pub fn prefix(&self) -> String {
        normalize_prefix(self.server.prefix.as_deref().unwrap_or(""))
    }

    /// Resolve user agent: env METMAR_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Some(value) = env_override("METMAR_USER_AGENT") {
            return value;
        }
        self.upstream
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    /// Resolve fetch timeout: env METMAR_HTTP_TIMEOUT_MS > config > DEFAULT_TIMEOUT_MS.
    pub fn timeout(&self) -> Duration {
        let millis = env_override("METMAR_HTTP_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.upstream.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Duration::from_millis(millis)
    }

    pub fn index_title(&self) -> String {
        self.areas
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_INDEX_TITLE.to_string())
    }

    pub fn forecast_source(&self) -> Result<ForecastSource> {
        let schema = self.areas.schema.unwrap_or(SourceSchema::CoastalPair);
        let schema = match schema {
            SourceSchema::Html => {
                let Some(url) = self.areas.html_url.clone() else {
                    bail!("[areas] schema = \"html\" requires html_url");
                };
                return Ok(ForecastSource::Html {
                    url,
                    markup: self.areas.markup.clone().unwrap_or_default(),
                });
            }
            SourceSchema::SingleArea => BulletinSchema::SingleArea,
            SourceSchema::CoastalPair => BulletinSchema::CoastalPair,
        };
        let endpoints = if self.areas.endpoints.is_empty() {
            default_coastal_endpoints()
        } else {
            self.areas.endpoints.clone()
        };
        for endpoint in &endpoints {
            if endpoint.id.trim().is_empty() {
                bail!("area endpoint id cannot be empty ({})", endpoint.url);
            }
        }
        Ok(ForecastSource::Json { schema, endpoints })
    }

    pub fn bulletin_url(&self) -> String {
        self.bulletin
            .url
            .clone()
            .unwrap_or_else(|| coastal_url(METROPOLE_AREA_ID))
    }

    pub fn bulletin_schema(&self) -> BulletinSchema {
        self.bulletin.schema.unwrap_or(BulletinSchema::SingleArea)
    }

    pub fn gale_template(&self) -> String {
        self.gale
            .template
            .clone()
            .unwrap_or_else(|| DEFAULT_GALE_TEMPLATE.to_string())
    }

    pub fn scripts_dir(&self) -> String {
        self.gale
            .scripts_dir
            .clone()
            .unwrap_or_else(|| DEFAULT_SCRIPTS_DIR.to_string())
    }
}

/// Load and parse a MetmarConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<MetmarConfig> {
    if !config_path.exists() {
        return Ok(MetmarConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: MetmarConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

fn default_coastal_endpoints() -> Vec<AreaEndpoint> {
    (1..=COASTAL_AREA_COUNT)
        .map(|id| AreaEndpoint {
            id: id.to_string(),
            url: coastal_url(id),
        })
        .collect()
}

fn coastal_url(id: u32) -> String {
    COASTAL_URL_PATTERN.replace("{id}", &id.to_string())
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
