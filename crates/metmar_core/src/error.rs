use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// Upstream could not be reached or answered with a non-200 status.
    #[error("could not fetch weather: {0}")]
    Fetch(String),
    /// Upstream answered but the document does not have the expected shape.
    #[error("unable to produce forecast: {0}")]
    Decode(String),
    /// The requested report id is not part of the current batch.
    #[error("cannot find forecast: {0}")]
    NotFound(String),
    /// Gale timeline reconstruction failed on some snapshot.
    #[error("cannot extract gale warnings from {path}: {message}")]
    Extraction { path: String, message: String },
}

impl ServiceError {
    pub(crate) fn extraction(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.to_string(),
        }
    }
}
