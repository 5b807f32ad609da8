use chrono::{DateTime, Utc};

/// One normalized report, ready to be served as plain text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forecast {
    pub id: String,
    pub title: String,
    pub content: String,
}

/// Warning number found in one saved bulletin. Zero means none was announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaleWarning {
    pub number: u32,
    pub timestamp: DateTime<Utc>,
}
