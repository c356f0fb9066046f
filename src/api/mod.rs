use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::models::{Credentials, DatabaseInfo, FieldInfo, Language, RowSet, TableInfo};
use crate::utils::DateInterval;

pub mod csmar_client;
pub use csmar_client::CsmarClient;

/// Errors raised by the remote query service
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("CSMAR error {code}: {message}")]
    Vendor { code: i64, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("not logged in to CSMAR")]
    NotLoggedIn,
}

impl ApiError {
    /// Whether the failure looks like the vendor's per-query row cap
    pub fn is_row_limit(&self) -> bool {
        let message = self.to_string().to_lowercase();
        ["quantitative limit", "200000", "200,000"]
            .iter()
            .any(|token| message.contains(token))
    }
}

/// Fixed pause between consecutive data requests
#[derive(Debug, Clone)]
pub struct ApiRateLimiter {
    delay: Duration,
}

impl ApiRateLimiter {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub async fn wait(&self) {
        if self.delay.is_zero() {
            return;
        }
        debug!("Rate limiting: sleeping {:?}", self.delay);
        tokio::time::sleep(self.delay).await;
    }
}

/// Operations offered by the CSMAR query service
#[async_trait]
pub trait CsmarApi: Send + Sync {
    async fn login(&self, credentials: &Credentials, language: Language) -> Result<(), ApiError>;

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>, ApiError>;

    async fn list_tables(&self, database: &str) -> Result<Vec<TableInfo>, ApiError>;

    async fn list_fields(&self, table: &str) -> Result<Vec<FieldInfo>, ApiError>;

    /// Number of rows matching the query. `Ok(None)` when the service
    /// answers with something that is not a count.
    async fn query_count(
        &self,
        columns: &[String],
        condition: &str,
        table: &str,
        range: Option<DateInterval>,
    ) -> Result<Option<u64>, ApiError>;

    async fn query(
        &self,
        columns: &[String],
        condition: &str,
        table: &str,
        range: Option<DateInterval>,
    ) -> Result<RowSet, ApiError>;
}

/// Interpret a count payload. Numeric strings (`"150000.0"`, `"12,345"`) parse
/// as numbers; otherwise the digits are pulled out of text such as
/// `"12,345 rows"`. Anything that is not a non-negative number is unknown.
pub fn normalize_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 0.0).map(|f| f as u64)),
        Value::Bool(b) => Some(u64::from(*b)),
        Value::String(s) => {
            if let Ok(f) = s.trim().replace(',', "").parse::<f64>() {
                return (f.is_finite() && f >= 0.0).then_some(f as u64);
            }
            let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '-').collect();
            if cleaned.is_empty() || cleaned == "-" {
                return None;
            }
            cleaned.parse::<i64>().ok().and_then(|n| u64::try_from(n).ok())
        }
        _ => None,
    }
}
