use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::utils::{parse_date, ChunkPeriod, DateInterval};

/// Vendor-side hard limit on rows returned by one query
pub const DEFAULT_MAX_ROWS: u64 = 200_000;

/// Account used to log in to CSMAR
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Language of table metadata and text columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    Chinese,
    #[default]
    English,
}

impl Language {
    /// Code sent with the login request
    pub fn code(self) -> &'static str {
        match self {
            Language::Chinese => "0",
            Language::English => "1",
        }
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "0" | "zh" | "cn" | "chinese" => Ok(Language::Chinese),
            "1" | "en" | "english" => Ok(Language::English),
            other => Err(anyhow!(
                "Unsupported CSMAR_LANGUAGE '{}': use 0 (Chinese) or 1 (English)",
                other
            )),
        }
    }
}

/// Configuration for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub language: Language,
    pub date_range: DateInterval,
    pub output_dir: PathBuf,
    pub api_url: String,
    pub max_rows: u64,
    pub rate_limit_delay: Duration,
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup; empty values count as unset.
    pub fn from_vars<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let username = get("CSMAR_USERNAME")
            .ok_or_else(|| anyhow!("CSMAR_USERNAME environment variable required"))?;
        let password = get("CSMAR_PASSWORD")
            .ok_or_else(|| anyhow!("CSMAR_PASSWORD environment variable required"))?;

        let language = match get("CSMAR_LANGUAGE") {
            Some(value) => value.parse()?,
            None => Language::default(),
        };

        let start = parse_date(
            &get("CSMAR_START_DATE").unwrap_or_else(|| "2010-01-01".to_string()),
            "CSMAR_START_DATE",
        )?;
        let end = parse_date(
            &get("CSMAR_END_DATE").unwrap_or_else(|| "2024-12-31".to_string()),
            "CSMAR_END_DATE",
        )?;
        let date_range = DateInterval::new(start, end).context("Invalid CSMAR date range")?;

        let max_rows = parse_number(get("CSMAR_MAX_ROWS"), "CSMAR_MAX_ROWS", DEFAULT_MAX_ROWS)?;
        if max_rows == 0 {
            return Err(anyhow!("CSMAR_MAX_ROWS must be greater than zero"));
        }

        Ok(Config {
            credentials: Credentials::new(username, password),
            language,
            date_range,
            output_dir: PathBuf::from(
                get("CSMAR_OUTPUT_DIR").unwrap_or_else(|| "dataset/csmar_data".to_string()),
            ),
            api_url: get("CSMAR_API_URL").unwrap_or_else(|| "https://data.csmar.com".to_string()),
            max_rows,
            rate_limit_delay: Duration::from_secs(parse_number(
                get("CSMAR_RATE_LIMIT_SECS"),
                "CSMAR_RATE_LIMIT_SECS",
                3,
            )?),
            request_timeout: Duration::from_secs(parse_number(
                get("CSMAR_TIMEOUT_SECS"),
                "CSMAR_TIMEOUT_SECS",
                120,
            )?),
        })
    }
}

fn parse_number(value: Option<String>, key: &str, default: u64) -> anyhow::Result<u64> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a non-negative integer, got: {}", key, raw)),
        None => Ok(default),
    }
}

fn default_true() -> bool {
    true
}

/// Remote table to download: which columns, how to filter, how to chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    pub table: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub description: String,
    /// Date-partitioned table; static snapshots are queried without a range
    #[serde(default = "default_true")]
    pub time_varying: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_period: Option<ChunkPeriod>,
}

impl TableSpec {
    pub fn new(table: &str, columns: &[&str], description: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            description: description.to_string(),
            time_varying: true,
            stock_field: None,
            condition: None,
            chunk_period: None,
        }
    }

    pub fn with_stock_field(mut self, field: &str) -> Self {
        self.stock_field = Some(field.to_string());
        self
    }

    pub fn with_condition(mut self, condition: &str) -> Self {
        self.condition = Some(condition.to_string());
        self
    }

    pub fn with_chunk_period(mut self, period: ChunkPeriod) -> Self {
        self.chunk_period = Some(period);
        self
    }

    pub fn static_snapshot(mut self) -> Self {
        self.time_varying = false;
        self
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.table.trim().is_empty() {
            return Err(anyhow!("Table name must not be empty"));
        }
        if self.columns.is_empty() {
            return Err(anyhow!("Table {} must request at least one column", self.table));
        }
        Ok(())
    }
}

/// Rows returned by one or more queries against the same column list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RowSet {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut set = Self::new(columns);
        for row in rows {
            set.push_row(row);
        }
        set
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Push a row, padding or truncating it to the column count
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.columns.len(), String::new());
        self.rows.push(row);
    }

    /// Append another batch. Columns are matched by name when the batches
    /// disagree on order; absent columns become empty cells.
    pub fn append(&mut self, other: RowSet) {
        if self.columns.is_empty() && self.rows.is_empty() {
            *self = other;
            return;
        }
        if self.columns == other.columns {
            self.rows.extend(other.rows);
            return;
        }

        let mapping: Vec<Option<usize>> = self
            .columns
            .iter()
            .map(|name| other.column_index(name))
            .collect();
        for row in other.rows {
            let remapped = mapping
                .iter()
                .map(|index| index.and_then(|i| row.get(i).cloned()).unwrap_or_default())
                .collect();
            self.rows.push(remapped);
        }
    }

    /// Drop exact duplicate rows, keeping the first occurrence. Returns the
    /// number of rows removed.
    pub fn dedup(&mut self) -> usize {
        let before = self.rows.len();
        let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(before);
        let rows = std::mem::take(&mut self.rows);
        for row in rows {
            if seen.insert(row.clone()) {
                self.rows.push(row);
            }
        }
        before - self.rows.len()
    }

    /// Approximate in-memory size of the cell text
    pub fn estimated_size_bytes(&self) -> usize {
        let header: usize = self.columns.iter().map(|c| c.len()).sum();
        let cells: usize = self
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.len()).sum::<usize>())
            .sum();
        header + cells
    }

    /// Row as a column-name lookup
    pub fn record(&self, index: usize) -> Option<HashMap<&str, &str>> {
        self.rows.get(index).map(|row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect()
        })
    }
}

/// Database visible to the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub description: String,
}

/// Table inside a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub database: String,
    pub name: String,
    pub description: String,
}

/// Column of a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub description: String,
    pub data_type: String,
}
