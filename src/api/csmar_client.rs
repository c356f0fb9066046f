use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use super::{normalize_count, ApiError, CsmarApi};
use crate::models::{Config, Credentials, DatabaseInfo, FieldInfo, Language, RowSet, TableInfo};
use crate::utils::DateInterval;

const DATABASE_KEYS: &[&str] = &["Database", "database", "数据库", "name"];
const TABLE_KEYS: &[&str] = &["Table", "table", "表名", "name"];
const FIELD_KEYS: &[&str] = &["field", "Field", "字段", "name"];
const DESCRIPTION_KEYS: &[&str] = &["Description", "description", "描述"];
const TYPE_KEYS: &[&str] = &["Type", "type", "DataType", "类型"];

/// Response envelope shared by every gateway endpoint
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Value,
}

/// Session established by a successful login
#[derive(Debug, Clone)]
struct Session {
    token: String,
    account: String,
}

/// CSMAR API client
pub struct CsmarClient {
    client: Client,
    base_url: Url,
    session: Arc<Mutex<Option<Session>>>,
}

impl CsmarClient {
    /// Create a new CSMAR client from configuration
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        Self::with_base_url(&config.api_url, config.request_timeout)
    }

    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("csmar-downloader/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            client,
            base_url,
            session: Arc::new(Mutex::new(None)),
        })
    }

    /// Account of the current session, if logged in
    pub async fn logged_in_as(&self) -> Option<String> {
        self.session.lock().await.as_ref().map(|s| s.account.clone())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        Ok(self.base_url.join(path)?)
    }

    async fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder, ApiError> {
        let token = self
            .session
            .lock()
            .await
            .as_ref()
            .map(|s| s.token.clone())
            .ok_or(ApiError::NotLoggedIn)?;
        Ok(request.bearer_auth(token))
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, ApiError> {
        let url = self.endpoint(path)?;
        debug!("GET {} {:?}", url, query);
        let request = self.authorized(self.client.get(url).query(query)).await?;
        Self::send(request).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let request = self.authorized(self.client.post(url).json(body)).await?;
        Self::send(request).await
    }

    /// Send a request and unwrap the gateway envelope
    async fn send(request: RequestBuilder) -> Result<Value, ApiError> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = response.json().await?;
        if envelope.code != 0 {
            return Err(ApiError::Vendor {
                code: envelope.code,
                message: envelope.msg,
            });
        }

        Ok(envelope.data)
    }
}

fn query_body(
    columns: &[String],
    condition: &str,
    table: &str,
    range: Option<DateInterval>,
) -> Value {
    let mut body = json!({
        "columns": columns,
        "condition": condition,
        "table": table,
    });
    if let (Some(range), Some(object)) = (range, body.as_object_mut()) {
        let (start, end) = range.bounds_iso();
        object.insert("startTime".to_string(), Value::String(start));
        object.insert("endTime".to_string(), Value::String(end));
    }
    body
}

/// First non-empty text stored under any of `keys`
fn extract_text(entry: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| entry.get(*key))
        .map(cell_text)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Listing payloads are arrays of objects or of bare names
fn entries(data: Value) -> Result<Vec<Value>, ApiError> {
    match data {
        Value::Array(items) => Ok(items),
        Value::Null => Ok(Vec::new()),
        other => Err(ApiError::Decode(format!("expected a list, got {}", other))),
    }
}

fn entry_name(entry: &Value, keys: &[&str]) -> (String, String) {
    match entry {
        Value::Object(map) => (extract_text(map, keys), extract_text(map, DESCRIPTION_KEYS)),
        other => (cell_text(other), String::new()),
    }
}

/// Decode query rows, either `{fields, items}` or a list of records
fn decode_rows(columns: &[String], data: Value) -> Result<RowSet, ApiError> {
    match data {
        Value::Null => Ok(RowSet::new(columns.to_vec())),
        Value::Object(mut map) => {
            let fields: Vec<String> = match map.remove("fields") {
                Some(Value::Array(fields)) => fields.iter().map(cell_text).collect(),
                _ => columns.to_vec(),
            };
            let items = match map.remove("items") {
                Some(Value::Array(items)) => items,
                Some(Value::Null) | None => Vec::new(),
                Some(other) => {
                    return Err(ApiError::Decode(format!("expected row items, got {}", other)))
                }
            };

            let mut rows = RowSet::new(fields);
            for item in items {
                match item {
                    Value::Array(cells) => rows.push_row(cells.iter().map(cell_text).collect()),
                    other => {
                        return Err(ApiError::Decode(format!("expected a row array, got {}", other)))
                    }
                }
            }
            Ok(rows)
        }
        Value::Array(records) => {
            let mut rows = RowSet::new(columns.to_vec());
            for record in records {
                let map = match record {
                    Value::Object(map) => map,
                    other => {
                        return Err(ApiError::Decode(format!("expected a record, got {}", other)))
                    }
                };
                rows.push_row(
                    columns
                        .iter()
                        .map(|c| map.get(c).map(cell_text).unwrap_or_default())
                        .collect(),
                );
            }
            Ok(rows)
        }
        other => Err(ApiError::Decode(format!("unexpected query payload: {}", other))),
    }
}

#[async_trait]
impl CsmarApi for CsmarClient {
    async fn login(&self, credentials: &Credentials, language: Language) -> Result<(), ApiError> {
        let url = self.endpoint("api/login")?;
        let body = json!({
            "account": credentials.username,
            "password": credentials.password,
            "lang": language.code(),
        });

        let data = Self::send(self.client.post(url).json(&body)).await?;
        let token = data
            .get("token")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Decode("login response carried no token".to_string()))?;

        *self.session.lock().await = Some(Session {
            token: token.to_string(),
            account: credentials.username.clone(),
        });
        info!("Logged in to CSMAR as {}", credentials.username);
        Ok(())
    }

    async fn list_databases(&self) -> Result<Vec<DatabaseInfo>, ApiError> {
        let data = self.get("api/databases", &[]).await?;
        Ok(entries(data)?
            .iter()
            .map(|entry| {
                let (name, description) = entry_name(entry, DATABASE_KEYS);
                DatabaseInfo { name, description }
            })
            .filter(|db| !db.name.is_empty())
            .collect())
    }

    async fn list_tables(&self, database: &str) -> Result<Vec<TableInfo>, ApiError> {
        let data = self.get("api/tables", &[("database", database)]).await?;
        Ok(entries(data)?
            .iter()
            .map(|entry| {
                let (name, description) = entry_name(entry, TABLE_KEYS);
                TableInfo {
                    database: database.to_string(),
                    name,
                    description,
                }
            })
            .filter(|table| !table.name.is_empty())
            .collect())
    }

    async fn list_fields(&self, table: &str) -> Result<Vec<FieldInfo>, ApiError> {
        let data = self.get("api/fields", &[("table", table)]).await?;
        Ok(entries(data)?
            .iter()
            .map(|entry| {
                let (name, description) = entry_name(entry, FIELD_KEYS);
                let data_type = match entry {
                    Value::Object(map) => extract_text(map, TYPE_KEYS),
                    _ => String::new(),
                };
                FieldInfo {
                    name,
                    description,
                    data_type,
                }
            })
            .filter(|field| !field.name.is_empty())
            .collect())
    }

    async fn query_count(
        &self,
        columns: &[String],
        condition: &str,
        table: &str,
        range: Option<DateInterval>,
    ) -> Result<Option<u64>, ApiError> {
        let data = self
            .post("api/query/count", &query_body(columns, condition, table, range))
            .await?;
        let count = data.get("count").unwrap_or(&data);
        Ok(normalize_count(count))
    }

    async fn query(
        &self,
        columns: &[String],
        condition: &str,
        table: &str,
        range: Option<DateInterval>,
    ) -> Result<RowSet, ApiError> {
        let data = self
            .post("api/query", &query_body(columns, condition, table, range))
            .await?;
        let rows = decode_rows(columns, data)?;
        debug!("Retrieved {} rows from {}", rows.len(), table);
        Ok(rows)
    }
}
