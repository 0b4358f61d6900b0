//! FaunaDB adapter implementing the `DocumentStore` port.
//!
//! Talks to Fauna's HTTP query endpoint using the FQL v4 JSON wire format.
//! - Lookups run `Map(Paginate(Match(Index, term)), Lambda(x, Get(x)))` and
//!   read the first page only.
//! - Writes are `Create` / `Replace`; `upsert_by_index` is a single
//!   transactional `Let/If/Exists` query, so it is atomic on the server.
//! - `FaunaConfig::from_env()` reads `FAUNA_DB_SECRET` (required),
//!   `FAUNA_ENDPOINT` and `FAUNA_TIMEOUT_SECS`.
//!
//! Notes
//! - One HTTP request per port call, no retries.
//! - The secret never appears in logs or `Debug` output.

pub mod query;
pub mod wire;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use domain::{Collection, Document, DocumentRef, DocumentStore, Payload, StoreError};
use serde_json::Value;
use tracing::debug;

/// Public cloud endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://db.fauna.com/";
const API_VERSION_HEADER: &str = "X-FaunaDB-API-Version";
const API_VERSION: &str = "4";
/// Error code Fauna reports for a reference that does not exist.
const INSTANCE_NOT_FOUND: &str = "instance not found";

#[derive(Debug, thiserror::Error)]
pub enum FaunaError {
    #[error("missing FAUNA_DB_SECRET")]
    MissingSecret,
    #[error("invalid {field}: {message}")]
    InvalidConfig { field: &'static str, message: String },
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("query failed ({status}): {code}: {description}")]
    Query {
        status: u16,
        code: String,
        description: String,
    },
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl From<FaunaError> for StoreError {
    fn from(err: FaunaError) -> Self {
        match err {
            FaunaError::Query { ref code, .. } if code == INSTANCE_NOT_FOUND => {
                StoreError::NotFound(err.to_string())
            }
            FaunaError::Malformed(msg) => StoreError::Mapping(msg),
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Connection settings for a Fauna database.
#[derive(Clone)]
pub struct FaunaConfig {
    pub secret: String,
    pub endpoint: String,
    /// Per-request timeout. `None` keeps the HTTP client's default (no timeout).
    pub timeout: Option<Duration>,
}

impl FaunaConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            endpoint: DEFAULT_ENDPOINT.into(),
            timeout: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build from environment variables:
    /// - `FAUNA_DB_SECRET` (required)
    /// - `FAUNA_ENDPOINT` (optional, defaults to the public cloud endpoint)
    /// - `FAUNA_TIMEOUT_SECS` (optional)
    pub fn from_env() -> Result<Self, FaunaError> {
        let secret = std::env::var("FAUNA_DB_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .ok_or(FaunaError::MissingSecret)?;
        let mut cfg = Self::new(secret);
        if let Some(endpoint) = std::env::var("FAUNA_ENDPOINT").ok().filter(|s| !s.is_empty()) {
            cfg.endpoint = endpoint;
        }
        if let Ok(raw) = std::env::var("FAUNA_TIMEOUT_SECS") {
            cfg.timeout = Some(parse_timeout(&raw)?);
        }
        Ok(cfg)
    }
}

impl fmt::Debug for FaunaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaunaConfig")
            .field("secret", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn parse_timeout(raw: &str) -> Result<Duration, FaunaError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(FaunaError::InvalidConfig {
            field: "FAUNA_TIMEOUT_SECS",
            message: format!("expected a positive number of seconds, got '{raw}'"),
        }),
    }
}

/// Document store backed by FaunaDB.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct FaunaClient {
    http: reqwest::Client,
    endpoint: String,
    secret: String,
}

impl FaunaClient {
    pub fn new(config: FaunaConfig) -> Result<Self, FaunaError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            http,
            endpoint: config.endpoint,
            secret: config.secret,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Evaluate one FQL expression and return its `resource`.
    pub async fn query(&self, expr: &Value) -> Result<Value, FaunaError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.secret)
            .header(API_VERSION_HEADER, API_VERSION)
            .json(expr)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        let body: Value = match serde_json::from_str(&text) {
            Ok(body) => body,
            // Gateways in front of Fauna may answer with an HTML error page.
            Err(_) if !status.is_success() => {
                return Err(FaunaError::Query {
                    status: status.as_u16(),
                    code: "unavailable".into(),
                    description: snippet(&text),
                })
            }
            Err(e) => {
                return Err(FaunaError::Malformed(format!(
                    "non-JSON body with status {status}: {e}"
                )))
            }
        };

        if let Some(first) = body
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errs| errs.first())
        {
            let field = |name: &str| {
                first
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            return Err(FaunaError::Query {
                status: status.as_u16(),
                code: field("code"),
                description: field("description"),
            });
        }
        if !status.is_success() {
            return Err(FaunaError::Query {
                status: status.as_u16(),
                code: "unknown".into(),
                description: body.to_string(),
            });
        }
        body.get("resource")
            .cloned()
            .ok_or_else(|| FaunaError::Malformed("response missing resource".into()))
    }

    async fn query_document(&self, expr: &Value) -> Result<Document, StoreError> {
        let resource = self.query(expr).await?;
        Ok(wire::decode_document(&resource)?)
    }
}

fn snippet(text: &str) -> String {
    const MAX: usize = 200;
    match text.char_indices().nth(MAX) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}

#[async_trait]
impl DocumentStore for FaunaClient {
    async fn find_first(&self, index: &str, term: &str) -> Result<Option<Document>, StoreError> {
        debug!(index, "fauna paginate match");
        let page = self.query(&query::find_first(index, term)).await?;
        Ok(wire::decode_first(&page)?)
    }

    async fn create(&self, collection: Collection, data: Payload) -> Result<Document, StoreError> {
        debug!(collection = collection.name(), "fauna create");
        self.query_document(&query::create(collection.name(), &data))
            .await
    }

    async fn replace(
        &self,
        reference: &DocumentRef,
        data: Payload,
    ) -> Result<Document, StoreError> {
        debug!(collection = reference.collection(), id = reference.id(), "fauna replace");
        self.query_document(&query::replace(reference, &data)).await
    }

    async fn upsert_by_index(
        &self,
        collection: Collection,
        term: &str,
        data: Payload,
    ) -> Result<Document, StoreError> {
        debug!(collection = collection.name(), "fauna upsert");
        self.query_document(&query::upsert(collection, term, &data))
            .await
    }
}
