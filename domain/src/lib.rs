//! Domain library for the record store.
//!
//! Holds the record types, the `DocumentStore` port, document mapping and the
//! error definitions. Database clients live in adapter crates; this crate only
//! knows documents as JSON payloads plus a reference.

use std::fmt::{Display, Formatter};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod adapters;
pub mod document;
pub mod fail_soft;
pub mod service;
pub mod validate;

pub use document::{to_payload, Document, DocumentRef, Payload, ID_FIELD};

/// Unique index over `users.login`.
pub const USERS_LOGIN_INDEX: &str = "users_login";
/// Unique index over `streams.streamDate`.
pub const STREAMS_STREAM_DATE_INDEX: &str = "streams_streamDate";

/// Logical collections and the schema objects bound to them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    Users,
    Streams,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Users, Collection::Streams];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Streams => "streams",
        }
    }

    /// Name of the unique secondary index used for key lookups.
    pub fn unique_index(&self) -> &'static str {
        match self {
            Collection::Users => USERS_LOGIN_INDEX,
            Collection::Streams => STREAMS_STREAM_DATE_INDEX,
        }
    }

    /// Payload field covered by `unique_index`.
    pub fn key_field(&self) -> &'static str {
        match self {
            Collection::Users => "login",
            Collection::Streams => "streamDate",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    pub fn from_index(index: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.unique_index() == index)
    }
}

/// A domain record persisted as one document in a collection.
///
/// `key` is the unique business key covered by the collection's unique index;
/// `id` is the database identifier, present once the record is persisted.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn key(&self) -> &str;
    fn id(&self) -> Option<&str>;
}

/// A user profile, looked up by `login`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub login: String,
    /// Remaining profile fields, carried through untouched.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl User {
    pub fn new<S: Into<String>>(login: S) -> Self {
        Self {
            id: None,
            login: login.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl Record for User {
    const COLLECTION: Collection = Collection::Users;

    fn key(&self) -> &str {
        &self.login
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// A stream session, looked up by its `streamDate`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stream {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "streamDate")]
    pub stream_date: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl Stream {
    pub fn new<S: Into<String>>(stream_date: S) -> Self {
        Self {
            id: None,
            stream_date: stream_date.into(),
            attributes: Map::new(),
        }
    }

    pub fn with_id<S: Into<String>>(mut self, id: S) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_attribute<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl Record for Stream {
    const COLLECTION: Collection = Collection::Streams;

    fn key(&self) -> &str {
        &self.stream_date
    }

    fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }
}

/// Branch of a save that issued the failing write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update,
    Upsert,
}

impl WriteOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOp::Create => "Create",
            WriteOp::Update => "Update",
            WriteOp::Upsert => "Upsert",
        }
    }
}

impl Display for WriteOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors surfaced by stores and the record store service.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("database error: {0}")]
    Database(String),
    #[error("malformed document: {0}")]
    Mapping(String),
    #[error("existence check failed: {0}")]
    Lookup(#[source] Box<StoreError>),
    #[error("{op} failed: {source}")]
    Write {
        op: WriteOp,
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    pub fn write(op: WriteOp, source: StoreError) -> Self {
        StoreError::Write {
            op,
            source: Box::new(source),
        }
    }
}

/// Port for a document database reachable through secondary indexes.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// First document matching `term` on `index`. Only the first page is read.
    async fn find_first(&self, index: &str, term: &str) -> Result<Option<Document>, StoreError>;

    async fn create(&self, collection: Collection, data: Payload) -> Result<Document, StoreError>;

    /// Replace the data of an existing document. Unknown references yield
    /// `StoreError::NotFound`.
    async fn replace(&self, reference: &DocumentRef, data: Payload)
        -> Result<Document, StoreError>;

    /// Insert-or-replace keyed by the collection's unique index.
    ///
    /// Engines with a native conditional write override this to run as one
    /// atomic operation. The default is a lookup followed by a write and is
    /// not isolated from concurrent writers.
    async fn upsert_by_index(
        &self,
        collection: Collection,
        term: &str,
        data: Payload,
    ) -> Result<Document, StoreError> {
        match self.find_first(collection.unique_index(), term).await? {
            Some(existing) => self.replace(&existing.reference, data).await,
            None => self.create(collection, data).await,
        }
    }
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn find_first(&self, index: &str, term: &str) -> Result<Option<Document>, StoreError> {
        (**self).find_first(index, term).await
    }

    async fn create(&self, collection: Collection, data: Payload) -> Result<Document, StoreError> {
        (**self).create(collection, data).await
    }

    async fn replace(
        &self,
        reference: &DocumentRef,
        data: Payload,
    ) -> Result<Document, StoreError> {
        (**self).replace(reference, data).await
    }

    async fn upsert_by_index(
        &self,
        collection: Collection,
        term: &str,
        data: Payload,
    ) -> Result<Document, StoreError> {
        (**self).upsert_by_index(collection, term, data).await
    }
}

/// Return a short about/version line for binaries to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} - record store domain", pkg, ver)
}
