//! Stored document envelope and the mapping between documents and records.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Collection, StoreError};

/// Field under which the document identifier is exposed on records.
pub const ID_FIELD: &str = "_id";

/// The `data` object of a stored document.
pub type Payload = Map<String, Value>;

/// Handle to a stored document: its collection plus the database-assigned id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DocumentRef {
    collection: String,
    id: String,
}

impl DocumentRef {
    pub fn new<C: Into<String>, I: Into<String>>(collection: C, id: I) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn in_collection<I: Into<String>>(collection: Collection, id: I) -> Self {
        Self::new(collection.name(), id)
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// A document as returned by the database: reference plus payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub reference: DocumentRef,
    pub data: Payload,
}

impl Document {
    pub fn new(reference: DocumentRef, data: Payload) -> Self {
        Self { reference, data }
    }

    /// Reshape into a domain record: payload fields plus `_id` from the reference.
    /// The reference id wins over any `_id` stored in the payload.
    pub fn into_record<R: DeserializeOwned>(self) -> Result<R, StoreError> {
        let Document { reference, mut data } = self;
        data.insert(ID_FIELD.to_string(), Value::String(reference.id));
        serde_json::from_value(Value::Object(data)).map_err(|e| {
            StoreError::Mapping(format!("{} document: {e}", reference.collection))
        })
    }
}

/// Serialize a record into the payload written as a document's data.
/// The identifier lives in the reference, so `_id` is never part of the payload.
pub fn to_payload<R: Serialize>(record: &R) -> Result<Payload, StoreError> {
    match serde_json::to_value(record) {
        Ok(Value::Object(mut map)) => {
            map.remove(ID_FIELD);
            Ok(map)
        }
        Ok(other) => Err(StoreError::Mapping(format!(
            "record must serialize to an object, got {other}"
        ))),
        Err(e) => Err(StoreError::Mapping(e.to_string())),
    }
}
