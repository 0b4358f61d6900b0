//! Decoding of FaunaDB's tagged JSON values.
//!
//! Responses wrap special types in single-key objects: `{"@ref": ...}`,
//! `{"@ts": ...}`, `{"@date": ...}`, `{"@bytes": ...}`, and escape user objects
//! whose keys collide with those tags as `{"@obj": ...}`.

use domain::{Document, DocumentRef, Payload};
use serde_json::{Map, Value};

use crate::FaunaError;

/// `{"@ref": {"id": "101", "collection": {"@ref": {"id": "users", ...}}}}`
pub fn decode_ref(value: &Value) -> Result<DocumentRef, FaunaError> {
    let inner = value
        .get("@ref")
        .ok_or_else(|| FaunaError::Malformed(format!("expected a ref, got {value}")))?;
    let id = inner
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| FaunaError::Malformed("ref missing id".into()))?;
    let collection = inner
        .get("collection")
        .and_then(|c| c.get("@ref"))
        .and_then(|c| c.get("id"))
        .and_then(Value::as_str)
        .ok_or_else(|| FaunaError::Malformed(format!("ref {id} missing collection")))?;
    Ok(DocumentRef::new(collection, id))
}

/// A document as returned by `Get`, `Create` or `Replace`.
pub fn decode_document(value: &Value) -> Result<Document, FaunaError> {
    let reference = value
        .get("ref")
        .ok_or_else(|| FaunaError::Malformed("document missing ref".into()))
        .and_then(decode_ref)?;
    let data = match value.get("data").map(plain) {
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(FaunaError::Malformed(format!(
                "document data is not an object: {other}"
            )))
        }
        None => Payload::new(),
    };
    Ok(Document::new(reference, data))
}

/// First document of a `Paginate` page, if any.
pub fn decode_first(page: &Value) -> Result<Option<Document>, FaunaError> {
    let items = page
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| FaunaError::Malformed("page missing data".into()))?;
    items.first().map(decode_document).transpose()
}

/// Strip wire tags, leaving plain JSON. Timestamps, dates and bytes become
/// their string form; nested refs collapse to their id.
pub fn plain(value: &Value) -> Value {
    match value {
        Value::Object(map) if map.len() == 1 => {
            let (tag, inner) = match map.iter().next() {
                Some(entry) => entry,
                None => return Value::Object(Map::new()),
            };
            match tag.as_str() {
                "@obj" => match inner {
                    Value::Object(fields) => plain_fields(fields),
                    other => plain(other),
                },
                "@ts" | "@date" | "@bytes" => inner.clone(),
                "@ref" => inner.get("id").cloned().unwrap_or(Value::Null),
                _ => plain_fields(map),
            }
        }
        Value::Object(map) => plain_fields(map),
        Value::Array(items) => Value::Array(items.iter().map(plain).collect()),
        other => other.clone(),
    }
}

fn plain_fields(map: &Map<String, Value>) -> Value {
    Value::Object(map.iter().map(|(k, v)| (k.clone(), plain(v))).collect())
}
