//! Lightweight input validation helpers. Keep logic minimal and deterministic.

use serde_json::Value;

use crate::{Collection, Payload, StoreError};

/// Validate a unique business key before it reaches an index lookup.
pub fn validate_key(collection: Collection, key: &str) -> Result<(), StoreError> {
    if key.trim().is_empty() {
        return Err(StoreError::InvalidKey(format!(
            "{} must not be empty",
            collection.key_field()
        )));
    }
    Ok(())
}

/// The serialized record must carry the key it is saved under. A free-form
/// attribute named like the key field would otherwise replace it.
pub fn validate_payload_key(
    collection: Collection,
    key: &str,
    payload: &Payload,
) -> Result<(), StoreError> {
    let field = collection.key_field();
    match payload.get(field).and_then(Value::as_str) {
        Some(stored) if stored == key => Ok(()),
        _ => Err(StoreError::InvalidKey(format!(
            "attribute {field} conflicts with the record key '{key}'"
        ))),
    }
}
