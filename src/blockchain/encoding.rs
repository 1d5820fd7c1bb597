use serde::{ser, Serialize, Serializer};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors that can occur while encoding a record for hashing
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Produces the canonical byte representation of a record
///
/// Object keys are sorted at every nesting level and the output carries no
/// whitespace, so the same logical record always yields the same bytes.
///
/// # Arguments
///
/// * `record` - Any serializable record (transaction, block, proof candidate)
///
/// # Returns
///
/// The compact JSON bytes of the record with sorted keys
pub fn canonical_bytes<T: Serialize + ?Sized>(record: &T) -> Result<Vec<u8>, EncodingError> {
    let value = canonicalize(serde_json::to_value(record)?);
    Ok(serde_json::to_vec(&value)?)
}

/// Hashes a record with SHA-256 over its canonical encoding
///
/// # Returns
///
/// The digest as 64 lowercase hexadecimal characters
pub fn hash<T: Serialize + ?Sized>(record: &T) -> Result<String, EncodingError> {
    let bytes = canonical_bytes(record)?;
    Ok(hash_bytes(&bytes))
}

/// Hashes raw bytes with SHA-256
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash of the empty record `{}`, used as the genesis block's previous hash
pub fn empty_record_hash() -> String {
    hash_bytes(b"{}")
}

/// Serializes an `f64` field, refusing NaN and infinities
///
/// serde_json quietly writes non-finite floats as `null`, which would change
/// the record behind the hash. Use with `#[serde(serialize_with = ...)]`.
pub fn serialize_finite<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if !value.is_finite() {
        return Err(ser::Error::custom(format!("non-finite number {}", value)));
    }
    serializer.serialize_f64(*value)
}

fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            let mut sorted = Map::new();
            for (key, value) in entries {
                sorted.insert(key, canonicalize(value));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
