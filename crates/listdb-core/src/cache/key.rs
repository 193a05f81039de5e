//! Cache keys and tags.

use listdb_proto::ListQuery;

use crate::error::Error;

/// Tag every cached result depending on an entity carries.
pub fn entity_tag(entity: &str) -> String {
    format!("entity:{entity}")
}

/// Fingerprint of a list query: blake3 over its canonical JSON form.
///
/// Every part of the query contributes, values included, so two queries
/// share a key only when they would produce the same result.
pub fn query_fingerprint(query: &ListQuery) -> Result<String, Error> {
    let bytes = serde_json::to_vec(query)?;
    Ok(format!("list:{}", blake3::hash(&bytes).to_hex()))
}

/// Key for an arbitrary named value (enum tables and the like).
pub fn named_key(namespace: &str, parts: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    format!("{namespace}:{}", hex::encode(&hasher.finalize().as_bytes()[..16]))
}
