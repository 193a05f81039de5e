//! Record type for stored entity rows.

use crate::error::Error;
use listdb_proto::Value;
use rkyv::{Archive, Deserialize, Serialize};

/// Current time in microseconds since Unix epoch.
pub fn current_timestamp() -> u64 {
    chrono::Utc::now().timestamp_micros().max(0) as u64
}

/// One named value of a stored record.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoredField {
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: Value,
}

/// A stored record with metadata.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct Record {
    /// Field values in write order. The identity field is not stored; it is
    /// the record key.
    pub fields: Vec<StoredField>,

    /// Creation timestamp in microseconds since Unix epoch.
    pub created_at: u64,
}

impl Record {
    /// Create a new record with the current timestamp.
    pub fn new(fields: Vec<(String, Value)>) -> Self {
        Self {
            fields: fields
                .into_iter()
                .map(|(name, value)| StoredField { name, value })
                .collect(),
            created_at: current_timestamp(),
        }
    }

    /// Get a field value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|f| (f.name.as_str(), &f.value))
    }

    /// Serialize the record to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(bytes)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip() {
        let record = Record::new(vec![
            ("NAME".to_string(), Value::from("Lake house")),
            ("ACTIVE".to_string(), Value::Bool(true)),
            ("PREVIEW_PICTURE".to_string(), Value::Null),
        ]);
        let bytes = record.to_bytes().unwrap();
        let decoded = Record::from_bytes(&bytes).unwrap();

        assert_eq!(record, decoded);
        assert_eq!(decoded.get("ACTIVE"), Some(&Value::Bool(true)));
        assert_eq!(decoded.get("MISSING"), None);
    }

    #[test]
    fn test_corrupt_bytes() {
        assert!(matches!(
            Record::from_bytes(&[1, 2, 3]),
            Err(Error::Deserialization(_))
        ));
    }
}
