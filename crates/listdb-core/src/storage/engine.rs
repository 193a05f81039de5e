//! sled-backed record store.

use sled::{Db, Tree};
use tracing::debug;

use super::{Record, StorageConfig};
use crate::error::Error;
use listdb_proto::Value;

/// Tree name for unique claims.
const UNIQUE_TREE: &str = "index:unique";

/// Prefix of per-entity record trees.
const ENTITY_TREE_PREFIX: &str = "entity:";

/// The storage engine.
///
/// Each entity lives in its own tree keyed by the big-endian record id, so a
/// plain tree scan yields records in ascending primary-key order.
pub struct StorageEngine {
    db: Db,
    unique_tree: Tree,
    config: StorageConfig,
}

impl StorageEngine {
    /// Open or create a storage engine with the given configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        let unique_tree = db.open_tree(UNIQUE_TREE)?;

        Ok(Self {
            db,
            unique_tree,
            config,
        })
    }

    /// Get the underlying sled database.
    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Get the configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Generate a new record id. Ids start at 1 so that 0 stays "no reference".
    pub fn generate_id(&self) -> Result<i64, Error> {
        Ok(self.db.generate_id()? as i64 + 1)
    }

    /// Insert a record under a freshly generated id.
    pub fn insert(&self, entity: &str, fields: Vec<(String, Value)>) -> Result<i64, Error> {
        let id = self.generate_id()?;
        self.put(entity, id, fields)?;
        Ok(id)
    }

    /// Write a record under the given id, replacing any previous version.
    pub fn put(&self, entity: &str, id: i64, fields: Vec<(String, Value)>) -> Result<(), Error> {
        let record = Record::new(fields);
        self.entity_tree(entity)?
            .insert(encode_id(id), record.to_bytes()?)?;
        debug!(entity, id, "record written");
        Ok(())
    }

    /// Get a record by id.
    pub fn get(&self, entity: &str, id: i64) -> Result<Option<Record>, Error> {
        match self.entity_tree(entity)?.get(encode_id(id))? {
            Some(bytes) => Ok(Some(Record::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Delete a record. Returns whether a record was removed.
    pub fn delete(&self, entity: &str, id: i64) -> Result<bool, Error> {
        let removed = self.entity_tree(entity)?.remove(encode_id(id))?.is_some();
        debug!(entity, id, removed, "record deleted");
        Ok(removed)
    }

    /// Scan all records of an entity in ascending id order.
    pub fn scan(
        &self,
        entity: &str,
    ) -> Result<impl Iterator<Item = Result<(i64, Record), Error>>, Error> {
        let tree = self.entity_tree(entity)?;
        Ok(tree.iter().map(|item| {
            let (key, value) = item?;
            Ok((decode_id(&key)?, Record::from_bytes(&value)?))
        }))
    }

    /// Count records of an entity.
    pub fn count(&self, entity: &str) -> Result<usize, Error> {
        Ok(self.entity_tree(entity)?.len())
    }

    /// Atomically claim a unique key for a record id.
    ///
    /// Returns `false` when the key is already claimed.
    pub fn claim_unique(&self, key: &[u8], id: i64) -> Result<bool, Error> {
        let claimed = self
            .unique_tree
            .compare_and_swap(key, None as Option<&[u8]>, Some(&encode_id(id)[..]))?
            .is_ok();
        Ok(claimed)
    }

    /// Get the id holding a unique key.
    pub fn unique_owner(&self, key: &[u8]) -> Result<Option<i64>, Error> {
        match self.unique_tree.get(key)? {
            Some(bytes) => Ok(Some(decode_id(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Release a unique key.
    pub fn release_unique(&self, key: &[u8]) -> Result<(), Error> {
        self.unique_tree.remove(key)?;
        Ok(())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        self.db.flush()?;
        Ok(())
    }

    fn entity_tree(&self, entity: &str) -> Result<Tree, Error> {
        Ok(self.db.open_tree(format!("{}{}", ENTITY_TREE_PREFIX, entity))?)
    }
}

/// Build a unique-index key from its parts, NUL separated.
pub fn unique_key(entity: &str, constraint: &str, values: &[&str]) -> Vec<u8> {
    let mut key = Vec::new();
    key.extend_from_slice(entity.as_bytes());
    key.push(0);
    key.extend_from_slice(constraint.as_bytes());
    for value in values {
        key.push(0);
        key.extend_from_slice(value.as_bytes());
    }
    key
}

fn encode_id(id: i64) -> [u8; 8] {
    (id as u64).to_be_bytes()
}

fn decode_id(bytes: &[u8]) -> Result<i64, Error> {
    let buf: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Deserialization(format!("invalid record key length {}", bytes.len())))?;
    Ok(u64::from_be_bytes(buf) as i64)
}
