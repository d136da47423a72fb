use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use light_core::Entity;

use crate::queue::Task;

/// Datastore key: entity kind + key name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key {
    kind: String,
    name: String,
}

impl Key {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Key of the entity of type `E` with identifier `id`.
    pub fn of<E: Entity>(id: &E::Id) -> Self {
        Self::new(E::KIND, id.to_string())
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl core::fmt::Display for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Datastore operation error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A key read or written by the transaction changed before commit.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

/// Unit of work against the datastore.
///
/// Reads record the version observed, writes and queue tasks are buffered.
/// Nothing is visible to other transactions until [`Datastore::commit`]
/// succeeds; tasks are handed back by the commit for dispatch.
#[derive(Debug, Default)]
pub struct Transaction {
    observed: HashMap<Key, u64>,
    writes: BTreeMap<Key, JsonValue>,
    tasks: Vec<Task>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the version seen for `key` (first observation wins).
    pub fn observe(&mut self, key: &Key, version: u64) {
        self.observed.entry(key.clone()).or_insert(version);
    }

    /// Value written earlier in this transaction, if any.
    pub fn buffered(&self, key: &Key) -> Option<&JsonValue> {
        self.writes.get(key)
    }

    pub fn put_raw(&mut self, key: Key, value: JsonValue) {
        self.writes.insert(key, value);
    }

    /// Serialize and buffer an entity write.
    pub fn put_entity<E>(&mut self, entity: &E) -> Result<(), StoreError>
    where
        E: Entity + Serialize,
    {
        let value = serde_json::to_value(entity)
            .map_err(|e| StoreError::Serialization(format!("{}: {e}", E::KIND)))?;
        self.put_raw(Key::new(E::KIND, entity.storage_key()), value);
        Ok(())
    }

    /// Buffer a queue task; dispatched only if the transaction commits.
    pub fn enqueue(&mut self, task: Task) {
        self.tasks.push(task);
    }

    /// Split into (observed versions, writes, tasks) for a store to commit.
    pub fn into_parts(
        self,
    ) -> (HashMap<Key, u64>, BTreeMap<Key, JsonValue>, Vec<Task>) {
        (self.observed, self.writes, self.tasks)
    }
}

/// Transactional key-value store with optimistic concurrency.
///
/// Implementations must:
/// - record the version of every key read through a transaction (absent = 0)
/// - reject a commit with [`StoreError::Concurrency`] if any observed key changed
/// - apply all buffered writes of a transaction atomically
pub trait Datastore: Send + Sync {
    /// Read `key` inside `txn`, seeing the transaction's own buffered writes.
    fn get(&self, txn: &mut Transaction, key: &Key) -> Result<Option<JsonValue>, StoreError>;

    /// Read the latest committed value outside any transaction.
    fn get_now(&self, key: &Key) -> Result<Option<JsonValue>, StoreError>;

    /// Commit `txn`, returning its buffered tasks for dispatch.
    fn commit(&self, txn: Transaction) -> Result<Vec<Task>, StoreError>;

    /// Allocate a fresh positive id for `kind`. Not transactional.
    fn allocate_id(&self, kind: &str) -> Result<u64, StoreError>;

    /// Delete every entity of `kind`; returns how many were removed.
    fn purge_kind(&self, kind: &str) -> Result<usize, StoreError>;
}

impl<S> Datastore for Arc<S>
where
    S: Datastore + ?Sized,
{
    fn get(&self, txn: &mut Transaction, key: &Key) -> Result<Option<JsonValue>, StoreError> {
        (**self).get(txn, key)
    }

    fn get_now(&self, key: &Key) -> Result<Option<JsonValue>, StoreError> {
        (**self).get_now(key)
    }

    fn commit(&self, txn: Transaction) -> Result<Vec<Task>, StoreError> {
        (**self).commit(txn)
    }

    fn allocate_id(&self, kind: &str) -> Result<u64, StoreError> {
        (**self).allocate_id(kind)
    }

    fn purge_kind(&self, kind: &str) -> Result<usize, StoreError> {
        (**self).purge_kind(kind)
    }
}

/// Typed entity access on top of any [`Datastore`].
pub trait DatastoreExt: Datastore {
    fn load<E>(&self, txn: &mut Transaction, id: &E::Id) -> Result<Option<E>, StoreError>
    where
        E: Entity + DeserializeOwned,
    {
        self.get(txn, &Key::of::<E>(id))?
            .map(decode::<E>)
            .transpose()
    }

    fn load_now<E>(&self, id: &E::Id) -> Result<Option<E>, StoreError>
    where
        E: Entity + DeserializeOwned,
    {
        self.get_now(&Key::of::<E>(id))?
            .map(decode::<E>)
            .transpose()
    }
}

impl<S: Datastore + ?Sized> DatastoreExt for S {}

fn decode<E: Entity + DeserializeOwned>(value: JsonValue) -> Result<E, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Serialization(format!("{}: {e}", E::KIND)))
}
