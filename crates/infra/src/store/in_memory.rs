use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use serde_json::Value as JsonValue;

use super::r#trait::{Datastore, Key, StoreError, Transaction};
use crate::queue::Task;

#[derive(Debug, Clone)]
struct Versioned {
    version: u64,
    /// `None` is a tombstone; the version keeps counting across deletes.
    value: Option<JsonValue>,
}

/// In-memory transactional datastore.
///
/// Intended for tests/dev. Commits are serialized by a single write lock.
#[derive(Debug, Default)]
pub struct InMemoryDatastore {
    entries: RwLock<HashMap<Key, Versioned>>,
    next_id: AtomicU64,
    injected_conflicts: AtomicU32,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` commits fail with a concurrency error (fault injection).
    pub fn fail_next_commits(&self, n: u32) {
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    /// Number of live (non-deleted) entities of `kind`.
    pub fn count_kind(&self, kind: &str) -> Result<usize, StoreError> {
        let entries = self.read_entries()?;
        Ok(entries
            .iter()
            .filter(|(k, v)| k.kind() == kind && v.value.is_some())
            .count())
    }

    fn read_entries(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Key, Versioned>>, StoreError> {
        self.entries
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Datastore for InMemoryDatastore {
    fn get(&self, txn: &mut Transaction, key: &Key) -> Result<Option<JsonValue>, StoreError> {
        if let Some(buffered) = txn.buffered(key) {
            return Ok(Some(buffered.clone()));
        }

        let entries = self.read_entries()?;
        let (version, value) = match entries.get(key) {
            Some(v) => (v.version, v.value.clone()),
            None => (0, None),
        };
        txn.observe(key, version);
        Ok(value)
    }

    fn get_now(&self, key: &Key) -> Result<Option<JsonValue>, StoreError> {
        let entries = self.read_entries()?;
        Ok(entries.get(key).and_then(|v| v.value.clone()))
    }

    fn commit(&self, txn: Transaction) -> Result<Vec<Task>, StoreError> {
        if self.take_injected_conflict() {
            return Err(StoreError::Concurrency("injected conflict".to_string()));
        }

        let (observed, writes, tasks) = txn.into_parts();

        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        // Validate every observed key before applying anything.
        for (key, seen) in &observed {
            let current = entries.get(key).map(|v| v.version).unwrap_or(0);
            if current != *seen {
                return Err(StoreError::Concurrency(format!(
                    "{key} changed (observed version {seen}, now {current})"
                )));
            }
        }

        for (key, value) in writes {
            let entry = entries.entry(key).or_insert(Versioned {
                version: 0,
                value: None,
            });
            entry.version += 1;
            entry.value = Some(value);
        }

        Ok(tasks)
    }

    fn allocate_id(&self, _kind: &str) -> Result<u64, StoreError> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn purge_kind(&self, kind: &str) -> Result<usize, StoreError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".to_string()))?;

        let mut removed = 0;
        for (key, entry) in entries.iter_mut() {
            if key.kind() == kind && entry.value.is_some() {
                entry.value = None;
                entry.version += 1;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn key(name: &str) -> Key {
        Key::new("Thing", name)
    }

    #[test]
    fn committed_write_is_visible() {
        let store = InMemoryDatastore::new();
        let mut txn = Transaction::new();
        txn.put_raw(key("a"), json!({"n": 1}));
        store.commit(txn).unwrap();

        assert_eq!(store.get_now(&key("a")).unwrap(), Some(json!({"n": 1})));
    }

    #[test]
    fn uncommitted_write_is_invisible_but_read_your_writes_holds() {
        let store = InMemoryDatastore::new();
        let mut txn = Transaction::new();
        txn.put_raw(key("a"), json!(1));

        assert_eq!(store.get(&mut txn, &key("a")).unwrap(), Some(json!(1)));
        assert_eq!(store.get_now(&key("a")).unwrap(), None);
    }

    #[test]
    fn stale_read_fails_commit() {
        let store = InMemoryDatastore::new();
        let mut seed = Transaction::new();
        seed.put_raw(key("a"), json!(0));
        store.commit(seed).unwrap();

        let mut first = Transaction::new();
        let mut second = Transaction::new();
        store.get(&mut first, &key("a")).unwrap();
        store.get(&mut second, &key("a")).unwrap();

        first.put_raw(key("a"), json!(1));
        second.put_raw(key("a"), json!(2));

        store.commit(first).unwrap();
        let err = store.commit(second).unwrap_err();
        assert!(matches!(err, StoreError::Concurrency(_)));
        assert_eq!(store.get_now(&key("a")).unwrap(), Some(json!(1)));
    }

    #[test]
    fn reading_an_absent_key_conflicts_with_its_creation() {
        let store = InMemoryDatastore::new();
        let mut txn = Transaction::new();
        assert_eq!(store.get(&mut txn, &key("new")).unwrap(), None);

        let mut other = Transaction::new();
        other.put_raw(key("new"), json!("created"));
        store.commit(other).unwrap();

        txn.put_raw(key("new"), json!("mine"));
        assert!(matches!(store.commit(txn), Err(StoreError::Concurrency(_))));
    }

    #[test]
    fn failed_commit_applies_nothing() {
        let store = InMemoryDatastore::new();
        store.fail_next_commits(1);

        let mut txn = Transaction::new();
        txn.put_raw(key("a"), json!(1));
        txn.put_raw(key("b"), json!(2));
        assert!(store.commit(txn).is_err());

        assert_eq!(store.get_now(&key("a")).unwrap(), None);
        assert_eq!(store.get_now(&key("b")).unwrap(), None);
    }

    #[test]
    fn purge_removes_only_the_kind() {
        let store = InMemoryDatastore::new();
        let mut txn = Transaction::new();
        txn.put_raw(Key::new("Job", "1"), json!(1));
        txn.put_raw(Key::new("Job", "2"), json!(2));
        txn.put_raw(Key::new("Promise", "p"), json!(3));
        store.commit(txn).unwrap();

        assert_eq!(store.purge_kind("Job").unwrap(), 2);
        assert_eq!(store.count_kind("Job").unwrap(), 0);
        assert_eq!(store.count_kind("Promise").unwrap(), 1);
    }

    #[test]
    fn allocated_ids_are_positive_and_unique() {
        let store = InMemoryDatastore::new();
        let a = store.allocate_id("Job").unwrap();
        let b = store.allocate_id("Job").unwrap();
        assert!(a > 0);
        assert_ne!(a, b);
    }
}
