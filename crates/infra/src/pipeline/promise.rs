//! Durable promises a suspended pipeline can wait on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use light_core::{Entity, JobId, PromiseHandle};

use crate::error::JobError;
use crate::queue::{Task, TaskPayload};
use crate::store::{Datastore, DatastoreExt, Transaction};

/// Who is expected to fulfil a promise.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromiseKind {
    /// Fulfilled from outside the job system (user action, webhook).
    External,
    /// Fulfilled with a child job's response when the child completes.
    ChildFuture,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromiseRecord {
    pub handle: PromiseHandle,
    /// Job whose pipeline waits on this promise.
    pub owner_job: JobId,
    pub kind: PromiseKind,
    pub value: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub fulfilled_at: Option<DateTime<Utc>>,
}

impl Entity for PromiseRecord {
    type Id = PromiseHandle;

    const KIND: &'static str = "Promise";

    fn id(&self) -> &PromiseHandle {
        &self.handle
    }
}

impl PromiseRecord {
    pub fn is_fulfilled(&self) -> bool {
        self.fulfilled_at.is_some()
    }
}

/// Creates, reads and fulfils promises inside datastore transactions.
#[derive(Clone)]
pub struct PromiseBook {
    store: Arc<dyn Datastore>,
}

impl core::fmt::Debug for PromiseBook {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PromiseBook").finish_non_exhaustive()
    }
}

impl PromiseBook {
    pub fn new(store: Arc<dyn Datastore>) -> Self {
        Self { store }
    }

    /// Buffer a new unfulfilled promise owned by `owner_job`.
    pub fn create(
        &self,
        txn: &mut Transaction,
        owner_job: JobId,
        kind: PromiseKind,
    ) -> Result<PromiseHandle, JobError> {
        let record = PromiseRecord {
            handle: PromiseHandle::new(),
            owner_job,
            kind,
            value: None,
            created_at: Utc::now(),
            fulfilled_at: None,
        };
        txn.put_entity(&record)?;
        Ok(record.handle)
    }

    pub fn get(
        &self,
        txn: &mut Transaction,
        handle: PromiseHandle,
    ) -> Result<PromiseRecord, JobError> {
        self.store
            .load::<PromiseRecord>(txn, &handle)?
            .ok_or(JobError::PromiseNotFound(handle))
    }

    pub fn get_now(&self, handle: PromiseHandle) -> Result<Option<PromiseRecord>, JobError> {
        Ok(self.store.load_now::<PromiseRecord>(&handle)?)
    }

    /// Fulfil `handle` with `value`.
    ///
    /// Returns `false` (and keeps the first value) if it was already fulfilled.
    /// Fulfilling an external promise wakes its owner with a `Resume` task;
    /// child futures are collected by the owner's fan-in instead.
    pub fn fulfill(
        &self,
        txn: &mut Transaction,
        handle: PromiseHandle,
        value: JsonValue,
    ) -> Result<bool, JobError> {
        let mut record = self.get(txn, handle)?;
        if record.is_fulfilled() {
            return Ok(false);
        }

        record.value = Some(value);
        record.fulfilled_at = Some(Utc::now());
        txn.put_entity(&record)?;

        if record.kind == PromiseKind::External {
            txn.enqueue(Task::new(TaskPayload::Resume {
                job_id: record.owner_job,
            }));
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryDatastore;
    use serde_json::json;

    fn book() -> (Arc<InMemoryDatastore>, PromiseBook) {
        let store = Arc::new(InMemoryDatastore::new());
        (store.clone(), PromiseBook::new(store))
    }

    fn owner() -> JobId {
        JobId::new(1).unwrap()
    }

    #[test]
    fn fulfil_is_first_writer_wins() {
        let (store, book) = book();
        let mut txn = Transaction::new();
        let handle = book.create(&mut txn, owner(), PromiseKind::ChildFuture).unwrap();
        store.commit(txn).unwrap();

        let mut txn = Transaction::new();
        assert!(book.fulfill(&mut txn, handle, json!("first")).unwrap());
        store.commit(txn).unwrap();

        let mut txn = Transaction::new();
        assert!(!book.fulfill(&mut txn, handle, json!("second")).unwrap());
        assert!(store.commit(txn).unwrap().is_empty());

        let record = book.get_now(handle).unwrap().unwrap();
        assert_eq!(record.value, Some(json!("first")));
    }

    #[test]
    fn external_fulfilment_wakes_owner() {
        let (store, book) = book();
        let mut txn = Transaction::new();
        let handle = book.create(&mut txn, owner(), PromiseKind::External).unwrap();
        store.commit(txn).unwrap();

        let mut txn = Transaction::new();
        book.fulfill(&mut txn, handle, json!(true)).unwrap();
        let tasks = store.commit(txn).unwrap();

        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].payload, TaskPayload::Resume { job_id: owner() });
    }

    #[test]
    fn child_future_fulfilment_enqueues_nothing() {
        let (store, book) = book();
        let mut txn = Transaction::new();
        let handle = book.create(&mut txn, owner(), PromiseKind::ChildFuture).unwrap();
        store.commit(txn).unwrap();

        let mut txn = Transaction::new();
        book.fulfill(&mut txn, handle, json!({"moduleId": "m1"})).unwrap();
        assert!(store.commit(txn).unwrap().is_empty());
    }

    #[test]
    fn unknown_handle_is_not_found() {
        let (_store, book) = book();
        let mut txn = Transaction::new();
        let err = book.fulfill(&mut txn, PromiseHandle::new(), json!(1)).unwrap_err();
        assert!(matches!(err, JobError::PromiseNotFound(_)));
    }
}
