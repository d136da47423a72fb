//! Transaction retry wrapper.
//!
//! Runs a unit of work against the datastore and re-runs it from scratch when
//! the commit loses an optimistic-concurrency race. Queue tasks buffered by the
//! body are dispatched only after the commit that carried them succeeds, so a
//! discarded attempt never leaks work onto the queue.
//!
//! Once the commit succeeds its writes are durable. A queue that refuses the
//! committed tasks is retried with the same policy as conflicts; tasks that
//! still cannot be enqueued are logged with their payload so they can be
//! replayed, and the queue error is returned.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::error::JobError;
use crate::queue::{Task, TaskQueue};
use crate::retry::RetryPolicy;
use crate::store::{Datastore, Transaction};

#[derive(Clone)]
pub struct TransactionRunner {
    store: Arc<dyn Datastore>,
    queue: Arc<dyn TaskQueue>,
    policy: RetryPolicy,
}

impl core::fmt::Debug for TransactionRunner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransactionRunner")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl TransactionRunner {
    pub fn new(store: Arc<dyn Datastore>, queue: Arc<dyn TaskQueue>, policy: RetryPolicy) -> Self {
        Self {
            store,
            queue,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `body` in a transaction, retrying on concurrent modification.
    ///
    /// `body` may run several times; only the attempt that commits has any
    /// effect. Errors other than [`JobError::Concurrency`] abort immediately
    /// and discard the attempt's writes and tasks.
    pub fn run<T, F>(&self, mut body: F) -> Result<T, JobError>
    where
        F: FnMut(&mut Transaction) -> Result<T, JobError>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);

            let mut txn = Transaction::new();
            let outcome = body(&mut txn).and_then(|value| {
                let tasks = self.store.commit(txn)?;
                Ok((value, tasks))
            });

            match outcome {
                Ok((value, tasks)) => {
                    if !tasks.is_empty() {
                        debug!(attempt, tasks = tasks.len(), "dispatching committed tasks");
                        self.dispatch(tasks)?;
                    }
                    return Ok(value);
                }
                Err(JobError::Concurrency(reason)) => {
                    if !self.policy.should_retry(attempt) {
                        warn!(attempt, %reason, "transaction retry cap reached");
                        return Err(JobError::RetryExhausted {
                            attempts: attempt,
                            last: reason,
                        });
                    }

                    let delay = self.policy.delay_for_attempt(attempt);
                    debug!(attempt, %reason, delay_ms = delay.as_millis() as u64, "transaction conflict, retrying");
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(other) => return Err(other),
            }
        }
    }

    fn dispatch(&self, tasks: Vec<Task>) -> Result<(), JobError> {
        let mut tasks = tasks.into_iter();
        while let Some(task) = tasks.next() {
            let mut tries: u32 = 1;
            while let Err(err) = self.queue.enqueue(task.clone()) {
                if !self.policy.should_retry(tries) {
                    for lost in std::iter::once(&task).chain(tasks.as_slice()) {
                        error!(
                            task_id = %lost.id,
                            kind = lost.payload.kind(),
                            job_id = %lost.job_id(),
                            payload = ?lost.payload,
                            "committed task not dispatched"
                        );
                    }
                    return Err(err.into());
                }
                let delay = self.policy.delay_for_attempt(tries);
                warn!(task_id = %task.id, attempt = tries, error = %err, "enqueue after commit failed, retrying");
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                tries += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{DeadLetterEntry, InMemoryTaskQueue, QueueError, QueueStats, TaskPayload};
    use crate::store::{InMemoryDatastore, Key};
    use light_core::{JobId, TaskId};
    use std::sync::atomic::{AtomicU32, Ordering};
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;

    fn fixture(max_attempts: u32) -> (Arc<InMemoryDatastore>, Arc<InMemoryTaskQueue>, TransactionRunner) {
        let store = Arc::new(InMemoryDatastore::new());
        let queue = InMemoryTaskQueue::arc();
        let runner = TransactionRunner::new(
            store.clone(),
            queue.clone(),
            RetryPolicy::fixed(max_attempts, Duration::ZERO),
        );
        (store, queue, runner)
    }

    fn counter() -> Key {
        Key::new("Counter", "c")
    }

    fn resume_task() -> Task {
        Task::new(TaskPayload::Resume {
            job_id: JobId::new(1).unwrap(),
        })
    }

    #[test]
    fn only_the_committed_attempt_persists() {
        let (store, queue, runner) = fixture(10);
        store.fail_next_commits(2);

        let mut calls = 0;
        let result = runner
            .run(|txn| {
                calls += 1;
                txn.put_raw(counter(), json!(calls));
                txn.enqueue(resume_task());
                Ok(calls)
            })
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(store.get_now(&counter()).unwrap(), Some(json!(3)));
        assert_eq!(queue.len().unwrap(), 1);
    }

    #[test]
    fn real_conflict_rereads_fresh_state() {
        let (store, _queue, runner) = fixture(10);
        let mut seed = Transaction::new();
        seed.put_raw(counter(), json!(0));
        store.commit(seed).unwrap();

        let mut interfered = false;
        runner
            .run(|txn| {
                let current = store.get(txn, &counter())?.and_then(|v| v.as_i64()).unwrap_or(0);
                if !interfered {
                    interfered = true;
                    let mut other = Transaction::new();
                    other.put_raw(counter(), json!(100));
                    store.commit(other)?;
                }
                txn.put_raw(counter(), json!(current + 1));
                Ok(())
            })
            .unwrap();

        assert_eq!(store.get_now(&counter()).unwrap(), Some(json!(101)));
    }

    #[test]
    fn cap_yields_retry_exhausted() {
        let (store, queue, runner) = fixture(3);
        store.fail_next_commits(10);

        let mut calls = 0;
        let err = runner
            .run(|txn| {
                calls += 1;
                txn.enqueue(resume_task());
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, JobError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(calls, 3);
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn fatal_error_discards_writes_and_tasks() {
        let (store, queue, runner) = fixture(10);

        let err = runner
            .run(|txn| -> Result<(), JobError> {
                txn.put_raw(counter(), json!(1));
                txn.enqueue(resume_task());
                Err(JobError::InvalidContext("module_id must be set".into()))
            })
            .unwrap_err();

        assert!(matches!(err, JobError::InvalidContext(_)));
        assert_eq!(store.get_now(&counter()).unwrap(), None);
        assert!(queue.is_empty().unwrap());
    }

    /// Refuses the first `failures` enqueues, then delegates.
    struct FlakyQueue {
        inner: InMemoryTaskQueue,
        failures: AtomicU32,
    }

    impl FlakyQueue {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                inner: InMemoryTaskQueue::new(),
                failures: AtomicU32::new(failures),
            })
        }
    }

    impl TaskQueue for FlakyQueue {
        fn enqueue(&self, task: Task) -> Result<TaskId, QueueError> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(QueueError::Storage("queue unavailable".into()));
            }
            self.inner.enqueue(task)
        }
        fn claim_next(&self) -> Result<Option<Task>, QueueError> {
            self.inner.claim_next()
        }
        fn complete(&self, task_id: TaskId) -> Result<(), QueueError> {
            self.inner.complete(task_id)
        }
        fn retry_later(&self, task_id: TaskId, error: String, delay: Duration) -> Result<(), QueueError> {
            self.inner.retry_later(task_id, error, delay)
        }
        fn dead_letter(&self, task_id: TaskId, reason: String) -> Result<(), QueueError> {
            self.inner.dead_letter(task_id, reason)
        }
        fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, QueueError> {
            self.inner.list_dead_letters(limit)
        }
        fn stats(&self) -> Result<QueueStats, QueueError> {
            self.inner.stats()
        }
    }

    fn flaky_fixture(failures: u32, max_attempts: u32) -> (Arc<InMemoryDatastore>, Arc<FlakyQueue>, TransactionRunner) {
        let store = Arc::new(InMemoryDatastore::new());
        let queue = FlakyQueue::new(failures);
        let runner = TransactionRunner::new(
            store.clone(),
            queue.clone(),
            RetryPolicy::fixed(max_attempts, Duration::ZERO),
        );
        (store, queue, runner)
    }

    #[test]
    fn refused_dispatch_is_retried_without_rerunning_the_body() {
        let (store, queue, runner) = flaky_fixture(2, 5);

        let mut calls = 0;
        runner
            .run(|txn| {
                calls += 1;
                txn.put_raw(counter(), json!(calls));
                txn.enqueue(resume_task());
                txn.enqueue(resume_task());
                Ok(())
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert_eq!(store.get_now(&counter()).unwrap(), Some(json!(1)));
        assert_eq!(queue.len().unwrap(), 2);
    }

    #[test]
    fn dispatch_gives_up_but_keeps_committed_writes() {
        let (store, queue, runner) = flaky_fixture(10, 3);

        let err = runner
            .run(|txn| {
                txn.put_raw(counter(), json!("committed"));
                txn.enqueue(resume_task());
                Ok(())
            })
            .unwrap_err();

        assert!(matches!(err, JobError::Queue(QueueError::Storage(_))));
        assert_eq!(store.get_now(&counter()).unwrap(), Some(json!("committed")));
        assert!(queue.is_empty().unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]

        /// Property: N forced conflicts cost exactly N + 1 runs of the body and
        /// dispatch the final attempt's tasks once.
        #[test]
        fn conflicts_are_absorbed(conflicts in 0u32..20) {
            let (store, queue, runner) = fixture(64);
            store.fail_next_commits(conflicts);

            let mut calls = 0u32;
            runner.run(|txn| {
                calls += 1;
                txn.enqueue(resume_task());
                Ok(())
            }).unwrap();

            prop_assert_eq!(calls, conflicts + 1);
            prop_assert_eq!(queue.len().unwrap(), 1);
        }
    }
}
