//! Task queue implementations.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use light_core::TaskId;

use super::types::{DeadLetterEntry, QueueStats, Task};

/// At-least-once task queue.
///
/// A claimed task stays in flight until it is completed, scheduled for retry
/// or dead-lettered. Tasks are delivered oldest first once their delay passes.
pub trait TaskQueue: Send + Sync {
    /// Add a task.
    fn enqueue(&self, task: Task) -> Result<TaskId, QueueError>;

    /// Claim the next ready task, if any.
    fn claim_next(&self) -> Result<Option<Task>, QueueError>;

    /// Acknowledge a claimed task.
    fn complete(&self, task_id: TaskId) -> Result<(), QueueError>;

    /// Put a claimed task back, deliverable after `delay`.
    fn retry_later(
        &self,
        task_id: TaskId,
        error: String,
        delay: std::time::Duration,
    ) -> Result<(), QueueError>;

    /// Move a claimed task to the dead-letter queue.
    fn dead_letter(&self, task_id: TaskId, reason: String) -> Result<(), QueueError>;

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, QueueError>;

    fn stats(&self) -> Result<QueueStats, QueueError>;

    /// Queued plus in-flight tasks.
    fn len(&self) -> Result<usize, QueueError> {
        let stats = self.stats()?;
        Ok(stats.ready + stats.delayed + stats.in_flight)
    }

    fn is_empty(&self) -> Result<bool, QueueError> {
        Ok(self.len()? == 0)
    }
}

impl<Q> TaskQueue for Arc<Q>
where
    Q: TaskQueue + ?Sized,
{
    fn enqueue(&self, task: Task) -> Result<TaskId, QueueError> {
        (**self).enqueue(task)
    }

    fn claim_next(&self) -> Result<Option<Task>, QueueError> {
        (**self).claim_next()
    }

    fn complete(&self, task_id: TaskId) -> Result<(), QueueError> {
        (**self).complete(task_id)
    }

    fn retry_later(
        &self,
        task_id: TaskId,
        error: String,
        delay: std::time::Duration,
    ) -> Result<(), QueueError> {
        (**self).retry_later(task_id, error, delay)
    }

    fn dead_letter(&self, task_id: TaskId, reason: String) -> Result<(), QueueError> {
        (**self).dead_letter(task_id, reason)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, QueueError> {
        (**self).list_dead_letters(limit)
    }

    fn stats(&self) -> Result<QueueStats, QueueError> {
        (**self).stats()
    }
}

/// Task queue error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("task not in flight: {0}")]
    NotFound(TaskId),
    #[error("queue storage error: {0}")]
    Storage(String),
}

/// In-memory task queue for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    queued: RwLock<Vec<Task>>,
    in_flight: RwLock<HashMap<TaskId, Task>>,
    dead_letters: RwLock<Vec<DeadLetterEntry>>,
}

fn poisoned<T>(_: T) -> QueueError {
    QueueError::Storage("lock poisoned".to_string())
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Make every delayed task deliverable now (lets tests drain backoffs).
    pub fn release_delays(&self) -> Result<(), QueueError> {
        let mut queued = self.queued.write().map_err(poisoned)?;
        for task in queued.iter_mut() {
            task.not_before = None;
        }
        Ok(())
    }

    fn take_in_flight(&self, task_id: TaskId) -> Result<Task, QueueError> {
        self.in_flight
            .write()
            .map_err(poisoned)?
            .remove(&task_id)
            .ok_or(QueueError::NotFound(task_id))
    }
}

impl TaskQueue for InMemoryTaskQueue {
    fn enqueue(&self, task: Task) -> Result<TaskId, QueueError> {
        let id = task.id;
        self.queued.write().map_err(poisoned)?.push(task);
        Ok(id)
    }

    fn claim_next(&self) -> Result<Option<Task>, QueueError> {
        let mut queued = self.queued.write().map_err(poisoned)?;

        // Queue order is enqueue order; retries go to the back.
        let Some(pos) = queued.iter().position(Task::is_ready) else {
            return Ok(None);
        };

        let mut task = queued.remove(pos);
        task.attempt += 1;
        self.in_flight
            .write()
            .map_err(poisoned)?
            .insert(task.id, task.clone());
        Ok(Some(task))
    }

    fn complete(&self, task_id: TaskId) -> Result<(), QueueError> {
        self.take_in_flight(task_id).map(|_| ())
    }

    fn retry_later(
        &self,
        task_id: TaskId,
        error: String,
        delay: std::time::Duration,
    ) -> Result<(), QueueError> {
        let mut task = self.take_in_flight(task_id)?.delayed(delay);
        task.last_error = Some(error);
        self.queued.write().map_err(poisoned)?.push(task);
        Ok(())
    }

    fn dead_letter(&self, task_id: TaskId, reason: String) -> Result<(), QueueError> {
        let mut task = self.take_in_flight(task_id)?;
        task.last_error = Some(reason.clone());
        self.dead_letters
            .write()
            .map_err(poisoned)?
            .push(DeadLetterEntry::new(task, reason));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, QueueError> {
        let dls = self.dead_letters.read().map_err(poisoned)?;
        Ok(dls.iter().take(limit).cloned().collect())
    }

    fn stats(&self) -> Result<QueueStats, QueueError> {
        let queued = self.queued.read().map_err(poisoned)?;
        let ready = queued.iter().filter(|t| t.is_ready()).count();

        Ok(QueueStats {
            ready,
            delayed: queued.len() - ready,
            in_flight: self.in_flight.read().map_err(poisoned)?.len(),
            dead_lettered: self.dead_letters.read().map_err(poisoned)?.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskPayload;
    use light_core::JobId;
    use std::time::Duration;

    fn resume(id: u64) -> Task {
        Task::new(TaskPayload::Resume {
            job_id: JobId::new(id).unwrap(),
        })
    }

    #[test]
    fn claim_is_fifo_and_counts_attempts() {
        let queue = InMemoryTaskQueue::new();
        let first = queue.enqueue(resume(1)).unwrap();
        queue.enqueue(resume(2)).unwrap();

        let claimed = queue.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, first);
        assert_eq!(claimed.attempt, 1);

        let stats = queue.stats().unwrap();
        assert_eq!(stats.ready, 1);
        assert_eq!(stats.in_flight, 1);
    }

    #[test]
    fn empty_queue_returns_none() {
        let queue = InMemoryTaskQueue::new();
        assert!(queue.claim_next().unwrap().is_none());
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn retry_later_delays_and_keeps_error() {
        let queue = InMemoryTaskQueue::new();
        let id = queue.enqueue(resume(1)).unwrap();
        queue.claim_next().unwrap();

        queue
            .retry_later(id, "not ready".to_string(), Duration::from_secs(60))
            .unwrap();
        assert!(queue.claim_next().unwrap().is_none());
        assert_eq!(queue.stats().unwrap().delayed, 1);

        queue.release_delays().unwrap();
        let again = queue.claim_next().unwrap().unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.attempt, 2);
        assert_eq!(again.last_error.as_deref(), Some("not ready"));
    }

    #[test]
    fn dead_letter_moves_task_out() {
        let queue = InMemoryTaskQueue::new();
        let id = queue.enqueue(resume(1)).unwrap();
        queue.claim_next().unwrap();
        queue.dead_letter(id, "boom".to_string()).unwrap();

        let dls = queue.list_dead_letters(10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].reason, "boom");
        assert!(queue.is_empty().unwrap());
    }

    #[test]
    fn completing_unknown_task_fails() {
        let queue = InMemoryTaskQueue::new();
        let err = queue.complete(TaskId::new()).unwrap_err();
        assert!(matches!(err, QueueError::NotFound(_)));
    }
}
