//! Queue task types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use light_core::{JobId, TaskId};
use light_jobs::{ChildJobCompletionNotification, StepRef};

/// Work a queue task asks the worker to perform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskPayload {
    /// Run one pipeline step of a job.
    RunStep {
        job_id: JobId,
        step: StepRef,
        #[serde(default)]
        args: Vec<JsonValue>,
    },
    /// Re-check a job suspended on an external promise.
    Resume { job_id: JobId },
    /// Check whether a fan-in job's children are all complete.
    PollChildren { job_id: JobId },
    /// Deliver a child completion to its parent.
    ChildCompleted(ChildJobCompletionNotification),
}

impl TaskPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskPayload::RunStep { .. } => "run_step",
            TaskPayload::Resume { .. } => "resume",
            TaskPayload::PollChildren { .. } => "poll_children",
            TaskPayload::ChildCompleted(_) => "child_completed",
        }
    }
}

/// A unit of queued work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub payload: TaskPayload,
    /// Deliveries so far (incremented on claim).
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    /// Not deliverable before this instant.
    pub not_before: Option<DateTime<Utc>>,
    /// Error from the previous delivery, if it failed.
    pub last_error: Option<String>,
}

impl Task {
    pub fn new(payload: TaskPayload) -> Self {
        Self::with_id(TaskId::new(), payload)
    }

    /// Create a task with a caller-chosen id (the id a job expects to run next).
    pub fn with_id(id: TaskId, payload: TaskPayload) -> Self {
        Self {
            id,
            payload,
            attempt: 0,
            created_at: Utc::now(),
            not_before: None,
            last_error: None,
        }
    }

    /// Delay delivery by `delay` from now.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.not_before = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        self
    }

    pub fn is_ready(&self) -> bool {
        match self.not_before {
            Some(at) => Utc::now() >= at,
            None => true,
        }
    }

    /// Job the task concerns (the parent for a completion notification).
    pub fn job_id(&self) -> JobId {
        match &self.payload {
            TaskPayload::RunStep { job_id, .. }
            | TaskPayload::Resume { job_id }
            | TaskPayload::PollChildren { job_id } => *job_id,
            TaskPayload::ChildCompleted(n) => n.parent_job_id,
        }
    }
}

/// Entry in the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub task: Task,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(task: Task, reason: String) -> Self {
        Self {
            task,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub ready: usize,
    pub delayed: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(id: u64) -> JobId {
        JobId::new(id).unwrap()
    }

    #[test]
    fn delayed_task_is_not_ready() {
        let task = Task::new(TaskPayload::Resume { job_id: job(1) }).delayed(Duration::from_secs(60));
        assert!(!task.is_ready());
        assert!(Task::new(TaskPayload::Resume { job_id: job(1) }).is_ready());
    }

    #[test]
    fn completion_task_routes_to_parent() {
        let n = ChildJobCompletionNotification::new(job(2), job(1), JsonValue::Null);
        let task = Task::new(TaskPayload::ChildCompleted(n));
        assert_eq!(task.job_id(), job(1));
        assert_eq!(task.payload.kind(), "child_completed");
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = TaskPayload::RunStep {
            job_id: job(7),
            step: StepRef::named("publish"),
            args: vec![],
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "run_step");
        assert_eq!(json["job_id"], 7);
    }
}
