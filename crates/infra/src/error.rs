//! Orchestration error taxonomy.
//!
//! - **Retriable**: `Concurrency` (absorbed by the transaction runner) and
//!   `NotReady` (absorbed by queue redelivery). Callers above those layers
//!   only see them once retries are exhausted.
//! - **Fatal**: everything else. The worker records the message on the job and
//!   dead-letters the task.

use thiserror::Error;

use light_core::{DomainError, JobId, PromiseHandle};

use crate::queue::QueueError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum JobError {
    /// Optimistic-concurrency conflict on the datastore.
    #[error("concurrent modification: {0}")]
    Concurrency(String),

    /// The work cannot proceed yet (parent not waiting, archive not exported,
    /// children still running). Redeliver after a backoff.
    #[error("not ready: {0}")]
    NotReady(String),

    /// The transaction runner hit its attempt cap.
    #[error("transaction abandoned after {attempts} attempts: {last}")]
    RetryExhausted { attempts: u32, last: String },

    /// Missing or malformed context field for the job's state.
    #[error("invalid job context: {0}")]
    InvalidContext(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// A notification names a parent that does not exist (data corruption).
    #[error("parent job {parent} of child {child} not found")]
    MissingParent { parent: JobId, child: JobId },

    #[error("promise not found: {0}")]
    PromiseNotFound(PromiseHandle),

    /// Explicit pipeline stop.
    #[error("pipeline {pipeline_id} stopped for job {job_id}: {reason}")]
    PipelineStopped {
        pipeline_id: String,
        job_id: JobId,
        reason: String,
    },

    /// An external collaborator (document source, module catalog) failed.
    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("storage error: {0}")]
    Store(String),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl JobError {
    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    pub fn collaborator(msg: impl Into<String>) -> Self {
        Self::Collaborator(msg.into())
    }

    /// Whether redelivering the same work later can succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(self, JobError::Concurrency(_) | JobError::NotReady(_))
    }
}

impl From<StoreError> for JobError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => JobError::Concurrency(msg),
            other => JobError::Store(other.to_string()),
        }
    }
}

impl From<DomainError> for JobError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => JobError::InvalidContext(msg),
            DomainError::InvalidId(msg) => JobError::InvalidContext(msg),
            DomainError::InvariantViolation(msg) => JobError::InvariantViolation(msg),
        }
    }
}
