//! The durable job record.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use light_core::{DomainError, DomainResult, Entity, JobId, PromiseHandle, TaskId, UserId};

use crate::context::{ImportContext, JobContext};
use crate::state::{JobState, Placement};

/// Job type, used to route a job to its pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Import one module from an exported archive (spawned as a child).
    Import,
    /// Coordinate importing a Google Doc into a new collection (root).
    GoogleDocImport,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Import => "import",
            JobType::GoogleDocImport => "google_doc_import",
        }
    }

    /// Whether the job's context is an [`ImportContext`] validated per state.
    pub fn uses_import_context(&self) -> bool {
        matches!(self, JobType::Import | JobType::GoogleDocImport)
    }
}

impl core::fmt::Display for JobType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audit record. Never used for control flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// A pipeline pause point persisted on the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    /// Promises that must all be fulfilled before resuming.
    pub awaiting: Vec<PromiseHandle>,
    /// Step to run with the fulfilled values, in `awaiting` order.
    pub then: String,
}

/// A durable unit of orchestrated work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    id: JobId,
    pub job_type: JobType,
    state: JobState,
    /// Typed per job type; see [`Job::context_as`].
    pub context: JsonValue,
    pub parent_job_id: Option<JobId>,
    pub root_job_id: Option<JobId>,
    /// Every child ever spawned, in spawn order.
    pub child_job_ids: Vec<JobId>,
    /// Children whose completion notification has not been consumed yet.
    pub pending_children: BTreeSet<JobId>,
    change_log: Vec<ChangeLogEntry>,
    /// Queue task expected to run the next step.
    pub task_id: Option<TaskId>,
    /// Promise fulfilled with this job's response on completion.
    pub promise: Option<PromiseHandle>,
    pub suspension: Option<Suspension>,
    pub owner_id: UserId,
    pub actor_id: UserId,
    response: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity for Job {
    type Id = JobId;

    const KIND: &'static str = "Job";

    fn id(&self) -> &JobId {
        &self.id
    }
}

impl Job {
    /// Create a job in `Enqueued`.
    pub fn new(
        id: JobId,
        job_type: JobType,
        owner_id: UserId,
        actor_id: UserId,
        context: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            job_type,
            state: JobState::Enqueued,
            context,
            parent_job_id: None,
            root_job_id: None,
            child_job_ids: Vec::new(),
            pending_children: BTreeSet::new(),
            change_log: Vec::new(),
            task_id: None,
            promise: None,
            suspension: None,
            owner_id,
            actor_id,
            response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Link this job under a parent and root.
    pub fn with_parent(mut self, parent: JobId, root: JobId) -> Self {
        self.parent_job_id = Some(parent);
        self.root_job_id = Some(root);
        self
    }

    pub fn with_promise(mut self, promise: Option<PromiseHandle>) -> Self {
        self.promise = promise;
        self
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn response(&self) -> Option<&JsonValue> {
        self.response.as_ref()
    }

    pub fn change_log(&self) -> &[ChangeLogEntry] {
        &self.change_log
    }

    pub fn last_message(&self) -> Option<&str> {
        self.change_log.last().map(|e| e.message.as_str())
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }

    /// Identity for running one of this job's steps.
    pub fn step_context(&self) -> JobContext {
        JobContext::new(self.id, self.owner_id, self.actor_id)
    }

    /// Where the current state sits relative to `target`.
    pub fn placement(&self, target: JobState) -> Placement {
        Placement::of(self.state, target)
    }

    /// Move forward to `next`. Re-entering the current state is allowed (retry path).
    pub fn advance_to(&mut self, next: JobState) -> DomainResult<()> {
        if next < self.state {
            return Err(DomainError::invariant(format!(
                "job {} cannot move back from {} to {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }

    /// Mark complete with `response`. Returns `false` if the job was already complete,
    /// in which case the stored response is kept.
    pub fn complete_with(&mut self, response: JsonValue) -> bool {
        if self.is_complete() {
            return false;
        }
        self.state = JobState::Complete;
        self.response = Some(response);
        true
    }

    /// Append an audit entry.
    pub fn record(&mut self, message: impl Into<String>) {
        let now = Utc::now();
        self.change_log.push(ChangeLogEntry {
            at: now,
            message: message.into(),
        });
        self.updated_at = now;
    }

    /// Decode the context payload.
    pub fn context_as<T: DeserializeOwned>(&self) -> DomainResult<T> {
        serde_json::from_value(self.context.clone()).map_err(|e| {
            DomainError::validation(format!("job {} has malformed context: {e}", self.id))
        })
    }

    /// Replace the context payload.
    pub fn set_context<T: Serialize>(&mut self, context: &T) -> DomainResult<()> {
        self.context = serde_json::to_value(context).map_err(|e| {
            DomainError::validation(format!("job {} context not serializable: {e}", self.id))
        })?;
        Ok(())
    }

    /// Check the context against the fields required by the current state.
    pub fn validate(&self) -> DomainResult<()> {
        if self.job_type.uses_import_context() {
            self.context_as::<ImportContext>()?.validate(self.state)?;
        }
        Ok(())
    }
}
