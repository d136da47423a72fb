use serde::{Deserialize, Serialize};

use light_core::{JobId, PromiseHandle, UserId};
use light_jobs::{Job, JobState, JobType};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct StartImportRequest {
    pub resource_id: String,
    pub owner_id: UserId,
    /// Defaults to the owner.
    pub actor_id: Option<UserId>,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub job_type: JobType,
    pub state: JobState,
    pub last_message: Option<String>,
    pub response: Option<serde_json::Value>,
    pub parent_job_id: Option<JobId>,
    pub child_job_ids: Vec<JobId>,
    pub pending_children: Vec<JobId>,
    /// Promises the job is suspended on.
    pub awaiting: Vec<PromiseHandle>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id(),
            job_type: job.job_type,
            state: job.state(),
            last_message: job.last_message().map(str::to_string),
            response: job.response().cloned(),
            parent_job_id: job.parent_job_id,
            child_job_ids: job.child_job_ids.clone(),
            pending_children: job.pending_children.iter().copied().collect(),
            awaiting: job
                .suspension
                .as_ref()
                .map(|s| s.awaiting.clone())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FulfillPromiseResponse {
    pub handle: PromiseHandle,
    /// False when the promise already held a value.
    pub fulfilled: bool,
}
