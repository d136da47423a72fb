//! Job persistence and lifecycle operations.
//!
//! `JobManager` is the only component that writes `Job` records. Every
//! mutation runs through the [`TransactionRunner`], so callers never see
//! concurrency conflicts, and queue tasks (next steps, polls, completion
//! notifications) are dispatched only when the write that implies them commits.
//!
//! ## Write rules
//!
//! - the context is validated for the job's current state before every write
//! - every write appends exactly one ChangeLog entry, even when the state is unchanged
//! - state only moves forward ([`Job::advance_to`])
//! - a missing job is [`JobError::JobNotFound`] (fatal)

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use light_core::{Entity, JobId, PromiseHandle, UserId};
use light_jobs::{
    ChildJobCompletionNotification, ImportContext, Job, JobState, JobType, StepRef,
};

use crate::error::JobError;
use crate::pipeline::{PromiseBook, PromiseRecord};
use crate::queue::{Task, TaskPayload};
use crate::store::{Datastore, DatastoreExt, Transaction};
use crate::transaction::TransactionRunner;

#[derive(Clone, Debug)]
pub struct JobManager {
    runner: TransactionRunner,
    promises: PromiseBook,
}

impl JobManager {
    pub fn new(runner: TransactionRunner) -> Self {
        let promises = PromiseBook::new(runner.store().clone());
        Self { runner, promises }
    }

    pub fn runner(&self) -> &TransactionRunner {
        &self.runner
    }

    pub fn promises(&self) -> &PromiseBook {
        &self.promises
    }

    fn store(&self) -> &dyn Datastore {
        self.runner.store().as_ref()
    }

    /// Read a job, inside `txn` when given, else the latest committed version.
    pub fn get(&self, txn: Option<&mut Transaction>, id: JobId) -> Result<Option<Job>, JobError> {
        let job = match txn {
            Some(txn) => self.store().load::<Job>(txn, &id)?,
            None => self.store().load_now::<Job>(&id)?,
        };
        Ok(job)
    }

    /// Read a job inside `txn`, failing if it does not exist.
    pub fn load(&self, txn: &mut Transaction, id: JobId) -> Result<Job, JobError> {
        self.get(Some(txn), id)?.ok_or(JobError::JobNotFound(id))
    }

    /// Validate, log and buffer a job write.
    pub fn put(
        &self,
        txn: &mut Transaction,
        job: &mut Job,
        message: impl Into<String>,
    ) -> Result<(), JobError> {
        job.validate()?;
        job.record(message);
        txn.put_entity(job)?;
        Ok(())
    }

    /// Buffer a `RunStep` task for `job` and make it the job's expected task.
    ///
    /// The caller persists `job`; earlier tasks become stale once it commits.
    pub fn schedule_step(
        &self,
        txn: &mut Transaction,
        job: &mut Job,
        step: StepRef,
        args: Vec<JsonValue>,
    ) {
        let task = Task::new(TaskPayload::RunStep {
            job_id: job.id(),
            step,
            args,
        });
        job.task_id = Some(task.id);
        txn.enqueue(task);
    }

    /// Buffer a `PollChildren` task for `job_id`.
    pub fn enqueue_job_for_polling(&self, txn: &mut Transaction, job_id: JobId) {
        txn.enqueue(Task::new(TaskPayload::PollChildren { job_id }));
    }

    /// Create a root job and schedule its pipeline entry step.
    pub fn enqueue_root_job<C: Serialize>(
        &self,
        job_type: JobType,
        context: &C,
        owner_id: UserId,
        actor_id: UserId,
    ) -> Result<Job, JobError> {
        let id = self.allocate_job_id()?;

        let job = self.runner.run(|txn| {
            let mut job = Job::new(id, job_type, owner_id, actor_id, JsonValue::Null);
            job.set_context(context)?;
            self.schedule_step(txn, &mut job, StepRef::Entry, Vec::new());
            self.put(txn, &mut job, format!("enqueued {job_type} job"))?;
            Ok(job)
        })?;

        info!(job_id = %id, job_type = %job_type, "root job enqueued");
        Ok(job)
    }

    /// Create an `Import` child of `parent_job_id` and schedule its first step.
    ///
    /// The child is registered on the parent (`child_job_ids` and
    /// `pending_children`) in the same transaction that creates it.
    pub fn enqueue_import_job(
        &self,
        import: &ImportContext,
        parent_job_id: JobId,
        root_job_id: JobId,
        promise: Option<PromiseHandle>,
    ) -> Result<Job, JobError> {
        let id = self.allocate_job_id()?;

        let child = self.runner.run(|txn| {
            let mut parent = self.load(txn, parent_job_id)?;
            if parent.is_complete() {
                return Err(JobError::InvariantViolation(format!(
                    "cannot spawn a child of completed job {parent_job_id}"
                )));
            }

            let mut child = Job::new(
                id,
                JobType::Import,
                parent.owner_id,
                parent.actor_id,
                JsonValue::Null,
            )
            .with_parent(parent_job_id, root_job_id)
            .with_promise(promise);
            child.set_context(import)?;
            self.schedule_step(txn, &mut child, StepRef::Entry, Vec::new());
            self.put(
                txn,
                &mut child,
                format!("enqueued import of {}", import.resource_id),
            )?;

            parent.child_job_ids.push(id);
            parent.pending_children.insert(id);
            self.put(txn, &mut parent, format!("spawned child job {id}"))?;
            Ok(child)
        })?;

        info!(job_id = %id, parent_job_id = %parent_job_id, "import child enqueued");
        Ok(child)
    }

    /// Complete a job with `result`.
    ///
    /// Safe to call repeatedly: the first call sets `Complete` and the response,
    /// later calls keep them. Every call appends a ChangeLog entry and, for a
    /// child, re-sends the completion notification to the parent.
    pub fn enqueue_complete_job(
        &self,
        job_id: JobId,
        result: JsonValue,
        message: &str,
    ) -> Result<Job, JobError> {
        let job = self.runner.run(|txn| {
            let mut job = self.load(txn, job_id)?;

            let first = job.complete_with(result.clone());
            if first {
                job.suspension = None;
                job.task_id = None;
                self.put(txn, &mut job, message)?;
            } else {
                self.put(txn, &mut job, format!("{message} (already complete)"))?;
            }

            let response = job.response().cloned().unwrap_or(JsonValue::Null);
            if let Some(handle) = job.promise {
                self.promises.fulfill(txn, handle, response.clone())?;
            }
            if let Some(parent) = job.parent_job_id {
                txn.enqueue(Task::new(TaskPayload::ChildCompleted(
                    ChildJobCompletionNotification::new(job_id, parent, response),
                )));
            }
            Ok(job)
        })?;

        info!(job_id = %job_id, "job complete");
        Ok(job)
    }

    /// Move a job forward to `next`, updating its typed context.
    ///
    /// Re-entering the current state is allowed so a re-delivered step can
    /// repeat its transition.
    pub fn transition<C, F>(
        &self,
        job_id: JobId,
        next: JobState,
        mut update: F,
        message: &str,
    ) -> Result<Job, JobError>
    where
        C: Serialize + DeserializeOwned,
        F: FnMut(&mut C),
    {
        self.runner.run(|txn| {
            let mut job = self.load(txn, job_id)?;
            let mut context: C = job.context_as()?;
            update(&mut context);
            job.set_context(&context)?;
            job.advance_to(next)?;
            self.put(txn, &mut job, message)?;
            debug!(job_id = %job_id, state = %next, "job transitioned");
            Ok(job)
        })
    }

    /// Update only the typed context, keeping the state.
    pub fn update_context<C, F>(&self, job_id: JobId, mut update: F, message: &str) -> Result<Job, JobError>
    where
        C: Serialize + DeserializeOwned,
        F: FnMut(&mut C),
    {
        self.runner.run(|txn| {
            let mut job = self.load(txn, job_id)?;
            let mut context: C = job.context_as()?;
            update(&mut context);
            job.set_context(&context)?;
            self.put(txn, &mut job, message)?;
            Ok(job)
        })
    }

    /// Record a fatal error on the job's ChangeLog. The state is left as is.
    pub fn record_failure(&self, job_id: JobId, reason: &str) -> Result<(), JobError> {
        self.runner.run(|txn| {
            let mut job = self.load(txn, job_id)?;
            job.record(format!("failed: {reason}"));
            txn.put_entity(&job)?;
            Ok(())
        })?;
        warn!(job_id = %job_id, %reason, "job failed");
        Ok(())
    }

    /// Load every child of `job_id` (latest committed versions), in spawn order.
    pub fn children(&self, job_id: JobId) -> Result<Vec<Job>, JobError> {
        let parent = self.get(None, job_id)?.ok_or(JobError::JobNotFound(job_id))?;
        parent
            .child_job_ids
            .iter()
            .map(|id| self.get(None, *id)?.ok_or(JobError::JobNotFound(*id)))
            .collect()
    }

    /// Delete every job and promise. Test and cleanup tooling only.
    pub fn purge_all(&self) -> Result<usize, JobError> {
        let jobs = self.store().purge_kind(Job::KIND)?;
        let promises = self.store().purge_kind(PromiseRecord::KIND)?;
        warn!(jobs, promises, "purged all jobs");
        Ok(jobs + promises)
    }

    /// Reserve a fresh job id without creating the job.
    pub fn allocate_job_id(&self) -> Result<JobId, JobError> {
        let raw = self.store().allocate_id(Job::KIND)?;
        Ok(JobId::new(raw)?)
    }
}
