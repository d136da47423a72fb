//! Pipeline engine.
//!
//! ## Delivery model
//!
//! ```text
//! RunStep(task_id, job, step, args)
//!   ↓
//! 1. Load job; drop the delivery if the job is complete or expects another task
//!   ↓
//! 2. Resolve the job type's pipeline and the step (unknown → explicit stop)
//!   ↓
//! 3. Run the step under a span carrying the job's principals
//!   ↓
//! 4. Apply the outcome in one transaction:
//!      Value        → complete the job
//!      Next         → schedule the next step (new expected task id)
//!      WaitAll      → persist suspension, move to WaitingForChildCompleteNotification
//!      AwaitPromise → persist suspension (or continue if already fulfilled)
//!      Stop         → PipelineStopped
//! ```
//!
//! Suspended jobs continue through [`PipelineEngine::resume`] (external
//! promises) or [`PipelineEngine::poll_children`] (fan-in).

use std::collections::HashMap;

use serde_json::Value as JsonValue;
use tracing::{debug, info, info_span, warn};

use light_core::{JobId, PromiseHandle, TaskId};
use light_jobs::{Job, JobState, JobType, Placement, StepInput, StepOutcome, StepRef, Suspension};

use super::Pipeline;
use super::promise::PromiseKind;
use crate::error::JobError;
use crate::manager::JobManager;

/// What a delivery did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRun {
    /// The job completed with the step's value.
    Completed,
    /// `step` was scheduled as the job's next task.
    Scheduled { step: String },
    /// The job is suspended until its promises are fulfilled.
    Suspended { then: String },
    /// Nothing to do (stale or duplicate delivery).
    Skipped { reason: String },
}

impl StepRun {
    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineEngine {
    manager: JobManager,
    pipelines: HashMap<JobType, Pipeline>,
}

impl PipelineEngine {
    pub fn new(manager: JobManager) -> Self {
        Self {
            manager,
            pipelines: HashMap::new(),
        }
    }

    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    /// Register (or replace) the pipeline for `job_type`.
    pub fn register(&mut self, job_type: JobType, pipeline: Pipeline) {
        debug!(job_type = %job_type, pipeline = pipeline.id(), "pipeline registered");
        self.pipelines.insert(job_type, pipeline);
    }

    pub fn pipeline(&self, job_type: JobType) -> Option<&Pipeline> {
        self.pipelines.get(&job_type)
    }

    /// Run one step delivery.
    pub fn run_step(
        &self,
        task_id: TaskId,
        job_id: JobId,
        step: &StepRef,
        args: Vec<JsonValue>,
    ) -> Result<StepRun, JobError> {
        let job = self
            .manager
            .get(None, job_id)?
            .ok_or(JobError::JobNotFound(job_id))?;

        if job.is_complete() {
            return Ok(StepRun::skipped("job already complete"));
        }
        if job.task_id != Some(task_id) {
            debug!(job_id = %job_id, task_id = %task_id, "stale step delivery");
            return Ok(StepRun::skipped("stale task"));
        }

        let pipeline = self.pipelines.get(&job.job_type).ok_or_else(|| {
            stopped(job.job_type.as_str(), job_id, "no pipeline registered")
        })?;
        let (name, runner) = pipeline
            .resolve(step)
            .ok_or_else(|| stopped(pipeline.id(), job_id, format!("unknown step {step}")))?;

        let ctx = job.step_context();
        let span = info_span!(
            "pipeline_step",
            pipeline = pipeline.id(),
            step = name,
            job_id = %ctx.job_id,
            owner_id = %ctx.owner_id,
            actor_id = %ctx.actor_id,
        );
        let _guard = span.enter();

        debug!("running step");
        let outcome = runner.run(&ctx, StepInput::new(args))?;
        self.apply(pipeline, task_id, job_id, name, outcome)
    }

    fn apply(
        &self,
        pipeline: &Pipeline,
        task_id: TaskId,
        job_id: JobId,
        name: &str,
        outcome: StepOutcome,
    ) -> Result<StepRun, JobError> {
        match outcome {
            StepOutcome::Value { value } => {
                self.manager.enqueue_complete_job(
                    job_id,
                    value,
                    &format!("pipeline {} complete", pipeline.id()),
                )?;
                Ok(StepRun::Completed)
            }
            StepOutcome::Next { step, args } => {
                self.ensure_step(pipeline, job_id, &step)?;
                self.with_current_task(job_id, task_id, |engine, txn, job| {
                    engine.manager.schedule_step(txn, job, StepRef::named(&step), args.clone());
                    engine.manager.put(txn, job, format!("step {name} done, next {step}"))?;
                    Ok(StepRun::Scheduled { step: step.clone() })
                })
            }
            StepOutcome::WaitAll { futures, then } => {
                self.ensure_step(pipeline, job_id, &then)?;
                self.with_current_task(job_id, task_id, |engine, txn, job| {
                    job.suspension = Some(Suspension {
                        awaiting: futures.clone(),
                        then: then.clone(),
                    });
                    job.task_id = None;
                    job.advance_to(JobState::WaitingForChildCompleteNotification)?;

                    if job.pending_children.is_empty() {
                        // Every child already reported; go straight to polling.
                        job.advance_to(JobState::PollingForChilds)?;
                        engine.manager.put(txn, job, "no children pending, polling")?;
                        engine.manager.enqueue_job_for_polling(txn, job_id);
                    } else {
                        let pending = job.pending_children.len();
                        engine.manager.put(txn, job, format!("waiting for {pending} children"))?;
                    }
                    Ok(StepRun::Suspended { then: then.clone() })
                })
            }
            StepOutcome::AwaitPromise { promise, then } => {
                self.ensure_step(pipeline, job_id, &then)?;
                self.with_current_task(job_id, task_id, |engine, txn, job| {
                    let record = engine.manager.promises().get(txn, promise)?;
                    if record.is_fulfilled() {
                        let value = record.value.unwrap_or(JsonValue::Null);
                        engine.manager.schedule_step(txn, job, StepRef::named(&then), vec![value]);
                        engine.manager.put(txn, job, format!("promise {promise} already fulfilled, next {then}"))?;
                        return Ok(StepRun::Scheduled { step: then.clone() });
                    }

                    job.suspension = Some(Suspension {
                        awaiting: vec![promise],
                        then: then.clone(),
                    });
                    job.task_id = None;
                    engine.manager.put(txn, job, format!("awaiting promise {promise}"))?;
                    Ok(StepRun::Suspended { then: then.clone() })
                })
            }
            StepOutcome::Stop { reason } => Err(stopped(pipeline.id(), job_id, reason)),
        }
    }

    /// Continue a suspended job once all its promises are fulfilled.
    ///
    /// A fan-in only continues from `PollingForChilds`: while the job still
    /// waits for child notifications the delivery is skipped, even if every
    /// child future already holds a value.
    pub fn resume(&self, job_id: JobId) -> Result<StepRun, JobError> {
        let run = self.manager.runner().run(|txn| {
            let mut job = self.manager.load(txn, job_id)?;
            if job.is_complete() {
                return Ok(StepRun::skipped("job already complete"));
            }
            if job.placement(JobState::WaitingForChildCompleteNotification) == Placement::Equal {
                return Ok(StepRun::skipped("waiting for child notifications"));
            }
            let Some(suspension) = job.suspension.clone() else {
                return Ok(StepRun::skipped("job not suspended"));
            };

            let mut values = Vec::with_capacity(suspension.awaiting.len());
            for handle in &suspension.awaiting {
                let record = self.manager.promises().get(txn, *handle)?;
                if !record.is_fulfilled() {
                    return Err(JobError::not_ready(format!("promise {handle} not fulfilled")));
                }
                values.push(record.value.unwrap_or(JsonValue::Null));
            }

            job.suspension = None;
            self.manager
                .schedule_step(txn, &mut job, StepRef::named(&suspension.then), values);
            self.manager
                .put(txn, &mut job, format!("resumed, next {}", suspension.then))?;
            Ok(StepRun::Scheduled {
                step: suspension.then,
            })
        })?;

        if let StepRun::Scheduled { step } = &run {
            info!(job_id = %job_id, next = %step, "job resumed");
        }
        Ok(run)
    }

    /// Fan-in check for a job in `PollingForChilds`.
    pub fn poll_children(&self, job_id: JobId) -> Result<StepRun, JobError> {
        let job = self
            .manager
            .get(None, job_id)?
            .ok_or(JobError::JobNotFound(job_id))?;

        match job.placement(JobState::PollingForChilds) {
            Placement::Before => {
                warn!(job_id = %job_id, state = %job.state(), "poll for job not yet polling");
                return Ok(StepRun::skipped("job not polling"));
            }
            Placement::After => return Ok(StepRun::skipped("job past polling")),
            Placement::Equal => {}
        }

        let pending = self.incomplete_children(&job)?;
        if !pending.is_empty() {
            debug!(job_id = %job_id, pending = pending.len(), "children still running");
            return Err(JobError::not_ready("waiting for children to complete"));
        }

        self.resume(job_id)
    }

    /// Fulfil an external promise (user or webhook input).
    pub fn fulfill_external(&self, handle: PromiseHandle, value: JsonValue) -> Result<bool, JobError> {
        let fulfilled = self.manager.runner().run(|txn| {
            let record = self.manager.promises().get(txn, handle)?;
            if record.kind != PromiseKind::External {
                return Err(JobError::InvariantViolation(format!(
                    "promise {handle} is fulfilled by its child job"
                )));
            }
            self.manager.promises().fulfill(txn, handle, value.clone())
        })?;

        info!(promise = %handle, fulfilled, "external promise fulfilment");
        Ok(fulfilled)
    }

    fn incomplete_children(&self, job: &Job) -> Result<Vec<JobId>, JobError> {
        Ok(self
            .manager
            .children(job.id())?
            .into_iter()
            .filter(|child| !child.is_complete())
            .map(|child| child.id())
            .collect())
    }

    fn ensure_step(&self, pipeline: &Pipeline, job_id: JobId, step: &str) -> Result<(), JobError> {
        if pipeline.has_step(step) {
            Ok(())
        } else {
            Err(stopped(pipeline.id(), job_id, format!("unknown step {step}")))
        }
    }

    /// Run `body` on the job only while it still expects `task_id`.
    fn with_current_task<F>(&self, job_id: JobId, task_id: TaskId, mut body: F) -> Result<StepRun, JobError>
    where
        F: FnMut(&Self, &mut crate::store::Transaction, &mut Job) -> Result<StepRun, JobError>,
    {
        self.manager.runner().run(|txn| {
            let mut job = self.manager.load(txn, job_id)?;
            if job.task_id != Some(task_id) || job.is_complete() {
                return Ok(StepRun::skipped("superseded while running"));
            }
            body(self, txn, &mut job)
        })
    }
}

fn stopped(pipeline_id: &str, job_id: JobId, reason: impl Into<String>) -> JobError {
    JobError::PipelineStopped {
        pipeline_id: pipeline_id.to_string(),
        job_id,
        reason: reason.into(),
    }
}
