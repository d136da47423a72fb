//! Queue worker: claims tasks and routes them to the engine or dispatcher.

use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use light_core::TaskId;

use crate::dispatcher::NotificationDispatcher;
use crate::error::JobError;
use crate::pipeline::PipelineEngine;
use crate::queue::{QueueError, Task, TaskPayload, TaskQueue};
use crate::retry::RetryPolicy;

/// Worker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// How long to sleep when no task is ready
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "light-worker".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Outcome of processing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskReport {
    Done {
        task_id: TaskId,
        kind: &'static str,
    },
    Retrying {
        task_id: TaskId,
        attempt: u32,
        delay: Duration,
    },
    DeadLettered {
        task_id: TaskId,
        reason: String,
    },
}

/// Worker runtime statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorkerStats {
    pub tasks_processed: u64,
    pub tasks_succeeded: u64,
    pub tasks_retried: u64,
    pub tasks_dead_lettered: u64,
    pub uptime_secs: u64,
}

impl WorkerStats {
    fn count(&mut self, report: &TaskReport) {
        self.tasks_processed += 1;
        match report {
            TaskReport::Done { .. } => self.tasks_succeeded += 1,
            TaskReport::Retrying { .. } => self.tasks_retried += 1,
            TaskReport::DeadLettered { .. } => self.tasks_dead_lettered += 1,
        }
    }
}

/// Handle to control a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl WorkerHandle {
    /// Request graceful shutdown and wait for the current task to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[derive(Clone)]
pub struct QueueWorker {
    engine: Arc<PipelineEngine>,
    dispatcher: NotificationDispatcher,
    queue: Arc<dyn TaskQueue>,
    retry: RetryPolicy,
}

impl QueueWorker {
    pub fn new(
        engine: Arc<PipelineEngine>,
        dispatcher: NotificationDispatcher,
        queue: Arc<dyn TaskQueue>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            engine,
            dispatcher,
            queue,
            retry,
        }
    }

    /// Claim and process one ready task, if any.
    pub fn process_next(&self) -> Result<Option<TaskReport>, QueueError> {
        let Some(task) = self.queue.claim_next()? else {
            return Ok(None);
        };

        debug!(
            task_id = %task.id,
            kind = task.payload.kind(),
            job_id = %task.job_id(),
            attempt = task.attempt,
            "claimed task"
        );

        let report = match self.execute(&task) {
            Ok(()) => {
                self.queue.complete(task.id)?;
                TaskReport::Done {
                    task_id: task.id,
                    kind: task.payload.kind(),
                }
            }
            Err(err) if err.is_retriable() && self.may_redeliver(&task) => {
                let delay = self.retry.delay_for_attempt(task.attempt);
                debug!(task_id = %task.id, attempt = task.attempt, error = %err, "task not ready, retrying later");
                self.queue.retry_later(task.id, err.to_string(), delay)?;
                TaskReport::Retrying {
                    task_id: task.id,
                    attempt: task.attempt,
                    delay,
                }
            }
            Err(err) => {
                let reason = if err.is_retriable() {
                    format!("gave up after {} attempts: {err}", task.attempt)
                } else {
                    err.to_string()
                };
                error!(task_id = %task.id, job_id = %task.job_id(), error = %reason, "task failed");
                self.record_failure(&task, &reason);
                self.queue.dead_letter(task.id, reason.clone())?;
                TaskReport::DeadLettered {
                    task_id: task.id,
                    reason,
                }
            }
        };
        Ok(Some(report))
    }

    /// Process tasks until none is ready or `limit` tasks were handled.
    pub fn run_until_idle(&self, limit: usize) -> Result<Vec<TaskReport>, QueueError> {
        let mut reports = Vec::new();
        while reports.len() < limit {
            match self.process_next()? {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        Ok(reports)
    }

    /// Spawn the worker on a background thread.
    pub fn spawn(self, config: WorkerConfig) -> std::io::Result<WorkerHandle> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let stats_clone = stats.clone();

        let join = thread::Builder::new()
            .name(config.name.clone())
            .spawn(move || worker_loop(self, config, shutdown_rx, stats_clone))?;

        Ok(WorkerHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        })
    }

    fn execute(&self, task: &Task) -> Result<(), JobError> {
        match &task.payload {
            TaskPayload::RunStep { job_id, step, args } => {
                let run = self.engine.run_step(task.id, *job_id, step, args.clone())?;
                debug!(job_id = %job_id, ?run, "step delivered");
            }
            TaskPayload::Resume { job_id } => {
                self.engine.resume(*job_id)?;
            }
            TaskPayload::PollChildren { job_id } => {
                self.engine.poll_children(*job_id)?;
            }
            TaskPayload::ChildCompleted(notification) => {
                self.dispatcher.handle(notification)?;
            }
        }
        Ok(())
    }

    /// Child-completion notifications ignore the attempt limit: the parent
    /// only consumes them once it is waiting, and a dropped one would leave it
    /// waiting forever.
    fn may_redeliver(&self, task: &Task) -> bool {
        matches!(task.payload, TaskPayload::ChildCompleted(_)) || self.retry.should_retry(task.attempt)
    }

    fn record_failure(&self, task: &Task, reason: &str) {
        let job_id = task.job_id();
        if let Err(err) = self.engine.manager().record_failure(job_id, reason) {
            warn!(job_id = %job_id, error = %err, "could not record failure on job");
        }
    }
}

fn worker_loop(
    worker: QueueWorker,
    config: WorkerConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = %config.name, "queue worker started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        match worker.process_next() {
            Ok(Some(report)) => {
                if let Ok(mut s) = stats.lock() {
                    s.count(&report);
                    s.uptime_secs = start_time.elapsed().as_secs();
                }
            }
            Ok(None) => thread::sleep(config.poll_interval),
            Err(e) => {
                error!(worker = %config.name, error = %e, "queue failure");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(worker = %config.name, "queue worker stopped");
}
