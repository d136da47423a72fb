//! Child-completion notification dispatcher.
//!
//! Notifications arrive at-least-once and in any order relative to the
//! parent's own progress. The parent's position against
//! `WaitingForChildCompleteNotification` decides what a notification means:
//!
//! ```text
//! Before  -> parent still spawning children; NotReady (queue retries later)
//! Equal   -> consume it; the last pending child moves the parent to polling
//! After   -> parent already past fan-in; ignore
//! ```

use tracing::{debug, info};

use light_jobs::{ChildJobCompletionNotification, JobState, Placement};

use crate::error::JobError;
use crate::manager::JobManager;

/// What handling a notification did to the parent.
#[derive(Debug, Copy, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationOutcome {
    /// Last pending child: parent moved to `PollingForChilds`, poll enqueued.
    Advanced,
    /// Child consumed; other children still pending.
    Recorded,
    /// This child's completion was already consumed.
    Duplicate,
    /// Parent is past the fan-in; nothing to do.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    manager: JobManager,
}

impl NotificationDispatcher {
    pub fn new(manager: JobManager) -> Self {
        Self { manager }
    }

    /// Apply `notification` to its parent in one retried transaction.
    pub fn handle(
        &self,
        notification: &ChildJobCompletionNotification,
    ) -> Result<NotificationOutcome, JobError> {
        let parent_id = notification.parent_job_id;
        let child_id = notification.child_job_id;

        let outcome = self.manager.runner().run(|txn| {
            let mut parent = self
                .manager
                .get(Some(txn), parent_id)?
                .ok_or(JobError::MissingParent {
                    parent: parent_id,
                    child: child_id,
                })?;

            match parent.placement(JobState::WaitingForChildCompleteNotification) {
                Placement::Before => Err(JobError::not_ready(format!(
                    "parent {parent_id} is in {} and not yet waiting for children",
                    parent.state()
                ))),
                Placement::After => Ok(NotificationOutcome::Ignored),
                Placement::Equal => {
                    if !parent.pending_children.remove(&child_id) {
                        return Ok(NotificationOutcome::Duplicate);
                    }

                    let remaining = parent.pending_children.len();
                    if remaining > 0 {
                        self.manager.put(
                            txn,
                            &mut parent,
                            format!("child {child_id} completed, {remaining} remaining"),
                        )?;
                        return Ok(NotificationOutcome::Recorded);
                    }

                    parent.advance_to(JobState::PollingForChilds)?;
                    self.manager.put(
                        txn,
                        &mut parent,
                        format!("child {child_id} completed, all children done"),
                    )?;
                    self.manager.enqueue_job_for_polling(txn, parent_id);
                    Ok(NotificationOutcome::Advanced)
                }
            }
        })?;

        match outcome {
            NotificationOutcome::Advanced => {
                info!(parent_job_id = %parent_id, child_job_id = %child_id, "all children complete, polling")
            }
            other => {
                debug!(parent_job_id = %parent_id, child_job_id = %child_id, outcome = ?other, "notification handled")
            }
        }
        Ok(outcome)
    }
}
