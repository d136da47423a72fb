//! Job state machine and notification placement.

use serde::{Deserialize, Serialize};

/// Position of a job in its pipeline.
///
/// Declaration order is the progression order; `Ord` follows it. Jobs may skip
/// states (a coordination job never waits for an archive) but never move back.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Enqueued,
    WaitingForArchive,
    ArchiveDownloaded,
    ModuleCreated,
    ModuleVersionReserved,
    ModuleVersionPublished,
    ModuleIndexed,
    WaitingForChildCompleteNotification,
    PollingForChilds,
    Complete,
}

impl JobState {
    /// Every state in progression order.
    pub const ALL: [JobState; 10] = [
        JobState::Enqueued,
        JobState::WaitingForArchive,
        JobState::ArchiveDownloaded,
        JobState::ModuleCreated,
        JobState::ModuleVersionReserved,
        JobState::ModuleVersionPublished,
        JobState::ModuleIndexed,
        JobState::WaitingForChildCompleteNotification,
        JobState::PollingForChilds,
        JobState::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Enqueued => "enqueued",
            JobState::WaitingForArchive => "waiting_for_archive",
            JobState::ArchiveDownloaded => "archive_downloaded",
            JobState::ModuleCreated => "module_created",
            JobState::ModuleVersionReserved => "module_version_reserved",
            JobState::ModuleVersionPublished => "module_version_published",
            JobState::ModuleIndexed => "module_indexed",
            JobState::WaitingForChildCompleteNotification => {
                "waiting_for_child_complete_notification"
            }
            JobState::PollingForChilds => "polling_for_childs",
            JobState::Complete => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete)
    }
}

impl core::fmt::Display for JobState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a job's current state against a target state.
///
/// - `Before`: the job has not reached `target` yet
/// - `Equal`: the job is exactly at `target`
/// - `After`: the job has already moved past `target`
///
/// Assumes the single linear order of [`JobState`]; a branching state machine
/// would need a different check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    Before,
    Equal,
    After,
}

impl Placement {
    pub fn of(current: JobState, target: JobState) -> Self {
        match current.cmp(&target) {
            core::cmp::Ordering::Less => Placement::Before,
            core::cmp::Ordering::Equal => Placement::Equal,
            core::cmp::Ordering::Greater => Placement::After,
        }
    }
}
