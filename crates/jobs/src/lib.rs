//! `light-jobs`: the job model and pipeline step mechanics.
//!
//! Pure types: no storage, queue or clock-driven behaviour beyond timestamps.

pub mod context;
pub mod job;
pub mod notification;
pub mod response;
pub mod state;
pub mod step;

pub use context::{ImportContext, JobContext};
pub use job::{ChangeLogEntry, Job, JobType, Suspension};
pub use notification::ChildJobCompletionNotification;
pub use response::{CollectionTreeNode, ModuleImportResult};
pub use state::{JobState, Placement};
pub use step::{StepInput, StepOutcome, StepRef};
