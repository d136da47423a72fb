//! Pipeline engine: named steps chained through the task queue.
//!
//! A [`Pipeline`] is registered per job type. Each queue delivery runs exactly
//! one step; the step's [`StepOutcome`] tells the engine whether to complete
//! the job, schedule another step, or suspend on promises.

pub mod engine;
pub mod promise;

use std::collections::HashMap;
use std::sync::Arc;

use light_jobs::{JobContext, StepInput, StepOutcome, StepRef};

use crate::error::JobError;

pub use engine::{PipelineEngine, StepRun};
pub use promise::{PromiseBook, PromiseKind, PromiseRecord};

/// One unit of pipeline work.
///
/// Steps may run more than once for the same job (redelivery), so they must
/// check persisted progress before calling out. Return
/// [`JobError::NotReady`] to be re-invoked later; any other error stops the job.
pub trait Step: Send + Sync {
    fn run(&self, ctx: &JobContext, input: StepInput) -> Result<StepOutcome, JobError>;
}

impl<F> Step for F
where
    F: Fn(&JobContext, StepInput) -> Result<StepOutcome, JobError> + Send + Sync,
{
    fn run(&self, ctx: &JobContext, input: StepInput) -> Result<StepOutcome, JobError> {
        self(ctx, input)
    }
}

/// A named set of steps with an entry point.
#[derive(Clone)]
pub struct Pipeline {
    id: String,
    entry: String,
    steps: HashMap<String, Arc<dyn Step>>,
}

impl core::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut names: Vec<_> = self.steps.keys().collect();
        names.sort();
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("entry", &self.entry)
            .field("steps", &names)
            .finish()
    }
}

impl Pipeline {
    pub fn new(id: impl Into<String>, entry: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entry: entry.into(),
            steps: HashMap::new(),
        }
    }

    /// Add a step implemented by a closure.
    pub fn step<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&JobContext, StepInput) -> Result<StepOutcome, JobError> + Send + Sync + 'static,
    {
        self.with_step(name, Arc::new(f))
    }

    pub fn with_step(mut self, name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        self.steps.insert(name.into(), step);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn has_step(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    /// Resolve a step reference to its name and implementation.
    pub fn resolve(&self, step: &StepRef) -> Option<(&str, &Arc<dyn Step>)> {
        let name = match step {
            StepRef::Entry => self.entry.as_str(),
            StepRef::Named(name) => name.as_str(),
        };
        self.steps.get_key_value(name).map(|(k, v)| (k.as_str(), v))
    }
}
