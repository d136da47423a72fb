//! Pipeline step mechanics (framework only, no import rules).
//!
//! A job runs as a graph of named steps. Each invocation of a step receives a
//! variadic input envelope and answers with a [`StepOutcome`]:
//!
//! - `Value` finishes the pipeline; the value becomes the job's response
//! - `Next` chains to another step with fresh arguments
//! - `WaitAll` fans in on promises fulfilled by child jobs
//! - `AwaitPromise` suspends until an external actor supplies a value
//! - `Stop` ends the pipeline run for good
//!
//! Infra persists suspensions and re-invokes steps through the task queue, so
//! every step must tolerate running more than once.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use light_core::{DomainError, DomainResult, PromiseHandle};

/// Arguments handed to a step invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepInput {
    pub args: Vec<JsonValue>,
}

impl StepInput {
    pub fn new(args: Vec<JsonValue>) -> Self {
        Self { args }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Decode argument `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> DomainResult<T> {
        let raw = self.args.get(index).ok_or_else(|| {
            DomainError::validation(format!(
                "step argument {index} missing (got {})",
                self.args.len()
            ))
        })?;
        serde_json::from_value(raw.clone())
            .map_err(|e| DomainError::validation(format!("step argument {index}: {e}")))
    }

    /// Decode every argument as the same type.
    pub fn all<T: DeserializeOwned>(&self) -> DomainResult<Vec<T>> {
        (0..self.args.len()).map(|i| self.arg(i)).collect()
    }
}

/// What a step asks the engine to do next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    /// Pipeline finished with this response.
    Value { value: JsonValue },
    /// Run another step of the same pipeline.
    Next { step: String, args: Vec<JsonValue> },
    /// Resume `then` once every future has been fulfilled (fan-in).
    WaitAll {
        futures: Vec<PromiseHandle>,
        then: String,
    },
    /// Resume `then` once an external actor fulfils `promise`.
    AwaitPromise { promise: PromiseHandle, then: String },
    /// The pipeline cannot continue.
    Stop { reason: String },
}

impl StepOutcome {
    pub fn value<T: Serialize>(value: &T) -> DomainResult<Self> {
        let value = serde_json::to_value(value)
            .map_err(|e| DomainError::validation(format!("step result not serializable: {e}")))?;
        Ok(Self::Value { value })
    }

    pub fn next(step: impl Into<String>) -> Self {
        Self::Next {
            step: step.into(),
            args: Vec::new(),
        }
    }

    pub fn next_with(step: impl Into<String>, args: Vec<JsonValue>) -> Self {
        Self::Next {
            step: step.into(),
            args,
        }
    }

    pub fn stop(reason: impl Into<String>) -> Self {
        Self::Stop {
            reason: reason.into(),
        }
    }
}

/// Reference to the step a queue task should run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum StepRef {
    /// The entry step of the job type's pipeline.
    Entry,
    Named(String),
}

impl StepRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

impl core::fmt::Display for StepRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StepRef::Entry => f.write_str("<entry>"),
            StepRef::Named(name) => f.write_str(name),
        }
    }
}
