//! `light-infra`: durable job orchestration over a transactional store and a task queue,
//! with the pipelines and the worker that drive them.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod import;
pub mod manager;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod runtime;
pub mod store;
pub mod transaction;
pub mod worker;

#[cfg(test)]
mod integration_tests;

pub use config::{ConfigError, OrchestrationConfig};
pub use dispatcher::{NotificationDispatcher, NotificationOutcome};
pub use error::JobError;
pub use manager::JobManager;
pub use pipeline::{Pipeline, PipelineEngine, PromiseBook, PromiseKind, PromiseRecord, Step, StepRun};
pub use queue::{InMemoryTaskQueue, QueueError, Task, TaskPayload, TaskQueue};
pub use retry::{Backoff, RetryPolicy};
pub use runtime::Orchestrator;
pub use store::{Datastore, DatastoreExt, InMemoryDatastore, Key, StoreError, Transaction};
pub use transaction::TransactionRunner;
pub use worker::{QueueWorker, TaskReport, WorkerConfig, WorkerHandle, WorkerStats};
