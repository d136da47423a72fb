//! Wiring: one place that builds the store, queue, manager, engine, dispatcher
//! and worker from an [`OrchestrationConfig`].

use std::sync::Arc;

use light_jobs::{ImportContext, Job, JobType};
use light_core::UserId;

use crate::config::OrchestrationConfig;
use crate::dispatcher::NotificationDispatcher;
use crate::error::JobError;
use crate::import::{DocumentSource, ImportServices, ModuleCatalog, register_import_pipelines};
use crate::manager::JobManager;
use crate::pipeline::PipelineEngine;
use crate::queue::{InMemoryTaskQueue, TaskQueue};
use crate::store::{Datastore, InMemoryDatastore};
use crate::transaction::TransactionRunner;
use crate::worker::{QueueWorker, WorkerHandle};

#[derive(Clone)]
pub struct Orchestrator {
    config: OrchestrationConfig,
    store: Arc<dyn Datastore>,
    queue: Arc<dyn TaskQueue>,
    manager: JobManager,
    engine: Arc<PipelineEngine>,
    dispatcher: NotificationDispatcher,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build over in-memory storage with the import pipelines registered.
    pub fn in_memory(
        config: OrchestrationConfig,
        documents: Arc<dyn DocumentSource>,
        catalog: Arc<dyn ModuleCatalog>,
    ) -> Self {
        Self::with_backends(
            config,
            Arc::new(InMemoryDatastore::new()),
            InMemoryTaskQueue::arc(),
            documents,
            catalog,
        )
    }

    pub fn with_backends(
        config: OrchestrationConfig,
        store: Arc<dyn Datastore>,
        queue: Arc<dyn TaskQueue>,
        documents: Arc<dyn DocumentSource>,
        catalog: Arc<dyn ModuleCatalog>,
    ) -> Self {
        let runner = TransactionRunner::new(
            store.clone(),
            queue.clone(),
            config.transaction_retry.clone(),
        );
        let manager = JobManager::new(runner);

        let mut engine = PipelineEngine::new(manager.clone());
        let services = Arc::new(ImportServices::new(manager.clone(), documents, catalog));
        register_import_pipelines(&mut engine, services);

        Self {
            dispatcher: NotificationDispatcher::new(manager.clone()),
            config,
            store,
            queue,
            manager,
            engine: Arc::new(engine),
        }
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Datastore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn TaskQueue> {
        &self.queue
    }

    pub fn manager(&self) -> &JobManager {
        &self.manager
    }

    pub fn engine(&self) -> &PipelineEngine {
        &self.engine
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    /// A worker over this orchestrator's queue.
    pub fn worker(&self) -> QueueWorker {
        QueueWorker::new(
            self.engine.clone(),
            self.dispatcher.clone(),
            self.queue.clone(),
            self.config.queue_retry.clone(),
        )
    }

    /// Start a background worker with the configured poll interval.
    pub fn spawn_worker(&self) -> std::io::Result<WorkerHandle> {
        self.worker().spawn(self.config.worker.clone())
    }

    /// Enqueue a root `GoogleDocImport` job for `resource_id`.
    pub fn start_google_doc_import(
        &self,
        resource_id: &str,
        owner_id: UserId,
        actor_id: UserId,
    ) -> Result<Job, JobError> {
        self.manager.enqueue_root_job(
            JobType::GoogleDocImport,
            &ImportContext::new(resource_id),
            owner_id,
            actor_id,
        )
    }
}
