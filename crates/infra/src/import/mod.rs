//! Import pipelines: Google Doc → collection with one imported module.
//!
//! ```text
//! GoogleDocImport (root)              Import (child)
//!   authorize                           request_archive   → WaitingForArchive
//!   create_module   → ModuleCreated     download_archive  → ArchiveDownloaded
//!   spawn_import ───── spawns ───────▶  create_module     → ModuleCreated
//!   (WaitingForChildCompleteNotification) reserve_version → ModuleVersionReserved
//!   (PollingForChilds)  ◀── notifies ── publish           → ModuleVersionPublished
//!   assemble_tree   → Complete          index             → ModuleIndexed → Complete
//! ```

pub mod collaborators;
pub mod google_doc;
pub mod module_import;

use std::sync::Arc;

use light_core::JobId;
use light_jobs::{ImportContext, JobContext, JobType, StepInput, StepOutcome};

use crate::error::JobError;
use crate::manager::JobManager;
use crate::pipeline::PipelineEngine;

pub use collaborators::{
    ArchiveStatus, CatalogModule, DocumentSource, InMemoryDocumentSource, InMemoryModuleCatalog,
    ModuleCatalog,
};
pub use google_doc::google_doc_import_pipeline;
pub use module_import::module_import_pipeline;

/// What the import steps need: job persistence and the two collaborators.
#[derive(Clone)]
pub struct ImportServices {
    pub manager: JobManager,
    pub documents: Arc<dyn DocumentSource>,
    pub catalog: Arc<dyn ModuleCatalog>,
}

impl ImportServices {
    pub fn new(
        manager: JobManager,
        documents: Arc<dyn DocumentSource>,
        catalog: Arc<dyn ModuleCatalog>,
    ) -> Self {
        Self {
            manager,
            documents,
            catalog,
        }
    }

    /// Latest committed import context of `job_id`.
    pub(crate) fn context(&self, job_id: JobId) -> Result<ImportContext, JobError> {
        let job = self
            .manager
            .get(None, job_id)?
            .ok_or(JobError::JobNotFound(job_id))?;
        Ok(job.context_as()?)
    }
}

/// Register both import pipelines on `engine`.
pub fn register_import_pipelines(engine: &mut PipelineEngine, services: Arc<ImportServices>) {
    engine.register(
        JobType::GoogleDocImport,
        google_doc_import_pipeline(services.clone()),
    );
    engine.register(JobType::Import, module_import_pipeline(services));
}

type StepFn = fn(&ImportServices, &JobContext, StepInput) -> Result<StepOutcome, JobError>;

/// Close a step function over the shared services.
fn bind(
    services: &Arc<ImportServices>,
    step: StepFn,
) -> impl Fn(&JobContext, StepInput) -> Result<StepOutcome, JobError> + Send + Sync + 'static {
    let services = services.clone();
    move |ctx: &JobContext, input: StepInput| step(&services, ctx, input)
}
