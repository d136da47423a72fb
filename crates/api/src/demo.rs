//! In-memory collaborators for running the server on its own.
//!
//! The binary has no real document provider or module catalog behind it.
//! It serves one seeded document, [`DEMO_RESOURCE_ID`], that no owner is
//! authorized for: an import of it suspends until the grant arrives through
//! `POST /promises/{handle}`.

use std::sync::Arc;

use light_infra::import::{InMemoryDocumentSource, InMemoryModuleCatalog};
use light_infra::{JobError, OrchestrationConfig, Orchestrator};

pub const DEMO_RESOURCE_ID: &str = "demo-doc";
pub const DEMO_TITLE: &str = "Demo document";

pub fn demo_orchestrator(config: OrchestrationConfig) -> Result<Orchestrator, JobError> {
    let documents = Arc::new(InMemoryDocumentSource::new());
    documents.add_document(DEMO_RESOURCE_ID, DEMO_TITLE)?;
    Ok(Orchestrator::in_memory(
        config,
        documents,
        Arc::new(InMemoryModuleCatalog::new()),
    ))
}
