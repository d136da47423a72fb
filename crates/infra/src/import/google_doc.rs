//! Root `GoogleDocImport` pipeline: creates a collection and fans out one child import.

use std::sync::Arc;

use tracing::info;

use light_jobs::{
    CollectionTreeNode, ImportContext, JobContext, JobState, JobType, ModuleImportResult,
    StepInput, StepOutcome,
};

use super::{ImportServices, bind};
use crate::error::JobError;
use crate::pipeline::{Pipeline, PromiseKind};

pub const PIPELINE_ID: &str = "google-doc-import";

pub fn google_doc_import_pipeline(services: Arc<ImportServices>) -> Pipeline {
    Pipeline::new(PIPELINE_ID, "authorize")
        .step("authorize", bind(&services, authorize))
        .step("create_module", bind(&services, create_module))
        .step("spawn_import", bind(&services, spawn_import))
        .step("assemble_tree", bind(&services, assemble_tree))
}

/// Continue when the owner already granted access, else wait for an external grant.
fn authorize(s: &ImportServices, ctx: &JobContext, _input: StepInput) -> Result<StepOutcome, JobError> {
    let import = s.context(ctx.job_id)?;
    if s.documents.is_authorized(ctx.owner_id, &import.resource_id)? {
        return Ok(StepOutcome::next_with(
            "create_module",
            vec![serde_json::Value::Bool(true)],
        ));
    }

    let job_id = ctx.job_id;
    let promise = s.manager.runner().run(|txn| {
        let mut job = s.manager.load(txn, job_id)?;
        let mut import: ImportContext = job.context_as()?;
        if let Some(existing) = import.authorization_promise {
            return Ok(existing);
        }

        let handle = s.manager.promises().create(txn, job_id, PromiseKind::External)?;
        import.authorization_promise = Some(handle);
        job.set_context(&import)?;
        s.manager.put(txn, &mut job, "awaiting document authorization")?;
        Ok(handle)
    })?;

    Ok(StepOutcome::AwaitPromise {
        promise,
        then: "create_module".to_string(),
    })
}

/// Takes the authorization decision (a bool) as its only argument.
fn create_module(s: &ImportServices, ctx: &JobContext, input: StepInput) -> Result<StepOutcome, JobError> {
    if !input.is_empty() && !input.arg::<bool>(0)? {
        return Ok(StepOutcome::stop("document access was denied"));
    }

    let import = s.context(ctx.job_id)?;
    let title = match import.title {
        Some(title) => title,
        None => s.documents.document_title(&import.resource_id)?,
    };
    let module_id = match import.module_id {
        Some(id) => id,
        None => s.catalog.create_module(ctx.owner_id, &title)?,
    };

    s.manager.transition(
        ctx.job_id,
        JobState::ModuleCreated,
        |c: &mut ImportContext| {
            c.title = Some(title.clone());
            c.module_id = Some(module_id.clone());
        },
        &format!("collection module {module_id} created"),
    )?;
    Ok(StepOutcome::next("spawn_import"))
}

/// Spawn the child import once; a redelivery reuses the spawned children.
fn spawn_import(s: &ImportServices, ctx: &JobContext, _input: StepInput) -> Result<StepOutcome, JobError> {
    let job = s
        .manager
        .get(None, ctx.job_id)?
        .ok_or(JobError::JobNotFound(ctx.job_id))?;

    let futures = if job.child_job_ids.is_empty() {
        let import: ImportContext = job.context_as()?;
        let handle = s
            .manager
            .runner()
            .run(|txn| s.manager.promises().create(txn, job.id(), PromiseKind::ChildFuture))?;

        let mut child_import = ImportContext::new(&import.resource_id);
        child_import.title = import.title.clone();

        let root = job.root_job_id.unwrap_or(job.id());
        let child = s
            .manager
            .enqueue_import_job(&child_import, job.id(), root, Some(handle))?;
        info!(job_id = %job.id(), child_job_id = %child.id(), "child import spawned");
        vec![handle]
    } else {
        s.manager
            .children(job.id())?
            .into_iter()
            .map(|child| {
                child.promise.ok_or_else(|| {
                    JobError::InvariantViolation(format!("child {} has no promise", child.id()))
                })
            })
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(StepOutcome::WaitAll {
        futures,
        then: "assemble_tree".to_string(),
    })
}

/// Build the collection tree from the children's results (in spawn order).
fn assemble_tree(s: &ImportServices, ctx: &JobContext, input: StepInput) -> Result<StepOutcome, JobError> {
    let import = s.context(ctx.job_id)?;
    let children = s.manager.children(ctx.job_id)?;
    let results: Vec<ModuleImportResult> = input.all()?;

    if results.len() != children.len() {
        return Err(JobError::InvariantViolation(format!(
            "{} child results for {} children",
            results.len(),
            children.len()
        )));
    }

    let mut nodes = Vec::with_capacity(children.len());
    for (child, result) in children.iter().zip(&results) {
        match child.job_type {
            JobType::Import => nodes.push(CollectionTreeNode::leaf(result)),
            other => {
                return Ok(StepOutcome::stop(format!(
                    "unsupported child job type {other}"
                )));
            }
        }
    }

    let module_id = import
        .module_id
        .ok_or_else(|| JobError::InvalidContext("module_id missing".to_string()))?;
    let tree = CollectionTreeNode {
        title: import.title.unwrap_or(import.resource_id),
        module_id,
        version: None,
        children: nodes,
    };
    Ok(StepOutcome::value(&tree)?)
}
