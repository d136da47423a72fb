//! Child `Import` pipeline: export one document and publish it as a module version.

use std::sync::Arc;

use tracing::debug;

use light_jobs::{ImportContext, JobContext, JobState, ModuleImportResult, StepInput, StepOutcome};

use super::collaborators::ArchiveStatus;
use super::{ImportServices, bind};
use crate::error::JobError;
use crate::pipeline::Pipeline;

pub const PIPELINE_ID: &str = "module-import";

pub fn module_import_pipeline(services: Arc<ImportServices>) -> Pipeline {
    Pipeline::new(PIPELINE_ID, "request_archive")
        .step("request_archive", bind(&services, request_archive))
        .step("download_archive", bind(&services, download_archive))
        .step("create_module", bind(&services, create_module))
        .step("reserve_version", bind(&services, reserve_version))
        .step("publish", bind(&services, publish))
        .step("index", bind(&services, index))
}

fn request_archive(
    s: &ImportServices,
    ctx: &JobContext,
    _input: StepInput,
) -> Result<StepOutcome, JobError> {
    let import = s.context(ctx.job_id)?;
    let archive_id = match import.archive_id {
        Some(id) => id,
        None => s.documents.request_archive(&import.resource_id)?,
    };

    s.manager.transition(
        ctx.job_id,
        JobState::WaitingForArchive,
        |c: &mut ImportContext| c.archive_id = Some(archive_id.clone()),
        &format!("archive {archive_id} requested"),
    )?;
    Ok(StepOutcome::next("download_archive"))
}

fn download_archive(
    s: &ImportServices,
    ctx: &JobContext,
    _input: StepInput,
) -> Result<StepOutcome, JobError> {
    let import = s.context(ctx.job_id)?;
    let archive_id = import
        .archive_id
        .ok_or_else(|| JobError::InvalidContext("archive_id missing".to_string()))?;

    let location = match import.archive_location {
        Some(location) => location,
        None => match s.documents.archive_status(&archive_id)? {
            ArchiveStatus::Pending => {
                debug!(archive_id = %archive_id, "archive not exported yet");
                return Err(JobError::not_ready(format!(
                    "archive {archive_id} not exported yet"
                )));
            }
            ArchiveStatus::Ready { location } => location,
        },
    };

    s.manager.transition(
        ctx.job_id,
        JobState::ArchiveDownloaded,
        |c: &mut ImportContext| c.archive_location = Some(location.clone()),
        "archive downloaded",
    )?;
    Ok(StepOutcome::next("create_module"))
}

fn create_module(
    s: &ImportServices,
    ctx: &JobContext,
    _input: StepInput,
) -> Result<StepOutcome, JobError> {
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
        &format!("module {module_id} created"),
    )?;
    Ok(StepOutcome::next("reserve_version"))
}

fn reserve_version(
    s: &ImportServices,
    ctx: &JobContext,
    _input: StepInput,
) -> Result<StepOutcome, JobError> {
    let import = s.context(ctx.job_id)?;
    let module_id = required_module(&import)?;
    let version = match import.version {
        Some(v) => v,
        None => s.catalog.reserve_version(module_id)?,
    };

    s.manager.transition(
        ctx.job_id,
        JobState::ModuleVersionReserved,
        |c: &mut ImportContext| c.version = Some(version),
        &format!("version {version} reserved"),
    )?;
    Ok(StepOutcome::next("publish"))
}

fn publish(s: &ImportServices, ctx: &JobContext, _input: StepInput) -> Result<StepOutcome, JobError> {
    let import = s.context(ctx.job_id)?;
    if !import.published {
        let module_id = required_module(&import)?;
        let version = required_version(&import)?;
        let location = import.archive_location.as_deref().unwrap_or_default();
        s.catalog.publish(module_id, version, location)?;
    }

    s.manager.transition(
        ctx.job_id,
        JobState::ModuleVersionPublished,
        |c: &mut ImportContext| c.published = true,
        "module version published",
    )?;
    Ok(StepOutcome::next("index"))
}

fn index(s: &ImportServices, ctx: &JobContext, _input: StepInput) -> Result<StepOutcome, JobError> {
    let import = s.context(ctx.job_id)?;
    let module_id = required_module(&import)?.to_string();
    let version = required_version(&import)?;
    if !import.indexed {
        s.catalog.index(&module_id, version)?;
    }

    s.manager.transition(
        ctx.job_id,
        JobState::ModuleIndexed,
        |c: &mut ImportContext| c.indexed = true,
        "module version indexed",
    )?;

    let result = ModuleImportResult {
        module_id,
        version,
        title: import.title.unwrap_or(import.resource_id),
    };
    Ok(StepOutcome::value(&result)?)
}

fn required_module(import: &ImportContext) -> Result<&str, JobError> {
    import
        .module_id
        .as_deref()
        .ok_or_else(|| JobError::InvalidContext("module_id missing".to_string()))
}

fn required_version(import: &ImportContext) -> Result<u32, JobError> {
    import
        .version
        .ok_or_else(|| JobError::InvalidContext("version missing".to_string()))
}
