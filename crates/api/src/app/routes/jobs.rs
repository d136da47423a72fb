use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use light_core::JobId;
use light_infra::{JobError, Orchestrator};

use crate::app::dto::{JobView, StartImportRequest};
use crate::app::errors::ApiError;

pub async fn start_google_doc_import(
    Extension(orchestrator): Extension<Orchestrator>,
    Json(body): Json<StartImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if body.resource_id.trim().is_empty() {
        return Err(ApiError::BadRequest("resource_id must not be empty".to_string()));
    }

    let actor_id = body.actor_id.unwrap_or(body.owner_id);
    let job = orchestrator.start_google_doc_import(&body.resource_id, body.owner_id, actor_id)?;
    Ok((StatusCode::CREATED, Json(JobView::from(&job))))
}

pub async fn get_job(
    Extension(orchestrator): Extension<Orchestrator>,
    Path(id): Path<String>,
) -> Result<Json<JobView>, ApiError> {
    let job_id: JobId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid job id: {id}")))?;

    let job = orchestrator
        .manager()
        .get(None, job_id)?
        .ok_or(JobError::JobNotFound(job_id))?;
    Ok(Json(JobView::from(&job)))
}
