use axum::{
    Json,
    extract::Extension,
};
use serde_json::json;

use light_infra::Orchestrator;
use light_jobs::ChildJobCompletionNotification;

use crate::app::errors::ApiError;
use crate::middleware::QueueName;

/// Queue delivery of a child completion. 503 asks the queue to redeliver.
pub async fn child_complete(
    Extension(orchestrator): Extension<Orchestrator>,
    Extension(QueueName(queue)): Extension<QueueName>,
    Json(notification): Json<ChildJobCompletionNotification>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = orchestrator.dispatcher().handle(&notification)?;
    tracing::info!(
        queue = %queue,
        parent_job_id = %notification.parent_job_id,
        child_job_id = %notification.child_job_id,
        ?outcome,
        "child completion handled"
    );
    Ok(Json(json!({ "outcome": outcome })))
}
