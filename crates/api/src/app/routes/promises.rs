use axum::{
    Json,
    extract::{Extension, Path},
};

use light_core::PromiseHandle;
use light_infra::Orchestrator;

use crate::app::dto::FulfillPromiseResponse;
use crate::app::errors::ApiError;

/// Fulfil an external promise with the request body.
pub async fn fulfill_promise(
    Extension(orchestrator): Extension<Orchestrator>,
    Path(handle): Path<String>,
    Json(value): Json<serde_json::Value>,
) -> Result<Json<FulfillPromiseResponse>, ApiError> {
    let handle: PromiseHandle = handle
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid promise handle: {handle}")))?;

    let fulfilled = orchestrator.engine().fulfill_external(handle, value)?;
    Ok(Json(FulfillPromiseResponse { handle, fulfilled }))
}
