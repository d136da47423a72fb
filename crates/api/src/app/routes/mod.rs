use axum::{
    Router,
    routing::{get, post},
};

pub mod jobs;
pub mod notifications;
pub mod promises;
pub mod system;

/// Public job and promise endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(jobs::start_google_doc_import))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/promises/:handle", post(promises::fulfill_promise))
}

/// Endpoints the task queue delivers to (mounted under `/internal`).
pub fn internal_router() -> Router {
    Router::new().route(
        "/notifications/child-complete",
        post(notifications::child_complete),
    )
}
