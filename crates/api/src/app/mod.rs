//! HTTP API application wiring (Axum router over an [`Orchestrator`]).
//!
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

use light_infra::Orchestrator;

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(orchestrator: Orchestrator) -> Router {
    // Internal routes: only reachable through the task queue.
    let internal = routes::internal_router()
        .layer(axum::middleware::from_fn(middleware::require_queue_header));

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .nest("/internal", internal)
        .layer(ServiceBuilder::new().layer(Extension(orchestrator)))
}
