//! HTTP API: routing, request/response mapping and the internal queue gate.

pub mod app;
pub mod demo;
pub mod middleware;
