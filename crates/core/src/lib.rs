//! `light-core`: identifiers and error primitives shared by every Light crate.
//!
//! This crate contains **pure domain** primitives (no storage or queue concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{JobId, PromiseHandle, TaskId, UserId};
