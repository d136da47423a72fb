//! Transactional datastore (optimistic concurrency).

pub mod in_memory;
pub mod r#trait;

pub use in_memory::InMemoryDatastore;
pub use r#trait::{Datastore, DatastoreExt, Key, StoreError, Transaction};
