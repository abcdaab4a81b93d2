//! Quill Store
//!
//! The persistence collaborator the pipeline talks to:
//!
//! - [`Store`]: typed read accessors plus an atomic [`Store::commit`]
//! - [`Transaction`]: an ordered write batch
//! - [`InMemoryStore`]: process-local implementation with JSON snapshots

#![warn(unreachable_pub)]

pub mod error;
pub mod memory;
pub mod store;
pub mod transaction;

pub use error::StoreError;
pub use memory::{InMemoryStore, StoreSnapshot};
pub use store::Store;
pub use transaction::{Transaction, Write};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
