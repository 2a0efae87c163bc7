//! Path-addressed state store.
//!
//! This module provides a `StateStore` trait over a hierarchical JSON
//! key/value space with multi-key atomic patches, plus SQLite and in-memory
//! backends.

mod memory;
mod sqlite;
pub mod tree;
mod types;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;
pub use types::*;
