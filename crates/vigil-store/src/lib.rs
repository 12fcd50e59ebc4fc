//! Typed records and storage adapters for Vigil.
//!
//! This crate provides:
//! - The record types the engine reads and writes (profiles, topics,
//!   drift buffer rows, social connections, notifications)
//! - The async [`Store`] trait the engine runs against
//! - [`MemoryStore`], a thread-safe implementation with state-file persistence

mod error;
mod memory;
mod store;
mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use store::Store;
pub use types::*;
