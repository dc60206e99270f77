//! Keen storage abstractions.
//!
//! The coordinator keeps its violation ledger in memory and mirrors it to a
//! `ViolationStore` after every mutation. Two adapters ship here:
//! - `InMemoryViolationStore` for tests and ephemeral runs
//! - `JsonFileViolationStore` for durable single-node deployments

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod file;
pub mod memory;
mod traits;

pub use error::{StorageError, StorageResult};
pub use file::JsonFileViolationStore;
pub use memory::InMemoryViolationStore;
pub use traits::ViolationStore;
