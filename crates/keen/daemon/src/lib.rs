//! Keen daemon library
//!
//! Process wiring around the coordinator:
//! - Layered configuration
//! - Console notifier
//! - Line-oriented command driver
//! - Server lifecycle management

pub mod commands;
pub mod config;
pub mod error;
pub mod notifier;
pub mod server;

pub use config::DaemonConfig;
pub use error::{DaemonError, DaemonResult};
pub use notifier::ConsoleNotifier;
pub use server::Server;
