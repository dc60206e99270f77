//! # Keen Coordinator - Group Formation for Shared Channels
//!
//! This crate gathers a fixed number of participants in a shared channel
//! into a group and makes sure they are all actually present before the
//! group forms.
//!
//! ## Overview
//!
//! - **Keen queue**: bounded FIFO of participants waiting for a group
//! - **Ready check**: when the queue fills, everyone must confirm within a
//!   window; the group forms on full confirmation
//! - **Violations**: leaving, missing a ready check, or ignoring a deferred
//!   join is recorded in a persistent ledger
//! - **Cooldowns**: leaving blocks a further leave for a while
//! - **Deferred joins**: ask to be offered a slot later, then confirm
//! - **Idle expiry**: long-idle participants are evicted with a grace
//!   window for silent re-admission
//!
//! ## Key Components
//!
//! - [`Coordinator`]: owner of all state and entry point for every command
//! - [`IdleExpiryMonitor`]: background idle sweeper
//! - [`Notifier`]: outbound channel messages
//! - [`KeenEvent`]: state transitions for subscribers
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use keen_coordinator::{Coordinator, IdleExpiryMonitor, KeenConfig, RecordingNotifier};
//! use keen_storage::InMemoryViolationStore;
//! use keen_types::Participant;
//!
//! # async fn example() -> keen_coordinator::KeenResult<()> {
//! let coordinator = Coordinator::new(
//!     KeenConfig::default(),
//!     Arc::new(RecordingNotifier::new()),
//!     Arc::new(InMemoryViolationStore::new()),
//! )
//! .await?;
//! let _monitor = IdleExpiryMonitor::start(Arc::clone(&coordinator));
//!
//! let position = coordinator.join(Participant::new(1, "ada")).await?;
//! println!("queued at {position}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod cooldown;
pub mod coordinator;
pub mod deferred;
pub mod error;
pub mod events;
pub mod ledger;
pub mod monitor;
pub mod notifier;
pub mod queue;
mod ready_check;

// Re-export main types
pub use config::{
    CooldownConfig, DeferredConfig, IdleConfig, KeenConfig, QueueConfig, ReadyCheckConfig,
};
pub use cooldown::CooldownRegistry;
pub use coordinator::{
    Authority, ConfirmOutcome, Coordinator, IgnoreReason, LeaveOutcome, QueueSlot, QueueSnapshot,
    RoundView,
};
pub use deferred::DeferredView;
pub use error::{KeenError, KeenResult};
pub use events::{GraceLapse, KeenEvent};
pub use ledger::ViolationLedger;
pub use monitor::IdleExpiryMonitor;
pub use notifier::{Notifier, NotifierError, RecordingNotifier};
pub use queue::{Fill, InterestToggle, JoinOutcome, ParticipantQueue, QueueEntry, RemoveOutcome};
