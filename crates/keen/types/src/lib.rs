//! Keen core types
//!
//! Shared vocabulary for the coordinator, its storage, and whatever command
//! layer drives it: participant identity, round and broadcast correlation
//! handles, violation records, and the structured notices the coordinator
//! emits through its notifier.

#![deny(unsafe_code)]

pub mod ids;
pub mod notice;
pub mod violation;

pub use ids::{BroadcastHandle, Participant, ParticipantId, RoundId};
pub use notice::Notice;
pub use violation::{ViolationReason, ViolationRecord};
