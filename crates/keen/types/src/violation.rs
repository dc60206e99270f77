//! Violation records ("spanners")

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::Participant;

/// Why a violation was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationReason {
    /// Voluntarily left the queue.
    Left,
    /// Did not confirm before a ready-check deadline.
    MissedReadyCheck,
    /// Answered "no" to a deferred-admission confirmation.
    DeclinedDeferred,
    /// Never answered a deferred-admission confirmation.
    DeferredExpired,
}

impl fmt::Display for ViolationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationReason::Left => write!(f, "left"),
            ViolationReason::MissedReadyCheck => write!(f, "missed ready check"),
            ViolationReason::DeclinedDeferred => write!(f, "declined deferred join"),
            ViolationReason::DeferredExpired => write!(f, "deferred join expired"),
        }
    }
}

/// One entry of the append-only violation ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub participant: Participant,
    pub reason: ViolationReason,
    pub recorded_at: DateTime<Utc>,
}

impl ViolationRecord {
    pub fn new(participant: Participant, reason: ViolationReason) -> Self {
        Self {
            participant,
            reason,
            recorded_at: Utc::now(),
        }
    }
}
