//! Per-participant leave cooldowns.
//!
//! Only the voluntary-leave path sets or consults a cooldown. Missed ready
//! checks and failed deferred confirmations are recorded as violations but
//! never put anyone on cooldown.

use std::collections::HashMap;
use std::time::Duration;

use keen_types::ParticipantId;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CooldownRegistry {
    duration: Duration,
    expires_at: HashMap<ParticipantId, Instant>,
}

impl CooldownRegistry {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            expires_at: HashMap::new(),
        }
    }

    /// Start (or restart) a cooldown for `id`; returns when it ends.
    pub fn penalize(&mut self, id: ParticipantId, now: Instant) -> Instant {
        let until = now + self.duration;
        self.expires_at.insert(id, until);
        until
    }

    /// Time left on `id`'s cooldown, zero if unrestricted.
    pub fn remaining(&self, id: &ParticipantId, now: Instant) -> Duration {
        self.expires_at
            .get(id)
            .map(|until| until.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO)
    }

    pub fn is_restricted(&self, id: &ParticipantId, now: Instant) -> bool {
        !self.remaining(id, now).is_zero()
    }

    /// Drop entries that have already lapsed. Lapsed entries are harmless;
    /// this only keeps the map from growing without bound.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.expires_at.len();
        self.expires_at.retain(|_, until| *until > now);
        before - self.expires_at.len()
    }

    /// Number of stored entries, lapsed or not.
    pub fn len(&self) -> usize {
        self.expires_at.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expires_at.is_empty()
    }
}
