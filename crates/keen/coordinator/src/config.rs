//! Coordinator configuration.
//!
//! Every window is stored in whole seconds so the configuration reads
//! naturally from TOML or environment variables; accessors hand out
//! `Duration`s.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KeenError, KeenResult};

/// Configuration for the coordinator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeenConfig {
    /// Queue sizing.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Ready-check timing.
    #[serde(default)]
    pub ready_check: ReadyCheckConfig,

    /// Leave cooldown.
    #[serde(default)]
    pub cooldown: CooldownConfig,

    /// Deferred admission timing.
    #[serde(default)]
    pub deferred: DeferredConfig,

    /// Idle expiry timing.
    #[serde(default)]
    pub idle: IdleConfig,
}

impl KeenConfig {
    /// Reject configurations the coordinator cannot run with.
    pub fn validate(&self) -> KeenResult<()> {
        if self.queue.capacity < 2 {
            return Err(KeenError::Configuration(format!(
                "queue capacity must be at least 2, got {}",
                self.queue.capacity
            )));
        }

        let windows = [
            ("ready_check.confirmation_window_secs", self.ready_check.confirmation_window_secs),
            ("ready_check.poll_interval_secs", self.ready_check.poll_interval_secs),
            ("deferred.confirmation_window_secs", self.deferred.confirmation_window_secs),
            ("deferred.max_delay_secs", self.deferred.max_delay_secs),
            ("idle.sweep_interval_secs", self.idle.sweep_interval_secs),
            ("idle.idle_threshold_secs", self.idle.idle_threshold_secs),
        ];
        for (name, secs) in windows {
            if secs == 0 {
                return Err(KeenError::Configuration(format!("{} must be non-zero", name)));
            }
        }

        Ok(())
    }
}

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Number of participants that fills the queue and starts a ready check.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Ready-check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyCheckConfig {
    /// How long snapshot participants have to confirm.
    #[serde(default = "default_ready_window")]
    pub confirmation_window_secs: u64,

    /// Upper bound between completion re-checks while waiting.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for ReadyCheckConfig {
    fn default() -> Self {
        Self {
            confirmation_window_secs: default_ready_window(),
            poll_interval_secs: default_poll_interval(),
        }
    }
}

impl ReadyCheckConfig {
    pub fn confirmation_window(&self) -> Duration {
        Duration::from_secs(self.confirmation_window_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Cooldown configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownConfig {
    /// Restriction applied after a voluntary leave.
    #[serde(default = "default_leave_cooldown")]
    pub leave_cooldown_secs: u64,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            leave_cooldown_secs: default_leave_cooldown(),
        }
    }
}

impl CooldownConfig {
    pub fn leave_cooldown(&self) -> Duration {
        Duration::from_secs(self.leave_cooldown_secs)
    }
}

/// Deferred admission configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeferredConfig {
    /// How long a deferred participant has to confirm once asked.
    #[serde(default = "default_deferred_window")]
    pub confirmation_window_secs: u64,

    /// Longest delay a participant may schedule.
    #[serde(default = "default_max_delay")]
    pub max_delay_secs: u64,
}

impl Default for DeferredConfig {
    fn default() -> Self {
        Self {
            confirmation_window_secs: default_deferred_window(),
            max_delay_secs: default_max_delay(),
        }
    }
}

impl DeferredConfig {
    pub fn confirmation_window(&self) -> Duration {
        Duration::from_secs(self.confirmation_window_secs)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

/// Idle expiry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdleConfig {
    /// Interval between sweeps.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Queue age after which a participant is evicted.
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,

    /// How long an evicted participant is held for silent re-admission.
    #[serde(default = "default_grace_window")]
    pub grace_window_secs: u64,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            idle_threshold_secs: default_idle_threshold(),
            grace_window_secs: default_grace_window(),
        }
    }
}

impl IdleConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    pub fn grace_window(&self) -> Duration {
        Duration::from_secs(self.grace_window_secs)
    }
}

// Default value helpers
fn default_capacity() -> usize {
    5
}

fn default_ready_window() -> u64 {
    600
}

fn default_poll_interval() -> u64 {
    2
}

fn default_leave_cooldown() -> u64 {
    300
}

fn default_deferred_window() -> u64 {
    300
}

fn default_max_delay() -> u64 {
    24 * 60 * 60
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_idle_threshold() -> u64 {
    3600
}

fn default_grace_window() -> u64 {
    600
}
