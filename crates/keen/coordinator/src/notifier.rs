//! Outbound notification seam.
//!
//! The coordinator never renders or delivers messages itself. It hands
//! structured [`Notice`]s to a [`Notifier`] and keeps the returned
//! [`BroadcastHandle`] so later confirmations can be correlated with the
//! message they answer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use keen_types::{BroadcastHandle, Notice};
use thiserror::Error;
use tokio::sync::Mutex;

/// Failures reported by a notifier.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// Channel unreachable or not configured.
    #[error("notifier unavailable: {0}")]
    Unavailable(String),

    /// The platform refused the message.
    #[error("broadcast rejected: {0}")]
    Rejected(String),
}

/// Posts notices to the coordination channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Post `notice` and return a handle confirmations can be matched on.
    async fn broadcast(&self, notice: &Notice) -> Result<BroadcastHandle, NotifierError>;
}

/// Notifier that keeps everything it is asked to post.
///
/// Handles are `msg-1`, `msg-2`, ... in posting order.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(BroadcastHandle, Notice)>>,
    next_id: AtomicU64,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent broadcasts fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Everything posted so far, oldest first.
    pub async fn sent(&self) -> Vec<(BroadcastHandle, Notice)> {
        self.sent.lock().await.clone()
    }

    pub async fn notices(&self) -> Vec<Notice> {
        self.sent
            .lock()
            .await
            .iter()
            .map(|(_, notice)| notice.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn broadcast(&self, notice: &Notice) -> Result<BroadcastHandle, NotifierError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifierError::Unavailable("recording notifier set to fail".into()));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = BroadcastHandle::new(format!("msg-{}", id));
        self.sent.lock().await.push((handle.clone(), notice.clone()));
        Ok(handle)
    }
}
