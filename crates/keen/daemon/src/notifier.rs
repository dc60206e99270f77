//! Console notifier: prints notices to stdout with a numbered handle that
//! confirmations can refer to.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use keen_coordinator::{Notifier, NotifierError};
use keen_types::{BroadcastHandle, Notice};
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

pub struct ConsoleNotifier {
    out: Mutex<Stdout>,
    next_id: AtomicU64,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Write a plain reply line.
    pub async fn reply(&self, line: &str) -> std::io::Result<()> {
        let mut out = self.out.lock().await;
        out.write_all(format!("{}\n", line).as_bytes()).await?;
        out.flush().await
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn broadcast(&self, notice: &Notice) -> Result<BroadcastHandle, NotifierError> {
        let handle = BroadcastHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst).to_string());
        self.reply(&format!("[{}] {}", handle, notice))
            .await
            .map_err(|e| NotifierError::Unavailable(e.to_string()))?;
        Ok(handle)
    }
}
