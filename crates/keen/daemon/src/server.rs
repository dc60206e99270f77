//! Daemon lifecycle: wire the coordinator, drive it from stdin, and shut
//! down cleanly on Ctrl+C, SIGTERM or end of input.

use std::sync::Arc;

use keen_coordinator::{Coordinator, IdleExpiryMonitor};
use keen_storage::{InMemoryViolationStore, JsonFileViolationStore, ViolationStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::commands;
use crate::config::{DaemonConfig, StorageConfig};
use crate::error::DaemonResult;
use crate::notifier::ConsoleNotifier;

pub struct Server {
    config: DaemonConfig,
    coordinator: Arc<Coordinator>,
    console: Arc<ConsoleNotifier>,
    monitor: IdleExpiryMonitor,
}

impl Server {
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let store: Arc<dyn ViolationStore> = match &config.storage {
            StorageConfig::Memory => {
                warn!("Using in-memory violation ledger, nothing will survive a restart");
                Arc::new(InMemoryViolationStore::new())
            }
            StorageConfig::File { path } => {
                info!(path = %path.display(), "Using JSON violation ledger");
                Arc::new(JsonFileViolationStore::new(path.clone()))
            }
        };

        let console = Arc::new(ConsoleNotifier::new());
        let coordinator = Coordinator::new(config.keen.clone(), console.clone(), store).await?;
        let monitor = IdleExpiryMonitor::start(Arc::clone(&coordinator));

        Ok(Self {
            config,
            coordinator,
            console,
            monitor,
        })
    }

    /// Read commands until input ends or a shutdown signal arrives.
    pub async fn run(mut self) -> DaemonResult<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut events = self.coordinator.subscribe();
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        info!(capacity = self.config.keen.queue.capacity, "keend ready for commands");

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                line = lines.next_line() => match line? {
                    Some(line) => self.handle_line(&line).await?,
                    None => {
                        info!("Input closed");
                        break;
                    }
                },
                event = events.recv() => match event {
                    Ok(event) => debug!(event = ?event, "Coordinator event"),
                    Err(RecvError::Lagged(skipped)) => warn!(skipped = skipped, "Event log lagged"),
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!("keend shutting down");
        self.monitor.stop();
        self.coordinator.shutdown().await;
        Ok(())
    }

    async fn handle_line(&self, line: &str) -> DaemonResult<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let reply = match commands::parse(line) {
            Ok(request) => {
                debug!(actor = %request.actor.id, command = ?request.command, "Command");
                commands::execute(&self.coordinator, &self.config, request).await
            }
            Err(e) => e.to_string(),
        };
        self.console.reply(&reply).await?;
        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
