//! Background cache refresh
//!
//! Rebuilds the partitioned cache on a fixed interval while the server runs,
//! reporting each cycle over a tokio channel. Deployments that rebuild from
//! an external scheduler (`assetfeed pre-cache`) leave this disabled.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::cache::{PartitionedCache, CACHE_TTL};
use crate::source::DataSource;

/// Messages sent from the background refresh task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshMessage {
    /// A rebuild started
    RefreshStarted,
    /// A rebuild finished, writing `keys` cache keys
    RefreshCompleted { keys: usize },
    /// A rebuild failed
    RefreshError(String),
}

/// Configuration for the refresh interval
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Time between rebuilds
    pub interval: Duration,
    /// Whether auto-refresh is enabled
    pub enabled: bool,
}

impl RefreshConfig {
    /// Refresh every `secs` seconds; zero disables refresh
    pub fn from_secs(secs: u64) -> Self {
        if secs == 0 {
            return Self::default();
        }
        Self {
            interval: Duration::from_secs(secs),
            enabled: true,
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval: CACHE_TTL,
            enabled: false,
        }
    }
}

/// Handle for controlling the background refresh task
pub struct RefreshHandle {
    /// Channel for receiving refresh messages
    pub receiver: mpsc::Receiver<RefreshMessage>,
    /// Requests an immediate rebuild
    trigger_tx: mpsc::Sender<()>,
    /// Flag to signal shutdown
    shutdown_tx: mpsc::Sender<()>,
}

impl RefreshHandle {
    /// Creates a new RefreshHandle and spawns the background refresh task
    ///
    /// The first rebuild happens one interval after spawning. Messages are
    /// dropped when the receiver is full or gone; the task logs every cycle
    /// itself.
    ///
    /// # Arguments
    /// * `config` - Configuration for the refresh interval
    /// * `cache` - Cache to rebuild
    /// * `source` - Source the rebuild reads from
    ///
    /// # Returns
    /// A RefreshHandle that receives updates via the `receiver` channel
    pub fn spawn(
        config: RefreshConfig,
        cache: Arc<PartitionedCache>,
        source: Arc<dyn DataSource>,
    ) -> Self {
        let (msg_tx, msg_rx) = mpsc::channel(32);
        let (trigger_tx, mut trigger_rx) = mpsc::channel::<()>(1);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        if config.enabled {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(config.interval);
                // Skip the first tick (immediate)
                interval.tick().await;

                loop {
                    tokio::select! {
                        _ = interval.tick() => {}
                        Some(()) = trigger_rx.recv() => {}
                        _ = shutdown_rx.recv() => break,
                    }

                    let _ = msg_tx.try_send(RefreshMessage::RefreshStarted);
                    let message = run_rebuild(cache.clone(), source.clone()).await;
                    let _ = msg_tx.try_send(message);
                }
            });
        }

        Self {
            receiver: msg_rx,
            trigger_tx,
            shutdown_tx,
        }
    }

    /// Requests an immediate rebuild; ignored if one is already pending
    pub fn request_refresh(&self) {
        let _ = self.trigger_tx.try_send(());
    }

    /// Shuts down the background refresh task
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn run_rebuild(cache: Arc<PartitionedCache>, source: Arc<dyn DataSource>) -> RefreshMessage {
    let result = tokio::task::spawn_blocking(move || cache.rebuild(source.as_ref())).await;

    match result {
        Ok(Ok(keys)) => {
            info!(keys = keys.len(), "background refresh complete");
            RefreshMessage::RefreshCompleted { keys: keys.len() }
        }
        Ok(Err(err)) => {
            warn!(error = %err, "background refresh failed");
            RefreshMessage::RefreshError(err.to_string())
        }
        Err(err) => {
            warn!(error = %err, "background refresh task panicked");
            RefreshMessage::RefreshError(err.to_string())
        }
    }
}

/// Checks for pending refresh messages without blocking
///
/// # Arguments
/// * `handle` - The RefreshHandle to check
///
/// # Returns
/// * `Some(RefreshMessage)` if a message was available
/// * `None` if no messages are pending
pub fn try_recv(handle: &mut RefreshHandle) -> Option<RefreshMessage> {
    handle.receiver.try_recv().ok()
}
