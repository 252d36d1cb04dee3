//! Graceful Shutdown Handler
//!
//! Cancellation for long-lived tasks (the market feed). Distinct from the
//! reconnect-on-error path: a listener that fires means "stop", never "retry".

use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown signal types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    /// Normal graceful shutdown (SIGTERM, SIGINT)
    Graceful,
    /// Emergency shutdown - immediate stop
    Emergency,
}

impl std::fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownSignal::Graceful => write!(f, "graceful"),
            ShutdownSignal::Emergency => write!(f, "emergency"),
        }
    }
}

/// Graceful shutdown coordinator
pub struct GracefulShutdown {
    shutdown_requested: AtomicBool,
    signal_tx: watch::Sender<Option<ShutdownSignal>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (signal_tx, _) = watch::channel(None);
        Self {
            shutdown_requested: AtomicBool::new(false),
            signal_tx,
        }
    }

    /// Listener handed to a task that must stop on shutdown
    pub fn listener(&self) -> ShutdownListener {
        ShutdownListener {
            rx: self.signal_tx.subscribe(),
        }
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    /// Request shutdown. Only the first request is broadcast.
    pub fn request(&self, signal: ShutdownSignal) {
        if self.shutdown_requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring {} request", signal);
            return;
        }
        info!("Shutdown requested ({})", signal);
        self.signal_tx.send_replace(Some(signal));
    }

    /// Resolve on Ctrl-C and request a graceful shutdown
    pub async fn wait_for_ctrl_c(&self) {
        match tokio::signal::ctrl_c().await {
            Ok(()) => self.request(ShutdownSignal::Graceful),
            Err(e) => {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side of a shutdown request
#[derive(Debug, Clone)]
pub struct ShutdownListener {
    rx: watch::Receiver<Option<ShutdownSignal>>,
}

impl ShutdownListener {
    pub fn is_triggered(&self) -> bool {
        self.rx.borrow().is_some()
    }

    /// Wait until shutdown is requested. A dropped coordinator counts as a
    /// graceful shutdown so orphaned tasks do not run forever.
    pub async fn recv(&mut self) -> ShutdownSignal {
        loop {
            if let Some(signal) = *self.rx.borrow_and_update() {
                return signal;
            }
            if self.rx.changed().await.is_err() {
                return ShutdownSignal::Graceful;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_listener_receives_signal() {
        let shutdown = GracefulShutdown::new();
        let mut listener = shutdown.listener();
        assert!(!listener.is_triggered());

        shutdown.request(ShutdownSignal::Emergency);
        let signal = tokio::time::timeout(Duration::from_secs(1), listener.recv())
            .await
            .unwrap();
        assert_eq!(signal, ShutdownSignal::Emergency);
        assert!(shutdown.is_shutdown_requested());
    }

    #[tokio::test]
    async fn test_first_request_wins() {
        let shutdown = GracefulShutdown::new();
        shutdown.request(ShutdownSignal::Graceful);
        shutdown.request(ShutdownSignal::Emergency);
        let mut listener = shutdown.listener();
        assert_eq!(listener.recv().await, ShutdownSignal::Graceful);
    }

    #[tokio::test]
    async fn test_dropped_coordinator_stops_listener() {
        let shutdown = GracefulShutdown::new();
        let mut listener = shutdown.listener();
        drop(shutdown);
        assert_eq!(listener.recv().await, ShutdownSignal::Graceful);
    }
}
