//! Connection management
//!
//! Opens the diagnostic link through a [`LinkConnector`], retrying a bounded
//! number of times at startup and indefinitely in the background afterwards.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::link::{DiagnosticLink, LinkConnector, LinkError};

/// Default number of startup attempts
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// Default spacing of background reconnect attempts
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(5);

/// Result of a bounded connection attempt
pub enum ConnectOutcome {
    Connected(Box<dyn DiagnosticLink>),
    /// Every attempt failed; carries the last error
    Failed(LinkError),
}

impl ConnectOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectOutcome::Connected(_))
    }
}

impl fmt::Debug for ConnectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectOutcome::Connected(link) => f.debug_tuple("Connected").field(&link.describe()).finish(),
            ConnectOutcome::Failed(e) => f.debug_tuple("Failed").field(e).finish(),
        }
    }
}

/// Establishes and re-establishes the diagnostic link
#[derive(Clone)]
pub struct ConnectionManager {
    connector: Arc<dyn LinkConnector>,
    reconnect_interval: Duration,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn LinkConnector>, reconnect_interval: Duration) -> Self {
        Self {
            connector,
            reconnect_interval,
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        self.reconnect_interval
    }

    /// Try to connect up to `retries` times (at least once)
    pub fn connect(&self, timeout: Duration, retries: u32) -> ConnectOutcome {
        let attempts = retries.max(1);
        let mut last_error = LinkError::NotConnected;

        for attempt in 1..=attempts {
            info!(attempt, of = attempts, timeout_ms = timeout.as_millis() as u64, "connecting to adapter");
            match self.connector.connect(timeout) {
                Ok(link) => {
                    info!(attempt, link = %link.describe(), "adapter connected");
                    return ConnectOutcome::Connected(link);
                }
                Err(e) => {
                    warn!(attempt, error = %e, "connection attempt failed");
                    last_error = e;
                }
            }
        }

        warn!(attempts, error = %last_error, "giving up on startup connection");
        ConnectOutcome::Failed(last_error)
    }

    /// Retry every `reconnect_interval` until a link comes up. Returns `None`
    /// if cancelled first.
    pub async fn reconnect(&self, timeout: Duration, cancel: &CancellationToken) -> Option<Box<dyn DiagnosticLink>> {
        let mut ticker = tokio::time::interval(self.reconnect_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let mut attempt: u64 = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("reconnect loop cancelled");
                    return None;
                }
                _ = ticker.tick() => {}
            }

            attempt += 1;
            match self.connector.connect(timeout) {
                Ok(link) => {
                    info!(attempt, link = %link.describe(), "adapter reconnected");
                    return Some(link);
                }
                Err(e) => warn!(attempt, error = %e, "reconnect attempt failed"),
            }
        }
    }
}
