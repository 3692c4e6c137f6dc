//! Acquisition supervisor
//!
//! Connects at startup, resolves capabilities and spawns the telemetry
//! scheduler. When the startup connection fails the dashboard keeps running
//! disconnected while a background task retries; whichever path connects
//! first starts the scheduler, and it is started at most once.
//!
//! A scheduler error is fatal, and so is a panic in any acquisition task.
//! Both are handed back through [`Runtime::wait`], which cancels every task
//! so the process can exit and be restarted by its supervisor.

use std::any::Any;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::capability::CapabilityResolver;
use crate::config::{ConfigError, DashConfig};
use crate::connection::{ConnectOutcome, ConnectionManager};
use crate::link::{DiagnosticLink, LinkConnector};
use crate::scheduler::{CadenceConfig, CadencePolicy, SchedulerError, TelemetryScheduler};
use crate::telemetry::SharedTelemetryState;

/// Acquisition settings, usually derived from [`DashConfig`]
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub connect_timeout: Duration,
    pub connect_retries: u32,
    pub reconnect_interval: Duration,
    pub poll_interval: Duration,
    pub cadence: CadenceConfig,
    pub data_dir: PathBuf,
}

impl RuntimeConfig {
    pub fn from_dash_config(config: &DashConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            connect_timeout: config.connect_timeout(),
            connect_retries: config.connect_retries,
            reconnect_interval: config.reconnect_interval(),
            poll_interval: config.poll_interval(),
            cadence: config.cadence.clone(),
            data_dir: config.data_dir()?,
        })
    }
}

/// Everything needed to turn a fresh link into a running scheduler
struct Launcher {
    state: Arc<SharedTelemetryState>,
    resolver: CapabilityResolver,
    cadence: CadenceConfig,
    poll_interval: Duration,
    cancel: CancellationToken,
    fatal: mpsc::Sender<SchedulerError>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Launcher {
    fn track(&self, handle: JoinHandle<()>) {
        match self.tasks.lock() {
            Ok(mut tasks) => tasks.push(handle),
            Err(poisoned) => poisoned.into_inner().push(handle),
        }
    }

    /// Resolve capabilities on `link` and spawn the scheduler, once
    fn launch(self: &Arc<Self>, mut link: Box<dyn DiagnosticLink>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(link = %link.describe(), "scheduler already running, dropping extra link");
            return;
        }

        let capabilities = match self.resolver.resolve(link.as_mut()) {
            Ok(capabilities) => capabilities,
            Err(e) => {
                error!(error = %e, "capability resolution failed");
                self.report(SchedulerError::from(e));
                return;
            }
        };

        let scheduler = TelemetryScheduler::new(
            link,
            capabilities,
            self.state.clone(),
            CadencePolicy::from_config(&self.cadence),
        )
        .with_poll_interval(self.poll_interval);

        let cancel = self.cancel.clone();
        self.spawn_monitored("scheduler", scheduler.run_until_cancelled(cancel));
    }

    /// Spawn `task` under a monitor that reports its error, or its panic,
    /// as fatal
    fn spawn_monitored<F>(self: &Arc<Self>, name: &'static str, task: F)
    where
        F: Future<Output = Result<(), SchedulerError>> + Send + 'static,
    {
        let inner = tokio::spawn(task);
        let this = self.clone();
        let handle = tokio::spawn(async move {
            match inner.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => this.report(e),
                Err(e) if e.is_panic() => {
                    let message = panic_message(e);
                    error!(task = name, %message, "acquisition task panicked");
                    this.state.set_connected(false);
                    this.report(SchedulerError::TaskPanicked { task: name, message });
                }
                Err(e) => warn!(task = name, error = %e, "acquisition task cancelled"),
            }
        });
        self.track(handle);
    }

    fn report(&self, e: SchedulerError) {
        if self.fatal.try_send(e).is_err() {
            warn!("fatal error already pending, dropping another");
        }
    }
}

fn panic_message(e: JoinError) -> String {
    let payload: Box<dyn Any + Send> = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Running acquisition side of the dashboard
pub struct Runtime {
    launcher: Arc<Launcher>,
    fatal: mpsc::Receiver<SchedulerError>,
}

impl Runtime {
    /// Connect and start polling. Must be called inside a tokio runtime.
    pub async fn start(
        config: RuntimeConfig,
        connector: Arc<dyn LinkConnector>,
        state: Arc<SharedTelemetryState>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(1);
        let launcher = Arc::new(Launcher {
            state,
            resolver: CapabilityResolver::in_dir(&config.data_dir),
            cadence: config.cadence.clone(),
            poll_interval: config.poll_interval,
            cancel: CancellationToken::new(),
            fatal: tx,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        });

        let manager = ConnectionManager::new(connector, config.reconnect_interval);
        match manager.connect(config.connect_timeout, config.connect_retries) {
            ConnectOutcome::Connected(link) => launcher.launch(link),
            ConnectOutcome::Failed(e) => {
                warn!(
                    error = %e,
                    retry_in_ms = config.reconnect_interval.as_millis() as u64,
                    "starting disconnected, retrying in background"
                );
                launcher.state.set_connected(false);

                let this = launcher.clone();
                let timeout = config.connect_timeout;
                launcher.spawn_monitored("reconnect", async move {
                    if let Some(link) = manager.reconnect(timeout, &this.cancel).await {
                        this.launch(link);
                    }
                    Ok(())
                });
            }
        }

        Runtime { launcher, fatal: rx }
    }

    pub fn state(&self) -> &Arc<SharedTelemetryState> {
        &self.launcher.state
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.launcher.cancel.clone()
    }

    pub fn is_scheduler_started(&self) -> bool {
        self.launcher.started.load(Ordering::SeqCst)
    }

    /// Wait until shutdown is requested or a fatal error arrives. On a fatal
    /// error every task is cancelled and the error returned.
    pub async fn wait(&mut self) -> Result<(), SchedulerError> {
        tokio::select! {
            Some(e) = self.fatal.recv() => {
                error!(error = %e, "fatal acquisition error, shutting down");
                self.launcher.cancel.cancel();
                Err(e)
            }
            _ = self.launcher.cancel.cancelled() => Ok(()),
        }
    }

    /// Cancel all tasks and wait for them to finish
    pub async fn shutdown(self) {
        self.launcher.cancel.cancel();
        let handles = match self.launcher.tasks.lock() {
            Ok(mut tasks) => std::mem::take(&mut *tasks),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "acquisition task ended abnormally");
            }
        }
        info!("acquisition stopped");
    }
}
