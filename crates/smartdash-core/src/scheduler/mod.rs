//! Telemetry scheduler
//!
//! The background poller. Every iteration it reads the active page from the
//! shared state, walks that page's manifest, and issues the queries that are
//! supported by the vehicle and due on their cadence. The finished sample is
//! published as one snapshot at the end of the iteration.
//!
//! Any link failure is fatal: the poller returns the error instead of
//! retrying, and the runtime supervisor shuts the dashboard down.

pub mod cadence;
mod error;
pub mod manifest;

pub use cadence::{AdaptiveCadence, CadenceConfig, CadencePolicy};
pub use error::SchedulerError;
pub use manifest::{is_gated, manifest_for, Cadence, Manifest, Query};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::capability::CapabilitySet;
use crate::link::{DiagnosticLink, ParameterId, Reading};
use crate::telemetry::{calculate_mpg, ClearOutcome, SharedTelemetryState, TelemetrySample};

/// Default spacing of poller iterations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30);

/// Values read during one iteration, before they are folded into the sample.
/// `None` means the query was not issued this iteration.
#[derive(Debug, Default)]
struct IterationReadings {
    rpm: Option<Reading>,
    speed: Option<Reading>,
    maf: Option<Reading>,
}

/// Page-driven poller over a single diagnostic link
pub struct TelemetryScheduler {
    link: Box<dyn DiagnosticLink>,
    capabilities: CapabilitySet,
    state: Arc<SharedTelemetryState>,
    cadence: CadencePolicy,
    poll_interval: Duration,
    working: TelemetrySample,
    /// Most recent RPM the vehicle reported, if any
    last_rpm: Option<u32>,
    last_fast: Option<Instant>,
    last_slow: Option<Instant>,
}

impl TelemetryScheduler {
    pub fn new(
        link: Box<dyn DiagnosticLink>,
        capabilities: CapabilitySet,
        state: Arc<SharedTelemetryState>,
        cadence: CadencePolicy,
    ) -> Self {
        let working = (*state.sample()).clone();
        Self {
            link,
            capabilities,
            state,
            cadence,
            poll_interval: DEFAULT_POLL_INTERVAL,
            working,
            last_rpm: None,
            last_fast: None,
            last_slow: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Whether the vehicle supports what `query` needs
    pub fn is_supported(&self, query: Query) -> bool {
        query
            .required_pid()
            .map_or(true, |pid| self.capabilities.contains(pid))
    }

    fn due(&self, cadence: Cadence, manifest: Manifest, now: Instant) -> bool {
        let last = match cadence {
            Cadence::EveryTick => return true,
            Cadence::Fast => self.last_fast,
            Cadence::Slow => self.last_slow,
        };
        let delay = self.cadence.delay(cadence, manifest::batch(manifest, cadence));
        last.map_or(true, |t| now.saturating_duration_since(t) >= delay)
    }

    /// Run one polling iteration at `now` and publish the result
    pub fn tick(&mut self, now: Instant) -> Result<(), SchedulerError> {
        let page = self.state.page();
        let settings = self.state.settings();
        let manifest = manifest_for(page, settings.optimize);
        let gated = is_gated(page);

        let fast_due = settings.delay || self.due(Cadence::Fast, manifest, now);
        let slow_due = settings.delay || self.due(Cadence::Slow, manifest, now);

        let mut readings = IterationReadings::default();
        let mut ran_fast = false;
        let mut ran_slow = false;

        for &(query, cadence) in manifest {
            match cadence {
                Cadence::Fast if !fast_due => continue,
                Cadence::Slow if !slow_due => continue,
                Cadence::Fast => ran_fast = true,
                Cadence::Slow => ran_slow = true,
                Cadence::EveryTick => {}
            }
            if gated && !self.is_supported(query) {
                continue;
            }
            self.run(query, &mut readings)?;
        }

        if ran_fast {
            self.last_fast = Some(now);
        }
        if ran_slow {
            self.last_slow = Some(now);
        }

        self.fold_fuel_inputs(&readings);

        self.working.sequence += 1;
        self.working.sampled_at = Some(now);
        self.state.publish(self.working.clone());
        Ok(())
    }

    /// Speed and MAF feed the same MPG figure, so when both were queried
    /// they are stored only as a pair. A reading whose partner was not
    /// queried (unsupported, or not on this page) is stored alone.
    fn fold_fuel_inputs(&mut self, readings: &IterationReadings) {
        match (readings.speed, readings.maf) {
            (Some(Some(speed)), Some(Some(maf))) => {
                self.working.speed = speed;
                self.working.maf = maf;
                self.working.mpg = calculate_mpg(speed, maf);
            }
            (Some(Some(speed)), None) => self.working.speed = speed,
            (None, Some(Some(maf))) => self.working.maf = maf,
            _ => {}
        }
    }

    fn read_rpm(&mut self) -> Result<Reading, SchedulerError> {
        let reading = self.timed_query(Query::Rpm, ParameterId::RPM)?;
        if let Some(rpm) = reading {
            let rpm = rpm.round().max(0.0) as u32;
            self.working.rpm = rpm;
            self.last_rpm = Some(rpm);
        }
        Ok(reading)
    }

    fn timed_query(&mut self, query: Query, pid: ParameterId) -> Result<Reading, SchedulerError> {
        let started = Instant::now();
        let reading = self
            .link
            .query(pid)
            .map_err(|source| SchedulerError::QueryFault { query, source })?;
        self.cadence.record(query, started.elapsed());
        Ok(reading)
    }

    fn run(&mut self, query: Query, readings: &mut IterationReadings) -> Result<(), SchedulerError> {
        match query {
            Query::Rpm => readings.rpm = Some(self.read_rpm()?),
            Query::Speed => readings.speed = Some(self.timed_query(query, ParameterId::SPEED)?),
            Query::Maf => readings.maf = Some(self.timed_query(query, ParameterId::MAF)?),
            Query::FuelLevel => {
                if let Some(level) = self.timed_query(query, ParameterId::FUEL_LEVEL)? {
                    self.working.fuel_level = level;
                }
            }
            Query::Voltage => {
                if let Some(volts) = self.timed_query(query, ParameterId::CONTROL_MODULE_VOLTAGE)? {
                    self.working.voltage = volts;
                }
            }
            Query::AirTemp => {
                if let Some(temp) = self.timed_query(query, ParameterId::AMBIENT_AIR_TEMP)? {
                    self.working.air_temp = temp;
                }
            }
            Query::TroubleCodes => {
                let started = Instant::now();
                let codes = self
                    .link
                    .trouble_codes()
                    .map_err(|source| SchedulerError::QueryFault { query, source })?;
                self.cadence.record(query, started.elapsed());
                if let Some(codes) = codes {
                    if codes.as_slice() != self.working.trouble_codes.as_slice() {
                        debug!(count = codes.len(), "trouble codes changed");
                        self.working.trouble_codes = Arc::new(codes);
                    }
                }
            }
            Query::ClearCodes => self.service_clear(readings.rpm)?,
        }
        Ok(())
    }

    /// Clear codes if requested and the engine is off. RPM is read here when
    /// the page did not query it, whatever the capability set says. A null
    /// reading falls back to the last known value, and with no value ever
    /// seen the engine is assumed to be running.
    fn service_clear(&mut self, rpm: Option<Reading>) -> Result<(), SchedulerError> {
        if !self.state.clear_request().pending {
            return Ok(());
        }

        let reading = match rpm {
            Some(reading) => reading,
            None => self.read_rpm()?,
        };
        let rpm = reading.map(|r| r.round().max(0.0) as u32).or(self.last_rpm);
        let outcome = if rpm == Some(0) {
            let acknowledged = self
                .link
                .clear_trouble_codes()
                .map_err(|source| SchedulerError::QueryFault {
                    query: Query::ClearCodes,
                    source,
                })?;
            if acknowledged {
                self.working.trouble_codes = Arc::new(Vec::new());
                ClearOutcome::Success
            } else {
                ClearOutcome::Error
            }
        } else {
            ClearOutcome::EngineRunning
        };

        match outcome {
            ClearOutcome::Success => info!("trouble codes cleared"),
            ClearOutcome::Error => warn!("vehicle rejected clear request"),
            ClearOutcome::EngineRunning => debug!(?rpm, "clear request waiting for engine off"),
        }
        self.state.record_clear_outcome(outcome);
        Ok(())
    }

    /// Poll until cancelled or a query fails
    pub async fn run_until_cancelled(mut self, cancel: CancellationToken) -> Result<(), SchedulerError> {
        info!(
            link = %self.link.describe(),
            supported = self.capabilities.len(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "telemetry scheduler started"
        );
        self.state.set_connected(true);

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let result = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.tick(tokio::time::Instant::now().into_std()) {
                error!(error = %e, "telemetry query failed, stopping");
                break Err(e);
            }
        };

        self.state.set_connected(false);
        info!(sequence = self.working.sequence, "telemetry scheduler stopped");
        result
    }
}
