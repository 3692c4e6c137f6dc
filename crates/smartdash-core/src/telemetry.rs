//! Shared telemetry state
//!
//! The poller is the only writer of samples. It builds each sample privately
//! and publishes it by swapping in a new `Arc`, so the UI thread always reads
//! a complete snapshot and never waits on the link. The UI publishes the
//! active page and its settings the same way for the poller to read.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;

use crate::link::TroubleCode;
use crate::navigation::PageKind;
use crate::settings::Settings;

/// Grams of air per pound
const GRAMS_PER_POUND: f64 = 453.592;
/// Pounds per gallon of gasoline
const POUNDS_PER_GALLON: f64 = 6.17;

/// Fuel economy from speed (mph) and mass air flow (g/s), rounded to one
/// decimal. Zero when either input is zero.
pub fn calculate_mpg(speed: f64, maf: f64) -> f64 {
    if speed == 0.0 || maf == 0.0 {
        return 0.0;
    }
    let gallons_per_hour = maf * 3600.0 / GRAMS_PER_POUND / POUNDS_PER_GALLON;
    (speed / gallons_per_hour * 10.0).round() / 10.0
}

/// Latest values read from the vehicle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySample {
    pub rpm: u32,
    /// Vehicle speed in mph
    pub speed: f64,
    /// Mass air flow in g/s
    pub maf: f64,
    pub mpg: f64,
    /// Fuel tank level in percent
    pub fuel_level: f64,
    /// Control module voltage
    pub voltage: f64,
    /// Ambient air temperature in °C
    pub air_temp: f64,
    pub trouble_codes: Arc<Vec<TroubleCode>>,
    /// Incremented on every publish; 0 means nothing was published yet
    pub sequence: u64,
    pub sampled_at: Option<Instant>,
}

/// Result of a clear-codes attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    Success,
    /// The vehicle did not acknowledge
    Error,
    /// Codes can only be cleared with the engine off
    EngineRunning,
}

/// Clear-codes request shared between the UI and the poller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearRequest {
    pub pending: bool,
    pub last_result: Option<ClearOutcome>,
}

/// State shared between the poller and the UI thread
#[derive(Debug)]
pub struct SharedTelemetryState {
    sample: ArcSwap<TelemetrySample>,
    clear: ArcSwap<ClearRequest>,
    settings: ArcSwap<Settings>,
    page: AtomicU8,
    connected: AtomicBool,
}

impl Default for SharedTelemetryState {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SharedTelemetryState {
    pub fn new(settings: Settings) -> Self {
        let page = settings.page.kind();
        Self {
            sample: ArcSwap::from_pointee(TelemetrySample::default()),
            clear: ArcSwap::from_pointee(ClearRequest::default()),
            settings: ArcSwap::from_pointee(settings),
            page: AtomicU8::new(page as u8),
            connected: AtomicBool::new(false),
        }
    }

    /// Latest published sample
    pub fn sample(&self) -> Arc<TelemetrySample> {
        self.sample.load_full()
    }

    /// Replace the published sample
    pub fn publish(&self, sample: TelemetrySample) {
        self.sample.store(Arc::new(sample));
    }

    pub fn clear_request(&self) -> ClearRequest {
        **self.clear.load()
    }

    /// Ask the poller to clear codes. Returns false if a request is already pending.
    pub fn request_clear(&self) -> bool {
        let previous = self.clear.rcu(|current| {
            if current.pending {
                **current
            } else {
                ClearRequest {
                    pending: true,
                    last_result: None,
                }
            }
        });
        !previous.pending
    }

    /// Record the result of a clear attempt; only success retires the request
    pub fn record_clear_outcome(&self, outcome: ClearOutcome) {
        self.clear.rcu(|current| ClearRequest {
            pending: current.pending && outcome != ClearOutcome::Success,
            last_result: Some(outcome),
        });
    }

    pub fn page(&self) -> PageKind {
        PageKind::from_u8(self.page.load(Ordering::Acquire)).unwrap_or(PageKind::Main)
    }

    pub fn set_page(&self, page: PageKind) {
        self.page.store(page as u8, Ordering::Release);
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn publish_settings(&self, settings: Settings) {
        self.settings.store(Arc::new(settings));
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }
}
