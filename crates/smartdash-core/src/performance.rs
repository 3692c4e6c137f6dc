//! Acceleration runs
//!
//! While tracking, every fresh sample is appended to the current run. A run
//! starts when the car first moves; its clock starts at the last standstill
//! sample before that, so times are measured from rest. The run ends when the
//! speed drops while still above walking pace, or when the user stops it.

use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

/// Speeds at or below this are treated as noise when detecting the end of a run
pub const STOP_SPEED_THRESHOLD: f64 = 10.0;

/// One point of a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunSample {
    /// Time since the run started
    pub elapsed: Duration,
    /// mph
    pub speed: f64,
    pub rpm: u32,
}

/// A run in progress
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceRun {
    pub started: Instant,
    pub samples: Vec<RunSample>,
    pub zero_to_sixty: Option<Duration>,
    pub zero_to_hundred: Option<Duration>,
    pub top_speed: f64,
}

impl PerformanceRun {
    fn new(started: Instant) -> Self {
        Self {
            started,
            samples: Vec::new(),
            zero_to_sixty: None,
            zero_to_hundred: None,
            top_speed: 0.0,
        }
    }

    fn push(&mut self, at: Instant, speed: f64, rpm: u32) {
        let elapsed = at.saturating_duration_since(self.started);
        if speed >= 60.0 && self.zero_to_sixty.is_none() {
            self.zero_to_sixty = Some(elapsed);
        }
        if speed >= 100.0 && self.zero_to_hundred.is_none() {
            self.zero_to_hundred = Some(elapsed);
        }
        self.top_speed = self.top_speed.max(speed);
        self.samples.push(RunSample { elapsed, speed, rpm });
    }
}

/// Finished run, handed to the renderer for plotting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub recorded_at: DateTime<Local>,
    pub samples: Vec<RunSample>,
    pub zero_to_sixty: Option<Duration>,
    pub zero_to_hundred: Option<Duration>,
    pub top_speed: f64,
}

impl PerformanceSummary {
    pub fn duration(&self) -> Duration {
        self.samples.last().map(|s| s.elapsed).unwrap_or_default()
    }
}

/// Tracks acceleration runs from the live sample stream
#[derive(Debug, Clone)]
pub struct PerformanceTracker {
    tracking: bool,
    run: Option<PerformanceRun>,
    /// Last sample at rest while waiting for the car to move
    standstill: Option<(Instant, u32)>,
    /// Consecutive decreasing samples needed to end a run
    stop_after: u32,
    decreasing: u32,
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(1)
    }
}

impl PerformanceTracker {
    pub fn new(stop_after: u32) -> Self {
        Self {
            tracking: false,
            run: None,
            standstill: None,
            stop_after: stop_after.max(1),
            decreasing: 0,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking
    }

    pub fn current_run(&self) -> Option<&PerformanceRun> {
        self.run.as_ref()
    }

    /// Begin tracking; any unfinished run is discarded
    pub fn start(&mut self) {
        self.tracking = true;
        self.run = None;
        self.standstill = None;
        self.decreasing = 0;
        info!("performance tracking started");
    }

    /// Stop tracking; returns the summary if any samples were recorded
    pub fn stop(&mut self) -> Option<PerformanceSummary> {
        self.tracking = false;
        self.standstill = None;
        self.decreasing = 0;
        let run = self.run.take()?;
        if run.samples.is_empty() {
            return None;
        }
        let summary = PerformanceSummary {
            recorded_at: Local::now(),
            samples: run.samples,
            zero_to_sixty: run.zero_to_sixty,
            zero_to_hundred: run.zero_to_hundred,
            top_speed: run.top_speed,
        };
        info!(
            samples = summary.samples.len(),
            zero_to_sixty_s = ?summary.zero_to_sixty.map(|d| d.as_secs_f64()),
            zero_to_hundred_s = ?summary.zero_to_hundred.map(|d| d.as_secs_f64()),
            top_speed = summary.top_speed,
            "performance run finished"
        );
        Some(summary)
    }

    /// Start when idle, stop when tracking
    pub fn toggle(&mut self) -> Option<PerformanceSummary> {
        if self.tracking {
            self.stop()
        } else {
            self.start();
            None
        }
    }

    /// Feed one sample. Returns the summary when the sample ended the run.
    pub fn record(&mut self, at: Instant, speed: f64, rpm: u32) -> Option<PerformanceSummary> {
        if !self.tracking {
            return None;
        }

        let Some(run) = self.run.as_mut() else {
            if speed <= 0.0 {
                self.standstill = Some((at, rpm));
                return None;
            }
            let mut run = PerformanceRun::new(self.standstill.map_or(at, |(t, _)| t));
            if let Some((t, standstill_rpm)) = self.standstill.take() {
                run.push(t, 0.0, standstill_rpm);
            }
            run.push(at, speed, rpm);
            info!(speed, "performance run started");
            self.run = Some(run);
            return None;
        };

        let previous = run.samples.last().map(|s| s.speed);
        run.push(at, speed, rpm);

        match previous {
            Some(prev) if speed < prev && speed > STOP_SPEED_THRESHOLD => self.decreasing += 1,
            _ => self.decreasing = 0,
        }
        if self.decreasing >= self.stop_after {
            return self.stop();
        }
        None
    }
}
