//! Batch cadence
//!
//! The fast and slow batches either run at fixed intervals or adapt to the
//! measured link latency. The adaptive policy keeps an exponential moving
//! average of every query's round trip and spaces each batch at 1.2x the sum
//! of its queries' averages, never closer than half a second.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::manifest::{Cadence, Query};

/// Smoothing factor of the latency average
pub const LATENCY_ALPHA: f64 = 0.1;
/// Headroom applied to a batch's summed latency
pub const DELAY_MULTIPLIER: f64 = 1.2;
/// Minimum spacing of an adaptive batch
pub const MIN_ADAPTIVE_DELAY: Duration = Duration::from_millis(500);
/// Ceiling so a stalled link cannot push the batches out indefinitely
pub const MAX_ADAPTIVE_DELAY: Duration = Duration::from_secs(30);

/// Which cadence policy to use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CadenceConfig {
    Fixed {
        #[serde(default = "default_first_delay_ms")]
        first_delay_ms: u64,
        #[serde(default = "default_second_delay_ms")]
        second_delay_ms: u64,
    },
    Adaptive,
}

fn default_first_delay_ms() -> u64 {
    700
}

fn default_second_delay_ms() -> u64 {
    1300
}

impl Default for CadenceConfig {
    fn default() -> Self {
        CadenceConfig::Fixed {
            first_delay_ms: default_first_delay_ms(),
            second_delay_ms: default_second_delay_ms(),
        }
    }
}

/// Running latency averages for the adaptive policy
#[derive(Debug, Clone, Default)]
pub struct AdaptiveCadence {
    averages: HashMap<Query, f64>,
}

impl AdaptiveCadence {
    /// Fold a latency sample (seconds) into the query's average. Negative
    /// samples count as zero; non-finite ones are ignored.
    pub fn record(&mut self, query: Query, seconds: f64) {
        if !seconds.is_finite() {
            return;
        }
        let sample = seconds.max(0.0);
        self.averages
            .entry(query)
            .and_modify(|avg| *avg = LATENCY_ALPHA * sample + (1.0 - LATENCY_ALPHA) * *avg)
            .or_insert(sample);
    }

    /// Average latency of a query in seconds, if measured
    pub fn average(&self, query: Query) -> Option<f64> {
        self.averages.get(&query).copied()
    }

    /// Spacing for a batch made of `queries`
    pub fn delay<I: IntoIterator<Item = Query>>(&self, queries: I) -> Duration {
        let sum: f64 = queries.into_iter().filter_map(|q| self.average(q)).sum();
        let secs = (DELAY_MULTIPLIER * sum).clamp(
            MIN_ADAPTIVE_DELAY.as_secs_f64(),
            MAX_ADAPTIVE_DELAY.as_secs_f64(),
        );
        Duration::from_secs_f64(secs)
    }
}

/// Active cadence policy
#[derive(Debug, Clone)]
pub enum CadencePolicy {
    Fixed { fast: Duration, slow: Duration },
    Adaptive(AdaptiveCadence),
}

impl CadencePolicy {
    pub fn from_config(config: &CadenceConfig) -> Self {
        match *config {
            CadenceConfig::Fixed {
                first_delay_ms,
                second_delay_ms,
            } => CadencePolicy::Fixed {
                fast: Duration::from_millis(first_delay_ms),
                slow: Duration::from_millis(second_delay_ms),
            },
            CadenceConfig::Adaptive => CadencePolicy::Adaptive(AdaptiveCadence::default()),
        }
    }

    /// Record a query round trip; a no-op for the fixed policy
    pub fn record(&mut self, query: Query, elapsed: Duration) {
        if let CadencePolicy::Adaptive(adaptive) = self {
            adaptive.record(query, elapsed.as_secs_f64());
        }
    }

    /// Spacing of `cadence` whose batch consists of `queries`
    pub fn delay<I: IntoIterator<Item = Query>>(&self, cadence: Cadence, queries: I) -> Duration {
        match (self, cadence) {
            (_, Cadence::EveryTick) => Duration::ZERO,
            (CadencePolicy::Fixed { fast, .. }, Cadence::Fast) => *fast,
            (CadencePolicy::Fixed { slow, .. }, Cadence::Slow) => *slow,
            (CadencePolicy::Adaptive(adaptive), _) => adaptive.delay(queries),
        }
    }
}
