//! Per-page query manifests
//!
//! Each page declares which queries it needs and how often. The scheduler
//! walks the manifest of the active page in order on every iteration.

use crate::link::ParameterId;
use crate::navigation::PageKind;

/// A single request the poller can make
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    Rpm,
    Speed,
    Maf,
    FuelLevel,
    Voltage,
    AirTemp,
    TroubleCodes,
    /// Service a pending clear-codes request
    ClearCodes,
}

impl Query {
    /// The parameter the vehicle must support for this query to run.
    /// Trouble codes are gated on the monitor status PID.
    pub fn required_pid(self) -> Option<ParameterId> {
        match self {
            Query::Rpm => Some(ParameterId::RPM),
            Query::Speed => Some(ParameterId::SPEED),
            Query::Maf => Some(ParameterId::MAF),
            Query::FuelLevel => Some(ParameterId::FUEL_LEVEL),
            Query::Voltage => Some(ParameterId::CONTROL_MODULE_VOLTAGE),
            Query::AirTemp => Some(ParameterId::AMBIENT_AIR_TEMP),
            Query::TroubleCodes => Some(ParameterId::STATUS),
            Query::ClearCodes => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Query::Rpm => "rpm",
            Query::Speed => "speed",
            Query::Maf => "maf",
            Query::FuelLevel => "fuel_level",
            Query::Voltage => "voltage",
            Query::AirTemp => "air_temp",
            Query::TroubleCodes => "trouble_codes",
            Query::ClearCodes => "clear_codes",
        }
    }
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How often a manifest entry runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cadence {
    EveryTick,
    /// The first-delay batch
    Fast,
    /// The second-delay batch
    Slow,
}

pub type Manifest = &'static [(Query, Cadence)];

const MAIN: Manifest = &[
    (Query::Rpm, Cadence::EveryTick),
    (Query::Speed, Cadence::Fast),
    (Query::Maf, Cadence::Fast),
    (Query::FuelLevel, Cadence::Fast),
    (Query::Voltage, Cadence::Slow),
    (Query::AirTemp, Cadence::Slow),
    (Query::TroubleCodes, Cadence::Slow),
];

const MAIN_OPTIMIZED: Manifest = &[(Query::Rpm, Cadence::EveryTick), (Query::FuelLevel, Cadence::Fast)];

const CLEARING: Manifest = &[(Query::Rpm, Cadence::EveryTick), (Query::ClearCodes, Cadence::EveryTick)];

const PERFORMANCE: Manifest = &[(Query::Rpm, Cadence::EveryTick), (Query::Speed, Cadence::EveryTick)];

const RPM_ONLY: Manifest = &[(Query::Rpm, Cadence::EveryTick)];

/// The manifest for `page`; `optimize` trims the main page to the essentials
pub fn manifest_for(page: PageKind, optimize: bool) -> Manifest {
    match page {
        PageKind::Main if optimize => MAIN_OPTIMIZED,
        PageKind::Main => MAIN,
        PageKind::Trouble | PageKind::Rpm => CLEARING,
        PageKind::Performance => PERFORMANCE,
        PageKind::Custom | PageKind::ShiftLights | PageKind::Settings | PageKind::Info => RPM_ONLY,
    }
}

/// Whether queries on `page` are skipped when the vehicle does not report
/// support. The performance page polls unconditionally for dense sampling.
pub fn is_gated(page: PageKind) -> bool {
    page != PageKind::Performance
}

/// Queries of `manifest` that run in the given batch
pub fn batch(manifest: Manifest, cadence: Cadence) -> impl Iterator<Item = Query> {
    manifest.iter().filter(move |(_, c)| *c == cadence).map(|(q, _)| *q)
}
