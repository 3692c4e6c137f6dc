//! Diagnostic Link
//!
//! The vehicle side of the dashboard: an OBD-II adapter reached over a serial
//! port or TCP socket, exposed as a small query interface.
//!
//! Supports ELM327-compatible adapters and a simulated vehicle for development.

pub mod codes;
pub mod demo;
pub mod elm327;
mod error;
pub mod serial;
pub mod stream;

pub use codes::{decode_trouble_codes, describe, TroubleCode};
pub use demo::{DemoConnector, DemoLink};
pub use elm327::{Elm327Connector, Elm327Link, Transport};
pub use error::LinkError;
pub use serial::{list_ports, open_port, PortInfo};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default baud rate for ELM327 adapters
pub const DEFAULT_BAUD_RATE: u32 = 38400;

/// Default timeout for a single adapter response in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// A mode 01 parameter identifier (PID)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ParameterId(pub u8);

impl ParameterId {
    /// Supported PIDs [01-20]
    pub const PIDS_A: ParameterId = ParameterId(0x00);
    /// Monitor status since DTCs cleared (includes DTC count)
    pub const STATUS: ParameterId = ParameterId(0x01);
    /// Engine speed
    pub const RPM: ParameterId = ParameterId(0x0C);
    /// Vehicle speed
    pub const SPEED: ParameterId = ParameterId(0x0D);
    /// Mass air flow rate
    pub const MAF: ParameterId = ParameterId(0x10);
    /// Supported PIDs [21-40]
    pub const PIDS_B: ParameterId = ParameterId(0x20);
    /// Fuel tank level input
    pub const FUEL_LEVEL: ParameterId = ParameterId(0x2F);
    /// Supported PIDs [41-60]
    pub const PIDS_C: ParameterId = ParameterId(0x40);
    /// Control module voltage
    pub const CONTROL_MODULE_VOLTAGE: ParameterId = ParameterId(0x42);
    /// Ambient air temperature
    pub const AMBIENT_AIR_TEMP: ParameterId = ParameterId(0x46);
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

impl FromStr for ParameterId {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        u8::from_str_radix(hex, 16)
            .map(ParameterId)
            .map_err(|_| LinkError::MalformedResponse(format!("invalid parameter id '{}'", s)))
    }
}

/// One of the three "supported PIDs" bitmask blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapabilityBlock {
    /// PIDs 0x01-0x20
    A,
    /// PIDs 0x21-0x40
    B,
    /// PIDs 0x41-0x60
    C,
}

impl CapabilityBlock {
    /// All blocks in query order
    pub const ALL: [CapabilityBlock; 3] = [CapabilityBlock::A, CapabilityBlock::B, CapabilityBlock::C];

    /// The PID that requests this block
    pub fn pid(self) -> ParameterId {
        match self {
            CapabilityBlock::A => ParameterId::PIDS_A,
            CapabilityBlock::B => ParameterId::PIDS_B,
            CapabilityBlock::C => ParameterId::PIDS_C,
        }
    }
}

/// Decoded value of a single parameter query.
///
/// `None` means the vehicle answered without data (the adapter's `NO DATA`).
pub type Reading = Option<f64>;

/// Request/response access to the vehicle.
///
/// A link is used by at most one caller at a time; it is `Send` so it can be
/// moved onto the polling task, but not `Sync`.
pub trait DiagnosticLink: Send {
    /// Query a mode 01 parameter
    fn query(&mut self, pid: ParameterId) -> Result<Reading, LinkError>;

    /// Query one "supported PIDs" block as 32 bits, most significant first.
    /// An empty vector means the block was not answered.
    fn supported_bitmask(&mut self, block: CapabilityBlock) -> Result<Vec<bool>, LinkError>;

    /// Read stored trouble codes (mode 03). `None` when the vehicle gave no answer.
    fn trouble_codes(&mut self) -> Result<Option<Vec<TroubleCode>>, LinkError>;

    /// Clear stored trouble codes (mode 04). Returns whether the vehicle acknowledged.
    fn clear_trouble_codes(&mut self) -> Result<bool, LinkError>;

    /// Short human-readable description of the link (port, address, ...)
    fn describe(&self) -> String;
}

/// Factory that establishes a new [`DiagnosticLink`]
pub trait LinkConnector: Send + Sync {
    /// Open the transport and initialise the adapter within `timeout`
    fn connect(&self, timeout: Duration) -> Result<Box<dyn DiagnosticLink>, LinkError>;
}
