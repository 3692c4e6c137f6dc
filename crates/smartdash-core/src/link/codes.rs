//! Diagnostic trouble codes
//!
//! Mode 03 packs each code into two bytes: the top two bits select the
//! system letter, the next two bits the first digit, and the remaining
//! twelve bits the last three hex digits.

use serde::{Deserialize, Serialize};

/// A stored trouble code with its human-readable description
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TroubleCode {
    /// Five character code, e.g. "P0104"
    pub code: String,
    /// Description, empty when the code is not in the built-in table
    pub description: String,
}

impl TroubleCode {
    /// Build a code and look up its description
    pub fn new(code: impl Into<String>) -> Self {
        let code = code.into();
        let description = describe(&code).unwrap_or_default().to_string();
        Self { code, description }
    }
}

/// Common generic powertrain codes
const DESCRIPTIONS: &[(&str, &str)] = &[
    ("P0100", "Mass or Volume Air Flow Circuit Malfunction"),
    ("P0101", "Mass or Volume Air Flow Circuit Range/Performance Problem"),
    ("P0102", "Mass or Volume Air Flow Circuit Low Input"),
    ("P0103", "Mass or Volume Air Flow Circuit High Input"),
    ("P0104", "Mass or Volume Air Flow Circuit Intermittent"),
    ("P0113", "Intake Air Temperature Circuit High Input"),
    ("P0118", "Engine Coolant Temperature Circuit High Input"),
    ("P0128", "Coolant Thermostat (Coolant Temperature Below Thermostat Regulating Temperature)"),
    ("P0133", "O2 Sensor Circuit Slow Response (Bank 1, Sensor 1)"),
    ("P0171", "System Too Lean (Bank 1)"),
    ("P0172", "System Too Rich (Bank 1)"),
    ("P0174", "System Too Lean (Bank 2)"),
    ("P0175", "System Too Rich (Bank 2)"),
    ("P0300", "Random/Multiple Cylinder Misfire Detected"),
    ("P0301", "Cylinder 1 Misfire Detected"),
    ("P0302", "Cylinder 2 Misfire Detected"),
    ("P0303", "Cylinder 3 Misfire Detected"),
    ("P0304", "Cylinder 4 Misfire Detected"),
    ("P0305", "Cylinder 5 Misfire Detected"),
    ("P0306", "Cylinder 6 Misfire Detected"),
    ("P0307", "Cylinder 7 Misfire Detected"),
    ("P0308", "Cylinder 8 Misfire Detected"),
    ("P0325", "Knock Sensor 1 Circuit Malfunction (Bank 1 or Single Sensor)"),
    ("P0335", "Crankshaft Position Sensor A Circuit Malfunction"),
    ("P0401", "Exhaust Gas Recirculation Flow Insufficient Detected"),
    ("P0420", "Catalyst System Efficiency Below Threshold (Bank 1)"),
    ("P0430", "Catalyst System Efficiency Below Threshold (Bank 2)"),
    ("P0440", "Evaporative Emission Control System Malfunction"),
    ("P0442", "Evaporative Emission Control System Leak Detected (small leak)"),
    ("P0455", "Evaporative Emission Control System Leak Detected (no purge flow or large leak)"),
    ("P0500", "Vehicle Speed Sensor Malfunction"),
    ("P0505", "Idle Control System Malfunction"),
    ("P0562", "System Voltage Low"),
    ("P0563", "System Voltage High"),
    ("P0700", "Transmission Control System Malfunction"),
];

/// Look up the description of a code
pub fn describe(code: &str) -> Option<&'static str> {
    DESCRIPTIONS
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, d)| *d)
}

/// Decode one two-byte code; `0000` is padding and yields `None`
pub fn decode_code(a: u8, b: u8) -> Option<String> {
    if a == 0 && b == 0 {
        return None;
    }
    let letter = match a >> 6 {
        0 => 'P',
        1 => 'C',
        2 => 'B',
        _ => 'U',
    };
    let first_digit = (a >> 4) & 0x03;
    Some(format!("{}{}{:01X}{:02X}", letter, first_digit, a & 0x0F, b))
}

/// Decode the data bytes of a mode 03 answer (everything after the `43`
/// service byte). CAN adapters prefix a count byte, which shows up as an
/// odd number of data bytes.
pub fn decode_trouble_codes(data: &[u8]) -> Vec<TroubleCode> {
    let payload = if data.len() % 2 == 1 { &data[1..] } else { data };
    payload
        .chunks_exact(2)
        .filter_map(|pair| decode_code(pair[0], pair[1]))
        .map(TroubleCode::new)
        .collect()
}
