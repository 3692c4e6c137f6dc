//! Serial port handling
//!
//! Provides low-level serial port access for OBD-II adapters.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;

use super::{LinkError, DEFAULT_BAUD_RATE};

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/rfcomm0" or "COM5")
    pub name: String,

    /// Product name (if available)
    pub product: Option<String>,
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        let product = match info.port_type {
            SerialPortType::UsbPort(usb_info) => usb_info.product,
            _ => None,
        };

        Self {
            name: info.port_name,
            product,
        }
    }
}

/// Sort port names so Bluetooth RFCOMM devices come first, then USB adapters,
/// then everything else (numerically by suffix within each family).
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let basename = name.rsplit('/').next().unwrap_or(name);
    let families = ["rfcomm", "ttyUSB", "ttyACM"];
    for (rank, prefix) in families.iter().enumerate() {
        if let Some(rest) = basename.strip_prefix(prefix) {
            let num = rest.parse::<usize>().unwrap_or(usize::MAX);
            return (rank as u8, num, basename.to_string());
        }
    }
    (families.len() as u8, 0, basename.to_string())
}

/// List candidate adapter ports, with /dev fallbacks and deterministic ordering
pub fn list_ports() -> Vec<PortInfo> {
    let mut map: HashMap<String, PortInfo> = HashMap::new();
    for info in serialport::available_ports().unwrap_or_default() {
        let p = PortInfo::from(info);
        map.entry(p.name.clone()).or_insert(p);
    }

    // rfcomm devices are not always enumerated by the serialport API
    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        for entry in entries.flatten() {
            if let Some(fname) = entry.file_name().to_str() {
                if fname.starts_with("rfcomm") || fname.starts_with("ttyUSB") {
                    let full = format!("/dev/{}", fname);
                    map.entry(full.clone()).or_insert_with(|| PortInfo {
                        name: full,
                        product: None,
                    });
                }
            }
        }
    }

    let mut v: Vec<PortInfo> = map.into_values().collect();
    v.sort_by_key(|p| port_sort_key(&p.name));
    v
}

/// Open a serial port configured 8N1 without flow control
pub fn open_port(
    name: &str,
    baud_rate: Option<u32>,
    timeout: Duration,
) -> Result<Box<dyn SerialPort>, LinkError> {
    let baud = baud_rate.unwrap_or(DEFAULT_BAUD_RATE);

    let mut port = serialport::new(name, baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .flow_control(serialport::FlowControl::None)
        .timeout(timeout)
        .open()
        .map_err(|e| match e.kind() {
            serialport::ErrorKind::NoDevice => LinkError::PortNotFound(name.to_string()),
            _ => LinkError::SerialError(e.to_string()),
        })?;

    port.clear(serialport::ClearBuffer::All)
        .map_err(|e| LinkError::SerialError(e.to_string()))?;
    Ok(port)
}
