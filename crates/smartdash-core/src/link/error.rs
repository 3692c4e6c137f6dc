//! Link errors

use thiserror::Error;

/// Errors that can occur while talking to the diagnostic adapter
#[derive(Error, Debug)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    SerialError(String),

    #[error("Adapter timeout after {0} ms")]
    Timeout(u64),

    #[error("Not connected to adapter")]
    NotConnected,

    #[error("Adapter did not respond to '{0}'")]
    AdapterNotResponding(String),

    #[error("Vehicle did not respond (adapter said '{0}')")]
    VehicleNotResponding(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Port not found: {0}")]
    PortNotFound(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
