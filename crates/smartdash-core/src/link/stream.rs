//! Byte transports for adapter communication
//!
//! Bluetooth adapters show up as a serial device (`/dev/rfcomm0`), WiFi
//! adapters as a TCP endpoint. Both are driven through [`CommunicationChannel`].

use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::LinkError;

/// Abstraction for communication channels (Serial or TCP)
pub trait CommunicationChannel: Read + Write + Send {
    /// Set timeout for read/write operations
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;

    /// Discard anything the adapter sent that we have not read yet
    fn clear_input_buffer(&mut self) -> io::Result<()>;
}

/// Serial port wrapper implementing CommunicationChannel
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
}

impl SerialChannel {
    pub fn new(port: Box<dyn SerialPort>) -> Self {
        Self { port }
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.port.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.port.flush()
    }
}

impl CommunicationChannel for SerialChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(serialport::ClearBuffer::Input)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
    }
}

/// TCP stream wrapper implementing CommunicationChannel
pub struct TcpChannel {
    stream: TcpStream,
}

impl TcpChannel {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    /// Connect to a WiFi adapter (commonly `192.168.0.10:35000`)
    pub fn connect(address: &str, timeout: Duration) -> Result<Self, LinkError> {
        let addr = address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| LinkError::PortNotFound(address.to_string()))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl CommunicationChannel for TcpChannel {
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.stream.set_read_timeout(Some(timeout))?;
        self.stream.set_write_timeout(Some(timeout))?;
        Ok(())
    }

    fn clear_input_buffer(&mut self) -> io::Result<()> {
        // Drain with a non-blocking read, then restore blocking mode.
        self.stream.set_nonblocking(true)?;
        let mut buf = [0u8; 256];
        let result = loop {
            match self.stream.read(&mut buf) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break Ok(()),
                Err(e) => break Err(e),
            }
        };
        self.stream.set_nonblocking(false)?;
        result
    }
}
