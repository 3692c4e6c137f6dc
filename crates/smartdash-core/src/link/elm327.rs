//! ELM327 adapter link
//!
//! Text protocol: every command is terminated with `\r` and every answer
//! ends with the `>` prompt. After initialisation echo, linefeeds, spaces and
//! headers are all off, so a mode 01 answer looks like `410C1AF8`.

use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::codes::decode_trouble_codes;
use super::stream::{CommunicationChannel, SerialChannel, TcpChannel};
use super::{
    open_port, CapabilityBlock, DiagnosticLink, LinkConnector, LinkError, ParameterId, Reading,
    TroubleCode,
};

const KMH_TO_MPH: f64 = 0.621371;

/// Commands sent after reset, each answered with `OK`
const INIT_COMMANDS: &[&str] = &["ATE0", "ATL0", "ATS0", "ATH0", "ATSP0"];

/// Where the adapter lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transport {
    /// Serial device, e.g. the Bluetooth RFCOMM port `/dev/rfcomm0`
    Serial { port: String, baud_rate: u32 },
    /// WiFi adapter, e.g. `192.168.0.10:35000`
    Tcp { address: String },
}

/// Connects to an ELM327 adapter over the configured transport
#[derive(Debug, Clone)]
pub struct Elm327Connector {
    transport: Transport,
}

impl Elm327Connector {
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }
}

impl LinkConnector for Elm327Connector {
    fn connect(&self, timeout: Duration) -> Result<Box<dyn DiagnosticLink>, LinkError> {
        let (channel, description): (Box<dyn CommunicationChannel>, String) = match &self.transport {
            Transport::Serial { port, baud_rate } => {
                let handle = open_port(port, Some(*baud_rate), Duration::from_millis(100))?;
                (Box::new(SerialChannel::new(handle)), port.clone())
            }
            Transport::Tcp { address } => {
                let mut channel = TcpChannel::connect(address, timeout)?;
                channel.set_timeout(Duration::from_millis(100))?;
                (Box::new(channel), address.clone())
            }
        };

        let mut link = Elm327Link::new(channel, timeout, description);
        link.initialise()?;
        Ok(Box::new(link))
    }
}

/// An initialised ELM327 session
pub struct Elm327Link {
    channel: Box<dyn CommunicationChannel>,
    timeout: Duration,
    description: String,
    version: Option<String>,
}

impl Elm327Link {
    /// Wrap a channel; call [`Elm327Link::initialise`] before querying
    pub fn new(channel: Box<dyn CommunicationChannel>, timeout: Duration, description: String) -> Self {
        Self {
            channel,
            timeout,
            description,
            version: None,
        }
    }

    /// Adapter identification string reported by `ATZ`
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Reset the adapter, configure compact output and check the vehicle answers
    pub fn initialise(&mut self) -> Result<(), LinkError> {
        let reset = self.command("ATZ")?;
        self.version = reset.into_iter().find(|l| l.contains("ELM"));
        debug!(adapter = ?self.version, link = %self.description, "adapter reset");

        for cmd in INIT_COMMANDS {
            let lines = self.command(cmd)?;
            if !lines.iter().any(|l| l.contains("OK")) {
                return Err(LinkError::AdapterNotResponding(cmd.to_string()));
            }
        }

        let lines = self.command("0100")?;
        if find_payload(&lines, "4100").is_none() {
            return Err(LinkError::VehicleNotResponding(lines.join(" ")));
        }
        Ok(())
    }

    /// Send a command and collect the answer lines up to the prompt
    fn command(&mut self, cmd: &str) -> Result<Vec<String>, LinkError> {
        self.channel.clear_input_buffer()?;
        self.channel.write_all(format!("{}\r", cmd).as_bytes())?;
        self.channel.flush()?;

        let started = Instant::now();
        let mut raw = Vec::with_capacity(64);
        let mut buf = [0u8; 64];
        loop {
            if started.elapsed() >= self.timeout {
                return Err(LinkError::Timeout(self.timeout.as_millis() as u64));
            }
            match self.channel.read(&mut buf) {
                Ok(0) => return Err(LinkError::NotConnected),
                Ok(n) => {
                    raw.extend_from_slice(&buf[..n]);
                    if raw.contains(&b'>') {
                        break;
                    }
                }
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    continue
                }
                Err(e) => return Err(e.into()),
            }
        }

        let lines = split_response(&String::from_utf8_lossy(&raw), cmd);
        trace!(cmd, ?lines, elapsed_us = started.elapsed().as_micros() as u64, "adapter answered");
        Ok(lines)
    }
}

impl DiagnosticLink for Elm327Link {
    fn query(&mut self, pid: ParameterId) -> Result<Reading, LinkError> {
        let cmd = format!("01{:02X}", pid.0);
        let lines = self.command(&cmd)?;
        let prefix = format!("41{:02X}", pid.0);
        Ok(find_payload(&lines, &prefix).and_then(|bytes| decode_pid(pid, &bytes)))
    }

    fn supported_bitmask(&mut self, block: CapabilityBlock) -> Result<Vec<bool>, LinkError> {
        let pid = block.pid();
        let lines = self.command(&format!("01{:02X}", pid.0))?;
        let prefix = format!("41{:02X}", pid.0);
        Ok(find_payload(&lines, &prefix)
            .filter(|bytes| bytes.len() >= 4)
            .map(|bytes| bits_msb_first(&bytes[..4]))
            .unwrap_or_default())
    }

    fn trouble_codes(&mut self) -> Result<Option<Vec<TroubleCode>>, LinkError> {
        let lines = self.command("03")?;
        let mut found = false;
        let mut codes = Vec::new();
        for line in &lines {
            if let Some(bytes) = hex_bytes(line).filter(|b| b.first() == Some(&0x43)) {
                found = true;
                codes.extend(decode_trouble_codes(&bytes[1..]));
            }
        }
        Ok(found.then_some(codes))
    }

    fn clear_trouble_codes(&mut self) -> Result<bool, LinkError> {
        let lines = self.command("04")?;
        Ok(lines.iter().any(|l| l.starts_with("44")))
    }

    fn describe(&self) -> String {
        format!("ELM327 on {}", self.description)
    }
}

/// Split raw adapter output into meaningful lines, dropping the prompt,
/// the command echo and progress chatter.
fn split_response(raw: &str, cmd: &str) -> Vec<String> {
    raw.split(['\r', '\n', '>'])
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .filter(|l| !l.eq_ignore_ascii_case(cmd))
        .filter(|l| !l.starts_with("SEARCHING"))
        .map(|l| l.to_string())
        .collect()
}

/// Parse a line of hex digits (spaces tolerated) into bytes. Line noise
/// of any kind, including non-ASCII bytes, yields `None`.
fn hex_bytes(line: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = line.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.is_empty() || digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks_exact(2)
        .map(|pair| Some(hex_digit(pair[0])? << 4 | hex_digit(pair[1])?))
        .collect()
}

fn hex_digit(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

/// Find the first answer line starting with `prefix` and return the bytes after it
fn find_payload(lines: &[String], prefix: &str) -> Option<Vec<u8>> {
    let skip = prefix.len() / 2;
    lines.iter().find_map(|line| {
        let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
        if !compact.starts_with(prefix) {
            return None;
        }
        hex_bytes(&compact).and_then(|bytes| bytes.get(skip..).map(<[u8]>::to_vec))
    })
}

fn bits_msb_first(bytes: &[u8]) -> Vec<bool> {
    bytes
        .iter()
        .flat_map(|byte| (0..8).rev().map(move |bit| byte & (1 << bit) != 0))
        .collect()
}

/// Apply the standard SAE J1979 scaling for the parameters the dashboard uses
pub fn decode_pid(pid: ParameterId, data: &[u8]) -> Reading {
    let a = *data.first()? as f64;
    let ab = || data.get(1).map(|&b| a * 256.0 + b as f64);
    match pid {
        ParameterId::RPM => ab().map(|v| v / 4.0),
        ParameterId::SPEED => Some(a * KMH_TO_MPH),
        ParameterId::MAF => ab().map(|v| v / 100.0),
        ParameterId::FUEL_LEVEL => Some(a * 100.0 / 255.0),
        ParameterId::CONTROL_MODULE_VOLTAGE => ab().map(|v| v / 1000.0),
        ParameterId::AMBIENT_AIR_TEMP => Some(a - 40.0),
        _ => Some(a),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// Adapter stand-in that answers each command from a script
    struct ScriptedChannel {
        answers: HashMap<String, Vec<u8>>,
        pending: VecDeque<u8>,
        partial: String,
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl ScriptedChannel {
        fn new(answers: &[(&str, &str)]) -> (Self, Arc<Mutex<Vec<String>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let channel = Self {
                answers: answers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                    .collect(),
                pending: VecDeque::new(),
                partial: String::new(),
                sent: sent.clone(),
            };
            (channel, sent)
        }

        /// Answer `cmd` with bytes that need not be valid text
        fn answer_raw(&mut self, cmd: &str, bytes: &[u8]) {
            self.answers.insert(cmd.to_string(), bytes.to_vec());
        }
    }

    impl Read for ScriptedChannel {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pending.is_empty() {
                return Err(io::Error::new(io::ErrorKind::TimedOut, "idle"));
            }
            let n = buf.len().min(self.pending.len());
            for slot in buf.iter_mut().take(n) {
                *slot = self.pending.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for ScriptedChannel {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.partial.push_str(&String::from_utf8_lossy(buf));
            while let Some(pos) = self.partial.find('\r') {
                let cmd: String = self.partial.drain(..=pos).collect();
                let cmd = cmd.trim().to_string();
                self.sent.lock().unwrap().push(cmd.clone());
                let answer = self.answers.get(&cmd).cloned().unwrap_or_else(|| b"?".to_vec());
                self.pending.extend(answer);
                self.pending.extend(b"\r\r>");
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl CommunicationChannel for ScriptedChannel {
        fn set_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
            Ok(())
        }

        fn clear_input_buffer(&mut self) -> io::Result<()> {
            self.pending.clear();
            Ok(())
        }
    }

    const INIT: &[(&str, &str)] = &[
        ("ATZ", "ATZ\r\rELM327 v1.5"),
        ("ATE0", "ATE0\rOK"),
        ("ATL0", "OK"),
        ("ATS0", "OK"),
        ("ATH0", "OK"),
        ("ATSP0", "OK"),
        ("0100", "SEARCHING...\r4100BE3EB811"),
    ];

    fn link_with(extra: &[(&str, &str)]) -> (Elm327Link, Arc<Mutex<Vec<String>>>) {
        let mut script: Vec<(&str, &str)> = INIT.to_vec();
        script.extend_from_slice(extra);
        let (channel, sent) = ScriptedChannel::new(&script);
        let mut link = Elm327Link::new(Box::new(channel), Duration::from_millis(200), "test".into());
        link.initialise().expect("initialise");
        (link, sent)
    }

    #[test]
    fn test_initialise_sequence() {
        let (link, sent) = link_with(&[]);
        assert_eq!(link.version(), Some("ELM327 v1.5"));
        assert_eq!(
            *sent.lock().unwrap(),
            vec!["ATZ", "ATE0", "ATL0", "ATS0", "ATH0", "ATSP0", "0100"]
        );
    }

    #[test]
    fn test_initialise_vehicle_silent() {
        let mut script: Vec<(&str, &str)> = INIT[..6].to_vec();
        script.push(("0100", "UNABLE TO CONNECT"));
        let (channel, _) = ScriptedChannel::new(&script);
        let mut link = Elm327Link::new(Box::new(channel), Duration::from_millis(200), "test".into());
        assert!(matches!(
            link.initialise(),
            Err(LinkError::VehicleNotResponding(_))
        ));
    }

    #[test]
    fn test_query_rpm_and_speed() {
        let (mut link, _) = link_with(&[("010C", "410C1AF8"), ("010D", "41 0D 64")]);
        assert_eq!(link.query(ParameterId::RPM).unwrap(), Some(1726.0));
        let mph = link.query(ParameterId::SPEED).unwrap().unwrap();
        assert!((mph - 62.1371).abs() < 1e-6);
    }

    #[test]
    fn test_query_no_data_is_null() {
        let (mut link, _) = link_with(&[("0146", "NO DATA")]);
        assert_eq!(link.query(ParameterId::AMBIENT_AIR_TEMP).unwrap(), None);
    }

    #[test]
    fn test_query_unknown_command() {
        let (mut link, _) = link_with(&[]);
        // Unknown commands are answered with '?', which carries no payload
        assert_eq!(link.query(ParameterId::MAF).unwrap(), None);
    }

    #[test]
    fn test_query_line_noise_is_null() {
        let (mut channel, _) = ScriptedChannel::new(INIT);
        channel.answer_raw("010C", b"410C\xFF1");
        channel.answer_raw("010D", "410D\u{e9}4".as_bytes());
        channel.answer_raw("03", b"43\xC3\xA9104");
        let mut link = Elm327Link::new(Box::new(channel), Duration::from_millis(200), "test".into());
        link.initialise().expect("initialise");

        assert_eq!(link.query(ParameterId::RPM).unwrap(), None);
        assert_eq!(link.query(ParameterId::SPEED).unwrap(), None);
        assert_eq!(link.trouble_codes().unwrap(), None);
    }

    #[test]
    fn test_hex_bytes_rejects_noise() {
        assert_eq!(hex_bytes("41 0C 1A F8"), Some(vec![0x41, 0x0C, 0x1A, 0xF8]));
        assert_eq!(hex_bytes("410C\u{fffd}1"), None);
        assert_eq!(hex_bytes("41\u{e9}"), None);
        assert_eq!(hex_bytes("410G"), None);
        assert_eq!(hex_bytes("410"), None);
        assert_eq!(hex_bytes(""), None);
    }

    #[test]
    fn test_supported_bitmask() {
        let (mut link, _) = link_with(&[("0120", "41 20 80 00 00 01")]);
        let bits = link.supported_bitmask(CapabilityBlock::A).unwrap();
        assert_eq!(bits.len(), 32);
        // BE = 1011 1110
        assert_eq!(&bits[..8], &[true, false, true, true, true, true, true, false]);

        let bits = link.supported_bitmask(CapabilityBlock::B).unwrap();
        assert_eq!(bits.iter().filter(|b| **b).count(), 2);
        assert!(bits[0]);
        assert!(bits[31]);
    }

    #[test]
    fn test_supported_bitmask_unanswered() {
        let (mut link, _) = link_with(&[("0140", "NO DATA")]);
        assert!(link.supported_bitmask(CapabilityBlock::C).unwrap().is_empty());
    }

    #[test]
    fn test_trouble_codes() {
        let (mut link, _) = link_with(&[("03", "43010404200000"), ("04", "44")]);
        let codes = link.trouble_codes().unwrap().unwrap();
        let names: Vec<&str> = codes.iter().map(|c| c.code.as_str()).collect();
        assert_eq!(names, vec!["P0104", "P0420"]);
        assert!(link.clear_trouble_codes().unwrap());
    }

    #[test]
    fn test_trouble_codes_no_answer() {
        let (mut link, _) = link_with(&[("03", "NO DATA"), ("04", "NO DATA")]);
        assert_eq!(link.trouble_codes().unwrap(), None);
        assert!(!link.clear_trouble_codes().unwrap());
    }

    #[test]
    fn test_decode_pid_scaling() {
        assert_eq!(decode_pid(ParameterId::MAF, &[0x01, 0xF4]), Some(5.0));
        assert_eq!(decode_pid(ParameterId::FUEL_LEVEL, &[0xFF]), Some(100.0));
        assert_eq!(decode_pid(ParameterId::CONTROL_MODULE_VOLTAGE, &[0x36, 0xB0]), Some(14.0));
        assert_eq!(decode_pid(ParameterId::AMBIENT_AIR_TEMP, &[0x3C]), Some(20.0));
        assert_eq!(decode_pid(ParameterId::RPM, &[0x1A]), None);
        assert_eq!(decode_pid(ParameterId::RPM, &[]), None);
    }
}
