//! Scripted in-memory link shared by the integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use smartdash_core::link::{CapabilityBlock, DiagnosticLink, LinkConnector, LinkError, ParameterId, Reading, TroubleCode};

/// What the scripted link was asked
#[derive(Debug, Default, Clone)]
pub struct LinkLog {
    /// Mode 01 queries in order. Trouble code reads are logged under the
    /// status PID they are gated on.
    pub queries: Vec<ParameterId>,
    pub bitmask_reads: usize,
    pub clear_attempts: usize,
}

impl LinkLog {
    pub fn count(&self, pid: ParameterId) -> usize {
        self.queries.iter().filter(|p| **p == pid).count()
    }
}

/// Link answering from fixed tables
#[derive(Clone)]
pub struct ScriptedLink {
    supported: Vec<u8>,
    /// Blocks that come back empty, as when the vehicle stays silent
    silent_blocks: Vec<CapabilityBlock>,
    values: HashMap<u8, f64>,
    codes: Vec<TroubleCode>,
    clear_ack: bool,
    fail_on: Option<ParameterId>,
    panic_on: Option<ParameterId>,
    log: Arc<Mutex<LinkLog>>,
}

impl ScriptedLink {
    pub fn new(supported: &[u8]) -> Self {
        Self {
            supported: supported.to_vec(),
            silent_blocks: Vec::new(),
            values: HashMap::new(),
            codes: Vec::new(),
            clear_ack: true,
            fail_on: None,
            panic_on: None,
            log: Arc::new(Mutex::new(LinkLog::default())),
        }
    }

    pub fn with_value(mut self, pid: ParameterId, value: f64) -> Self {
        self.values.insert(pid.0, value);
        self
    }

    pub fn with_codes(mut self, codes: &[&str]) -> Self {
        self.codes = codes.iter().map(|c| TroubleCode::new(*c)).collect();
        self
    }

    pub fn with_clear_ack(mut self, ack: bool) -> Self {
        self.clear_ack = ack;
        self
    }

    pub fn failing_on(mut self, pid: ParameterId) -> Self {
        self.fail_on = Some(pid);
        self
    }

    /// Panic inside the link when `pid` is queried
    pub fn panicking_on(mut self, pid: ParameterId) -> Self {
        self.panic_on = Some(pid);
        self
    }

    pub fn with_silent_block(mut self, block: CapabilityBlock) -> Self {
        self.silent_blocks.push(block);
        self
    }

    /// Handle on the log that stays valid after the link is boxed
    pub fn log(&self) -> Arc<Mutex<LinkLog>> {
        self.log.clone()
    }

    pub fn snapshot(&self) -> LinkLog {
        self.log.lock().unwrap().clone()
    }

    fn record(&self, pid: ParameterId) -> Result<(), LinkError> {
        self.log.lock().unwrap().queries.push(pid);
        if self.fail_on == Some(pid) {
            return Err(LinkError::Timeout(2000));
        }
        if self.panic_on == Some(pid) {
            panic!("link driver crashed on {:?}", pid);
        }
        Ok(())
    }
}

impl DiagnosticLink for ScriptedLink {
    fn query(&mut self, pid: ParameterId) -> Result<Reading, LinkError> {
        self.record(pid)?;
        Ok(self.values.get(&pid.0).copied())
    }

    fn supported_bitmask(&mut self, block: CapabilityBlock) -> Result<Vec<bool>, LinkError> {
        self.log.lock().unwrap().bitmask_reads += 1;
        if self.silent_blocks.contains(&block) {
            return Ok(Vec::new());
        }
        let base = block.pid().0;
        Ok((1..=32u8).map(|offset| self.supported.contains(&(base + offset))).collect())
    }

    fn trouble_codes(&mut self) -> Result<Option<Vec<TroubleCode>>, LinkError> {
        self.record(ParameterId::STATUS)?;
        Ok(Some(self.codes.clone()))
    }

    fn clear_trouble_codes(&mut self) -> Result<bool, LinkError> {
        self.log.lock().unwrap().clear_attempts += 1;
        if self.clear_ack {
            self.codes.clear();
        }
        Ok(self.clear_ack)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Connector that fails a number of times before handing out a clone of
/// its link
pub struct ScriptedConnector {
    link: ScriptedLink,
    failures: u32,
    attempts: AtomicU32,
}

impl ScriptedConnector {
    pub fn new(link: ScriptedLink, failures: u32) -> Self {
        Self {
            link,
            failures,
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl LinkConnector for ScriptedConnector {
    fn connect(&self, _timeout: Duration) -> Result<Box<dyn DiagnosticLink>, LinkError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.failures {
            return Err(LinkError::AdapterNotResponding("ATZ".to_string()));
        }
        Ok(Box::new(self.link.clone()))
    }
}
