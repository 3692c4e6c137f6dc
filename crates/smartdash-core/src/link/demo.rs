//! Demo Mode - Simulated vehicle for testing
//!
//! Answers queries like a real car would without an adapter attached.
//! Simulates an engine idling at ~850 RPM with random throttle blips that
//! pull the car forward, a slowly draining tank and a couple of stored codes.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{CapabilityBlock, DiagnosticLink, LinkConnector, LinkError, ParameterId, Reading, TroubleCode};

const IDLE_RPM: f64 = 850.0;
const RAMP_UP_MS: u64 = 1500;
const HOLD_MS: u64 = 2000;
const RAMP_DOWN_MS: u64 = 3000;

/// Codes the simulated car reports until they are cleared
const STORED_CODES: &[&str] = &["P0104", "P0420"];

/// PIDs the simulated car answers, besides the bitmask blocks themselves
const SUPPORTED: &[u8] = &[0x01, 0x0C, 0x0D, 0x10, 0x2F, 0x42, 0x46];

/// Produces a [`DemoLink`]; never fails
#[derive(Debug, Clone)]
pub struct DemoConnector {
    engine_running: bool,
}

impl DemoConnector {
    pub fn new(engine_running: bool) -> Self {
        Self { engine_running }
    }
}

impl Default for DemoConnector {
    fn default() -> Self {
        Self::new(true)
    }
}

impl LinkConnector for DemoConnector {
    fn connect(&self, _timeout: Duration) -> Result<Box<dyn DiagnosticLink>, LinkError> {
        Ok(Box::new(DemoLink::new(self.engine_running)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlipState {
    /// Engine idling, car stationary
    Idle,
    /// Throttle opening, RPM rising
    RampUp { start_ms: u64 },
    /// At peak RPM, holding
    Hold { start_ms: u64 },
    /// Throttle closing, RPM falling
    RampDown { start_ms: u64 },
}

/// Simulated engine and vehicle state
pub struct DemoSimulator {
    engine_running: bool,
    last_update_ms: Option<u64>,
    next_blip_at_ms: u64,
    blip_state: BlipState,
    blip_target_rpm: f64,
    current_rpm: f64,
    speed_mph: f64,
    fuel_level: f64,
    rng: StdRng,
}

impl DemoSimulator {
    pub fn new(engine_running: bool) -> Self {
        Self::with_rng(engine_running, StdRng::from_entropy())
    }

    /// Deterministic simulator for tests
    pub fn with_seed(engine_running: bool, seed: u64) -> Self {
        Self::with_rng(engine_running, StdRng::seed_from_u64(seed))
    }

    fn with_rng(engine_running: bool, mut rng: StdRng) -> Self {
        let first_blip = rng.gen_range(8000..15000);
        Self {
            engine_running,
            last_update_ms: None,
            next_blip_at_ms: first_blip,
            blip_state: BlipState::Idle,
            blip_target_rpm: 0.0,
            current_rpm: if engine_running { IDLE_RPM } else { 0.0 },
            speed_mph: 0.0,
            fuel_level: 72.0,
            rng,
        }
    }

    /// Advance the simulation to `sim_ms` milliseconds after start
    pub fn update(&mut self, sim_ms: u64) {
        let delta_ms = self
            .last_update_ms
            .map(|last| sim_ms.saturating_sub(last))
            .unwrap_or(0);
        self.last_update_ms = Some(sim_ms);

        if !self.engine_running {
            self.current_rpm = 0.0;
            self.speed_mph = 0.0;
            return;
        }

        self.update_blip_state(sim_ms);
        let target_rpm = self.target_rpm(sim_ms);
        let dt = delta_ms as f64 / 1000.0;

        let rpm_rate = if target_rpm > self.current_rpm { 4000.0 } else { 1500.0 };
        let max_change = rpm_rate * dt;
        self.current_rpm += (target_rpm - self.current_rpm).clamp(-max_change, max_change);

        // Accelerate while the throttle is open, coast down otherwise
        let accel = match self.blip_state {
            BlipState::RampUp { .. } | BlipState::Hold { .. } => (self.current_rpm - IDLE_RPM) / 150.0,
            _ => -8.0,
        };
        self.speed_mph = (self.speed_mph + accel * dt).clamp(0.0, 120.0);

        self.fuel_level = (self.fuel_level - 0.0005 * dt * (self.current_rpm / IDLE_RPM)).max(0.0);
    }

    pub fn rpm(&self, sim_ms: u64) -> f64 {
        if !self.engine_running {
            return 0.0;
        }
        let t = sim_ms as f64 / 1000.0;
        let wobble = if matches!(self.blip_state, BlipState::Idle) {
            20.0 * (t * 2.5).sin() + 10.0 * (t * 7.3).sin()
        } else {
            0.0
        };
        (self.current_rpm + wobble).max(0.0).round()
    }

    pub fn speed(&self) -> f64 {
        self.speed_mph.round()
    }

    /// Mass air flow in g/s, roughly proportional to engine speed
    pub fn maf(&self) -> f64 {
        if self.engine_running {
            (self.current_rpm * 0.0045 * 100.0).round() / 100.0
        } else {
            0.0
        }
    }

    pub fn fuel_level(&self) -> f64 {
        self.fuel_level
    }

    pub fn voltage(&self, sim_ms: u64) -> f64 {
        let t = sim_ms as f64 / 1000.0;
        let base = if self.engine_running { 13.8 } else { 12.4 };
        base + 0.2 * (t * 0.5).sin()
    }

    pub fn air_temp(&self, sim_ms: u64) -> f64 {
        let t = sim_ms as f64 / 1000.0;
        (22.0 + 2.0 * (t * 0.01).sin()).round()
    }

    fn update_blip_state(&mut self, sim_ms: u64) {
        match self.blip_state {
            BlipState::Idle => {
                if sim_ms >= self.next_blip_at_ms {
                    self.blip_target_rpm = self.rng.gen_range(3000.0..6000.0);
                    self.blip_state = BlipState::RampUp { start_ms: sim_ms };
                }
            }
            BlipState::RampUp { start_ms } => {
                if sim_ms >= start_ms + RAMP_UP_MS {
                    self.blip_state = BlipState::Hold { start_ms: sim_ms };
                }
            }
            BlipState::Hold { start_ms } => {
                if sim_ms >= start_ms + HOLD_MS {
                    self.blip_state = BlipState::RampDown { start_ms: sim_ms };
                }
            }
            BlipState::RampDown { start_ms } => {
                if sim_ms >= start_ms + RAMP_DOWN_MS {
                    self.blip_state = BlipState::Idle;
                    self.next_blip_at_ms = sim_ms + self.rng.gen_range(8000..15000);
                }
            }
        }
    }

    fn target_rpm(&self, sim_ms: u64) -> f64 {
        match self.blip_state {
            BlipState::Idle => IDLE_RPM,
            BlipState::RampUp { start_ms } => {
                let progress = ((sim_ms - start_ms) as f64 / RAMP_UP_MS as f64).min(1.0);
                IDLE_RPM + (self.blip_target_rpm - IDLE_RPM) * progress
            }
            BlipState::Hold { .. } => self.blip_target_rpm,
            BlipState::RampDown { start_ms } => {
                let progress = ((sim_ms - start_ms) as f64 / RAMP_DOWN_MS as f64).min(1.0);
                self.blip_target_rpm + (IDLE_RPM - self.blip_target_rpm) * progress
            }
        }
    }
}

/// A [`DiagnosticLink`] backed by [`DemoSimulator`]
pub struct DemoLink {
    simulator: DemoSimulator,
    started: Instant,
    codes: Vec<TroubleCode>,
}

impl DemoLink {
    pub fn new(engine_running: bool) -> Self {
        Self::from_simulator(DemoSimulator::new(engine_running))
    }

    pub fn from_simulator(simulator: DemoSimulator) -> Self {
        Self {
            simulator,
            started: Instant::now(),
            codes: STORED_CODES.iter().map(|c| TroubleCode::new(*c)).collect(),
        }
    }

    fn sim_ms(&mut self) -> u64 {
        let now = self.started.elapsed().as_millis() as u64;
        self.simulator.update(now);
        now
    }
}

impl DiagnosticLink for DemoLink {
    fn query(&mut self, pid: ParameterId) -> Result<Reading, LinkError> {
        let now = self.sim_ms();
        let sim = &self.simulator;
        let value = match pid {
            ParameterId::STATUS => Some(self.codes.len() as f64),
            ParameterId::RPM => Some(sim.rpm(now)),
            ParameterId::SPEED => Some(sim.speed()),
            ParameterId::MAF => Some(sim.maf()),
            ParameterId::FUEL_LEVEL => Some(sim.fuel_level()),
            ParameterId::CONTROL_MODULE_VOLTAGE => Some(sim.voltage(now)),
            ParameterId::AMBIENT_AIR_TEMP => Some(sim.air_temp(now)),
            _ => None,
        };
        Ok(value)
    }

    fn supported_bitmask(&mut self, block: CapabilityBlock) -> Result<Vec<bool>, LinkError> {
        let base = block.pid().0;
        let next_block = base.wrapping_add(0x20);
        Ok((1..=32u8)
            .map(|offset| {
                let pid = base + offset;
                SUPPORTED.contains(&pid) || (pid == next_block && block != CapabilityBlock::C)
            })
            .collect())
    }

    fn trouble_codes(&mut self) -> Result<Option<Vec<TroubleCode>>, LinkError> {
        Ok(Some(self.codes.clone()))
    }

    fn clear_trouble_codes(&mut self) -> Result<bool, LinkError> {
        let now = self.sim_ms();
        if self.simulator.rpm(now) == 0.0 {
            self.codes.clear();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn describe(&self) -> String {
        "demo vehicle".to_string()
    }
}
