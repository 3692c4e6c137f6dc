//! # SmartDash Core Library
//!
//! Core functionality for the SmartDash in-vehicle dashboard.
//!
//! This library provides:
//! - OBD-II communication through ELM327 adapters (serial or WiFi)
//! - A simulated vehicle for development without a car
//! - Page-driven telemetry polling with fixed or adaptive cadence
//! - Touch navigation over the dashboard's page grid
//! - Persisted settings and acceleration run tracking
//!
//! ## Example
//!
//! ```rust,ignore
//! use smartdash_core::prelude::*;
//!
//! let config = DashConfig::load(Path::new("config.json"))?;
//! let state = Arc::new(SharedTelemetryState::default());
//! let mut runtime = Runtime::start(
//!     RuntimeConfig::from_dash_config(&config)?,
//!     config.link.connector(),
//!     state.clone(),
//! )
//! .await;
//!
//! println!("RPM: {}", state.sample().rpm);
//! ```

pub mod capability;
pub mod config;
pub mod connection;
pub mod dashboard;
pub mod link;
pub mod navigation;
pub mod performance;
pub mod render;
pub mod runtime;
pub mod scheduler;
pub mod settings;
pub mod telemetry;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::capability::{CapabilityResolver, CapabilitySet};
    pub use crate::config::{DashConfig, LinkConfig};
    pub use crate::connection::{ConnectOutcome, ConnectionManager};
    pub use crate::dashboard::{Dashboard, TouchEvent};
    pub use crate::link::{DiagnosticLink, LinkConnector, LinkError, ParameterId, TroubleCode};
    pub use crate::navigation::{ExitReason, NavigationStateMachine, PageKind, PagePosition};
    pub use crate::performance::{PerformanceSummary, PerformanceTracker};
    pub use crate::render::{Frame, RenderFacade};
    pub use crate::runtime::{Runtime, RuntimeConfig};
    pub use crate::scheduler::{SchedulerError, TelemetryScheduler};
    pub use crate::settings::{Settings, SettingsStore};
    pub use crate::telemetry::{ClearOutcome, SharedTelemetryState, TelemetrySample};
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
