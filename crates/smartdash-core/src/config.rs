//! Dashboard configuration
//!
//! Read from a JSON file. Every field has a default, so a partial file (or no
//! file at all) is valid.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::link::{DemoConnector, Elm327Connector, LinkConnector, Transport, DEFAULT_BAUD_RATE};
use crate::navigation::NavigationConfig;
use crate::scheduler::CadenceConfig;

/// Errors raised while loading the configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Could not find a data directory")]
    NoDataDir,
}

/// Which adapter to talk to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkConfig {
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    Tcp {
        address: String,
    },
    /// Simulated vehicle
    Demo {
        #[serde(default = "default_true")]
        engine_running: bool,
    },
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_true() -> bool {
    true
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig::Serial {
            port: "/dev/rfcomm0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl LinkConfig {
    pub fn connector(&self) -> Arc<dyn LinkConnector> {
        match self {
            LinkConfig::Serial { port, baud_rate } => Arc::new(Elm327Connector::new(Transport::Serial {
                port: port.clone(),
                baud_rate: *baud_rate,
            })),
            LinkConfig::Tcp { address } => Arc::new(Elm327Connector::new(Transport::Tcp {
                address: address.clone(),
            })),
            LinkConfig::Demo { engine_running } => Arc::new(DemoConnector::new(*engine_running)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ScreenConfig {
    fn default() -> Self {
        Self { width: 800, height: 480 }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    pub link: LinkConfig,
    pub connect_timeout_ms: u64,
    pub connect_retries: u32,
    pub reconnect_interval_ms: u64,
    pub poll_interval_ms: u64,
    pub cadence: CadenceConfig,
    /// Where settings and the capability cache live; platform default when unset
    pub data_dir: Option<PathBuf>,
    pub screen: ScreenConfig,
    pub swipe_threshold_px: f32,
    pub hold_repeat_ms: u64,
    pub frame_rate: u32,
    /// Consecutive decreasing samples that end a performance run
    pub performance_stop_after: u32,
}

impl Default for DashConfig {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            connect_timeout_ms: 5000,
            connect_retries: 3,
            reconnect_interval_ms: 5000,
            poll_interval_ms: 30,
            cadence: CadenceConfig::default(),
            data_dir: None,
            screen: ScreenConfig::default(),
            swipe_threshold_px: 50.0,
            hold_repeat_ms: 100,
            frame_rate: 45,
            performance_stop_after: 1,
        }
    }
}

impl DashConfig {
    /// Load from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        let config: Self = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), ?config, "config loaded");
        Ok(config)
    }

    /// Platform data directory for the dashboard
    pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
        let base = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .ok_or(ConfigError::NoDataDir)?;
        Ok(base.join("smartdash"))
    }

    /// Platform default config file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("smartdash").join("config.json"))
    }

    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Self::default_data_dir(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Time between UI frames
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }

    pub fn navigation(&self) -> NavigationConfig {
        NavigationConfig {
            screen_width: self.screen.width as f32,
            screen_height: self.screen.height as f32,
            swipe_threshold: self.swipe_threshold_px,
            hold_repeat: Duration::from_millis(self.hold_repeat_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = DashConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, DashConfig::default());
        assert_eq!(config.poll_interval(), Duration::from_millis(30));
    }

    #[test]
    fn test_partial_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{
                "link": { "kind": "tcp", "address": "192.168.0.10:35000" },
                "cadence": { "mode": "adaptive" },
                "frame_rate": 30
            }"#,
        )
        .unwrap();

        let config = DashConfig::load(&path).unwrap();
        assert_eq!(
            config.link,
            LinkConfig::Tcp {
                address: "192.168.0.10:35000".to_string()
            }
        );
        assert_eq!(config.cadence, CadenceConfig::Adaptive);
        assert_eq!(config.frame_rate, 30);
        assert_eq!(config.connect_retries, 3);
        assert_eq!(config.screen, ScreenConfig::default());
    }

    #[test]
    fn test_serial_baud_defaults() {
        let link: LinkConfig = serde_json::from_str(r#"{ "kind": "serial", "port": "/dev/ttyUSB0" }"#).unwrap();
        assert_eq!(
            link,
            LinkConfig::Serial {
                port: "/dev/ttyUSB0".to_string(),
                baud_rate: DEFAULT_BAUD_RATE
            }
        );
        let demo: LinkConfig = serde_json::from_str(r#"{ "kind": "demo" }"#).unwrap();
        assert_eq!(demo, LinkConfig::Demo { engine_running: true });
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(DashConfig::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_frame_interval() {
        let config = DashConfig {
            frame_rate: 0,
            ..DashConfig::default()
        };
        assert_eq!(config.frame_interval(), Duration::from_secs(1));
        assert_eq!(DashConfig::default().navigation(), NavigationConfig::default());
    }
}
