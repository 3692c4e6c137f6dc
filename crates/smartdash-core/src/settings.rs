//! Persisted settings
//!
//! Two plain-text records live in the data directory:
//!
//! - `info.txt`: one scalar per line in a fixed order (last page, toggles,
//!   colour indices, padding, background image, brightness, ...)
//! - `rpm.txt`: `rpm_max,shift` on a single line
//!
//! Loading never fails. Each missing or unparsable field falls back to its
//! own default and the rest of the record is still used.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::navigation::action::{PADDING_MAX, PADDING_MIN, RPM_LIMIT};
use crate::navigation::PagePosition;

/// Number of entries in the colour palette
pub const PALETTE_SIZE: usize = 53;

pub const INFO_FILE_NAME: &str = "info.txt";
pub const RPM_FILE_NAME: &str = "rpm.txt";

/// Errors raised while persisting settings
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to write settings file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// User-adjustable dashboard settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Last visited page
    pub page: PagePosition,
    pub shift_light: bool,
    /// Poll every batch on every iteration instead of on its cadence
    pub delay: bool,
    /// Skip the slow batch and speed/MAF on the main page
    pub optimize: bool,
    pub font_color: usize,
    pub background_1: usize,
    pub background_2: usize,
    /// Palette indices of the four shift-light stages
    pub shift_colors: [usize; 4],
    pub shift_padding: u32,
    pub image_index: usize,
    pub brightness: u8,
    /// Display mounted upside down
    pub flip: bool,
    pub developer: bool,
    /// Tachometer full scale
    pub rpm_max: u32,
    /// Shift point, never above `rpm_max`
    pub shift_rpm: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            page: PagePosition::default(),
            shift_light: true,
            delay: false,
            optimize: false,
            font_color: 46,
            background_1: 23,
            background_2: 45,
            shift_colors: [12, 8, 0, 31],
            shift_padding: 100,
            image_index: 0,
            brightness: 0,
            flip: false,
            developer: false,
            rpm_max: 8000,
            shift_rpm: 6500,
        }
    }
}

impl Settings {
    /// Serialise the `info.txt` record
    pub fn encode_info(&self) -> String {
        let fields: [String; 17] = [
            self.page.group.to_string(),
            self.page.item.to_string(),
            flag(self.shift_light),
            flag(self.delay),
            flag(self.optimize),
            self.font_color.to_string(),
            self.background_1.to_string(),
            self.background_2.to_string(),
            self.shift_colors[0].to_string(),
            self.shift_colors[1].to_string(),
            self.shift_colors[2].to_string(),
            self.shift_colors[3].to_string(),
            self.shift_padding.to_string(),
            self.image_index.to_string(),
            self.brightness.to_string(),
            flag(self.flip),
            flag(self.developer),
        ];
        let mut out = fields.join("\n");
        out.push('\n');
        out
    }

    /// Serialise the `rpm.txt` record
    pub fn encode_rpm(&self) -> String {
        format!("{},{}", self.rpm_max, self.shift_rpm)
    }
}

fn flag(value: bool) -> String {
    u8::from(value).to_string()
}

/// Sequential reader over a record that defaults fields independently
struct FieldReader<'a> {
    fields: std::vec::IntoIter<&'a str>,
    record: &'static str,
    clean: bool,
}

impl<'a> FieldReader<'a> {
    fn new(fields: Vec<&'a str>, record: &'static str) -> Self {
        Self {
            fields: fields.into_iter(),
            record,
            clean: true,
        }
    }

    fn value<T: FromStr>(&mut self, name: &'static str, default: T, valid: impl Fn(&T) -> bool) -> T {
        let raw = self.fields.next().map(str::trim);
        match raw.and_then(|s| s.parse::<T>().ok()).filter(|v| valid(v)) {
            Some(v) => v,
            None => {
                warn!(record = self.record, field = name, raw = ?raw, "settings field missing or invalid, using default");
                self.clean = false;
                default
            }
        }
    }

    fn number<T: FromStr>(&mut self, name: &'static str, default: T) -> T {
        self.value(name, default, |_| true)
    }

    fn color(&mut self, name: &'static str, default: usize) -> usize {
        self.value(name, default, |v| *v < PALETTE_SIZE)
    }

    fn flag(&mut self, name: &'static str, default: bool) -> bool {
        let raw = self.fields.next().map(str::trim);
        match raw {
            Some("1") | Some("True") | Some("true") => true,
            Some("0") | Some("False") | Some("false") => false,
            _ => {
                warn!(record = self.record, field = name, raw = ?raw, "settings field missing or invalid, using default");
                self.clean = false;
                default
            }
        }
    }
}

/// Parse `info.txt` and `rpm.txt` contents; `None` means the file is absent.
/// Returns the settings and whether every field parsed.
pub fn parse_settings(info: Option<&str>, rpm: Option<&str>) -> (Settings, bool) {
    let defaults = Settings::default();

    let mut r = FieldReader::new(info.map(|s| s.lines().collect()).unwrap_or_default(), INFO_FILE_NAME);
    let group = r.number("page_x", 0usize);
    let item = r.number("page_y", 0usize);
    let mut settings = Settings {
        page: PagePosition::new(group, item).clamped(),
        shift_light: r.flag("shift_light", defaults.shift_light),
        delay: r.flag("delay", defaults.delay),
        optimize: r.flag("optimize", defaults.optimize),
        font_color: r.color("font_index", defaults.font_color),
        background_1: r.color("background_1_index", defaults.background_1),
        background_2: r.color("background_2_index", defaults.background_2),
        shift_colors: [
            r.color("shift_color_1", defaults.shift_colors[0]),
            r.color("shift_color_2", defaults.shift_colors[1]),
            r.color("shift_color_3", defaults.shift_colors[2]),
            r.color("shift_color_4", defaults.shift_colors[3]),
        ],
        shift_padding: r.value("shift_padding", defaults.shift_padding, |v| {
            (PADDING_MIN..=PADDING_MAX).contains(v)
        }),
        image_index: r.number("image_index", defaults.image_index),
        brightness: r.number("brightness", defaults.brightness),
        flip: r.flag("flip", defaults.flip),
        developer: r.flag("developer", defaults.developer),
        ..defaults.clone()
    };
    let info_clean = r.clean;

    let mut r = FieldReader::new(rpm.map(|s| s.trim().split(',').collect()).unwrap_or_default(), RPM_FILE_NAME);
    settings.rpm_max = r.value("rpm_max", defaults.rpm_max, |v| (1..=RPM_LIMIT).contains(v));
    settings.shift_rpm = r.value("shift", defaults.shift_rpm, |v| *v > 0);
    settings.shift_rpm = settings.shift_rpm.min(settings.rpm_max);

    (settings, info_clean && r.clean)
}

/// Loads and saves [`Settings`], writing only when they changed
#[derive(Debug)]
pub struct SettingsStore {
    info_path: PathBuf,
    rpm_path: PathBuf,
    /// Snapshot of what is on disk, when known
    persisted: Option<Settings>,
    writes: u64,
}

impl SettingsStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            info_path: data_dir.join(INFO_FILE_NAME),
            rpm_path: data_dir.join(RPM_FILE_NAME),
            persisted: None,
            writes: 0,
        }
    }

    /// Load settings, defaulting per field. A record that needed any default
    /// is rewritten by the next [`SettingsStore::save`].
    pub fn load(&mut self) -> Settings {
        let info = fs::read_to_string(&self.info_path).ok();
        let rpm = fs::read_to_string(&self.rpm_path).ok();
        if info.is_none() {
            debug!(path = %self.info_path.display(), "no settings file, using defaults");
        }
        let (settings, clean) = parse_settings(info.as_deref(), rpm.as_deref());
        self.persisted = clean.then(|| settings.clone());
        settings
    }

    /// Persist `settings` if they differ from the last persisted snapshot.
    /// Returns whether anything was written.
    pub fn save(&mut self, settings: &Settings) -> Result<bool, SettingsError> {
        if self.persisted.as_ref() == Some(settings) {
            return Ok(false);
        }
        self.write(settings)?;
        self.persisted = Some(settings.clone());
        Ok(true)
    }

    /// Number of times the records were written by this store
    pub fn write_count(&self) -> u64 {
        self.writes
    }

    fn write(&mut self, settings: &Settings) -> Result<(), SettingsError> {
        let previous = self.persisted.as_ref();
        if previous.map(Settings::encode_info) != Some(settings.encode_info()) {
            write_file(&self.info_path, &settings.encode_info())?;
        }
        if previous.map(Settings::encode_rpm) != Some(settings.encode_rpm()) {
            write_file(&self.rpm_path, &settings.encode_rpm())?;
        }
        self.writes += 1;
        debug!(path = %self.info_path.display(), writes = self.writes, "settings saved");
        Ok(())
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), SettingsError> {
    let to_err = |source: io::Error| SettingsError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(to_err)?;
    }
    fs::write(path, content).map_err(to_err)
}
