//! UI-side controller
//!
//! Runs on the render thread at the frame rate. Owns everything the user can
//! change (page, settings, performance tracking) and talks to the poller only
//! through [`SharedTelemetryState`].

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::navigation::{Action, ActionContext, Effect, ExitReason, NavigationConfig, NavigationStateMachine, PageKind};
use crate::performance::PerformanceTracker;
use crate::render::{Frame, RenderFacade};
use crate::settings::{Settings, SettingsError, SettingsStore};
use crate::telemetry::SharedTelemetryState;

pub const WIFI_FILE_NAME: &str = "wifi.txt";

/// A touchscreen event
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TouchEvent {
    Press { x: f32, y: f32 },
    Drag { x: f32, y: f32 },
    Release,
}

/// Reads the network flag written by the updater: a non-zero integer on the
/// first line means connected
pub fn read_wifi_flag(data_dir: &Path) -> bool {
    match fs::read_to_string(data_dir.join(WIFI_FILE_NAME)) {
        Ok(content) => content
            .lines()
            .next()
            .and_then(|line| line.trim().parse::<i64>().ok())
            .is_some_and(|v| v != 0),
        Err(_) => {
            debug!("no wifi file");
            false
        }
    }
}

pub struct Dashboard<R: RenderFacade> {
    state: Arc<SharedTelemetryState>,
    navigation: NavigationStateMachine,
    settings: Settings,
    store: SettingsStore,
    tracker: PerformanceTracker,
    renderer: R,
    wifi: bool,
    /// Sequence of the last sample fed to the tracker
    last_sequence: u64,
}

impl<R: RenderFacade> Dashboard<R> {
    pub fn new(
        state: Arc<SharedTelemetryState>,
        store: SettingsStore,
        settings: Settings,
        navigation: NavigationConfig,
        tracker: PerformanceTracker,
        renderer: R,
    ) -> Self {
        let mut machine = NavigationStateMachine::new(navigation, settings.page);
        machine.set_flip(settings.flip);
        let mut dashboard = Self {
            state,
            navigation: machine,
            settings,
            store,
            tracker,
            renderer,
            wifi: false,
            last_sequence: 0,
        };
        dashboard.settings.page = dashboard.navigation.page();
        dashboard.publish();
        dashboard
    }

    /// Load settings and the network flag from `data_dir`
    pub fn open(
        data_dir: &Path,
        state: Arc<SharedTelemetryState>,
        navigation: NavigationConfig,
        tracker: PerformanceTracker,
        renderer: R,
    ) -> Self {
        let mut store = SettingsStore::new(data_dir);
        let settings = store.load();
        let mut dashboard = Self::new(state, store, settings, navigation, tracker, renderer);
        dashboard.wifi = read_wifi_flag(data_dir);
        dashboard
    }

    pub fn with_wifi(mut self, wifi: bool) -> Self {
        self.wifi = wifi;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn page(&self) -> PageKind {
        self.navigation.page_kind()
    }

    pub fn tracker(&self) -> &PerformanceTracker {
        &self.tracker
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Feed a touch event. Returns the exit reason if the user asked to quit.
    pub fn handle(&mut self, event: TouchEvent, now: Instant) -> Option<ExitReason> {
        match event {
            TouchEvent::Press { x, y } => {
                let action = self.navigation.on_press(x, y, now)?;
                self.apply(action)
            }
            TouchEvent::Drag { x, y } => {
                if self.navigation.on_drag(x, y).is_some() {
                    self.sync_page();
                }
                None
            }
            TouchEvent::Release => {
                self.navigation.on_release();
                None
            }
        }
    }

    fn apply(&mut self, action: Action) -> Option<ExitReason> {
        let ctx = ActionContext {
            clear_pending: self.state.clear_request().pending,
            wifi: self.wifi,
            image_count: self.renderer.image_count(),
        };
        let effect = action.apply(&mut self.settings, &ctx);
        self.navigation.set_flip(self.settings.flip);

        match effect? {
            Effect::ClearCodes => {
                if self.state.request_clear() {
                    info!("clear codes requested");
                }
            }
            Effect::Exit(reason) => {
                info!(%reason, "exit requested");
                return Some(reason);
            }
            Effect::TogglePerformance => {
                if let Some(summary) = self.tracker.toggle() {
                    self.renderer.plot_performance(&summary);
                }
            }
            Effect::Brightness(level) => self.renderer.set_brightness(level),
        }
        None
    }

    fn sync_page(&mut self) {
        self.settings.page = self.navigation.page();
        self.state.set_page(self.navigation.page_kind());
    }

    fn publish(&mut self) {
        self.sync_page();
        if *self.state.settings() != self.settings {
            self.state.publish_settings(self.settings.clone());
        }
    }

    /// Run one frame: hold-repeat, snapshot publishing, performance sampling,
    /// drawing and persisting.
    pub fn frame(&mut self, now: Instant) -> Option<ExitReason> {
        let exit = self.navigation.on_tick(now).and_then(|action| self.apply(action));
        self.publish();

        let sample = self.state.sample();
        if sample.sequence != self.last_sequence {
            self.last_sequence = sample.sequence;
            if self.page() == PageKind::Performance && self.tracker.is_tracking() {
                let at = sample.sampled_at.unwrap_or(now);
                if let Some(summary) = self.tracker.record(at, sample.speed, sample.rpm) {
                    self.renderer.plot_performance(&summary);
                }
            }
        }

        let frame = Frame {
            page: self.page(),
            sample: &sample,
            settings: &self.settings,
            connected: self.state.is_connected(),
            clear: self.state.clear_request(),
            performance: self.tracker.current_run(),
            tracking: self.tracker.is_tracking(),
        };
        self.renderer.render(&frame);

        if let Err(e) = self.persist() {
            warn!(error = %e, "failed to save settings");
        }
        exit
    }

    /// Write settings if they changed since the last write
    pub fn persist(&mut self) -> Result<bool, SettingsError> {
        self.store.save(&self.settings)
    }
}
