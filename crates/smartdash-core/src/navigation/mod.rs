//! Page navigation
//!
//! Pages are arranged in a non-uniform 2-D grid: groups of related screens,
//! each with one or more items. Horizontal swipes move between groups,
//! vertical swipes between the items of a group, both with wraparound. Taps
//! are hit-tested against the zones of the current page, and a press held on
//! a repeatable zone fires its action again every repeat interval.

pub mod action;
pub mod zones;

pub use action::{Action, ActionContext, Effect, ExitReason, Stepper, Toggle};
pub use zones::{hit_test, zones_for, Shape, Zone};

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Every screen the dashboard can show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum PageKind {
    Main = 0,
    Performance = 1,
    Custom = 2,
    ShiftLights = 3,
    Settings = 4,
    Rpm = 5,
    Info = 6,
    Trouble = 7,
}

impl PageKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => PageKind::Main,
            1 => PageKind::Performance,
            2 => PageKind::Custom,
            3 => PageKind::ShiftLights,
            4 => PageKind::Settings,
            5 => PageKind::Rpm,
            6 => PageKind::Info,
            7 => PageKind::Trouble,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            PageKind::Main => "Main",
            PageKind::Performance => "Performance",
            PageKind::Custom => "Custom",
            PageKind::ShiftLights => "Shift Lights",
            PageKind::Settings => "Settings",
            PageKind::Rpm => "RPM",
            PageKind::Info => "Info",
            PageKind::Trouble => "Trouble",
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The page grid, groups in swipe order
pub const GRID: &[&[PageKind]] = &[
    &[PageKind::Main, PageKind::Performance],
    &[PageKind::Custom, PageKind::ShiftLights],
    &[PageKind::Settings, PageKind::Rpm, PageKind::Info],
    &[PageKind::Trouble],
];

/// A (group, item) position in [`GRID`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PagePosition {
    pub group: usize,
    pub item: usize,
}

impl PagePosition {
    pub fn new(group: usize, item: usize) -> Self {
        Self { group, item }
    }

    /// Reset an out-of-range group or item to 0
    pub fn clamped(self) -> Self {
        let group = if self.group < GRID.len() { self.group } else { 0 };
        let item = if self.item < GRID[group].len() { self.item } else { 0 };
        Self { group, item }
    }

    pub fn kind(self) -> PageKind {
        let p = self.clamped();
        GRID[p.group][p.item]
    }

    /// Position of the first occurrence of `kind` in the grid
    pub fn of(kind: PageKind) -> Self {
        GRID.iter()
            .enumerate()
            .find_map(|(g, items)| items.iter().position(|k| *k == kind).map(|i| Self::new(g, i)))
            .unwrap_or_default()
    }
}

/// Direction of a committed swipe, named by finger movement on screen.
/// With the display flipped a physical downward drag is an `Up` swipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swipe {
    /// Finger moved right: previous group
    Right,
    /// Finger moved left: next group
    Left,
    /// Finger moved down: previous item
    Down,
    /// Finger moved up: next item
    Up,
}

/// Tunables for gesture handling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavigationConfig {
    pub screen_width: f32,
    pub screen_height: f32,
    /// Minimum displacement in pixels before a drag becomes a swipe
    pub swipe_threshold: f32,
    /// Interval between repeats of a held zone
    pub hold_repeat: Duration,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            screen_width: 800.0,
            screen_height: 480.0,
            swipe_threshold: 50.0,
            hold_repeat: Duration::from_millis(100),
        }
    }
}

/// A touch in progress, in screen coordinates
#[derive(Debug, Clone, Copy)]
struct Gesture {
    /// Where the press landed; hold-repeat keeps hit-testing here
    start: (f32, f32),
    /// The first hold tick after a press only arms the repeat
    skip_first: bool,
    last_repeat: Option<Instant>,
}

/// Current page plus gesture tracking
#[derive(Debug, Clone)]
pub struct NavigationStateMachine {
    config: NavigationConfig,
    page: PagePosition,
    gesture: Option<Gesture>,
    flip: bool,
}

impl NavigationStateMachine {
    pub fn new(config: NavigationConfig, page: PagePosition) -> Self {
        Self {
            config,
            page: page.clamped(),
            gesture: None,
            flip: false,
        }
    }

    pub fn page(&self) -> PagePosition {
        self.page
    }

    pub fn page_kind(&self) -> PageKind {
        self.page.kind()
    }

    /// Jump directly to a page; out-of-range indices are clamped
    pub fn set_page(&mut self, page: PagePosition) {
        self.page = page.clamped();
    }

    /// Mirror the y axis of every touch (display mounted upside down)
    pub fn set_flip(&mut self, flip: bool) {
        self.flip = flip;
    }

    /// Whether a press is active and has not turned into a swipe
    pub fn is_pressed(&self) -> bool {
        self.gesture.is_some()
    }

    fn to_screen(&self, x: f32, y: f32) -> (f32, f32) {
        if self.flip {
            (x, self.config.screen_height - y)
        } else {
            (x, y)
        }
    }

    /// Start a touch; returns the action of the zone under the finger
    pub fn on_press(&mut self, x: f32, y: f32, _now: Instant) -> Option<Action> {
        let (sx, sy) = self.to_screen(x, y);
        self.gesture = Some(Gesture {
            start: (sx, sy),
            skip_first: true,
            last_repeat: None,
        });

        let zone = hit_test(self.page_kind(), sx, sy, self.config.screen_width, self.config.screen_height)?;
        debug!(page = %self.page_kind(), action = ?zone.action, "zone pressed");
        Some(zone.action)
    }

    /// Track finger movement; commits a swipe once one axis passes the threshold
    pub fn on_drag(&mut self, x: f32, y: f32) -> Option<Swipe> {
        let start = self.gesture.as_ref()?.start;
        let (sx, sy) = self.to_screen(x, y);

        let dx = sx - start.0;
        let dy = sy - start.1;
        let threshold = self.config.swipe_threshold;

        let swipe = if dx.abs() > threshold && dx.abs() > dy.abs() {
            if dx > 0.0 {
                Swipe::Right
            } else {
                Swipe::Left
            }
        } else if dy.abs() > threshold && dy.abs() > dx.abs() {
            if dy > 0.0 {
                Swipe::Down
            } else {
                Swipe::Up
            }
        } else {
            return None;
        };

        // A swipe cancels the press and its hold-repeat
        self.gesture = None;
        self.swipe(swipe);
        Some(swipe)
    }

    /// Apply a swipe to the current page
    pub fn swipe(&mut self, swipe: Swipe) {
        let page = self.page.clamped();
        let groups = GRID.len();
        let items = GRID[page.group].len();
        self.page = match swipe {
            Swipe::Right => PagePosition::new((page.group + groups - 1) % groups, 0),
            Swipe::Left => PagePosition::new((page.group + 1) % groups, 0),
            Swipe::Down => PagePosition::new(page.group, (page.item + items - 1) % items),
            Swipe::Up => PagePosition::new(page.group, (page.item + 1) % items),
        }
        .clamped();
        debug!(?swipe, page = %self.page_kind(), group = self.page.group, item = self.page.item, "page changed");
    }

    pub fn on_release(&mut self) {
        self.gesture = None;
    }

    /// Called once per frame; returns the repeated action of a held zone
    pub fn on_tick(&mut self, now: Instant) -> Option<Action> {
        let interval = self.config.hold_repeat;
        let gesture = self.gesture.as_mut()?;

        if gesture.skip_first {
            gesture.skip_first = false;
            gesture.last_repeat = Some(now);
            return None;
        }
        if let Some(last) = gesture.last_repeat {
            if now.saturating_duration_since(last) < interval {
                return None;
            }
        }
        gesture.last_repeat = Some(now);

        let (x, y) = gesture.start;
        hit_test(self.page_kind(), x, y, self.config.screen_width, self.config.screen_height)
            .filter(|zone| zone.repeatable)
            .map(|zone| zone.action)
    }
}
