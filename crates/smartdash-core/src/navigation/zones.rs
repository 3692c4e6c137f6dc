//! Tap zones
//!
//! Coordinates are fractions of the screen size so the same layout works at
//! any resolution. Circle radii are fractions of the screen height. Edges are
//! exclusive, and the first zone containing the point wins.

use super::action::{Action, Stepper, Toggle};
use super::PageKind;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Rect {
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
    },
    Circle {
        cx: f32,
        cy: f32,
        radius: f32,
    },
}

impl Shape {
    /// Whether the pixel position lies inside the shape on a `width`x`height` screen
    pub fn contains(&self, x: f32, y: f32, width: f32, height: f32) -> bool {
        match *self {
            Shape::Rect {
                left,
                top,
                right,
                bottom,
            } => x > left * width && x < right * width && y > top * height && y < bottom * height,
            Shape::Circle { cx, cy, radius } => {
                let dx = x - cx * width;
                let dy = y - cy * height;
                let r = radius * height;
                dx * dx + dy * dy < r * r
            }
        }
    }
}

/// A tappable area bound to an action
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Zone {
    pub shape: Shape,
    pub action: Action,
    /// Fires again while the press is held
    pub repeatable: bool,
}

const fn rect(left: f32, top: f32, right: f32, bottom: f32) -> Shape {
    Shape::Rect {
        left,
        top,
        right,
        bottom,
    }
}

const fn zone(shape: Shape, action: Action, repeatable: bool) -> Zone {
    Zone {
        shape,
        action,
        repeatable,
    }
}

/// Left and right stepper buttons of a settings row
const fn left(top: f32, bottom: f32) -> Shape {
    rect(0.5, top, 0.6, bottom)
}

const fn right(top: f32, bottom: f32) -> Shape {
    rect(0.7, top, 0.8, bottom)
}

/// Bottom-centre button shared by several pages
const BOTTOM_BUTTON: Shape = rect(0.45, 0.8, 0.55, 0.9);

// The RPM page buttons sit 25px off the 0.2/0.7 columns of an 800px screen
const RPM_MAX_COLUMN: f32 = 0.2 + 25.0 / 800.0;
const SHIFT_COLUMN: f32 = 0.7 - 25.0 / 800.0;

static RPM_ZONES: [Zone; 4] = [
    zone(rect(RPM_MAX_COLUMN, 0.3, RPM_MAX_COLUMN + 0.1, 0.4), Action::Step(Stepper::RpmMax, 1), true),
    zone(rect(RPM_MAX_COLUMN, 0.7, RPM_MAX_COLUMN + 0.1, 0.8), Action::Step(Stepper::RpmMax, -1), true),
    zone(rect(SHIFT_COLUMN, 0.3, SHIFT_COLUMN + 0.1, 0.4), Action::Step(Stepper::Shift, 1), true),
    zone(rect(SHIFT_COLUMN, 0.7, SHIFT_COLUMN + 0.1, 0.8), Action::Step(Stepper::Shift, -1), true),
];

static SETTINGS_ZONES: [Zone; 5] = [
    zone(rect(0.6, 0.32, 0.7, 0.42), Action::Toggle(Toggle::Optimize), false),
    zone(BOTTOM_BUTTON, Action::Toggle(Toggle::Flip), false),
    zone(rect(0.6, 0.44, 0.7, 0.54), Action::Toggle(Toggle::Delay), false),
    zone(left(0.2, 0.3), Action::Step(Stepper::Brightness, -1), true),
    zone(right(0.2, 0.3), Action::Step(Stepper::Brightness, 1), true),
];

static TROUBLE_ZONES: [Zone; 1] = [zone(rect(0.44, 0.8, 0.56, 0.9), Action::ClearCodes, false)];

static INFO_ZONES: [Zone; 3] = [
    zone(BOTTOM_BUTTON, Action::Exit, false),
    zone(rect(0.55, 0.2, 0.75, 0.3), Action::Update, false),
    zone(rect(0.6, 0.32, 0.7, 0.42), Action::Toggle(Toggle::Developer), false),
];

static CUSTOM_ZONES: [Zone; 8] = [
    zone(left(0.2, 0.3), Action::Step(Stepper::FontColor, -1), true),
    zone(right(0.2, 0.3), Action::Step(Stepper::FontColor, 1), true),
    zone(left(0.32, 0.42), Action::Step(Stepper::Background1, -1), true),
    zone(right(0.32, 0.42), Action::Step(Stepper::Background1, 1), true),
    zone(left(0.44, 0.54), Action::Step(Stepper::Background2, -1), true),
    zone(right(0.44, 0.54), Action::Step(Stepper::Background2, 1), true),
    zone(left(0.56, 0.66), Action::Step(Stepper::Image, -1), false),
    zone(right(0.56, 0.66), Action::Step(Stepper::Image, 1), false),
];

static SHIFT_LIGHT_ZONES: [Zone; 11] = [
    zone(rect(0.6, 0.2, 0.7, 0.3), Action::Toggle(Toggle::ShiftLight), false),
    zone(left(0.32, 0.42), Action::Step(Stepper::ShiftColor(0), -1), true),
    zone(right(0.32, 0.42), Action::Step(Stepper::ShiftColor(0), 1), true),
    zone(left(0.44, 0.54), Action::Step(Stepper::ShiftColor(1), -1), true),
    zone(right(0.44, 0.54), Action::Step(Stepper::ShiftColor(1), 1), true),
    zone(left(0.56, 0.66), Action::Step(Stepper::ShiftColor(2), -1), true),
    zone(right(0.56, 0.66), Action::Step(Stepper::ShiftColor(2), 1), true),
    zone(left(0.68, 0.78), Action::Step(Stepper::ShiftColor(3), -1), true),
    zone(right(0.68, 0.78), Action::Step(Stepper::ShiftColor(3), 1), true),
    // Padding grows on the left button and shrinks on the right
    zone(left(0.8, 0.9), Action::Step(Stepper::Padding, 1), true),
    zone(right(0.8, 0.9), Action::Step(Stepper::Padding, -1), true),
];

static PERFORMANCE_ZONES: [Zone; 1] = [zone(
    Shape::Circle {
        cx: 0.5,
        cy: 0.85,
        radius: 0.1,
    },
    Action::TogglePerformance,
    false,
)];

/// Zones of a page in hit-test order
pub fn zones_for(page: PageKind) -> &'static [Zone] {
    match page {
        PageKind::Main => &[],
        PageKind::Performance => &PERFORMANCE_ZONES,
        PageKind::Custom => &CUSTOM_ZONES,
        PageKind::ShiftLights => &SHIFT_LIGHT_ZONES,
        PageKind::Settings => &SETTINGS_ZONES,
        PageKind::Rpm => &RPM_ZONES,
        PageKind::Info => &INFO_ZONES,
        PageKind::Trouble => &TROUBLE_ZONES,
    }
}

/// First zone of `page` containing the pixel position
pub fn hit_test(page: PageKind, x: f32, y: f32, width: f32, height: f32) -> Option<&'static Zone> {
    zones_for(page)
        .iter()
        .find(|zone| zone.shape.contains(x, y, width, height))
}
