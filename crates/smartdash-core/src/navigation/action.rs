//! Zone actions
//!
//! Applying an action mutates the in-memory [`Settings`]; anything that must
//! happen outside the settings (clearing codes, exiting, hardware brightness)
//! is returned as an [`Effect`] for the dashboard controller.

use std::fmt;

use crate::settings::{Settings, PALETTE_SIZE};

pub const BRIGHTNESS_STEP: i32 = 15;
pub const RPM_STEP: u32 = 100;
/// Upper bound of the tachometer scale
pub const RPM_LIMIT: u32 = 50_000;
pub const PADDING_STEP: u32 = 10;
pub const PADDING_MIN: u32 = 10;
pub const PADDING_MAX: u32 = 200;

/// A numeric setting adjusted by +/- buttons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stepper {
    Brightness,
    RpmMax,
    Shift,
    FontColor,
    Background1,
    Background2,
    Image,
    /// One of the four shift-light stages
    ShiftColor(u8),
    Padding,
}

/// An on/off setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Optimize,
    Delay,
    Flip,
    ShiftLight,
    Developer,
}

/// What a zone does when pressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Move a stepper by one step; the sign gives the direction
    Step(Stepper, i8),
    Toggle(Toggle),
    ClearCodes,
    Exit,
    Update,
    TogglePerformance,
}

/// Why the dashboard is shutting down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The user pressed exit
    Exit,
    /// The user asked for a system update; the supervisor takes over
    Update,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Exit => f.write_str("Exiting..."),
            ExitReason::Update => f.write_str("Update System"),
        }
    }
}

/// Side effect of an action, handled by the dashboard controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ClearCodes,
    Exit(ExitReason),
    TogglePerformance,
    /// New backlight level to push to the display
    Brightness(u8),
}

/// Facts outside the settings that some actions depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionContext {
    /// A clear-codes request is already waiting for the poller
    pub clear_pending: bool,
    /// A network connection is available for updates
    pub wifi: bool,
    /// Number of selectable background images
    pub image_count: usize,
}

impl Default for ActionContext {
    fn default() -> Self {
        Self {
            clear_pending: false,
            wifi: false,
            image_count: 1,
        }
    }
}

fn wrap(index: usize, direction: i8, len: usize) -> usize {
    let len = len.max(1) as i64;
    (index as i64 + direction.signum() as i64).rem_euclid(len) as usize
}

impl Action {
    /// Apply to `settings`, returning the side effect to perform, if any
    pub fn apply(self, settings: &mut Settings, ctx: &ActionContext) -> Option<Effect> {
        match self {
            Action::Step(stepper, direction) => step(stepper, direction, settings, ctx),
            Action::Toggle(toggle) => {
                let flag = match toggle {
                    Toggle::Optimize => &mut settings.optimize,
                    Toggle::Delay => &mut settings.delay,
                    Toggle::Flip => &mut settings.flip,
                    Toggle::ShiftLight => &mut settings.shift_light,
                    Toggle::Developer => &mut settings.developer,
                };
                *flag = !*flag;
                None
            }
            Action::ClearCodes => (!ctx.clear_pending).then_some(Effect::ClearCodes),
            Action::Exit => Some(Effect::Exit(ExitReason::Exit)),
            Action::Update => ctx.wifi.then_some(Effect::Exit(ExitReason::Update)),
            Action::TogglePerformance => Some(Effect::TogglePerformance),
        }
    }
}

fn step(stepper: Stepper, direction: i8, settings: &mut Settings, ctx: &ActionContext) -> Option<Effect> {
    let up = direction > 0;
    match stepper {
        Stepper::Brightness => {
            let delta = if up { BRIGHTNESS_STEP } else { -BRIGHTNESS_STEP };
            let level = (settings.brightness as i32 + delta).clamp(0, u8::MAX as i32) as u8;
            settings.brightness = level;
            return Some(Effect::Brightness(level));
        }
        Stepper::RpmMax => {
            settings.rpm_max = if up {
                (settings.rpm_max + RPM_STEP).min(RPM_LIMIT)
            } else {
                settings.rpm_max.saturating_sub(RPM_STEP).max(RPM_STEP)
            };
            settings.shift_rpm = settings.shift_rpm.min(settings.rpm_max);
        }
        Stepper::Shift => {
            settings.shift_rpm = if up {
                (settings.shift_rpm + RPM_STEP).min(settings.rpm_max)
            } else {
                settings.shift_rpm.saturating_sub(RPM_STEP).max(RPM_STEP)
            };
        }
        Stepper::FontColor => settings.font_color = wrap(settings.font_color, direction, PALETTE_SIZE),
        Stepper::Background1 => settings.background_1 = wrap(settings.background_1, direction, PALETTE_SIZE),
        Stepper::Background2 => settings.background_2 = wrap(settings.background_2, direction, PALETTE_SIZE),
        Stepper::Image => settings.image_index = wrap(settings.image_index, direction, ctx.image_count),
        Stepper::ShiftColor(stage) => {
            if let Some(color) = settings.shift_colors.get_mut(stage as usize) {
                *color = wrap(*color, direction, PALETTE_SIZE);
            }
        }
        Stepper::Padding => {
            settings.shift_padding = if up {
                (settings.shift_padding + PADDING_STEP).min(PADDING_MAX)
            } else {
                settings.shift_padding.saturating_sub(PADDING_STEP).max(PADDING_MIN)
            };
        }
    }
    None
}
