//! Render facade
//!
//! Drawing lives outside the core. Each frame the dashboard hands the renderer
//! one [`Frame`] holding everything a page needs; nothing is returned.

use std::sync::Arc;

use crate::navigation::PageKind;
use crate::performance::{PerformanceRun, PerformanceSummary};
use crate::settings::Settings;
use crate::telemetry::{ClearRequest, TelemetrySample};

/// Everything needed to draw one frame
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub page: PageKind,
    pub sample: &'a Arc<TelemetrySample>,
    pub settings: &'a Settings,
    pub connected: bool,
    pub clear: ClearRequest,
    /// Run in progress on the performance page
    pub performance: Option<&'a PerformanceRun>,
    pub tracking: bool,
}

/// Draws frames and performance plots
pub trait RenderFacade {
    fn render(&mut self, frame: &Frame<'_>);

    /// Draw the speed and rpm plots of a finished run
    fn plot_performance(&mut self, summary: &PerformanceSummary);

    /// Push a backlight level to the display
    fn set_brightness(&mut self, _level: u8) {}

    /// Number of selectable background images
    fn image_count(&self) -> usize {
        1
    }
}
