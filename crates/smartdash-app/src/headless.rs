//! Renderer that logs instead of drawing

use smartdash_core::navigation::PageKind;
use smartdash_core::performance::PerformanceSummary;
use smartdash_core::render::{Frame, RenderFacade};
use smartdash_core::telemetry::ClearOutcome;
use tracing::{debug, info, trace};

#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    page: Option<PageKind>,
    connected: Option<bool>,
    code_count: Option<usize>,
    clear_result: Option<ClearOutcome>,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderFacade for HeadlessRenderer {
    fn render(&mut self, frame: &Frame<'_>) {
        if self.page != Some(frame.page) {
            info!(page = %frame.page, "page");
            self.page = Some(frame.page);
        }
        if self.connected != Some(frame.connected) {
            info!(connected = frame.connected, "adapter");
            self.connected = Some(frame.connected);
        }

        let sample = frame.sample;
        if self.code_count != Some(sample.trouble_codes.len()) {
            for code in sample.trouble_codes.iter() {
                info!(code = %code.code, description = %code.description, "trouble code");
            }
            self.code_count = Some(sample.trouble_codes.len());
        }
        if frame.clear.last_result != self.clear_result {
            if let Some(result) = frame.clear.last_result {
                let message = match result {
                    ClearOutcome::Success => "Codes cleared",
                    ClearOutcome::Error => "Error clearing codes",
                    ClearOutcome::EngineRunning => "Turn engine off to clear codes",
                };
                info!(pending = frame.clear.pending, "{}", message);
            }
            self.clear_result = frame.clear.last_result;
        }

        trace!(
            seq = sample.sequence,
            rpm = sample.rpm,
            speed = sample.speed,
            mpg = sample.mpg,
            fuel = sample.fuel_level,
            voltage = sample.voltage,
            air_temp = sample.air_temp,
            shift = sample.rpm >= frame.settings.shift_rpm,
            tracking = frame.tracking,
            "frame"
        );
    }

    fn plot_performance(&mut self, summary: &PerformanceSummary) {
        info!(
            recorded_at = %summary.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            duration_s = summary.duration().as_secs_f64(),
            zero_to_sixty_s = ?summary.zero_to_sixty.map(|d| d.as_secs_f64()),
            zero_to_hundred_s = ?summary.zero_to_hundred.map(|d| d.as_secs_f64()),
            top_speed = summary.top_speed,
            "performance summary"
        );
        for sample in &summary.samples {
            debug!(t = sample.elapsed.as_secs_f64(), speed = sample.speed, rpm = sample.rpm, "run sample");
        }
    }

    fn set_brightness(&mut self, level: u8) {
        info!(level, "brightness");
    }
}
