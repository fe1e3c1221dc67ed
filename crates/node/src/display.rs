//! Status rendering onto a small fixed-size text surface (128x64 OLED,
//! 8 px font, one field per 10 px row).

use crate::connectivity::LinkState;
use crate::sensor::Reading;

/// Black-box text surface: a frame is built with `clear` + `text` and made
/// visible with `show`.
pub trait TextSurface: Send {
    fn clear(&mut self);
    fn text(&mut self, s: &str, x: i32, y: i32);
    fn show(&mut self);
}

/// Vertical pitch between status rows.
const ROW: i32 = 10;

/// Boot banner shown before the first connect attempt.
pub fn render_splash(surface: &mut dyn TextSurface) {
    surface.clear();
    surface.text("Telemetry Node", 0, 0);
    surface.text("Starting...", 0, ROW);
    surface.show();
}

/// Redraw the five status fields. Best effort: the surface gives no
/// indication of failure.
pub fn render(
    surface: &mut dyn TextSurface,
    link: &LinkState,
    reading: &Reading,
    motion_triggered: bool,
) {
    let wifi = if link.wifi_connected {
        "CONNECTED"
    } else {
        "DISCONNECTED"
    };
    let motion = if motion_triggered { "DETECTED" } else { "NO" };

    surface.clear();
    surface.text(&format!("WiFi  : {wifi}"), 0, 0);
    surface.text(&format!("Temp  : {} C", reading.temperature_or_zero()), 0, ROW);
    surface.text(&format!("Humi  : {} %", reading.humidity_or_zero()), 0, 2 * ROW);
    surface.text(&format!("Light : {}", reading.light_or_zero()), 0, 3 * ROW);
    surface.text(&format!("Motion: {motion}"), 0, 4 * ROW);
    surface.show();
}

/// Surface that keeps the last shown frame and logs it, standing in for the
/// OLED panel.
#[derive(Default)]
pub struct ConsoleSurface {
    pending: Vec<String>,
    shown: Vec<String>,
}

impl ConsoleSurface {
    #[cfg(test)]
    pub fn frame(&self) -> &[String] {
        &self.shown
    }
}

impl TextSurface for ConsoleSurface {
    fn clear(&mut self) {
        self.pending.clear();
    }

    fn text(&mut self, s: &str, _x: i32, _y: i32) {
        self.pending.push(s.to_string());
    }

    fn show(&mut self) {
        self.shown = std::mem::take(&mut self.pending);
        tracing::debug!(frame = %self.shown.join(" | "), "display");
    }
}
