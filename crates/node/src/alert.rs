//! Visual + audible alert outputs.
//!
//! Motion and light each have their own LED but share one buzzer. Within a
//! tick motion is driven first and light second, so whichever fires last
//! leaves its mark on the buzzer; there is no priority between them.

use std::time::Duration;

use crate::config::ALERT_DWELL;

/// A single binary output (LED, buzzer).
pub trait Indicator: Send {
    fn set(&mut self, on: bool);
}

pub struct Alerter {
    motion_led: Box<dyn Indicator>,
    light_led: Box<dyn Indicator>,
    buzzer: Box<dyn Indicator>,
    dwell: Duration,
}

impl Alerter {
    pub fn new(
        motion_led: Box<dyn Indicator>,
        light_led: Box<dyn Indicator>,
        buzzer: Box<dyn Indicator>,
    ) -> Self {
        Self {
            motion_led,
            light_led,
            buzzer,
            dwell: ALERT_DWELL,
        }
    }

    /// Drive the motion LED; an accepted event also sounds the buzzer for
    /// the dwell time.
    pub async fn motion(&mut self, triggered: bool) {
        self.motion_led.set(triggered);
        if triggered {
            self.beep().await;
        }
    }

    /// Drive the light LED; an active alert also sounds the buzzer for the
    /// dwell time.
    pub async fn light(&mut self, triggered: bool) {
        self.light_led.set(triggered);
        if triggered {
            self.beep().await;
        }
    }

    async fn beep(&mut self) {
        self.buzzer.set(true);
        tokio::time::sleep(self.dwell).await;
        self.buzzer.set(false);
    }
}

/// Indicator that only logs state changes, for rigs without wired outputs.
#[cfg_attr(feature = "gpio", allow(dead_code))]
pub struct LogIndicator {
    name: &'static str,
    on: bool,
}

#[cfg_attr(feature = "gpio", allow(dead_code))]
impl LogIndicator {
    pub fn new(name: &'static str) -> Self {
        Self { name, on: false }
    }
}

impl Indicator for LogIndicator {
    fn set(&mut self, on: bool) {
        if on != self.on {
            tracing::debug!(output = self.name, on, "indicator changed");
            self.on = on;
        }
    }
}
