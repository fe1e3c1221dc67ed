//! Simulated sensors and WiFi link for running the node off-target.
//!
//! Models the behaviour of the real parts closely enough to exercise every
//! path of the main loop:
//! - DHT11 climate readings: slow random walk, integer resolution, and
//!   occasional checksum/timeout failures
//! - PIR motion in short bursts
//! - Ambient light following a compressed day/night cycle plus ADC noise
//! - A WiFi link that associates after a short delay and may drop out

use anyhow::{bail, Result};
use std::fmt;

use crate::config::LIGHT_MAX;
use crate::link::NetworkLink;
use crate::sensor::{ClimateSample, ClimateSensor, LightInput, MotionInput};

// ---------------------------------------------------------------------------
// Gaussian approximation (no extra dependency)
// ---------------------------------------------------------------------------

/// Approximate a sample from N(0,1) using the Irwin-Hall method:
/// sum of 12 uniform [0,1) values minus 6.
fn approx_std_normal() -> f64 {
    let mut sum: f64 = 0.0;
    for _ in 0..12 {
        sum += fastrand::f64();
    }
    sum - 6.0
}

/// Sample from N(mean, sigma).
fn gaussian(mean: f64, sigma: f64) -> f64 {
    mean + sigma * approx_std_normal()
}

// ---------------------------------------------------------------------------
// Scenario presets
// ---------------------------------------------------------------------------

/// Pre-configured simulation profiles selectable via `SIM_SCENARIO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// Bright room, rare motion, healthy sensors and link.
    Calm,
    /// Frequent motion bursts; exercises the debounce window.
    Busy,
    /// Climate read failures, noisy light and a link that drops out.
    Flaky,
    /// Light stays under the alert threshold most of the time.
    Dark,
}

impl Scenario {
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "busy" => Self::Busy,
            "flaky" => Self::Flaky,
            "dark" => Self::Dark,
            _ => Self::Calm,
        }
    }

    fn params(self) -> Params {
        match self {
            Scenario::Calm => Params {
                climate_fault: 0.01,
                motion_start: 0.03,
                light_center: 2400.0,
                light_noise: 40.0,
                link_drop: 0.0,
            },
            Scenario::Busy => Params {
                climate_fault: 0.01,
                motion_start: 0.25,
                light_center: 2400.0,
                light_noise: 40.0,
                link_drop: 0.0,
            },
            Scenario::Flaky => Params {
                climate_fault: 0.25,
                motion_start: 0.05,
                light_center: 1800.0,
                light_noise: 250.0,
                link_drop: 0.02,
            },
            Scenario::Dark => Params {
                climate_fault: 0.01,
                motion_start: 0.03,
                light_center: 250.0,
                light_noise: 30.0,
                link_drop: 0.0,
            },
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Calm => write!(f, "calm"),
            Self::Busy => write!(f, "busy"),
            Self::Flaky => write!(f, "flaky"),
            Self::Dark => write!(f, "dark"),
        }
    }
}

struct Params {
    /// Probability that one climate read fails.
    climate_fault: f32,
    /// Probability per sample that a motion burst starts.
    motion_start: f32,
    /// Mean light level (12-bit).
    light_center: f64,
    light_noise: f64,
    /// Probability per status poll that the link drops.
    link_drop: f32,
}

// ---------------------------------------------------------------------------
// Random walk
// ---------------------------------------------------------------------------

/// Mean-reverting random walk bounded to `[lo, hi]`.
struct Walk {
    value: f64,
    center: f64,
    sigma: f64,
    reversion: f64,
    lo: f64,
    hi: f64,
}

impl Walk {
    fn new(center: f64, sigma: f64, lo: f64, hi: f64) -> Self {
        Self {
            value: gaussian(center, sigma * 4.0).clamp(lo, hi),
            center,
            sigma,
            reversion: 0.05,
            lo,
            hi,
        }
    }

    fn step(&mut self) -> f64 {
        let pull = self.reversion * (self.center - self.value);
        self.value = (self.value + pull + gaussian(0.0, self.sigma)).clamp(self.lo, self.hi);
        self.value
    }
}

// ---------------------------------------------------------------------------
// Sensors
// ---------------------------------------------------------------------------

/// DHT11 stand-in. Whole-degree and whole-percent resolution, 0..50 C and
/// 20..90 % RH like the real part.
pub struct SimClimate {
    temperature: Walk,
    humidity: Walk,
    fault_prob: f32,
}

impl SimClimate {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            temperature: Walk::new(23.0, 0.2, 0.0, 50.0),
            humidity: Walk::new(55.0, 0.5, 20.0, 90.0),
            fault_prob: scenario.params().climate_fault,
        }
    }
}

impl ClimateSensor for SimClimate {
    fn measure(&mut self) -> Result<ClimateSample> {
        let t = self.temperature.step();
        let h = self.humidity.step();
        if fastrand::f32() < self.fault_prob {
            bail!("dht11: checksum mismatch");
        }
        Ok(ClimateSample {
            temperature: t.round() as f32,
            humidity: h.round() as f32,
        })
    }
}

/// PIR stand-in: output held high for a burst of a few samples, like a
/// retriggering sensor with someone walking past.
pub struct SimMotion {
    start_prob: f32,
    remaining: u32,
}

impl SimMotion {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            start_prob: scenario.params().motion_start,
            remaining: 0,
        }
    }
}

impl MotionInput for SimMotion {
    fn is_active(&mut self) -> bool {
        if self.remaining == 0 && fastrand::f32() < self.start_prob {
            self.remaining = fastrand::u32(2..=6);
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }
}

/// Light-dependent resistor on the 12-bit scale.
pub struct SimLight {
    center: f64,
    noise: f64,
    /// Full day/night cycle length in samples.
    period: f64,
    tick: u64,
}

impl SimLight {
    /// `period` is the day length in samples; 600 gives a ten-minute day at
    /// the 1 Hz loop rate.
    pub fn new(scenario: Scenario, period: u64) -> Self {
        let p = scenario.params();
        Self {
            center: p.light_center,
            noise: p.light_noise,
            period: period.max(1) as f64,
            tick: 0,
        }
    }
}

impl LightInput for SimLight {
    fn level(&mut self) -> Result<u16> {
        let phase = 2.0 * std::f64::consts::PI * self.tick as f64 / self.period;
        self.tick += 1;

        // Swing a third of the centre value either side over one day.
        let diurnal = self.center / 3.0 * phase.sin();
        let level = gaussian(self.center + diurnal, self.noise);
        Ok(level.round().clamp(0.0, f64::from(LIGHT_MAX)) as u16)
    }
}

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// WiFi link that needs a few status polls to associate and, depending on
/// the scenario, drops out and comes back on its own.
pub struct SimLink {
    powered: bool,
    associating: bool,
    /// Polls left until association (or reassociation) completes.
    settle: u32,
    up: bool,
    drop_prob: f32,
}

impl SimLink {
    pub fn new(scenario: Scenario) -> Self {
        Self {
            powered: false,
            associating: false,
            settle: 0,
            up: false,
            drop_prob: scenario.params().link_drop,
        }
    }
}

impl NetworkLink for SimLink {
    fn activate(&mut self) -> Result<()> {
        self.powered = true;
        Ok(())
    }

    fn associate(&mut self, ssid: &str, _password: &str) -> Result<()> {
        if !self.powered {
            bail!("radio is off");
        }
        tracing::debug!(%ssid, "sim link associating");
        self.associating = true;
        self.settle = 3;
        Ok(())
    }

    fn is_connected(&mut self) -> bool {
        if self.up {
            if fastrand::f32() < self.drop_prob {
                self.up = false;
                self.settle = fastrand::u32(3..=10);
            }
        } else if self.associating {
            if self.settle == 0 {
                self.up = true;
            } else {
                self.settle -= 1;
            }
        }
        self.up
    }
}

// ===========================================================================
// Tests
// ===========================================================================
