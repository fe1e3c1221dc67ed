//! Uniform polling interface over the climate, motion and light sensors.

use anyhow::Result;

use crate::config::LIGHT_MAX;

/// One combined temperature + humidity measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateSample {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Relative humidity, percent.
    pub humidity: f32,
}

/// Temperature + humidity sensor read in a single transaction.
pub trait ClimateSensor: Send {
    fn measure(&mut self) -> Result<ClimateSample>;
}

/// Digital motion detector (PIR output level).
pub trait MotionInput: Send {
    fn is_active(&mut self) -> bool;
}

/// Ambient light on the 12-bit scale, 0 (dark) to 4095 (bright).
pub trait LightInput: Send {
    fn level(&mut self) -> Result<u16>;
}

/// One loop tick's worth of sensor values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Reading {
    /// `None` when the climate sensor failed this tick.
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    /// `None` when the light sensor failed this tick.
    pub light_level: Option<u16>,
    pub motion_detected: bool,
}

impl Reading {
    /// Temperature with a failed read reported as the zero sentinel.
    pub fn temperature_or_zero(&self) -> f32 {
        self.temperature.unwrap_or(0.0)
    }

    /// Humidity with a failed read reported as the zero sentinel.
    pub fn humidity_or_zero(&self) -> f32 {
        self.humidity.unwrap_or(0.0)
    }

    /// Light level with a failed read reported as 0.
    pub fn light_or_zero(&self) -> u16 {
        self.light_level.unwrap_or(0)
    }
}

/// Owns the three sensor drivers and samples them once per tick.
pub struct SensorReader {
    climate: Box<dyn ClimateSensor>,
    motion: Box<dyn MotionInput>,
    light: Box<dyn LightInput>,
}

impl SensorReader {
    pub fn new(
        climate: Box<dyn ClimateSensor>,
        motion: Box<dyn MotionInput>,
        light: Box<dyn LightInput>,
    ) -> Self {
        Self {
            climate,
            motion,
            light,
        }
    }

    /// Read every sensor once. Failures are logged and absorbed: a failed
    /// read leaves its fields absent.
    pub fn sample(&mut self) -> Reading {
        let (temperature, humidity) = match self.climate.measure() {
            Ok(s) => (Some(s.temperature), Some(s.humidity)),
            Err(e) => {
                tracing::warn!("climate sensor read failed: {e:#}");
                (None, None)
            }
        };

        let motion_detected = self.motion.is_active();

        let light_level = match self.light.level() {
            Ok(level) => Some(level.min(LIGHT_MAX)),
            Err(e) => {
                tracing::warn!("light sensor read failed: {e:#}");
                None
            }
        };

        Reading {
            temperature,
            humidity,
            light_level,
            motion_detected,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
