//! Raspberry Pi GPIO drivers: LEDs and buzzer, the PIR input and a
//! bit-banged DHT11.

use anyhow::{bail, Context, Result};
use rppal::gpio::{Gpio, InputPin, IoPin, Mode, OutputPin};
use std::thread;
use std::time::{Duration, Instant};

use crate::alert::Indicator;
use crate::sensor::{ClimateSample, ClimateSensor, MotionInput};

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Active-high LED or buzzer.
pub struct GpioOutput {
    pin: OutputPin,
}

impl GpioOutput {
    pub fn new(gpio: &Gpio, pin: u8) -> Result<Self> {
        let mut pin = gpio
            .get(pin)
            .with_context(|| format!("gpio {pin} unavailable"))?
            .into_output();
        // Start dark and silent.
        pin.set_low();
        Ok(Self { pin })
    }
}

impl Indicator for GpioOutput {
    fn set(&mut self, on: bool) {
        if on {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
    }
}

// ---------------------------------------------------------------------------
// PIR
// ---------------------------------------------------------------------------

pub struct PirInput {
    pin: InputPin,
}

impl PirInput {
    pub fn new(gpio: &Gpio, pin: u8) -> Result<Self> {
        let pin = gpio
            .get(pin)
            .with_context(|| format!("gpio {pin} unavailable"))?
            .into_input();
        Ok(Self { pin })
    }
}

impl MotionInput for PirInput {
    fn is_active(&mut self) -> bool {
        self.pin.is_high()
    }
}

// ---------------------------------------------------------------------------
// DHT11
// ---------------------------------------------------------------------------

/// Host start signal: hold the line low for at least 18 ms.
const START_LOW: Duration = Duration::from_millis(20);
/// Upper bound for any single level while the sensor is talking.
const EDGE_TIMEOUT: Duration = Duration::from_micros(200);
/// High pulses longer than this encode a 1 bit (0 ~ 27 us, 1 ~ 70 us).
const ONE_THRESHOLD: Duration = Duration::from_micros(48);

/// DHT11 on a single bidirectional data line.
pub struct Dht11 {
    pin: IoPin,
}

impl Dht11 {
    pub fn new(gpio: &Gpio, pin: u8) -> Result<Self> {
        let mut pin = gpio
            .get(pin)
            .with_context(|| format!("gpio {pin} unavailable"))?
            .into_io(Mode::Output);
        pin.set_high();
        Ok(Self { pin })
    }

    /// Spin until the line leaves `high`, returning how long it stayed.
    fn wait_while(&self, high: bool) -> Result<Duration> {
        let start = Instant::now();
        while self.pin.is_high() == high {
            if start.elapsed() > EDGE_TIMEOUT {
                bail!("dht11: timeout waiting for {} edge", if high { "falling" } else { "rising" });
            }
        }
        Ok(start.elapsed())
    }

    fn read_pulses(&mut self) -> Result<[Duration; 40]> {
        self.pin.set_mode(Mode::Output);
        self.pin.set_low();
        thread::sleep(START_LOW);
        self.pin.set_high();
        self.pin.set_mode(Mode::Input);

        // Pull-up release, then the sensor's 80 us low + 80 us high response.
        self.wait_while(true)?;
        self.wait_while(false)?;
        self.wait_while(true)?;

        let mut pulses = [Duration::ZERO; 40];
        for pulse in pulses.iter_mut() {
            self.wait_while(false)?;
            *pulse = self.wait_while(true)?;
        }
        Ok(pulses)
    }
}

impl ClimateSensor for Dht11 {
    fn measure(&mut self) -> Result<ClimateSample> {
        let pulses = self.read_pulses();
        // Leave the line idle high for the next start signal.
        self.pin.set_mode(Mode::Output);
        self.pin.set_high();
        decode(pulses_to_frame(&pulses?))
    }
}

/// Pack 40 high-pulse widths MSB first into the 5-byte frame.
fn pulses_to_frame(pulses: &[Duration; 40]) -> [u8; 5] {
    let mut frame = [0u8; 5];
    for (i, width) in pulses.iter().enumerate() {
        if *width > ONE_THRESHOLD {
            frame[i / 8] |= 0x80 >> (i % 8);
        }
    }
    frame
}

/// Frame layout: RH integral, RH decimal, T integral, T decimal, checksum.
fn decode(frame: [u8; 5]) -> Result<ClimateSample> {
    let sum = frame[..4].iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    if sum != frame[4] {
        bail!("dht11: checksum mismatch ({sum:#04x} != {:#04x})", frame[4]);
    }
    Ok(ClimateSample {
        humidity: f32::from(frame[0]) + f32::from(frame[1]) * 0.1,
        temperature: f32::from(frame[2]) + f32::from(frame[3]) * 0.1,
    })
}
