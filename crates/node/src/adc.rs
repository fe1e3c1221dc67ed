//! ADS1115 16-bit ADC over I2C carrying the light-dependent resistor.
//!
//! Reads one single-ended channel at PGA ±4.096 V, 128 SPS, single-shot
//! mode, and rescales so 0..3.3 V maps linearly onto the 12-bit light scale.

use anyhow::{Context, Result};
use rppal::i2c::I2c;
use std::{thread, time::Duration};

use crate::config::LIGHT_MAX;
use crate::sensor::LightInput;

// ── ADS1115 register addresses ──────────────────────────────────────────────

/// Conversion result register (read-only, 16-bit signed).
const REG_CONVERSION: u8 = 0x00;
/// Configuration register (read/write).
const REG_CONFIG: u8 = 0x01;

// ── Config register bit fields ──────────────────────────────────────────────
//
// Layout (MSB first):
//   [15]    OS       write 1 to start single-shot conversion
//   [14:12] MUX      input multiplexer (channel selection)
//   [11:9]  PGA      programmable gain amplifier
//   [8]     MODE     0 = continuous, 1 = single-shot
//   [7:5]   DR       data rate
//   [4]     COMP_MODE
//   [3]     COMP_POL
//   [2]     COMP_LAT
//   [1:0]   COMP_QUE 11 = disable comparator (default)

/// OS=1 (start), PGA=001 (±4.096 V), MODE=1 (single-shot),
/// DR=100 (128 SPS), COMP_QUE=11 (comparator off).
const CONFIG_BASE: u16 = 0b1_000_001_1_100_0_0_0_11;

/// MUX values for single-ended reads (AINx vs GND).
const MUX_SHIFT: u8 = 12;
const MUX_SINGLE_ENDED: [u16; 4] = [0b100, 0b101, 0b110, 0b111];

const MAX_CHANNEL: usize = 3;

/// Conversion time at 128 SPS is ~7.8 ms.
const CONVERSION_WAIT: Duration = Duration::from_millis(9);

/// Bit 15 of the config register: conversion-ready flag when read.
const OS_READY_BIT: u16 = 1 << 15;

/// Raw count for 3.3 V at ±4.096 V full scale (32767 * 3.3 / 4.096).
const RAW_AT_3V3: i32 = 26_400;

fn config_for_channel(channel: usize) -> u16 {
    CONFIG_BASE | (MUX_SINGLE_ENDED[channel] << MUX_SHIFT)
}

/// Map a raw single-ended conversion onto 0..=4095.
fn scale_to_light(raw: i16) -> u16 {
    let raw = i32::from(raw).clamp(0, RAW_AT_3V3);
    let max = i32::from(LIGHT_MAX);
    // Rounded integer division; result is within 0..=max.
    ((raw * max + RAW_AT_3V3 / 2) / RAW_AT_3V3) as u16
}

/// Light sensor on one ADS1115 input, backed by `rppal::i2c`.
pub struct AdsLight {
    i2c: I2c,
    channel: usize,
}

impl AdsLight {
    /// Open I2C bus 1 and address the ADS1115 at `addr`.
    pub fn new(addr: u16, channel: usize) -> Result<Self> {
        anyhow::ensure!(
            channel <= MAX_CHANNEL,
            "ADS1115 channel {channel} out of range (0-{MAX_CHANNEL})"
        );

        let mut i2c = I2c::new().context("failed to open i2c bus")?;
        i2c.set_slave_address(addr)?;

        tracing::info!(
            addr = format_args!("0x{addr:02x}"),
            channel,
            "ads1115 initialised"
        );

        Ok(Self { i2c, channel })
    }

    /// Single-shot read returning the raw 16-bit signed value.
    fn read_raw(&mut self) -> Result<i16> {
        let config = config_for_channel(self.channel);
        self.i2c.block_write(REG_CONFIG, &config.to_be_bytes())?;

        thread::sleep(CONVERSION_WAIT);

        for _ in 0..3 {
            let mut buf = [0u8; 2];
            self.i2c.block_read(REG_CONFIG, &mut buf)?;
            if u16::from_be_bytes(buf) & OS_READY_BIT != 0 {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }

        let mut buf = [0u8; 2];
        self.i2c.block_read(REG_CONVERSION, &mut buf)?;
        Ok(i16::from_be_bytes(buf))
    }
}

impl LightInput for AdsLight {
    fn level(&mut self) -> Result<u16> {
        let raw = self
            .read_raw()
            .with_context(|| format!("ads1115 channel {} read failed", self.channel))?;
        Ok(scale_to_light(raw))
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
