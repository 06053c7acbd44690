//! TMP1075 digital temperature sensor.

use super::{Reading, SensorDriver};
use crate::bus::BusDevice;
use crate::outcome::{Failure, Outcome};
use core::cmp::Ordering;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Die ID register contents of a genuine TMP1075.
const DEVICE_ID: u16 = 0x7500;
/// Degrees Celsius per LSB of the 12-bit temperature.
const RESOLUTION_C: f32 = 0.0625;

const ONESHOT_OFFSET: u16 = 15;
const RATE_OFFSET: u16 = 13;
const SHUTDOWN_OFFSET: u16 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Register {
    Temp = 0x00,
    Cfgr = 0x01,
    Llim = 0x02,
    Hlim = 0x03,
    DieId = 0x0F,
}

impl From<Register> for u8 {
    fn from(register: Register) -> Self {
        register as u8
    }
}

/// Conversion period in continuous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionRate {
    Ms27_5 = 0b00,
    Ms55 = 0b01,
    Ms110 = 0b10,
    Ms220 = 0b11,
}

impl ConversionRate {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0b00 => ConversionRate::Ms27_5,
            0b01 => ConversionRate::Ms55,
            0b10 => ConversionRate::Ms110,
            _ => ConversionRate::Ms220,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub rate: ConversionRate,
    pub shutdown: bool,
}

#[derive(Debug)]
pub struct Tmp1075 {
    device: BusDevice,
}

impl Tmp1075 {
    pub const DEFAULT_ADDRESS: u8 = 0x48;

    pub fn read_temperature(&self) -> Outcome<f32> {
        // Bits 15..4 hold the signed temperature, 3..0 are unused.
        let raw = self.device.read_be_register::<i16>(Register::Temp)?;
        Ok(f32::from(raw >> 4) * RESOLUTION_C)
    }

    pub fn read_config(&self) -> Outcome<Config> {
        let raw = self.device.read_be_register::<u16>(Register::Cfgr)?;
        Ok(Config {
            rate: ConversionRate::from_bits(raw >> RATE_OFFSET),
            shutdown: (raw >> SHUTDOWN_OFFSET) & 0b1 == 1,
        })
    }

    /// Write `config`, optionally triggering a single conversion while shut down.
    pub fn write_config(&self, config: Config, oneshot: bool) -> Outcome<()> {
        let mut raw = 0_u16;
        raw |= u16::from(oneshot) << ONESHOT_OFFSET;
        raw |= (config.rate as u16) << RATE_OFFSET;
        raw |= u16::from(config.shutdown) << SHUTDOWN_OFFSET;
        self.device.write_be_register(Register::Cfgr, raw)
    }

    /// Program the alert window, in degrees Celsius.
    pub fn write_limits(&self, low_c: f32, high_c: f32) -> Outcome<()> {
        if low_c.partial_cmp(&high_c) != Some(Ordering::Less) {
            return Err(Failure::invalid_argument(alloc::format!(
                "low limit {low_c} must be below high limit {high_c}"
            )));
        }
        self.device.write_be_register(Register::Llim, encode_limit(low_c)?)?;
        self.device.write_be_register(Register::Hlim, encode_limit(high_c)?)
    }

    pub fn device(&self) -> &BusDevice {
        &self.device
    }
}

fn encode_limit(celsius: f32) -> Outcome<i16> {
    let steps = (celsius / RESOLUTION_C).round();
    if !(-2048.0..=2047.0).contains(&steps) {
        return Err(Failure::invalid_argument(alloc::format!(
            "limit {celsius} is outside the sensor range"
        )));
    }
    Ok((steps as i16) << 4)
}

impl SensorDriver for Tmp1075 {
    const FIELDS: &'static [&'static str] = &["temp_c"];

    fn create(device: BusDevice) -> Outcome<Self> {
        info!(address = device.address(), "temperature sensor created");
        Ok(Self { device })
    }

    fn is_connected(&self) -> bool {
        matches!(self.device.read_be_register::<u16>(Register::DieId), Ok(DEVICE_ID))
    }

    fn read(&mut self) -> Outcome<Reading> {
        self.read_temperature().map(Reading::Temperature)
    }
}
