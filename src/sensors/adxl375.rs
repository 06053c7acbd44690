//! ADXL375 high-g accelerometer.

use super::{Reading, SensorDriver};
use crate::bus::BusDevice;
use crate::outcome::Outcome;
use serde::{Deserialize, Serialize};
use tracing::info;

const DEVICE_ID: u8 = 0xE5;
/// LSB per g.
const SENSITIVITY: f32 = 20.5;

// Full resolution, +/-200 g.
const DATA_FORMAT_FULL_RES: u8 = 0x0F;
const POWER_CTL_MEASURE: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Register {
    DevId = 0x00,
    PowerCtl = 0x2D,
    DataFormat = 0x31,
    DataX0 = 0x32,
    DataY0 = 0x34,
    DataZ0 = 0x36,
}

impl From<Register> for u8 {
    fn from(register: Register) -> Self {
        register as u8
    }
}

/// Acceleration in g.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccelerationData {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
}

#[derive(Debug)]
pub struct Adxl375 {
    device: BusDevice,
}

impl Adxl375 {
    pub const DEFAULT_ADDRESS: u8 = 0x53;

    pub fn read_acceleration(&self) -> Outcome<AccelerationData> {
        let x = self.device.read_le_register::<i16>(Register::DataX0)?;
        let y = self.device.read_le_register::<i16>(Register::DataY0)?;
        let z = self.device.read_le_register::<i16>(Register::DataZ0)?;

        Ok(AccelerationData {
            ax: f32::from(x) / SENSITIVITY,
            ay: f32::from(y) / SENSITIVITY,
            az: f32::from(z) / SENSITIVITY,
        })
    }

    pub fn device(&self) -> &BusDevice {
        &self.device
    }
}

impl SensorDriver for Adxl375 {
    const FIELDS: &'static [&'static str] = &["ax", "ay", "az"];

    fn create(device: BusDevice) -> Outcome<Self> {
        let accel = Self { device };
        accel.device.write_be_register(Register::DataFormat, DATA_FORMAT_FULL_RES)?;
        accel.device.write_be_register(Register::PowerCtl, POWER_CTL_MEASURE)?;

        info!(address = accel.device.address(), "high-g accelerometer created");
        Ok(accel)
    }

    fn is_connected(&self) -> bool {
        matches!(self.device.read_be_register::<u8>(Register::DevId), Ok(DEVICE_ID))
    }

    fn read(&mut self) -> Outcome<Reading> {
        self.read_acceleration().map(Reading::HighGAcceleration)
    }
}
