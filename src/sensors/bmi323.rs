//! BMI323 six-axis IMU.
//!
//! Every BMI323 register is a 16-bit word, and over I2C the device sends two
//! dummy bytes before the data. Reads therefore fetch a little-endian `u32`
//! and keep the upper half with [`upper_half`].

use super::{Reading, SensorDriver};
use crate::bus::BusDevice;
use crate::outcome::Outcome;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const CHIP_ID: i16 = 0x0043;
const MODE_NORMAL: u16 = 0x4;

// LSB per g for 2/4/8/16 g.
const ACCEL_SENSITIVITY: [f32; 4] = [16_380.0, 8_190.0, 4_010.0, 2_050.0];
// LSB per deg/s for 125/250/500/1000/2000 dps.
const GYRO_SENSITIVITY: [f32; 5] = [262.144, 131.072, 65.536, 32.768, 16.4];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Register {
    ChipId = 0x00,
    AccDataX = 0x03,
    AccDataY = 0x04,
    AccDataZ = 0x05,
    GyrDataX = 0x06,
    GyrDataY = 0x07,
    GyrDataZ = 0x08,
    AccCfg = 0x20,
    GyrCfg = 0x21,
}

impl From<Register> for u8 {
    fn from(register: Register) -> Self {
        register as u8
    }
}

/// Output data rate shared by the accelerometer and the gyroscope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SensorHz {
    Hz0_78125 = 0x1,
    Hz1_5625 = 0x2,
    Hz3_125 = 0x3,
    Hz6_25 = 0x4,
    Hz12_5 = 0x5,
    Hz25 = 0x6,
    Hz50 = 0x7,
    Hz100 = 0x8,
    Hz200 = 0x9,
    Hz400 = 0xA,
    Hz800 = 0xB,
    Hz1600 = 0xC,
    Hz3200 = 0xD,
    Hz6400 = 0xE,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccelRange {
    G2 = 0x0,
    G4 = 0x1,
    G8 = 0x2,
    G16 = 0x3,
}

impl AccelRange {
    fn sensitivity(self) -> f32 {
        ACCEL_SENSITIVITY[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GyroRange {
    Dps125 = 0x0,
    Dps250 = 0x1,
    Dps500 = 0x2,
    Dps1000 = 0x3,
    Dps2000 = 0x4,
}

impl GyroRange {
    fn sensitivity(self) -> f32 {
        GYRO_SENSITIVITY[self as usize]
    }
}

/// Acceleration in g, angular rate in deg/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuData {
    pub ax: f32,
    pub ay: f32,
    pub az: f32,
    pub gx: f32,
    pub gy: f32,
    pub gz: f32,
}

/// Recover a signed 16-bit word carried in the upper half of a 32-bit read.
///
/// The shift is arithmetic so the word's sign bit survives; masking would
/// turn negative readings into large positive ones.
pub fn upper_half(raw: u32) -> i16 {
    ((raw as i32) >> 16) as i16
}

fn config_word(range: u16, hz: SensorHz) -> u16 {
    (MODE_NORMAL << 12) | (range << 4) | hz as u16
}

#[derive(Debug)]
pub struct Bmi323 {
    device: BusDevice,
    accel_range: AccelRange,
    gyro_range: GyroRange,
    sensor_hz: SensorHz,
}

impl Bmi323 {
    pub const DEFAULT_ADDRESS: u8 = 0x68;

    pub fn set_accel_range(&mut self, range: AccelRange) -> Outcome<()> {
        self.write_accel_config(range, self.sensor_hz)?;
        self.accel_range = range;
        Ok(())
    }

    pub fn set_gyro_range(&mut self, range: GyroRange) -> Outcome<()> {
        self.write_gyro_config(range, self.sensor_hz)?;
        self.gyro_range = range;
        Ok(())
    }

    /// Change the output data rate of both sensors.
    pub fn set_sensor_hz(&mut self, hz: SensorHz) -> Outcome<()> {
        self.write_accel_config(self.accel_range, hz)?;
        self.write_gyro_config(self.gyro_range, hz)?;
        self.sensor_hz = hz;
        Ok(())
    }

    pub fn accel_range(&self) -> AccelRange {
        self.accel_range
    }

    pub fn gyro_range(&self) -> GyroRange {
        self.gyro_range
    }

    pub fn sensor_hz(&self) -> SensorHz {
        self.sensor_hz
    }

    pub fn read_imu(&self) -> Outcome<ImuData> {
        let accel = self.accel_range.sensitivity();
        let gyro = self.gyro_range.sensitivity();

        Ok(ImuData {
            ax: f32::from(self.read_word(Register::AccDataX)?) / accel,
            ay: f32::from(self.read_word(Register::AccDataY)?) / accel,
            az: f32::from(self.read_word(Register::AccDataZ)?) / accel,
            gx: f32::from(self.read_word(Register::GyrDataX)?) / gyro,
            gy: f32::from(self.read_word(Register::GyrDataY)?) / gyro,
            gz: f32::from(self.read_word(Register::GyrDataZ)?) / gyro,
        })
    }

    pub fn device(&self) -> &BusDevice {
        &self.device
    }

    fn read_word(&self, register: Register) -> Outcome<i16> {
        self.device.read_le_register::<u32>(register).map(upper_half)
    }

    fn write_accel_config(&self, range: AccelRange, hz: SensorHz) -> Outcome<()> {
        let word = config_word(range as u16, hz);
        debug!(word = format_args!("0x{word:04x}"), "accelerometer config");
        self.device.write_le_register(Register::AccCfg, word)
    }

    fn write_gyro_config(&self, range: GyroRange, hz: SensorHz) -> Outcome<()> {
        let word = config_word(range as u16, hz);
        debug!(word = format_args!("0x{word:04x}"), "gyroscope config");
        self.device.write_le_register(Register::GyrCfg, word)
    }
}

impl SensorDriver for Bmi323 {
    const FIELDS: &'static [&'static str] = &["ax", "ay", "az", "gx", "gy", "gz"];

    fn create(device: BusDevice) -> Outcome<Self> {
        let imu = Self {
            device,
            accel_range: AccelRange::G8,
            gyro_range: GyroRange::Dps500,
            sensor_hz: SensorHz::Hz100,
        };
        imu.write_accel_config(imu.accel_range, imu.sensor_hz)?;
        imu.write_gyro_config(imu.gyro_range, imu.sensor_hz)?;

        info!(address = imu.device.address(), "IMU created");
        Ok(imu)
    }

    fn is_connected(&self) -> bool {
        matches!(self.read_word(Register::ChipId), Ok(CHIP_ID))
    }

    fn read(&mut self) -> Outcome<Reading> {
        self.read_imu().map(Reading::Imu)
    }
}
