//! MLX90395 three-axis magnetometer.
//!
//! Field values are reported in microtesla. The scale is the product of the
//! per-LSB sensitivity fixed at bring-up and the factor of the current gain
//! setting.

use super::{Reading, SensorDriver};
use crate::bus::BusDevice;
use crate::outcome::{Failure, Outcome};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

// Relative sensitivity per `GAIN_SEL` setting.
const GAIN_FACTOR: [f32; 16] = [
    0.2, 0.25, 0.333, 0.4, 0.5, 0.6, 0.75, 1.0, 0.1, 0.125, 0.1667, 0.2, 0.25, 0.3, 0.375, 0.5,
];

const GAIN_SHIFT: u16 = 4;
const GAIN_MASK: u16 = 0x000F;

/// Highest value accepted by [`Mlx90395::set_gain`].
pub const MAX_GAIN: u8 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Register {
    GainSel = 0x00,
    Data = 0x80,
}

impl From<Register> for u8 {
    fn from(register: Register) -> Self {
        register as u8
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MagneticFieldData {
    pub mx: f32,
    pub my: f32,
    pub mz: f32,
}

#[derive(Debug)]
pub struct Mlx90395 {
    device: BusDevice,
    gain: u8,
    lsb: f32,
}

impl Mlx90395 {
    pub const DEFAULT_ADDRESS: u8 = 0x0C;

    pub fn gain(&self) -> u8 {
        self.gain
    }

    /// Replace the `GAIN_SEL` field, leaving the rest of the register intact.
    pub fn set_gain(&mut self, gain: u8) -> Outcome<()> {
        if gain > MAX_GAIN {
            return Err(Failure::invalid_argument(alloc::format!(
                "gain {gain} is above {MAX_GAIN}"
            )));
        }

        let current = self.device.read_be_register::<u16>(Register::GainSel)?;
        let value = (current & !(GAIN_MASK << GAIN_SHIFT)) | (u16::from(gain) << GAIN_SHIFT);
        self.device.write_be_register(Register::GainSel, value)?;

        debug!(gain, register = format_args!("0x{value:04x}"), "magnetometer gain set");
        self.gain = gain;
        Ok(())
    }

    pub fn read_magnetic_field(&self) -> Outcome<MagneticFieldData> {
        // Status word first, then X, Y and Z, all big-endian.
        let raw = self.device.read_be_register::<u64>(Register::Data)?;
        let scale = self.lsb * GAIN_FACTOR[usize::from(self.gain)];

        Ok(MagneticFieldData {
            mx: f32::from((raw >> 32) as i16) * scale,
            my: f32::from((raw >> 16) as i16) * scale,
            mz: f32::from(raw as i16) * scale,
        })
    }

    pub fn device(&self) -> &BusDevice {
        &self.device
    }

    fn read_gain(device: &BusDevice) -> Outcome<u8> {
        let raw = device.read_be_register::<u16>(Register::GainSel)?;
        Ok(((raw >> GAIN_SHIFT) & GAIN_MASK) as u8)
    }
}

/// Microtesla per LSB for the power-on gains the flight software supports.
fn lsb_for_gain(gain: u8) -> Option<f32> {
    match gain {
        8 => Some(7.14),
        9 => Some(2.5),
        _ => None,
    }
}

impl SensorDriver for Mlx90395 {
    const FIELDS: &'static [&'static str] = &["mx", "my", "mz"];

    fn create(device: BusDevice) -> Outcome<Self> {
        let gain = Self::read_gain(&device)?;
        let lsb = lsb_for_gain(gain).ok_or_else(|| {
            Failure::hardware_fault(alloc::format!(
                "magnetometer at 0x{:02x} reports unsupported gain {gain}",
                device.address()
            ))
        })?;

        info!(address = device.address(), gain, "magnetometer created");
        Ok(Self { device, gain, lsb })
    }

    fn is_connected(&self) -> bool {
        matches!(Self::read_gain(&self.device).map(lsb_for_gain), Ok(Some(_)))
    }

    fn read(&mut self) -> Outcome<Reading> {
        self.read_magnetic_field().map(Reading::Magnetometer)
    }
}
