//! BMP581 barometric pressure sensor.
//!
//! The part has two strap-selectable addresses and no default, so the caller
//! always leases one of [`Bmp581::ADDRESS_1`] or [`Bmp581::ADDRESS_2`].

use super::{Reading, SensorDriver};
use crate::bus::BusDevice;
use crate::outcome::{Failure, Outcome};
use serde::{Deserialize, Serialize};
use tracing::info;

const TEMPERATURE_SCALE: f32 = 1.0 / 65_536.0;
const PRESSURE_SCALE: f32 = 1.0 / 64.0;

const INT_STATUS_POR: u8 = 0x10;
const STATUS_NVM_READY: u8 = 0x06;

const ODR_NORMAL_MODE: u8 = 0x01;
// Temperature x1, pressure x4, pressure enabled.
const OSR_STANDARD: u8 = 0b0101_0100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Register {
    ChipId = 0x01,
    TmpData = 0x1D,
    PressData = 0x20,
    IntStatus = 0x27,
    Status = 0x28,
    OsrConfig = 0x36,
    OdrConfig = 0x37,
}

impl From<Register> for u8 {
    fn from(register: Register) -> Self {
        register as u8
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BarometerData {
    pub temperature_c: f32,
    pub pressure_pa: f32,
}

#[derive(Debug)]
pub struct Bmp581 {
    device: BusDevice,
}

impl Bmp581 {
    pub const ADDRESS_1: u8 = 0x46;
    pub const ADDRESS_2: u8 = 0x47;

    /// Latest temperature and pressure conversion.
    pub fn read_data(&self) -> Outcome<BarometerData> {
        // Both values are 24 bits wide; the fourth byte belongs to the next register.
        let raw_temperature = self.device.read_le_register::<u32>(Register::TmpData)?;
        let raw_pressure = self.device.read_le_register::<u32>(Register::PressData)?;

        Ok(BarometerData {
            temperature_c: sign_extend_24(raw_temperature) as f32 * TEMPERATURE_SCALE,
            pressure_pa: (raw_pressure & 0x00FF_FFFF) as f32 * PRESSURE_SCALE,
        })
    }

    pub fn device(&self) -> &BusDevice {
        &self.device
    }
}

fn sign_extend_24(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

impl SensorDriver for Bmp581 {
    const FIELDS: &'static [&'static str] = &["temp_c", "pressure_pa"];

    fn create(device: BusDevice) -> Outcome<Self> {
        let sensor = Self { device };
        if !sensor.is_connected() {
            return Err(Failure::not_found(alloc::format!(
                "no BMP581 responding at 0x{:02x}",
                sensor.device.address()
            )));
        }

        sensor.device.write_be_register(Register::OdrConfig, ODR_NORMAL_MODE)?;
        sensor.device.write_be_register(Register::OsrConfig, OSR_STANDARD)?;

        info!(address = sensor.device.address(), "barometer created");
        Ok(sensor)
    }

    fn is_connected(&self) -> bool {
        let read = |register: Register| self.device.read_be_register::<u8>(register);
        match (read(Register::ChipId), read(Register::IntStatus), read(Register::Status)) {
            (Ok(id), Ok(int_status), Ok(status)) => {
                id != 0 && int_status == INT_STATUS_POR && status & STATUS_NVM_READY == STATUS_NVM_READY
            }
            _ => false,
        }
    }

    fn read(&mut self) -> Outcome<Reading> {
        self.read_data().map(Reading::Barometer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{SharedBus, SimulatedBus};
    use crate::outcome::FailureKind;

    fn present(sim: &SimulatedBus, address: u8) {
        sim.set_register(address, 0x01, &[0x50]);
        sim.set_register(address, 0x27, &[0x10]);
        sim.set_register(address, 0x28, &[0x06]);
    }

    #[test]
    fn test_create_configures_normal_mode() {
        let sim = SimulatedBus::new();
        present(&sim, Bmp581::ADDRESS_1);
        let bus = SharedBus::create(sim.clone()).unwrap();

        Bmp581::create(bus.lease(Bmp581::ADDRESS_1).unwrap()).unwrap();

        let writes = sim.writes(Bmp581::ADDRESS_1);
        assert_eq!(writes, alloc::vec![alloc::vec![0x37, 0x01], alloc::vec![0x36, 0x54]]);
    }

    #[test]
    fn test_create_rejects_absent_device() {
        let sim = SimulatedBus::new();
        sim.set_register(Bmp581::ADDRESS_2, 0x01, &[0x50]);
        sim.set_register(Bmp581::ADDRESS_2, 0x27, &[0x00]);
        let bus = SharedBus::create(sim.clone()).unwrap();

        let failure = Bmp581::create(bus.lease(Bmp581::ADDRESS_2).unwrap()).unwrap_err();
        assert_eq!(failure.kind, FailureKind::NotFound);
        // The failed driver dropped its device, so the address is free again.
        assert!(!bus.is_leased(Bmp581::ADDRESS_2));
    }

    #[test]
    fn test_read_data_scales_24_bit_values() {
        let sim = SimulatedBus::new();
        present(&sim, Bmp581::ADDRESS_1);
        // 25.5 C = 0x19_8000, stray high byte must be ignored.
        sim.set_register(Bmp581::ADDRESS_1, 0x1D, &[0x00, 0x80, 0x19, 0xAA]);
        // 101325 Pa * 64 = 0x62_F340
        sim.set_register(Bmp581::ADDRESS_1, 0x20, &[0x40, 0xF3, 0x62, 0xBB]);
        let bus = SharedBus::create(sim).unwrap();
        let sensor = Bmp581::create(bus.lease(Bmp581::ADDRESS_1).unwrap()).unwrap();

        let data = sensor.read_data().unwrap();
        assert_eq!(data.temperature_c, 25.5);
        assert_eq!(data.pressure_pa, 101_325.0);
    }

    #[test]
    fn test_negative_temperature_sign_extends() {
        assert_eq!(sign_extend_24(0x00FF_FFFF), -1);
        assert_eq!(sign_extend_24(0xAAFF_0000), -65_536);
        assert_eq!(sign_extend_24(0x007F_FFFF), 0x007F_FFFF);
    }
}
