pub mod adxl375;
pub mod bmi323;
pub mod bmp581;
pub mod mlx90395;
pub mod tmp1075;

pub use adxl375::{AccelerationData, Adxl375};
pub use bmi323::{Bmi323, ImuData};
pub use bmp581::{BarometerData, Bmp581};
pub use mlx90395::{MagneticFieldData, Mlx90395};
pub use tmp1075::Tmp1075;

use crate::bus::BusDevice;
use crate::outcome::Outcome;
use crate::telemetry::Channel;
use alloc::string::String;
use heapless::Vec;
use serde::{Deserialize, Serialize};

/// Largest number of values a single reading carries.
pub const MAX_READING_FIELDS: usize = 6;

/// One sample from one sensor, in physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    /// Degrees Celsius.
    Temperature(f32),
    Barometer(BarometerData),
    Imu(ImuData),
    HighGAcceleration(AccelerationData),
    /// Microtesla.
    Magnetometer(MagneticFieldData),
    Scalar(f32),
}

impl Reading {
    pub fn fields(&self) -> Vec<f32, MAX_READING_FIELDS> {
        let fields = match self {
            Reading::Temperature(value) | Reading::Scalar(value) => Vec::from_slice(&[*value]),
            Reading::Barometer(data) => Vec::from_slice(&[data.temperature_c, data.pressure_pa]),
            Reading::Imu(data) => {
                Vec::from_slice(&[data.ax, data.ay, data.az, data.gx, data.gy, data.gz])
            }
            Reading::HighGAcceleration(data) => Vec::from_slice(&[data.ax, data.ay, data.az]),
            Reading::Magnetometer(data) => Vec::from_slice(&[data.mx, data.my, data.mz]),
        };
        // Every variant fits in MAX_READING_FIELDS.
        fields.unwrap_or_default()
    }
}

/// The contract every sensor driver on the bus fulfils.
pub trait SensorDriver: Sized + Send {
    /// Column names of the values [`SensorDriver::read`] returns.
    const FIELDS: &'static [&'static str];

    /// Take ownership of a leased device and bring the sensor up.
    fn create(device: BusDevice) -> Outcome<Self>;

    /// Whether a responsive device of the expected type sits at the address.
    fn is_connected(&self) -> bool;

    fn read(&mut self) -> Outcome<Reading>;
}

/// Publishes a driver's readings as one telemetry channel.
#[derive(Debug)]
pub struct SensorChannel<S> {
    name: String,
    sensor: S,
}

impl<S: SensorDriver> SensorChannel<S> {
    pub fn new(name: impl Into<String>, sensor: S) -> Self {
        Self {
            name: name.into(),
            sensor,
        }
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn into_inner(self) -> S {
        self.sensor
    }
}

impl<S: SensorDriver> Channel for SensorChannel<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn fields(&self) -> &'static [&'static str] {
        S::FIELDS
    }

    fn sample(&mut self) -> Outcome<Reading> {
        self.sensor.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_flatten_in_column_order() {
        let imu = Reading::Imu(ImuData {
            ax: 1.0,
            ay: 2.0,
            az: 3.0,
            gx: 4.0,
            gy: 5.0,
            gz: 6.0,
        });
        assert_eq!(imu.fields().as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(Reading::Temperature(21.5).fields().as_slice(), &[21.5]);
    }

    #[test]
    fn test_field_counts_match_driver_columns() {
        let baro = Reading::Barometer(BarometerData {
            temperature_c: 20.0,
            pressure_pa: 101_325.0,
        });
        assert_eq!(baro.fields().len(), Bmp581::FIELDS.len());
        assert_eq!(Reading::Temperature(0.0).fields().len(), Tmp1075::FIELDS.len());
        let accel = Reading::HighGAcceleration(AccelerationData::default());
        assert_eq!(accel.fields().len(), Adxl375::FIELDS.len());
        assert_eq!(Reading::Imu(ImuData::default()).fields().len(), Bmi323::FIELDS.len());
        let mag = Reading::Magnetometer(MagneticFieldData::default());
        assert_eq!(mag.fields().len(), Mlx90395::FIELDS.len());
    }
}
