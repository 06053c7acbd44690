//! # Flight Computer
//!
//! Sensor acquisition and data logging for a small flight vehicle: a shared
//! I2C bus leased out one address at a time, typed register access, a
//! background telemetry publisher, and a CSV flight log on removable storage.
//!
//! ## Features
//!
//! - **Bus leasing**: one [`SharedBus`], exclusive [`BusDevice`] handles per address
//! - **Register codec**: fixed-width integers in either byte order
//! - **Sensor drivers**: TMP1075, BMP581, BMI323, ADXL375 and MLX90395
//! - **Telemetry**: versioned snapshots with blocking wait-for-newer
//! - **Flight log**: `data{N}.csv` files with compact float formatting
//! - **Simulation**: scripted register maps and fault injection for desktop runs
//!
//! ## Quick Start
//!
//! ```rust
//! use flight_computer::bus::{SharedBus, SimulatedBus};
//! use flight_computer::sensors::{SensorChannel, SensorDriver, Tmp1075};
//! use flight_computer::telemetry::{Channel, TelemetryPublisher, DEFAULT_PERIOD};
//!
//! let sim = SimulatedBus::new();
//! sim.set_register(Tmp1075::DEFAULT_ADDRESS, 0x00, &[0x19, 0x00]);
//! let bus = SharedBus::create(sim)?;
//!
//! let temp = Tmp1075::create(bus.lease(Tmp1075::DEFAULT_ADDRESS)?)?;
//! let channels: Vec<Box<dyn Channel>> = vec![Box::new(SensorChannel::new("temp", temp))];
//! let publisher = TelemetryPublisher::start(channels, DEFAULT_PERIOD)?;
//!
//! let snapshot = publisher.wait_for_newer(0);
//! assert_eq!(snapshot.version, 1);
//! # Ok::<(), flight_computer::Failure>(())
//! ```
//!
//! ## Architecture
//!
//! - [`outcome`] - Failure taxonomy and the `Outcome` result type
//! - [`codec`] - Register value encoding
//! - [`bus`] - Shared bus, leased devices and transports
//! - [`sensors`] - Sensor drivers
//! - [`telemetry`] - Snapshot publisher
//! - [`storage`] - File storage
//! - [`logger`] - CSV flight log
//! - [`computer`] - Snapshot-to-log loop
//! - [`config`] - JSON configuration

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::float_cmp)]

extern crate alloc;

pub mod bus;
pub mod codec;
pub mod computer;
pub mod config;
pub mod logger;
pub mod outcome;
pub mod sensors;
pub mod storage;
pub mod telemetry;

// Re-export main public types for convenience
pub use bus::{BusDevice, SharedBus};
pub use computer::FlightComputer;
pub use config::FlightConfig;
pub use outcome::{Failure, FailureKind, OrAbort, Outcome};
pub use telemetry::{TelemetryPublisher, TelemetryReader, TelemetrySnapshot};
