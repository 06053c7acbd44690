pub mod hal;
pub mod shared;
pub mod simulated;

pub use hal::HalBus;
pub use shared::{BusDevice, SharedBus, DEFAULT_TIMEOUT};
pub use simulated::{SimulatedBus, SimulatedFault, SimulatedFaultConfig, SimulationStats};

use crate::outcome::{Failure, FailureKind};
use core::time::Duration;
use thiserror::Error;

/// Highest 7-bit bus address.
pub const MAX_ADDRESS: u8 = 0x7F;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no response from 0x{address:02x} within {timeout:?}")]
    Timeout { address: u8, timeout: Duration },
    #[error("bus fault talking to 0x{address:02x} (code {code})")]
    Bus { address: u8, code: i32 },
    #[error("transferred {actual} of {expected} bytes with 0x{address:02x}")]
    Short {
        address: u8,
        expected: usize,
        actual: usize,
    },
}

impl From<TransportError> for Failure {
    fn from(error: TransportError) -> Self {
        let message = error.to_string();
        match error {
            TransportError::Timeout { .. } => Failure::timeout(message),
            TransportError::Bus { code, .. } => {
                Failure::new(FailureKind::IoError, message).with_code(code)
            }
            TransportError::Short { .. } => Failure::new(FailureKind::ShortTransfer, message),
        }
    }
}

/// The physical bus as seen by [`SharedBus`].
///
/// Each call is a single blocking transaction and nothing is retried.
/// Implementations that can bound a transaction give up after `timeout` and
/// report [`TransportError::Timeout`]. Those that cannot, such as [`HalBus`],
/// rely on the driver's own timeout and only quote `timeout` in the error.
pub trait Transport: Send {
    /// Write `write` to the device, then read exactly `read.len()` bytes back.
    fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
        timeout: Duration,
    ) -> Result<(), TransportError>;

    fn write(&mut self, address: u8, write: &[u8], timeout: Duration) -> Result<(), TransportError>;
}
