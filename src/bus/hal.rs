//! [`Transport`] over any `embedded-hal` 1.0 blocking I2C implementation.

use super::{Transport, TransportError};
use core::time::Duration;
use embedded_hal::i2c::{Error as _, ErrorKind, I2c, NoAcknowledgeSource};

// Stable codes for `TransportError::Bus`, one per `ErrorKind`.
const CODE_BUS: i32 = 1;
const CODE_ARBITRATION_LOSS: i32 = 2;
const CODE_OVERRUN: i32 = 3;
const CODE_DATA_NACK: i32 = 4;
const CODE_OTHER: i32 = -1;

/// Adapts an `embedded_hal::i2c::I2c` bus.
///
/// `embedded-hal` transactions block until the driver gives up, so the
/// per-device timeout is not enforced here. On Linux the i2c-dev adapter's
/// own timeout bounds each transfer; the per-device value only labels the
/// [`TransportError::Timeout`] reported for an address NACK. Every other
/// error is a bus fault.
#[derive(Debug)]
pub struct HalBus<I> {
    i2c: I,
}

impl<I: I2c> HalBus<I> {
    pub fn new(i2c: I) -> Self {
        Self { i2c }
    }

    pub fn into_inner(self) -> I {
        self.i2c
    }

    fn map_error(address: u8, timeout: Duration, kind: ErrorKind) -> TransportError {
        let code = match kind {
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address | NoAcknowledgeSource::Unknown) => {
                return TransportError::Timeout { address, timeout };
            }
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data) => CODE_DATA_NACK,
            ErrorKind::Bus => CODE_BUS,
            ErrorKind::ArbitrationLoss => CODE_ARBITRATION_LOSS,
            ErrorKind::Overrun => CODE_OVERRUN,
            _ => CODE_OTHER,
        };
        TransportError::Bus { address, code }
    }
}

#[cfg(feature = "linux-hal")]
impl HalBus<linux_embedded_hal::I2cdev> {
    /// Open a Linux i2c-dev character device such as `/dev/i2c-1`.
    pub fn open(path: impl AsRef<std::path::Path>) -> crate::outcome::Outcome<Self> {
        let path = path.as_ref();
        let i2c = linux_embedded_hal::I2cdev::new(path).map_err(|e| {
            crate::outcome::Failure::hardware_fault(alloc::format!(
                "could not open {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::new(i2c))
    }
}

impl<I: I2c + Send> Transport for HalBus<I> {
    fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.i2c
            .write_read(address, write, read)
            .map_err(|e| Self::map_error(address, timeout, e.kind()))
    }

    fn write(&mut self, address: u8, write: &[u8], timeout: Duration) -> Result<(), TransportError> {
        self.i2c
            .write(address, write)
            .map_err(|e| Self::map_error(address, timeout, e.kind()))
    }
}
