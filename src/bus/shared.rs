use super::{Transport, MAX_ADDRESS};
use crate::codec::{Endianness, RegisterValue};
use crate::outcome::{Failure, Outcome};
use alloc::sync::Arc;
use core::time::Duration;
use heapless::FnvIndexSet;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Per-transaction timeout handed to every leased device.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

// One slot per 7-bit address, so an insert can never run out of room.
const ADDRESS_SLOTS: usize = 128;

type LeasedSet = FnvIndexSet<u8, ADDRESS_SLOTS>;

/// The single physical bus, shared by every device leased from it.
///
/// Devices hold an `Arc` back to the bus, so the transport is only released
/// once the bus handle and every device are gone. The leased-address set has
/// its own lock: leasing and releasing are safe from any thread.
pub struct SharedBus {
    transport: Mutex<Box<dyn Transport>>,
    leased: Mutex<LeasedSet>,
    device_timeout: Duration,
}

impl SharedBus {
    pub fn create(transport: impl Transport + 'static) -> Outcome<Arc<Self>> {
        Self::with_timeout(transport, DEFAULT_TIMEOUT)
    }

    /// Bus whose transactions are each given `device_timeout`.
    ///
    /// The timeout is passed to the transport on every call. [`SimulatedBus`]
    /// honours it. [`HalBus`] cannot interrupt a blocking `embedded-hal`
    /// transaction, so on hardware the adapter's own timeout applies and
    /// `device_timeout` only labels the failures it reports.
    ///
    /// [`SimulatedBus`]: super::SimulatedBus
    /// [`HalBus`]: super::HalBus
    pub fn with_timeout(
        transport: impl Transport + 'static,
        device_timeout: Duration,
    ) -> Outcome<Arc<Self>> {
        if device_timeout.is_zero() {
            return Err(Failure::invalid_argument("device timeout must be non-zero"));
        }

        info!(timeout = ?device_timeout, "bus initialised");
        Ok(Arc::new(Self {
            transport: Mutex::new(Box::new(transport)),
            leased: Mutex::new(LeasedSet::new()),
            device_timeout,
        }))
    }

    /// Claim exclusive use of `address`.
    ///
    /// Fails with `AlreadyInUse` while another [`BusDevice`] holds the address.
    pub fn lease(self: &Arc<Self>, address: u8) -> Outcome<BusDevice> {
        if address > MAX_ADDRESS {
            return Err(Failure::invalid_argument(alloc::format!(
                "address 0x{address:02x} is not a 7-bit address"
            )));
        }

        let inserted = self
            .leased()
            .insert(address)
            .map_err(|_| Failure::resource_exhausted("leased address table is full"))?;
        if !inserted {
            return Err(Failure::already_in_use(alloc::format!(
                "address 0x{address:02x} is already leased"
            )));
        }

        debug!(address = format_args!("0x{address:02x}"), "leased bus address");
        Ok(BusDevice {
            bus: Arc::clone(self),
            address,
            timeout: self.device_timeout,
        })
    }

    pub fn is_leased(&self, address: u8) -> bool {
        self.leased().contains(&address)
    }

    pub fn leased_addresses(&self) -> alloc::vec::Vec<u8> {
        let mut addresses: alloc::vec::Vec<u8> = self.leased().iter().copied().collect();
        addresses.sort_unstable();
        addresses
    }

    pub fn device_timeout(&self) -> Duration {
        self.device_timeout
    }

    fn release(&self, address: u8) {
        self.leased().remove(&address);
        debug!(address = format_args!("0x{address:02x}"), "released bus address");
    }

    fn leased(&self) -> MutexGuard<'_, LeasedSet> {
        self.leased.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transport(&self) -> MutexGuard<'_, Box<dyn Transport>> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl core::fmt::Debug for SharedBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedBus")
            .field("leased", &self.leased_addresses())
            .field("device_timeout", &self.device_timeout)
            .finish_non_exhaustive()
    }
}

/// Exclusive handle to one address on a [`SharedBus`].
///
/// Not `Clone`: a second handle to the same address would let two subsystems
/// interleave writes to one device. Dropping the handle frees the address.
#[derive(Debug)]
pub struct BusDevice {
    bus: Arc<SharedBus>,
    address: u8,
    timeout: Duration,
}

impl BusDevice {
    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn bus(&self) -> &Arc<SharedBus> {
        &self.bus
    }

    /// One write-then-read transaction.
    pub fn write_read(&self, write: &[u8], read: &mut [u8]) -> Outcome<()> {
        self.bus
            .transport()
            .write_read(self.address, write, read, self.timeout)?;
        Ok(())
    }

    pub fn write(&self, write: &[u8]) -> Outcome<()> {
        self.bus.transport().write(self.address, write, self.timeout)?;
        Ok(())
    }

    /// Select `register`, then read and decode `T::WIDTH` bytes.
    pub fn read_register<T: RegisterValue>(
        &self,
        register: impl Into<u8>,
        endianness: Endianness,
    ) -> Outcome<T> {
        let mut buffer = T::Bytes::default();
        self.write_read(&[register.into()], buffer.as_mut())?;
        Ok(T::decode(buffer, endianness))
    }

    pub fn read_be_register<T: RegisterValue>(&self, register: impl Into<u8>) -> Outcome<T> {
        self.read_register(register, Endianness::Big)
    }

    pub fn read_le_register<T: RegisterValue>(&self, register: impl Into<u8>) -> Outcome<T> {
        self.read_register(register, Endianness::Little)
    }

    /// Send `[register, ..encoded value]` as a single transaction.
    pub fn write_register<T: RegisterValue>(
        &self,
        register: impl Into<u8>,
        value: T,
        endianness: Endianness,
    ) -> Outcome<()> {
        // Widest register is 8 bytes, plus the selector.
        let mut frame = heapless::Vec::<u8, 9>::from_slice(&[register.into()])
            .map_err(|()| Failure::resource_exhausted("register frame has no room"))?;
        frame
            .extend_from_slice(value.encode(endianness).as_ref())
            .map_err(|()| Failure::invalid_argument("register value wider than 8 bytes"))?;
        self.write(&frame)
    }

    pub fn write_be_register<T: RegisterValue>(
        &self,
        register: impl Into<u8>,
        value: T,
    ) -> Outcome<()> {
        self.write_register(register, value, Endianness::Big)
    }

    pub fn write_le_register<T: RegisterValue>(
        &self,
        register: impl Into<u8>,
        value: T,
    ) -> Outcome<()> {
        self.write_register(register, value, Endianness::Little)
    }
}

impl Drop for BusDevice {
    fn drop(&mut self) {
        self.bus.release(self.address);
    }
}

static_assertions::assert_not_impl_any!(BusDevice: Clone, Copy);
static_assertions::assert_impl_all!(BusDevice: Send, Sync);
static_assertions::assert_impl_all!(SharedBus: Send, Sync);
