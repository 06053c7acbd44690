//! In-process bus with scripted register maps and fault injection.
//!
//! Used by the test suite and by the desktop build of the flight computer.
//! The handle is cheap to clone; every clone drives the same simulated bus,
//! so a test can keep one clone to script faults after handing another to
//! [`SharedBus`](super::SharedBus).

use super::{Transport, TransportError};
use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

// Fault type probability weights (must sum to 100)
const TIMEOUT_WEIGHT: u8 = 60;
const BUS_ERROR_WEIGHT: u8 = 40;

/// Code reported for injected bus faults, mirroring an `EIO` from the driver.
pub const INJECTED_BUS_ERROR_CODE: i32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimulatedFault {
    /// The device does not answer; the caller waits out its timeout.
    Timeout,
    /// The transaction fails on the wire with the given code.
    BusError(i32),
    /// The device answers with fewer bytes than requested.
    ShortRead(usize),
}

/// Random fault injection across all attached devices.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedFaultConfig {
    pub enabled: bool,
    pub fault_rate_percent: f32,
    pub timeout_weight: u8,
    pub bus_error_weight: u8,
    pub seed: u64,
}

impl Default for SimulatedFaultConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            fault_rate_percent: 1.0,
            timeout_weight: TIMEOUT_WEIGHT,
            bus_error_weight: BUS_ERROR_WEIGHT,
            seed: 0x1234_5678_9ABC_DEF0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationStats {
    pub transactions: u64,
    pub scripted_faults: u32,
    pub injected_timeouts: u32,
    pub injected_bus_errors: u32,
    pub unanswered: u32,
}

#[derive(Debug, Default)]
struct SimulatedDevice {
    registers: BTreeMap<u8, Vec<u8>>,
    writes: Vec<Vec<u8>>,
    pending_faults: VecDeque<SimulatedFault>,
    latency: Duration,
}

#[derive(Debug)]
struct BusState {
    devices: BTreeMap<u8, SimulatedDevice>,
    config: SimulatedFaultConfig,
    stats: SimulationStats,
    rng_state: u64,
}

#[derive(Debug, Clone)]
pub struct SimulatedBus {
    state: Arc<Mutex<BusState>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::new_with_config(SimulatedFaultConfig::default())
    }

    pub fn new_with_config(config: SimulatedFaultConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                devices: BTreeMap::new(),
                rng_state: config.seed,
                config,
                stats: SimulationStats::default(),
            })),
        }
    }

    /// Make a device answer at `address`. Unattached addresses never respond.
    pub fn attach(&self, address: u8) {
        self.lock().devices.entry(address).or_default();
    }

    pub fn detach(&self, address: u8) {
        self.lock().devices.remove(&address);
    }

    /// Set the bytes returned when `register` is read. Reads longer than the
    /// stored value are zero-filled.
    pub fn set_register(&self, address: u8, register: u8, bytes: &[u8]) {
        self.lock()
            .devices
            .entry(address)
            .or_default()
            .registers
            .insert(register, bytes.to_vec());
    }

    pub fn register(&self, address: u8, register: u8) -> Option<Vec<u8>> {
        self.lock()
            .devices
            .get(&address)
            .and_then(|device| device.registers.get(&register).cloned())
    }

    /// Every frame written to `address`, selector byte included.
    pub fn writes(&self, address: u8) -> Vec<Vec<u8>> {
        self.lock()
            .devices
            .get(&address)
            .map(|device| device.writes.clone())
            .unwrap_or_default()
    }

    /// Fail the next transaction with `address` with `fault`. Faults queue up.
    pub fn inject_fault(&self, address: u8, fault: SimulatedFault) {
        self.lock()
            .devices
            .entry(address)
            .or_default()
            .pending_faults
            .push_back(fault);
    }

    pub fn clear_faults(&self, address: Option<u8>) {
        let mut state = self.lock();
        match address {
            Some(address) => {
                if let Some(device) = state.devices.get_mut(&address) {
                    device.pending_faults.clear();
                }
            }
            None => {
                for device in state.devices.values_mut() {
                    device.pending_faults.clear();
                }
            }
        }
    }

    /// Delay every transaction with `address`. A latency above the caller's
    /// timeout turns into a timeout after waiting the full timeout.
    pub fn set_latency(&self, address: u8, latency: Duration) {
        self.lock().devices.entry(address).or_default().latency = latency;
    }

    pub fn update_config(&self, config: SimulatedFaultConfig) {
        let mut state = self.lock();
        state.rng_state = config.seed;
        state.config = config;
    }

    pub fn set_fault_injection_enabled(&self, enabled: bool) {
        self.lock().config.enabled = enabled;
    }

    pub fn stats(&self) -> SimulationStats {
        self.lock().stats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Common prologue: answer, latency and faults. Returns the number of
    /// bytes the device will deliver on a short read.
    fn begin(&self, address: u8, timeout: Duration) -> Result<Option<usize>, TransportError> {
        let (latency, fault) = {
            let mut state = self.lock();
            state.stats.transactions += 1;

            if !state.devices.contains_key(&address) {
                state.stats.unanswered += 1;
                drop(state);
                std::thread::sleep(timeout.min(Duration::from_millis(1)));
                return Err(TransportError::Timeout { address, timeout });
            }

            let scripted = state
                .devices
                .get_mut(&address)
                .and_then(|device| device.pending_faults.pop_front());
            let fault = match scripted {
                Some(fault) => {
                    state.stats.scripted_faults += 1;
                    Some(fault)
                }
                None => state.random_fault(),
            };
            let latency = state.devices.get(&address).map(|d| d.latency).unwrap_or_default();
            (latency, fault)
        };

        if latency > timeout {
            std::thread::sleep(timeout);
            return Err(TransportError::Timeout { address, timeout });
        }
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }

        match fault {
            None => Ok(None),
            Some(SimulatedFault::Timeout) => Err(TransportError::Timeout { address, timeout }),
            Some(SimulatedFault::BusError(code)) => Err(TransportError::Bus { address, code }),
            Some(SimulatedFault::ShortRead(delivered)) => Ok(Some(delivered)),
        }
    }
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusState {
    fn random_fault(&mut self) -> Option<SimulatedFault> {
        if !self.config.enabled {
            return None;
        }
        if self.random_float() >= self.config.fault_rate_percent / 100.0 {
            return None;
        }

        let total_weight = u16::from(self.config.timeout_weight) + u16::from(self.config.bus_error_weight);
        if total_weight == 0 {
            return None;
        }

        let normalized = u16::from(self.random_u8()) * total_weight / 255;
        if normalized < u16::from(self.config.timeout_weight) {
            self.stats.injected_timeouts += 1;
            Some(SimulatedFault::Timeout)
        } else {
            self.stats.injected_bus_errors += 1;
            Some(SimulatedFault::BusError(INJECTED_BUS_ERROR_CODE))
        }
    }

    // Linear Congruential Generator, Numerical Recipes parameters
    fn next_random(&mut self) -> u64 {
        self.rng_state = self.rng_state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.rng_state
    }

    fn random_u8(&mut self) -> u8 {
        (self.next_random() >> 24) as u8
    }

    fn random_float(&mut self) -> f32 {
        (self.next_random() as f32) / (u64::MAX as f32)
    }
}

impl Transport for SimulatedBus {
    fn write_read(
        &mut self,
        address: u8,
        write: &[u8],
        read: &mut [u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        let short = self.begin(address, timeout)?;

        let mut state = self.lock();
        let Some(device) = state.devices.get_mut(&address) else {
            return Err(TransportError::Timeout { address, timeout });
        };

        read.fill(0);
        if let Some(&register) = write.first() {
            if write.len() > 1 {
                device.writes.push(write.to_vec());
            }
            if let Some(stored) = device.registers.get(&register) {
                let count = stored.len().min(read.len());
                read[..count].copy_from_slice(&stored[..count]);
            }
        }

        match short {
            Some(delivered) if delivered < read.len() => Err(TransportError::Short {
                address,
                expected: read.len(),
                actual: delivered,
            }),
            _ => Ok(()),
        }
    }

    fn write(&mut self, address: u8, write: &[u8], timeout: Duration) -> Result<(), TransportError> {
        let short = self.begin(address, timeout)?;

        let mut state = self.lock();
        let Some(device) = state.devices.get_mut(&address) else {
            return Err(TransportError::Timeout { address, timeout });
        };

        if let Some(delivered) = short.filter(|&delivered| delivered < write.len()) {
            return Err(TransportError::Short {
                address,
                expected: write.len(),
                actual: delivered,
            });
        }

        device.writes.push(write.to_vec());
        if let Some((&register, payload)) = write.split_first() {
            if !payload.is_empty() {
                device.registers.insert(register, payload.to_vec());
            }
        }
        Ok(())
    }
}
