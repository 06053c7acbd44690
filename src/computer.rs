//! The consumer side of the flight computer: every new telemetry snapshot
//! becomes one line in the flight log.

use crate::config::StorageConfig;
use crate::logger::FlightLog;
use crate::outcome::{Failure, Outcome};
use crate::storage::Storage;
use crate::telemetry::{TelemetryReader, TelemetrySnapshot};
use core::time::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// How long one step waits for a snapshot before checking the run flags again.
pub const WAIT_SLICE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputerState {
    pub running: bool,
    pub last_version: u64,
    pub records: u64,
    pub append_failures: u64,
    /// Snapshots published while the previous record was being written.
    pub skipped_versions: u64,
    pub last_error: Option<Failure>,
}

#[derive(Debug)]
pub struct FlightComputer<S> {
    reader: TelemetryReader,
    log: FlightLog<S>,
    state: ComputerState,
}

impl<S: Storage> FlightComputer<S> {
    /// Create the data file and write its header.
    pub fn init(reader: TelemetryReader, storage: S, config: &StorageConfig) -> Outcome<Self> {
        let log = FlightLog::create_with(
            storage,
            reader.layout(),
            config.max_data_files,
            &config.fallback_file_name,
        )?;

        Ok(Self {
            reader,
            log,
            state: ComputerState {
                running: true,
                ..ComputerState::default()
            },
        })
    }

    /// Wait up to `timeout` for a snapshot newer than the last one logged and
    /// append it.
    ///
    /// Returns the logged version, or `None` when nothing new arrived. An
    /// append failure is returned after the version has been consumed, so the
    /// same snapshot is never written twice.
    pub fn step(&mut self, timeout: Duration) -> Outcome<Option<u64>> {
        let Some(snapshot) = self
            .reader
            .wait_for_newer_timeout(self.state.last_version, timeout)
        else {
            return Ok(None);
        };

        self.consume(&snapshot);
        match self.log.append(&snapshot) {
            Ok(()) => {
                self.state.records += 1;
                Ok(Some(snapshot.version))
            }
            Err(failure) => {
                self.state.append_failures += 1;
                self.state.last_error = Some(failure.clone());
                Err(failure)
            }
        }
    }

    /// Log snapshots until `cycles` have been handled, [`FlightComputer::stop`]
    /// is called or the publisher stops. `None` runs without a limit.
    ///
    /// Append failures are logged and skipped. Returns the number of records
    /// written by this call.
    pub fn process(&mut self, cycles: Option<u64>) -> u64 {
        let written_before = self.state.records;
        let mut handled = 0_u64;

        while self.state.running && cycles.map_or(true, |limit| handled < limit) {
            match self.step(WAIT_SLICE) {
                Ok(Some(version)) => {
                    handled += 1;
                    debug!(version, "record appended");
                }
                Ok(None) => {
                    if !self.reader.is_running() {
                        info!("telemetry stopped, ending flight log");
                        break;
                    }
                }
                Err(failure) => {
                    handled += 1;
                    warn!(
                        kind = ?failure.kind,
                        file = self.log.file_name(),
                        "append failed: {}",
                        failure.message
                    );
                }
            }
        }

        self.state.records - written_before
    }

    pub fn stop(&mut self) {
        self.state.running = false;
        info!(records = self.state.records, "flight computer stopping");
    }

    pub fn state(&self) -> &ComputerState {
        &self.state
    }

    pub fn log(&self) -> &FlightLog<S> {
        &self.log
    }

    pub fn reader(&self) -> &TelemetryReader {
        &self.reader
    }

    fn consume(&mut self, snapshot: &TelemetrySnapshot) {
        let skipped = snapshot.version - self.state.last_version - 1;
        if skipped > 0 && self.state.last_version > 0 {
            self.state.skipped_versions += skipped;
            debug!(skipped, version = snapshot.version, "logger fell behind");
        }
        self.state.last_version = snapshot.version;
    }
}
