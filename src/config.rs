//! Run-time configuration, loaded from JSON.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. Missing file sections fall back to the flight defaults below.

use crate::bus::{SimulatedFaultConfig, DEFAULT_TIMEOUT};
use crate::logger::{DEFAULT_MAX_DATA_FILES, FALLBACK_FILE_NAME};
use crate::outcome::{Failure, Outcome};
use crate::telemetry::DEFAULT_PERIOD;
use alloc::string::String;
use core::time::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

const DEFAULT_FREQUENCY_HZ: u32 = 100_000;
const DEFAULT_MOUNT_POINT: &str = "/sdcard";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Linux i2c-dev node; the simulated bus is used when unset.
    pub device: Option<String>,
    pub frequency_hz: u32,
    pub timeout_ms: u64,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: None,
            frequency_hz: DEFAULT_FREQUENCY_HZ,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl BusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub period_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            period_ms: DEFAULT_PERIOD.as_millis() as u64,
        }
    }
}

impl TelemetryConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub mount_point: String,
    pub max_data_files: u32,
    pub fallback_file_name: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            mount_point: DEFAULT_MOUNT_POINT.into(),
            max_data_files: DEFAULT_MAX_DATA_FILES,
            fallback_file_name: FALLBACK_FILE_NAME.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightConfig {
    pub bus: BusConfig,
    pub telemetry: TelemetryConfig,
    pub storage: StorageConfig,
    pub simulation: SimulatedFaultConfig,
}

impl FlightConfig {
    pub fn load(path: impl AsRef<Path>) -> Outcome<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json(&text)?;
        tracing::debug!(path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Outcome<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| Failure::invalid_argument(alloc::format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the bus and publisher cannot run with.
    pub fn validate(&self) -> Outcome<()> {
        if self.bus.timeout_ms == 0 {
            return Err(Failure::invalid_argument("bus.timeout_ms must be non-zero"));
        }
        if self.telemetry.period_ms == 0 {
            return Err(Failure::invalid_argument("telemetry.period_ms must be non-zero"));
        }
        if !(0.0..=100.0).contains(&self.simulation.fault_rate_percent) {
            return Err(Failure::invalid_argument(
                "simulation.fault_rate_percent must be within 0..=100",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::FailureKind;

    #[test]
    fn test_defaults_match_flight_constants() {
        let config = FlightConfig::default();
        assert_eq!(config.bus.timeout(), Duration::from_millis(1000));
        assert_eq!(config.bus.frequency_hz, 100_000);
        assert_eq!(config.telemetry.period(), Duration::from_millis(50));
        assert_eq!(config.storage.mount_point, "/sdcard");
        assert_eq!(config.storage.max_data_files, 1000);
        assert_eq!(config.storage.fallback_file_name, "data.csv");
        assert!(!config.simulation.enabled);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = FlightConfig::from_json(r#"{"telemetry": {"period_ms": 20}}"#).unwrap();
        assert_eq!(config.telemetry.period_ms, 20);
        assert_eq!(config.bus, BusConfig::default());
        assert_eq!(config.storage, StorageConfig::default());
    }

    #[test]
    fn test_invalid_json_is_invalid_argument() {
        let failure = FlightConfig::from_json("{ not json").unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidArgument);

        let failure = FlightConfig::from_json(r#"{"bus": {"timeout_ms": 0}}"#).unwrap_err();
        assert_eq!(failure.kind, FailureKind::InvalidArgument);
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let failure = FlightConfig::load("/nonexistent/flight.json").unwrap_err();
        assert_eq!(failure.kind, FailureKind::NotFound);
    }
}
