use flight_computer::bus::{SimulatedBus, SimulatedFaultConfig};
use flight_computer::config::StorageConfig;
use flight_computer::sensors::{Bmp581, SensorChannel, SensorDriver, Tmp1075};
use flight_computer::storage::FsStorage;
use flight_computer::telemetry::{Channel, PublisherState};
use flight_computer::*;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use temp_dir::TempDir;

const HEADER: &str = "version,baro_temp_c,baro_pressure_pa,temp_temp_c";

fn vehicle_bus(sim: &SimulatedBus) -> Arc<SharedBus> {
    sim.set_register(Bmp581::ADDRESS_1, 0x01, &[0x50]);
    sim.set_register(Bmp581::ADDRESS_1, 0x27, &[0x10]);
    sim.set_register(Bmp581::ADDRESS_1, 0x28, &[0x06]);
    sim.set_register(Bmp581::ADDRESS_1, 0x1D, &[0x00, 0x80, 0x15, 0x00]);
    sim.set_register(Bmp581::ADDRESS_1, 0x20, &[0x40, 0xF3, 0x62, 0x00]);
    sim.set_register(Tmp1075::DEFAULT_ADDRESS, 0x00, &[0x15, 0x80]);
    SharedBus::with_timeout(sim.clone(), Duration::from_millis(5)).unwrap()
}

fn vehicle_channels(bus: &Arc<SharedBus>) -> Vec<Box<dyn Channel>> {
    let baro = Bmp581::create(bus.lease(Bmp581::ADDRESS_1).unwrap()).unwrap();
    let temp = Tmp1075::create(bus.lease(Tmp1075::DEFAULT_ADDRESS).unwrap()).unwrap();
    vec![
        Box::new(SensorChannel::new("baro", baro)),
        Box::new(SensorChannel::new("temp", temp)),
    ]
}

fn versions(contents: &str) -> Vec<u64> {
    contents
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap().parse().unwrap())
        .collect()
}

#[test]
fn test_sensors_to_csv() {
    let dir = TempDir::new().unwrap();
    let sim = SimulatedBus::new();
    let bus = vehicle_bus(&sim);

    let mut publisher =
        TelemetryPublisher::start(vehicle_channels(&bus), Duration::from_millis(2)).unwrap();
    let storage = FsStorage::mount(dir.path()).unwrap();
    let mut computer =
        FlightComputer::init(publisher.reader(), storage, &StorageConfig::default()).unwrap();

    assert_eq!(computer.process(Some(5)), 5);
    computer.stop();
    publisher.stop();

    let contents = fs::read_to_string(dir.path().join("data0.csv")).unwrap();
    let mut lines = contents.lines();
    assert_eq!(lines.next(), Some(HEADER));
    for line in lines {
        let (_, values) = line.split_once(',').unwrap();
        assert_eq!(values, "21.5,101325,21.5");
    }

    // One line per distinct snapshot, oldest first.
    let versions = versions(&contents);
    assert_eq!(versions.len(), 5);
    assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));

    let state = computer.state();
    assert!(!state.running);
    assert_eq!(state.records, 5);
    assert_eq!(state.last_version, *versions.last().unwrap());
    assert!(state.last_error.is_none());
}

#[test]
fn test_failing_sensors_leave_gaps_not_stale_values() {
    let dir = TempDir::new().unwrap();
    let sim = SimulatedBus::new();
    let bus = vehicle_bus(&sim);
    let channels = vehicle_channels(&bus);

    // Every transaction from here on fails.
    sim.update_config(SimulatedFaultConfig {
        enabled: true,
        fault_rate_percent: 100.0,
        ..SimulatedFaultConfig::default()
    });

    let mut publisher = TelemetryPublisher::start(channels, Duration::from_millis(2)).unwrap();
    let mut computer = FlightComputer::init(
        publisher.reader(),
        FsStorage::mount(dir.path()).unwrap(),
        &StorageConfig::default(),
    )
    .unwrap();

    assert_eq!(computer.process(Some(3)), 3);
    publisher.stop();

    let contents = fs::read_to_string(dir.path().join("data0.csv")).unwrap();
    for line in contents.lines().skip(1) {
        let (_, values) = line.split_once(',').unwrap();
        assert_eq!(values, ",,");
    }

    let stats = publisher.stats();
    assert!(stats.channels.iter().all(|channel| channel.samples == channel.failures));
    assert_eq!(publisher.state(), PublisherState::Stopped);
}

#[test]
fn test_previous_flights_are_kept() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("data0.csv"), "flight one\n").unwrap();

    let sim = SimulatedBus::new();
    let bus = vehicle_bus(&sim);
    let mut publisher =
        TelemetryPublisher::start(vehicle_channels(&bus), Duration::from_millis(2)).unwrap();
    let mut computer = FlightComputer::init(
        publisher.reader(),
        FsStorage::mount(dir.path()).unwrap(),
        &StorageConfig::default(),
    )
    .unwrap();
    assert_eq!(computer.log().file_name(), "data1.csv");

    computer.process(Some(1));
    publisher.stop();

    assert_eq!(fs::read_to_string(dir.path().join("data0.csv")).unwrap(), "flight one\n");
    let contents = fs::read_to_string(dir.path().join("data1.csv")).unwrap();
    assert_eq!(contents.lines().count(), 2);
}

#[test]
fn test_configuration_file_drives_the_run() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("sdcard");
    let config_path = dir.path().join("flight.json");
    fs::write(
        &config_path,
        format!(
            r#"{{
                "telemetry": {{ "period_ms": 3 }},
                "storage": {{ "mount_point": {:?}, "max_data_files": 2, "fallback_file_name": "overflow.csv" }}
            }}"#,
            data_dir.display().to_string()
        ),
    )
    .unwrap();

    let config = FlightConfig::load(&config_path).unwrap();
    config.validate().unwrap();
    assert_eq!(config.telemetry.period(), Duration::from_millis(3));

    let storage = FsStorage::mount(&config.storage.mount_point).unwrap();
    fs::write(data_dir.join("data0.csv"), "").unwrap();
    fs::write(data_dir.join("data1.csv"), "").unwrap();

    let sim = SimulatedBus::new();
    let bus = vehicle_bus(&sim);
    let mut publisher =
        TelemetryPublisher::start(vehicle_channels(&bus), config.telemetry.period()).unwrap();
    let mut computer = FlightComputer::init(publisher.reader(), storage, &config.storage).unwrap();
    assert_eq!(computer.log().file_name(), "overflow.csv");

    assert_eq!(computer.process(Some(2)), 2);
    publisher.stop();
    assert!(data_dir.join("overflow.csv").exists());
}

#[test]
fn test_stopping_releases_every_sensor() {
    let sim = SimulatedBus::new();
    let bus = vehicle_bus(&sim);
    let publisher =
        TelemetryPublisher::start(vehicle_channels(&bus), Duration::from_millis(2)).unwrap();
    assert_eq!(bus.leased_addresses(), vec![Bmp581::ADDRESS_1, Tmp1075::DEFAULT_ADDRESS]);

    drop(publisher);
    assert!(bus.leased_addresses().is_empty());

    // Addresses can be leased again by a fresh set of drivers.
    let channels = vehicle_channels(&bus);
    assert_eq!(channels.len(), 2);
}
