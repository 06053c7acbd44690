use clap::{App, Arg};
use colored::*;
use flight_computer::bus::{SharedBus, SimulatedBus};
use flight_computer::config::FlightConfig;
use flight_computer::outcome::{OrAbort, Outcome};
use flight_computer::sensors::{
    Adxl375, Bmi323, Bmp581, Mlx90395, SensorChannel, SensorDriver, Tmp1075,
};
use flight_computer::storage::FsStorage;
use flight_computer::telemetry::{Channel, TelemetryPublisher};
use flight_computer::FlightComputer;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = App::new("flight-computer")
        .version("0.1.0")
        .author("Flight Software Team")
        .about("🚀 Flight computer - samples the sensor bus and logs telemetry to CSV")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("data-dir")
                .short("d")
                .long("data-dir")
                .value_name("DIR")
                .help("Directory the data files are written to (overrides storage.mount_point)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("cycles")
                .short("n")
                .long("cycles")
                .value_name("COUNT")
                .help("Stop after logging this many snapshots (default: run forever)")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(_) => Ok(()),
                    Err(_) => Err("Cycle count must be a valid number".into()),
                }),
        )
        .arg(
            Arg::with_name("period-ms")
                .short("p")
                .long("period-ms")
                .value_name("MS")
                .help("Telemetry publish period in milliseconds")
                .takes_value(true)
                .validator(|v| match v.parse::<u64>() {
                    Ok(0) | Err(_) => Err("Period must be a positive number".into()),
                    Ok(_) => Ok(()),
                }),
        )
        .arg(
            Arg::with_name("i2c-dev")
                .long("i2c-dev")
                .value_name("PATH")
                .help("Linux i2c-dev node, e.g. /dev/i2c-1 (requires the linux-hal feature)")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("fault-rate")
                .long("fault-rate")
                .value_name("PERCENT")
                .help("Inject random faults on the simulated bus")
                .takes_value(true)
                .validator(|v| match v.parse::<f32>() {
                    Ok(rate) if (0.0..=100.0).contains(&rate) => Ok(()),
                    _ => Err("Fault rate must be between 0 and 100".into()),
                }),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .help("Enable debug logging"),
        )
        .get_matches();

    let default_level = if matches.is_present("verbose") { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    println!("{}", "🚀 Flight Computer".bright_cyan().bold());
    println!("{}", "==================".bright_cyan());

    let mut config = match matches.value_of("config") {
        Some(path) => FlightConfig::load(path).or_abort("loading configuration"),
        None => FlightConfig::default(),
    };
    if let Some(dir) = matches.value_of("data-dir") {
        config.storage.mount_point = dir.into();
    }
    if let Some(period) = matches.value_of("period-ms") {
        config.telemetry.period_ms = period.parse()?;
    }
    if let Some(device) = matches.value_of("i2c-dev") {
        config.bus.device = Some(device.into());
    }
    if let Some(rate) = matches.value_of("fault-rate") {
        config.simulation.enabled = true;
        config.simulation.fault_rate_percent = rate.parse()?;
    }
    config.validate().or_abort("validating configuration");
    let cycles = matches.value_of("cycles").map(str::parse::<u64>).transpose()?;

    let bus = open_bus(&config).or_abort("opening the sensor bus");
    let channels = create_channels(&bus);
    println!("   Sensors: {} {}", channels.len(), "✓".green());

    let mut publisher =
        TelemetryPublisher::start(channels, config.telemetry.period()).or_abort("starting telemetry");
    let storage = FsStorage::mount(&config.storage.mount_point).or_abort("mounting storage");
    let mut computer = FlightComputer::init(publisher.reader(), storage, &config.storage)
        .or_abort("creating the flight log");

    println!(
        "📝 Logging to {}",
        computer
            .log()
            .storage()
            .root()
            .join(computer.log().file_name())
            .display()
            .to_string()
            .bright_white()
    );

    let written = computer.process(cycles);
    computer.stop();
    publisher.stop();

    print_summary(written, &publisher);
    Ok(())
}

fn open_bus(config: &FlightConfig) -> Outcome<Arc<SharedBus>> {
    let timeout = config.bus.timeout();
    match &config.bus.device {
        Some(path) => open_hardware_bus(path, config),
        None => {
            info!(faults = config.simulation.enabled, "using the simulated sensor bus");
            SharedBus::with_timeout(simulated_flight_bus(config), timeout)
        }
    }
}

#[cfg(feature = "linux-hal")]
fn open_hardware_bus(path: &str, config: &FlightConfig) -> Outcome<Arc<SharedBus>> {
    use flight_computer::bus::HalBus;

    info!(path, frequency_hz = config.bus.frequency_hz, "opening I2C bus");
    SharedBus::with_timeout(HalBus::open(path)?, config.bus.timeout())
}

#[cfg(not(feature = "linux-hal"))]
fn open_hardware_bus(path: &str, _config: &FlightConfig) -> Outcome<Arc<SharedBus>> {
    Err(flight_computer::Failure::invalid_argument(format!(
        "cannot open {path}: built without the linux-hal feature"
    )))
}

/// Lease and bring up every sensor on the vehicle. Any missing sensor aborts.
fn create_channels(bus: &Arc<SharedBus>) -> Vec<Box<dyn Channel>> {
    vec![
        channel::<Bmp581>(bus, "baro1", Bmp581::ADDRESS_1),
        channel::<Bmp581>(bus, "baro2", Bmp581::ADDRESS_2),
        channel::<Bmi323>(bus, "imu", Bmi323::DEFAULT_ADDRESS),
        channel::<Adxl375>(bus, "high_g", Adxl375::DEFAULT_ADDRESS),
        channel::<Mlx90395>(bus, "mag", Mlx90395::DEFAULT_ADDRESS),
        channel::<Tmp1075>(bus, "temp", Tmp1075::DEFAULT_ADDRESS),
    ]
}

fn channel<S: SensorDriver + 'static>(
    bus: &Arc<SharedBus>,
    name: &'static str,
    address: u8,
) -> Box<dyn Channel> {
    let context = format!("creating sensor {name}");
    let device = bus.lease(address).or_abort(&context);
    let sensor = S::create(device).or_abort(&context);
    if !sensor.is_connected() {
        tracing::warn!(sensor = name, "sensor did not identify itself");
    }
    Box::new(SensorChannel::new(name, sensor))
}

/// Register maps for a vehicle sitting still on the pad.
fn simulated_flight_bus(config: &FlightConfig) -> SimulatedBus {
    let sim = SimulatedBus::new_with_config(config.simulation.clone());

    for address in [Bmp581::ADDRESS_1, Bmp581::ADDRESS_2] {
        sim.set_register(address, 0x01, &[0x50]);
        sim.set_register(address, 0x27, &[0x10]);
        sim.set_register(address, 0x28, &[0x06]);
        // 21.5 C and 101325 Pa
        sim.set_register(address, 0x1D, &[0x00, 0x80, 0x15, 0x00]);
        sim.set_register(address, 0x20, &[0x40, 0xF3, 0x62, 0x00]);
    }

    // 1 g on z at the 8 g range; the first two bytes are I2C filler.
    sim.set_register(Bmi323::DEFAULT_ADDRESS, 0x00, &[0x00, 0x00, 0x43, 0x00]);
    let [lsb, msb] = 4_010_i16.to_le_bytes();
    sim.set_register(Bmi323::DEFAULT_ADDRESS, 0x05, &[0x00, 0x00, lsb, msb]);

    sim.set_register(Adxl375::DEFAULT_ADDRESS, 0x00, &[0xE5]);
    sim.set_register(Adxl375::DEFAULT_ADDRESS, 0x36, &[0x14, 0x00]);

    // Gain 8, then status and roughly 20/-5/45 uT of Earth field.
    sim.set_register(Mlx90395::DEFAULT_ADDRESS, 0x00, &[0x00, 0x80]);
    sim.set_register(
        Mlx90395::DEFAULT_ADDRESS,
        0x80,
        &[0x80, 0x00, 0x00, 0x1C, 0xFF, 0xF9, 0x00, 0x3F],
    );

    sim.set_register(Tmp1075::DEFAULT_ADDRESS, 0x0F, &[0x75, 0x00]);
    sim.set_register(Tmp1075::DEFAULT_ADDRESS, 0x00, &[0x15, 0x80]);

    sim
}

fn print_summary(written: u64, publisher: &TelemetryPublisher) {
    let stats = publisher.stats();
    println!();
    println!("{}", "📊 Flight summary".bright_cyan().bold());
    println!("   Records written: {}", written.to_string().bright_white());
    println!("   Publish cycles:  {}", stats.cycles);
    println!("   Overruns:        {}", stats.overruns);

    let reader = publisher.reader();
    for (name, channel) in reader.channel_names().zip(&stats.channels) {
        let health = if channel.failures == 0 {
            "OK".green()
        } else {
            format!("{} failures", channel.failures).yellow()
        };
        println!("   {name:<8} {:>8} samples  {health}", channel.samples);
    }
}
