use flight_computer::bus::{SharedBus, SimulatedBus};
use flight_computer::sensors::{Reading, SensorChannel, SensorDriver, Tmp1075};
use flight_computer::telemetry::{Channel, PublisherState, TelemetryPublisher, DEFAULT_PERIOD};
use flight_computer::*;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

const GENEROUS: Duration = Duration::from_secs(5);

/// A channel whose every sample is handed in by the test, so the publisher
/// completes exactly one cycle per round of sends.
struct Scripted {
    name: &'static str,
    samples: Receiver<Outcome<Reading>>,
}

impl Channel for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn fields(&self) -> &'static [&'static str] {
        &["value"]
    }

    fn sample(&mut self) -> Outcome<Reading> {
        self.samples
            .recv()
            .unwrap_or_else(|_| Err(Failure::other("script finished")))
    }
}

fn scripted(names: &[&'static str]) -> (Vec<Sender<Outcome<Reading>>>, TelemetryPublisher) {
    let mut senders = Vec::new();
    let mut channels: Vec<Box<dyn Channel>> = Vec::new();
    for &name in names {
        let (tx, rx) = mpsc::channel();
        senders.push(tx);
        channels.push(Box::new(Scripted { name, samples: rx }));
    }
    let publisher = TelemetryPublisher::start(channels, Duration::from_millis(1)).unwrap();
    (senders, publisher)
}

fn value(v: f32) -> Outcome<Reading> {
    Ok(Reading::Scalar(v))
}

#[test]
fn test_initial_snapshot_has_version_zero() {
    let (senders, mut publisher) = scripted(&["a", "b"]);
    let snapshot = publisher.get_latest();
    assert_eq!(snapshot.version, 0);
    assert_eq!(snapshot.readings.as_slice(), &[None, None]);

    drop(senders);
    publisher.stop();
}

#[test]
fn test_versions_increase_by_one_despite_failures() {
    let (senders, mut publisher) = scripted(&["a", "b", "c"]);
    let mut last = publisher.get_latest().version;

    for cycle in 0..20_u32 {
        for (index, tx) in senders.iter().enumerate() {
            let sample = if (cycle as usize + index) % 3 == 0 {
                Err(Failure::timeout("scripted"))
            } else {
                value(cycle as f32)
            };
            tx.send(sample).unwrap();
        }

        let snapshot = publisher.wait_for_newer(last);
        assert_eq!(snapshot.version, last + 1);
        last = snapshot.version;
    }

    drop(senders);
    publisher.stop();
}

#[test]
fn test_failed_channel_reports_absence_not_stale_value() {
    let (senders, mut publisher) = scripted(&["a", "b", "c"]);

    for tx in &senders {
        tx.send(value(1.0)).unwrap();
    }
    let first = publisher.wait_for_newer(0);
    assert!(first.is_complete());

    senders[0].send(value(2.0)).unwrap();
    senders[1].send(Err(Failure::timeout("b went quiet"))).unwrap();
    senders[2].send(value(2.0)).unwrap();
    let second = publisher.wait_for_newer(first.version);

    assert_eq!(second.version, first.version + 1);
    assert_eq!(second.reading(0), Some(&Reading::Scalar(2.0)));
    assert_eq!(second.reading(1), None);
    assert_eq!(second.reading(2), Some(&Reading::Scalar(2.0)));

    // The next cycle is parked on channel a, so these counts are settled.
    let stats = publisher.stats();
    assert_eq!(stats.channels[1].failures, 1);
    assert_eq!(stats.channels[1].consecutive_failures, 1);
    assert_eq!(stats.channels[1].last_failure, Some(FailureKind::Timeout));
    assert_eq!(stats.channels[0].failures, 0);

    drop(senders);
    publisher.stop();
}

#[test]
fn test_wait_for_newer_blocks_until_next_publish() {
    let (senders, mut publisher) = scripted(&["a"]);
    senders[0].send(value(1.0)).unwrap();
    let current = publisher.wait_for_newer(0);

    let reader = publisher.reader();
    let waiter = thread::spawn(move || reader.wait_for_newer(current.version));

    thread::sleep(Duration::from_millis(50));
    assert!(!waiter.is_finished(), "returned before anything was published");

    senders[0].send(value(42.0)).unwrap();
    let newer = waiter.join().unwrap();
    assert_eq!(newer.version, current.version + 1);
    assert_eq!(newer.reading(0), Some(&Reading::Scalar(42.0)));

    drop(senders);
    publisher.stop();
}

#[test]
fn test_every_waiter_wakes_on_publish() {
    let (senders, mut publisher) = scripted(&["a"]);
    senders[0].send(value(1.0)).unwrap();
    let current = publisher.wait_for_newer(0).version;

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let reader = publisher.reader();
            thread::spawn(move || reader.wait_for_newer(current).version)
        })
        .collect();
    thread::sleep(Duration::from_millis(20));
    senders[0].send(value(2.0)).unwrap();

    for waiter in waiters {
        assert_eq!(waiter.join().unwrap(), current + 1);
    }

    drop(senders);
    publisher.stop();
}

#[test]
fn test_wait_with_timeout_gives_up() {
    let (senders, mut publisher) = scripted(&["a"]);
    senders[0].send(value(1.0)).unwrap();
    let current = publisher.wait_for_newer(0).version;

    assert_eq!(publisher.wait_for_newer_timeout(current, Duration::from_millis(20)), None);
    senders[0].send(value(2.0)).unwrap();
    let newer = publisher.wait_for_newer_timeout(current, GENEROUS).unwrap();
    assert_eq!(newer.version, current + 1);

    drop(senders);
    publisher.stop();
    assert_eq!(publisher.state(), PublisherState::Stopped);
}

#[test]
fn test_sensor_channel_over_simulated_bus() {
    let sim = SimulatedBus::new();
    sim.set_register(Tmp1075::DEFAULT_ADDRESS, 0x0F, &[0x75, 0x00]);
    sim.set_register(Tmp1075::DEFAULT_ADDRESS, 0x00, &[0x19, 0x00]);
    let bus = SharedBus::with_timeout(sim.clone(), Duration::from_millis(5)).unwrap();
    let temp = Tmp1075::create(bus.lease(Tmp1075::DEFAULT_ADDRESS).unwrap()).unwrap();

    let mut publisher = TelemetryPublisher::start(
        vec![Box::new(SensorChannel::new("temp", temp)) as Box<dyn Channel>],
        DEFAULT_PERIOD,
    )
    .unwrap();

    let snapshot = publisher.wait_for_newer(0);
    assert_eq!(snapshot.reading(0), Some(&Reading::Temperature(25.0)));

    // Unplug the sensor: the channel goes absent instead of repeating 25.0.
    sim.detach(Tmp1075::DEFAULT_ADDRESS);
    let mut latest = snapshot;
    while latest.reading(0).is_some() {
        latest = publisher.wait_for_newer_timeout(latest.version, GENEROUS).unwrap();
    }
    assert_eq!(latest.reading(0), None);

    publisher.stop();
    // The channel owned the device; stopping the publisher drops it.
    drop(publisher);
    assert!(!bus.is_leased(Tmp1075::DEFAULT_ADDRESS));
}
