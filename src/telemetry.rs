//! Periodic sensor polling and the shared telemetry snapshot.
//!
//! A [`TelemetryPublisher`] owns a background thread that samples every
//! [`Channel`] once per period, assembles a fresh [`TelemetrySnapshot`] and
//! swaps it in under a lock. Readers hold a [`TelemetryReader`] and either take
//! the latest snapshot or block until a newer version is published.
//!
//! A channel that fails is reported as `None` for that cycle. The previous
//! value is never carried forward.

use crate::outcome::{Failure, FailureKind, Outcome};
use crate::sensors::Reading;
use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use core::time::Duration;
use heapless::Vec;
use serde::{Deserialize, Serialize};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Most channels a single publisher can poll.
pub const MAX_CHANNELS: usize = 8;
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(50);

/// One named source of readings.
pub trait Channel: Send {
    fn name(&self) -> &str;

    /// Column names of the values this channel's readings flatten into.
    fn fields(&self) -> &'static [&'static str];

    /// Take one reading. Called from the publisher thread only.
    fn sample(&mut self) -> Outcome<Reading>;
}

/// The published state of every channel at one instant.
///
/// `readings[i]` belongs to the i-th channel passed to
/// [`TelemetryPublisher::start`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub version: u64,
    pub readings: Vec<Option<Reading>, MAX_CHANNELS>,
}

impl TelemetrySnapshot {
    fn empty(channels: usize) -> Outcome<Self> {
        let mut readings = Vec::new();
        readings.resize(channels, None).map_err(|()| too_many_channels(channels))?;
        Ok(Self { version: 0, readings })
    }

    pub fn reading(&self, channel: usize) -> Option<&Reading> {
        self.readings.get(channel).and_then(Option::as_ref)
    }

    /// Whether every channel produced a value this cycle.
    pub fn is_complete(&self) -> bool {
        self.readings.iter().all(Option::is_some)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PublisherState {
    /// Started, first cycle not yet begun.
    Idle = 0,
    /// Sampling channels or waiting for the next period.
    Polling = 1,
    /// Replacing the shared snapshot.
    Publishing = 2,
    Stopped = 3,
}

impl PublisherState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PublisherState::Idle,
            1 => PublisherState::Polling,
            2 => PublisherState::Publishing,
            _ => PublisherState::Stopped,
        }
    }
}

/// Name and column names of one channel, fixed for the publisher's lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    pub name: String,
    pub fields: &'static [&'static str],
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub samples: u64,
    pub failures: u64,
    pub consecutive_failures: u32,
    pub last_failure: Option<FailureKind>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherStats {
    pub cycles: u64,
    /// Cycles that finished after their deadline.
    pub overruns: u64,
    pub channels: alloc::vec::Vec<ChannelStats>,
}

struct Shared {
    snapshot: Mutex<TelemetrySnapshot>,
    published: Condvar,
    running: AtomicBool,
    state: AtomicU8,
    stats: Mutex<PublisherStats>,
    layout: alloc::vec::Vec<ChannelLayout>,
}

impl Shared {
    fn lock_snapshot(&self) -> MutexGuard<'_, TelemetrySnapshot> {
        self.snapshot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_stats(&self) -> MutexGuard<'_, PublisherStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: PublisherState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn publish(&self, readings: Vec<Option<Reading>, MAX_CHANNELS>) -> u64 {
        let version = {
            let mut snapshot = self.lock_snapshot();
            let version = snapshot.version + 1;
            *snapshot = TelemetrySnapshot { version, readings };
            version
        };
        self.published.notify_all();
        version
    }
}

/// Read access to the snapshot. Cheap to clone and hand to other threads.
#[derive(Clone)]
pub struct TelemetryReader {
    shared: Arc<Shared>,
}

impl TelemetryReader {
    /// Copy of the current snapshot. Never blocks on a publish cycle.
    pub fn get_latest(&self) -> TelemetrySnapshot {
        self.shared.lock_snapshot().clone()
    }

    /// Block until a snapshot with `version > last_seen` exists and return it.
    ///
    /// Waits forever once the publisher has stopped; use
    /// [`TelemetryReader::wait_for_newer_timeout`] where that matters.
    pub fn wait_for_newer(&self, last_seen: u64) -> TelemetrySnapshot {
        let guard = self.shared.lock_snapshot();
        let guard = self
            .shared
            .published
            .wait_while(guard, |snapshot| snapshot.version <= last_seen)
            .unwrap_or_else(PoisonError::into_inner);
        guard.clone()
    }

    /// Like [`TelemetryReader::wait_for_newer`], giving up after `timeout` or
    /// as soon as the publisher stops.
    pub fn wait_for_newer_timeout(
        &self,
        last_seen: u64,
        timeout: Duration,
    ) -> Option<TelemetrySnapshot> {
        let guard = self.shared.lock_snapshot();
        let (guard, _) = self
            .shared
            .published
            .wait_timeout_while(guard, timeout, |snapshot| {
                snapshot.version <= last_seen && self.shared.running.load(Ordering::Acquire)
            })
            .unwrap_or_else(PoisonError::into_inner);
        (guard.version > last_seen).then(|| guard.clone())
    }

    pub fn layout(&self) -> &[ChannelLayout] {
        &self.shared.layout
    }

    pub fn channel_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.shared.layout.iter().map(|channel| channel.name.as_str())
    }

    pub fn state(&self) -> PublisherState {
        PublisherState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PublisherStats {
        self.shared.lock_stats().clone()
    }
}

impl core::fmt::Debug for TelemetryReader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TelemetryReader")
            .field("channels", &self.shared.layout)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Handle to the polling thread. Dropping it stops the thread.
#[derive(Debug)]
pub struct TelemetryPublisher {
    reader: TelemetryReader,
    worker: Option<JoinHandle<()>>,
}

impl TelemetryPublisher {
    /// Spawn the polling thread over `channels`, one cycle every `period`.
    pub fn start(channels: alloc::vec::Vec<Box<dyn Channel>>, period: Duration) -> Outcome<Self> {
        let initial = TelemetrySnapshot::empty(channels.len())?;
        if period.is_zero() {
            return Err(Failure::invalid_argument("publish period must be non-zero"));
        }

        let layout = channels
            .iter()
            .map(|channel| ChannelLayout {
                name: channel.name().into(),
                fields: channel.fields(),
            })
            .collect();
        let shared = Arc::new(Shared {
            snapshot: Mutex::new(initial),
            published: Condvar::new(),
            running: AtomicBool::new(true),
            state: AtomicU8::new(PublisherState::Idle as u8),
            stats: Mutex::new(PublisherStats {
                channels: alloc::vec![ChannelStats::default(); channels.len()],
                ..PublisherStats::default()
            }),
            layout,
        });

        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("telemetry".into())
                .spawn(move || poll_loop(&shared, channels, period))?
        };

        info!(channels = shared.layout.len(), period = ?period, "telemetry publisher started");
        Ok(Self {
            reader: TelemetryReader { shared },
            worker: Some(worker),
        })
    }

    pub fn reader(&self) -> TelemetryReader {
        self.reader.clone()
    }

    pub fn get_latest(&self) -> TelemetrySnapshot {
        self.reader.get_latest()
    }

    pub fn wait_for_newer(&self, last_seen: u64) -> TelemetrySnapshot {
        self.reader.wait_for_newer(last_seen)
    }

    pub fn wait_for_newer_timeout(
        &self,
        last_seen: u64,
        timeout: Duration,
    ) -> Option<TelemetrySnapshot> {
        self.reader.wait_for_newer_timeout(last_seen, timeout)
    }

    pub fn state(&self) -> PublisherState {
        self.reader.state()
    }

    pub fn stats(&self) -> PublisherStats {
        self.reader.stats()
    }

    /// Stop after the current cycle and join the thread.
    ///
    /// A channel blocked inside a bus transaction is waited out; transactions
    /// are bounded by the device timeout.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };

        let shared = &self.reader.shared;
        shared.running.store(false, Ordering::Release);
        // Taking the lock orders the flag before any waiter's predicate check.
        drop(shared.lock_snapshot());
        shared.published.notify_all();
        worker.thread().unpark();

        if worker.join().is_err() {
            warn!("telemetry thread panicked");
        }
        shared.set_state(PublisherState::Stopped);
        info!("telemetry publisher stopped");
    }
}

impl Drop for TelemetryPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn too_many_channels(count: usize) -> Failure {
    Failure::invalid_argument(alloc::format!(
        "{count} channels requested, at most {MAX_CHANNELS} supported"
    ))
}

fn poll_loop(shared: &Shared, mut channels: alloc::vec::Vec<Box<dyn Channel>>, period: Duration) {
    let mut deadline = Instant::now();

    while shared.running.load(Ordering::Acquire) {
        shared.set_state(PublisherState::Polling);

        let mut readings = Vec::new();
        for (index, channel) in channels.iter_mut().enumerate() {
            let result = channel.sample();
            record_sample(shared, index, channel.name(), result.as_ref().err());
            let pushed = readings.push(result.ok());
            debug_assert!(pushed.is_ok(), "`start` bounds the channel count");
        }

        shared.set_state(PublisherState::Publishing);
        let version = shared.publish(readings);
        shared.set_state(PublisherState::Polling);

        deadline += period;
        let now = Instant::now();
        let overrun = now > deadline;
        {
            let mut stats = shared.lock_stats();
            stats.cycles += 1;
            if overrun {
                stats.overruns += 1;
            }
        }
        if overrun {
            debug!(version, late = ?(now - deadline), "publish cycle overran its period");
            deadline = now;
        }

        // Unparked early by `stop`.
        while shared.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
    }
}

fn record_sample(shared: &Shared, index: usize, name: &str, failure: Option<&Failure>) {
    let mut stats = shared.lock_stats();
    let Some(channel) = stats.channels.get_mut(index) else {
        return;
    };
    channel.samples += 1;

    match failure {
        None => {
            if channel.consecutive_failures > 0 {
                info!(
                    channel = name,
                    failed_cycles = channel.consecutive_failures,
                    "channel recovered"
                );
            }
            channel.consecutive_failures = 0;
        }
        Some(failure) => {
            if channel.consecutive_failures == 0 {
                warn!(channel = name, kind = ?failure.kind, "channel read failed: {}", failure.message);
            }
            debug!(channel = name, kind = ?failure.kind, code = ?failure.raw_code, "sample dropped");
            channel.failures += 1;
            channel.consecutive_failures = channel.consecutive_failures.saturating_add(1);
            channel.last_failure = Some(failure.kind);
        }
    }
}
