//! Health & load reporter.
//!
//! Runs on every replica regardless of role, publishing capacity, latency,
//! and request-rate signals on a fixed interval. A dedicated long-lived
//! task driven by `tokio::select!` against a `watch` shutdown receiver,
//! generalized from draining connections to publishing periodic signals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::PartitionConfig;

/// Latency thresholds (milliseconds) the health reporter compares observed
/// averages against, fixed regardless of configuration.
const LATENCY_WARN_MILLIS: u64 = 1000;
const LATENCY_ERROR_MILLIS: u64 = 5000;

/// Ok/Warning/Error classification shared by capacity and latency signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalLevel {
    Ok,
    Warning,
    Error,
}

impl SignalLevel {
    fn from_ratio(ratio: f64, warn_at: f64, error_at: f64) -> Self {
        if ratio >= error_at {
            Self::Error
        } else if ratio >= warn_at {
            Self::Warning
        } else {
            Self::Ok
        }
    }

    fn from_millis(value: u64) -> Self {
        if value >= LATENCY_ERROR_MILLIS {
            Self::Error
        } else if value >= LATENCY_WARN_MILLIS {
            Self::Warning
        } else {
            Self::Ok
        }
    }
}

/// A monotone start tick plus a count; `rate_per_second()` divides the
/// count by elapsed wall-clock time. Reset by replacing the whole counter,
/// matching the "whole-value replacement" concurrency policy for counters.
#[derive(Debug, Clone)]
pub struct CountPerSecond {
    started_at: Instant,
    count: u64,
}

impl CountPerSecond {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            count: 0,
        }
    }

    pub fn increment(&mut self) {
        self.count += 1;
    }

    /// `count / elapsed_seconds`, treating a sub-second window as one
    /// second so a fresh counter never divides by zero.
    #[must_use]
    pub fn rate_per_second(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64().max(1.0);
        self.count as f64 / elapsed
    }
}

impl Default for CountPerSecond {
    fn default() -> Self {
        Self::new()
    }
}

/// Running sum + sample count; `average_millis()` is `sum / count`. Reset
/// by replacing the whole counter.
#[derive(Debug, Clone, Default)]
pub struct AverageLatency {
    sum_millis: u64,
    samples: u64,
}

impl AverageLatency {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, duration: std::time::Duration) {
        self.sum_millis += duration.as_millis() as u64;
        self.samples += 1;
    }

    #[must_use]
    pub fn average_millis(&self) -> u64 {
        if self.samples == 0 {
            0
        } else {
            self.sum_millis / self.samples
        }
    }
}

/// Per-operation counters shared between the replica (which records
/// observations) and the health reporter (which samples and resets them).
pub struct OperationCounters {
    requests: Mutex<CountPerSecond>,
    enqueue_latency: Mutex<AverageLatency>,
    dequeue_latency: Mutex<AverageLatency>,
    extend_latency: Mutex<AverageLatency>,
}

impl OperationCounters {
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(CountPerSecond::new()),
            enqueue_latency: Mutex::new(AverageLatency::new()),
            dequeue_latency: Mutex::new(AverageLatency::new()),
            extend_latency: Mutex::new(AverageLatency::new()),
        }
    }

    pub fn record_enqueue(&self, duration: std::time::Duration) {
        self.requests.lock().increment();
        self.enqueue_latency.lock().observe(duration);
    }

    pub fn record_dequeue(&self, duration: std::time::Duration) {
        self.requests.lock().increment();
        self.dequeue_latency.lock().observe(duration);
    }

    pub fn record_extend(&self, duration: std::time::Duration) {
        self.requests.lock().increment();
        self.extend_latency.lock().observe(duration);
    }

    /// Samples and resets every counter, returning the values to publish.
    fn sample_and_reset(&self) -> LoadSample {
        let rps = std::mem::take(&mut *self.requests.lock()).rate_per_second();
        let enqueue_avg = std::mem::take(&mut *self.enqueue_latency.lock()).average_millis();
        let dequeue_avg = std::mem::take(&mut *self.dequeue_latency.lock()).average_millis();
        let extend_avg = std::mem::take(&mut *self.extend_latency.lock()).average_millis();
        LoadSample {
            requests_per_second: rps,
            enqueue_avg_millis: enqueue_avg,
            dequeue_avg_millis: dequeue_avg,
            extend_avg_millis: extend_avg,
        }
    }
}

impl Default for OperationCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts backing a capacity signal: current occupancy against configured
/// maxima for the item, queue, and expired collections.
#[derive(Debug, Clone, Copy)]
pub struct CapacitySample {
    pub queue_count: u64,
    pub lease_count: u64,
    pub expired_count: u64,
    pub item_count: u64,
}

/// One reporter tick's worth of rate/latency data.
#[derive(Debug, Clone, Copy)]
pub struct LoadSample {
    pub requests_per_second: f64,
    pub enqueue_avg_millis: u64,
    pub dequeue_avg_millis: u64,
    pub extend_avg_millis: u64,
}

/// A fully classified signal publication, handed to a [`SignalSink`].
#[derive(Debug, Clone, Copy)]
pub struct HealthSignal {
    pub capacity_level: SignalLevel,
    pub latency_level: SignalLevel,
    pub queue_count: u64,
    pub lease_count: u64,
    pub expired_count: u64,
    pub item_count: u64,
    pub requests_per_second: f64,
}

/// The `(RPS, queue_length)` vector handed to the placement service.
#[derive(Debug, Clone, Copy)]
pub struct LoadSignal {
    pub requests_per_second: f64,
    pub queue_length: u64,
}

/// Destination for published signals. The default
/// [`LoggingSignalSink`] just logs; a real placement-service client would
/// implement this to ship the load vector over the wire instead.
pub trait SignalSink: Send + Sync {
    fn publish_health(&self, title: &str, signal: HealthSignal);
    fn publish_load(&self, title: &str, signal: LoadSignal);
}

/// Default sink: structured log lines, one per signal per tick.
pub struct LoggingSignalSink;

impl SignalSink for LoggingSignalSink {
    fn publish_health(&self, title: &str, signal: HealthSignal) {
        tracing::info!(
            title,
            capacity = ?signal.capacity_level,
            latency = ?signal.latency_level,
            queue_count = signal.queue_count,
            lease_count = signal.lease_count,
            expired_count = signal.expired_count,
            item_count = signal.item_count,
            requests_per_second = signal.requests_per_second,
            "health signal"
        );
    }

    fn publish_load(&self, title: &str, signal: LoadSignal) {
        tracing::info!(
            title,
            requests_per_second = signal.requests_per_second,
            queue_length = signal.queue_length,
            "load signal"
        );
    }
}

/// Implemented by whatever can report current item/queue/lease/expired
/// occupancy for a tick -- the partition replica, in practice.
#[async_trait::async_trait]
pub trait CapacitySource: Send + Sync {
    async fn capacity_sample(&self) -> CapacitySample;
}

/// Periodic task publishing health/load signals. Construct with
/// [`HealthReporter::spawn`]; the returned handle's shutdown sender stops
/// the task.
pub struct HealthReporter {
    shutdown: watch::Sender<bool>,
}

impl HealthReporter {
    /// Spawns the reporter loop. `sample` is called once per tick to read
    /// current table occupancy; `counters` supplies rate/latency data.
    pub fn spawn(
        config: Arc<PartitionConfig>,
        counters: Arc<OperationCounters>,
        sink: Arc<dyn SignalSink>,
        source: Arc<dyn CapacitySource>,
    ) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            tokio::time::sleep(config.health_check_start_delay()).await;
            let mut interval = tokio::time::interval(config.health_check_interval());
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        let capacity = source.capacity_sample().await;
                        let load = counters.sample_and_reset();
                        publish_tick(&config, &sink, capacity, load);
                    }
                }
            }
        });
        Self { shutdown: shutdown_tx }
    }

    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

fn publish_tick(
    config: &PartitionConfig,
    sink: &Arc<dyn SignalSink>,
    capacity: CapacitySample,
    load: LoadSample,
) {
    let capacity_level = worst_of([
        ratio_level(config, capacity.queue_count, config.max_queue_capacity_per_partition),
        ratio_level(config, capacity.lease_count, config.max_lease_capacity_per_partition),
        ratio_level(config, capacity.expired_count, config.max_expired_capacity_per_partition),
    ]);
    let latency_level = worst_of([
        SignalLevel::from_millis(load.enqueue_avg_millis),
        SignalLevel::from_millis(load.dequeue_avg_millis),
        SignalLevel::from_millis(load.extend_avg_millis),
    ]);

    sink.publish_health(
        &config.health_report_title,
        HealthSignal {
            capacity_level,
            latency_level,
            queue_count: capacity.queue_count,
            lease_count: capacity.lease_count,
            expired_count: capacity.expired_count,
            item_count: capacity.item_count,
            requests_per_second: load.requests_per_second,
        },
    );
    sink.publish_load(
        &config.load_report_title,
        LoadSignal {
            requests_per_second: load.requests_per_second,
            queue_length: capacity.queue_count,
        },
    );
}

fn ratio_level(config: &PartitionConfig, current: u64, max: u64) -> SignalLevel {
    if max == 0 {
        return SignalLevel::Ok;
    }
    let ratio = current as f64 / max as f64;
    SignalLevel::from_ratio(ratio, config.capacity_warning_percent, config.capacity_error_percent)
}

fn worst_of(levels: [SignalLevel; 3]) -> SignalLevel {
    levels
        .into_iter()
        .max_by_key(|level| match level {
            SignalLevel::Ok => 0,
            SignalLevel::Warning => 1,
            SignalLevel::Error => 2,
        })
        .unwrap_or(SignalLevel::Ok)
}

/// Monotone request id generator used when a caller does not supply one;
/// not part of the published health signal but colocated here since both
/// are small ambient-observability helpers.
pub static REQUEST_SEQUENCE: AtomicU64 = AtomicU64::new(1);

#[must_use]
pub fn next_request_sequence() -> u64 {
    REQUEST_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}
