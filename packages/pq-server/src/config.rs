//! Partition replica configuration.
//!
//! A plain, immutable record: one struct, one `Default` impl, no hidden
//! global state. [`clap::Parser`] derives a CLI/env-var front end for
//! the binary entrypoint.

use std::time::Duration;

use clap::Parser;

/// Tuning knobs for one partition replica.
///
/// Every field has a production-sane default; the binary entrypoint
/// overrides them from the command line or environment via `clap`.
#[derive(Debug, Clone, Parser)]
#[command(name = "pq-partitiond", about = "Partitioned priority lease-queue replica")]
pub struct PartitionConfig {
    /// Which partition this process hosts.
    #[arg(long, env, default_value_t = 0)]
    pub partition_id: u64,

    /// Warning/error capacity threshold: total items across all priority
    /// queues.
    #[arg(long, env, default_value_t = 100_000)]
    pub max_queue_capacity_per_partition: u64,

    /// Warning/error capacity threshold: outstanding leases.
    #[arg(long, env, default_value_t = 10_000)]
    pub max_lease_capacity_per_partition: u64,

    /// Warning/error capacity threshold: rows in the expired table.
    #[arg(long, env, default_value_t = 100)]
    pub max_expired_capacity_per_partition: u64,

    /// Fraction of a capacity maximum at which health reports `Warning`.
    #[arg(long, env, default_value_t = 0.75)]
    pub capacity_warning_percent: f64,

    /// Fraction of a capacity maximum at which health reports `Error`.
    #[arg(long, env, default_value_t = 0.95)]
    pub capacity_error_percent: f64,

    /// Number of unreleased lease expirations an item tolerates before the
    /// sweeper moves it to the expired table instead of re-queueing it.
    #[arg(long, env, default_value_t = 5)]
    pub maximum_dequeue_count: u32,

    /// Number of priority bands, numbered `0..number_of_queues`. Must not
    /// exceed 100.
    #[arg(long, env, default_value_t = 5)]
    pub number_of_queues: u32,

    /// Default lease duration, in seconds, used when a caller passes 0.
    #[arg(long, env, default_value_t = 300)]
    pub lease_duration_secs: u64,

    /// Default absolute item TTL, in seconds, used when a caller passes 0.
    /// `0` means "never expires".
    #[arg(long, env, default_value_t = 0)]
    pub item_expiration_secs: u64,

    /// Per-store-call timeout, in milliseconds.
    #[arg(long, env, default_value_t = 4_000)]
    pub fabric_operation_timeout_millis: u64,

    /// Delay, in seconds, before the health/load reporter's first tick.
    #[arg(long, env, default_value_t = 30)]
    pub health_check_start_delay_secs: u64,

    /// Interval, in seconds, between health/load reporter ticks.
    #[arg(long, env, default_value_t = 30)]
    pub health_check_interval_secs: u64,

    /// Delay, in seconds, before the lease sweeper's first tick.
    #[arg(long, env, default_value_t = 120)]
    pub lease_check_start_delay_secs: u64,

    /// Interval, in seconds, between lease sweeper ticks.
    #[arg(long, env, default_value_t = 30)]
    pub lease_check_interval_secs: u64,

    /// Label attached to health signal publications.
    #[arg(long, env, default_value = "pq.partition.health")]
    pub health_report_title: String,

    /// Label attached to load signal publications.
    #[arg(long, env, default_value = "pq.partition.load")]
    pub load_report_title: String,

    /// Bind address for the HTTP adapter.
    #[arg(long, env, default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the HTTP adapter. `0` means OS-assigned.
    #[arg(long, env, default_value_t = 0)]
    pub port: u16,
}

impl PartitionConfig {
    #[must_use]
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    /// `None` means "never expires", matching the default-ttl semantics of
    /// `item_expiration_secs == 0`.
    #[must_use]
    pub fn item_expiration(&self) -> Option<Duration> {
        if self.item_expiration_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.item_expiration_secs))
        }
    }

    #[must_use]
    pub fn fabric_operation_timeout(&self) -> Duration {
        Duration::from_millis(self.fabric_operation_timeout_millis)
    }

    #[must_use]
    pub fn health_check_start_delay(&self) -> Duration {
        Duration::from_secs(self.health_check_start_delay_secs)
    }

    #[must_use]
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    #[must_use]
    pub fn lease_check_start_delay(&self) -> Duration {
        Duration::from_secs(self.lease_check_start_delay_secs)
    }

    #[must_use]
    pub fn lease_check_interval(&self) -> Duration {
        Duration::from_secs(self.lease_check_interval_secs)
    }
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            partition_id: 0,
            max_queue_capacity_per_partition: 100_000,
            max_lease_capacity_per_partition: 10_000,
            max_expired_capacity_per_partition: 100,
            capacity_warning_percent: 0.75,
            capacity_error_percent: 0.95,
            maximum_dequeue_count: 5,
            number_of_queues: 5,
            lease_duration_secs: 300,
            item_expiration_secs: 0,
            fabric_operation_timeout_millis: 4_000,
            health_check_start_delay_secs: 30,
            health_check_interval_secs: 30,
            lease_check_start_delay_secs: 120,
            lease_check_interval_secs: 30,
            health_report_title: "pq.partition.health".to_string(),
            load_report_title: "pq.partition.load".to_string(),
            host: "0.0.0.0".to_string(),
            port: 0,
        }
    }
}
