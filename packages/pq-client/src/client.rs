//! Partition-aware fan-out client.
//!
//! Resolves the partition count once at construction, then spreads
//! unaddressed operations (enqueue, dequeue) round-robin across
//! partitions via two independent atomic cursors, the way a load
//! balancer spreads requests across backends rather than picking one at
//! random per call -- approximate fairness, no coordination required.
//! Key-addressed operations (delete, extend/release lease) instead read
//! `partition_id` straight out of the `ItemKey` and route directly,
//! since the key already names its home partition.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pq_core::{ItemKey, QueueItem};
use serde_json::Value;
use tracing::warn;

use crate::endpoint::EndpointCache;
use crate::error::ClientError;
use crate::retry::RetryPolicy;

/// A partition-aware client for one priority lease-queue cluster.
pub struct PartitionClient {
    partition_count: u64,
    endpoints: Arc<EndpointCache>,
    http: reqwest::Client,
    retry_policy: RetryPolicy,
    next_dequeue_partition: AtomicU64,
    next_enqueue_partition: AtomicU64,
}

impl PartitionClient {
    #[must_use]
    pub fn new(partition_count: u64, endpoints: Arc<EndpointCache>, retry_policy: RetryPolicy) -> Self {
        assert!(partition_count > 0, "a client needs at least one partition");
        Self {
            partition_count,
            endpoints,
            http: reqwest::Client::new(),
            retry_policy,
            next_dequeue_partition: AtomicU64::new(0),
            next_enqueue_partition: AtomicU64::new(0),
        }
    }

    fn next_partition(&self, cursor: &AtomicU64) -> u64 {
        cursor.fetch_add(1, Ordering::Relaxed) % self.partition_count
    }

    /// Enqueues `payloads` into priority band `band` on a round-robin
    /// partition.
    pub async fn enqueue(
        &self,
        band: i32,
        payloads: &[Value],
        lease_seconds: Option<u64>,
        expiration_minutes: Option<u64>,
    ) -> Result<Vec<QueueItem<Value>>, ClientError> {
        let partition_id = self.next_partition(&self.next_enqueue_partition);
        self.with_retry(partition_id, |base_url| {
            let mut request = self.http.post(format!("{base_url}/api/{band}")).json(payloads);
            if let Some(secs) = lease_seconds {
                request = request.query(&[("leaseSeconds", secs.to_string())]);
            }
            if let Some(mins) = expiration_minutes {
                request = request.query(&[("expirationMinutes", mins.to_string())]);
            }
            request
        })
        .await
    }

    /// Dequeues up to `count` items from `startqueue..=endqueue` on a
    /// round-robin partition.
    pub async fn dequeue(
        &self,
        count: usize,
        startqueue: i32,
        endqueue: i32,
    ) -> Result<Vec<QueueItem<Value>>, ClientError> {
        let partition_id = self.next_partition(&self.next_dequeue_partition);
        self.with_retry(partition_id, |base_url| {
            self.http.get(format!("{base_url}/api/")).query(&[
                ("count", count.to_string()),
                ("startqueue", startqueue.to_string()),
                ("endqueue", endqueue.to_string()),
            ])
        })
        .await
    }

    /// Deletes `key`, routed directly to the partition the key names.
    pub async fn delete(&self, key: ItemKey) -> Result<Option<QueueItem<Value>>, ClientError> {
        let partition_id = key.partition_id();
        self.with_retry(partition_id, |base_url| self.http.delete(format!("{base_url}/api/{key}")))
            .await
    }

    /// Extends every key's lease by `lease_seconds`, or releases it if
    /// `lease_seconds == 0`. All keys must belong to the same partition;
    /// callers addressing multiple partitions must split the batch and
    /// issue one call per partition.
    pub async fn extend_lease(&self, keys: &[ItemKey], lease_seconds: u64) -> Result<Vec<bool>, ClientError> {
        let partition_id = keys.first().map(ItemKey::partition_id).unwrap_or(0);
        self.with_retry(partition_id, |base_url| {
            self.http
                .put(format!("{base_url}/api/"))
                .query(&[("leaseSeconds", lease_seconds.to_string())])
                .json(keys)
        })
        .await
    }

    /// `extend_lease` with a duration of zero.
    pub async fn release_lease(&self, keys: &[ItemKey]) -> Result<Vec<bool>, ClientError> {
        self.extend_lease(keys, 0).await
    }

    async fn with_retry<T, F>(&self, partition_id: u64, build_request: F) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let base_url = self.endpoints.get(partition_id).0;
            let result = self.send(partition_id, build_request(&base_url)).await;
            match result {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry_policy.max_attempts() => {
                    warn!(partition_id, attempt, error = %err, "retrying partition client call");
                    self.endpoints.invalidate(partition_id);
                    tokio::time::sleep(self.retry_policy.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(ClientError::RetriesExhausted { attempts: attempt });
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send<T>(&self, partition_id: u64, request: reqwest::RequestBuilder) -> Result<T, ClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(|source| ClientError::Transport { partition_id, source })?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Response { partition_id, status, body });
        }
        let body = response
            .text()
            .await
            .map_err(|source| ClientError::Transport { partition_id, source })?;
        serde_json::from_str(&body).map_err(ClientError::Decode)
    }
}
