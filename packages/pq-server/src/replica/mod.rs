//! The partition replica: the transactional state machine owning one
//! partition's item table, priority queue bank, lease table, and expired
//! table.
//!
//! Generic over the opaque payload type `T` and the concrete state store
//! `S`. There is exactly one state store implementation in this workspace
//! ([`crate::store::memory::InMemoryStateStore`]), so this is a
//! compile-time seam rather than a `dyn` boundary -- swapping in a
//! replicated-log-backed store means swapping `S`, not reaching for
//! dynamic dispatch nobody else needs.

pub mod delete;
pub mod dequeue;
pub mod enqueue;
pub mod lease;
pub mod peek;

use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use pq_core::ItemKey;
use tokio_util::sync::CancellationToken;

use crate::config::PartitionConfig;
use crate::error::PartitionError;
use crate::health::{CapacitySample, CapacitySource, OperationCounters};
use crate::store::{PartitionStateStore, StoreError};

/// Special `queue` selector values accepted by `count`: `-1` all bands, `-2` lease table, `-3` expired table, `-4`
/// item table. Non-negative values name a priority band directly.
pub const QUEUE_ALL_BANDS: i32 = -1;
pub const QUEUE_LEASES: i32 = -2;
pub const QUEUE_EXPIRED: i32 = -3;
pub const QUEUE_ITEMS: i32 = -4;

/// Maximum batch size accepted by dequeue and by `items`.
pub const MAX_BATCH: usize = 1000;

/// Upper bound on the number of priority bands a replica may be configured
/// with.
pub const MAX_NUMBER_OF_QUEUES: u32 = 100;

/// A `count` selector, validated against this replica's configured band
/// count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QuerySelector {
    Band(usize),
    AllBands,
    Leases,
    Expired,
    Items,
}

pub struct PartitionReplica<T, S> {
    partition_id: u64,
    store: S,
    config: Arc<PartitionConfig>,
    counters: Arc<OperationCounters>,
    next_expiration: AtomicI64,
    _payload: PhantomData<fn() -> T>,
}

impl<T, S> PartitionReplica<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    /// Rejects `config.number_of_queues` above [`MAX_NUMBER_OF_QUEUES`].
    pub fn new(
        partition_id: u64,
        store: S,
        config: Arc<PartitionConfig>,
        counters: Arc<OperationCounters>,
    ) -> Result<Self, PartitionError> {
        if config.number_of_queues > MAX_NUMBER_OF_QUEUES {
            return Err(PartitionError::ArgumentInvalid(format!(
                "number_of_queues {} exceeds the maximum of {MAX_NUMBER_OF_QUEUES}",
                config.number_of_queues
            )));
        }
        Ok(Self {
            partition_id,
            store,
            config,
            counters,
            next_expiration: AtomicI64::new(i64::MAX),
            _payload: PhantomData,
        })
    }

    #[must_use]
    pub fn partition_id(&self) -> u64 {
        self.partition_id
    }

    #[must_use]
    pub fn config(&self) -> &PartitionConfig {
        &self.config
    }

    pub(crate) fn config_arc(&self) -> Arc<PartitionConfig> {
        Arc::clone(&self.config)
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn counters(&self) -> &OperationCounters {
        &self.counters
    }

    pub(crate) fn counters_arc(&self) -> Arc<OperationCounters> {
        Arc::clone(&self.counters)
    }

    /// `prioritycount`: the number of priority bands, `K`.
    #[must_use]
    pub fn priority_count(&self) -> u32 {
        self.config.number_of_queues
    }

    /// Rejects `key` if it does not belong to this partition.
    pub(crate) fn check_partition(&self, key: ItemKey) -> Result<(), PartitionError> {
        if key.partition_id() != self.partition_id {
            return Err(PartitionError::PartitionMismatch {
                key_partition: key.partition_id(),
                this_partition: self.partition_id,
            });
        }
        Ok(())
    }

    pub(crate) fn check_partitions(&self, keys: &[ItemKey]) -> Result<(), PartitionError> {
        for key in keys {
            self.check_partition(*key)?;
        }
        Ok(())
    }

    pub(crate) fn validate_band(&self, band: i32) -> Result<usize, PartitionError> {
        if band < 0 || band as u32 >= self.config.number_of_queues {
            return Err(PartitionError::ArgumentInvalid(format!(
                "queue band {band} out of range [0, {})",
                self.config.number_of_queues
            )));
        }
        Ok(band as usize)
    }

    pub(crate) fn classify_selector(&self, queue: i32) -> Result<QuerySelector, PartitionError> {
        match queue {
            QUEUE_ALL_BANDS => Ok(QuerySelector::AllBands),
            QUEUE_LEASES => Ok(QuerySelector::Leases),
            QUEUE_EXPIRED => Ok(QuerySelector::Expired),
            QUEUE_ITEMS => Ok(QuerySelector::Items),
            band if band >= 0 => Ok(QuerySelector::Band(self.validate_band(band)?)),
            other => Err(PartitionError::ArgumentInvalid(format!(
                "unrecognized queue selector: {other}"
            ))),
        }
    }

    /// Validates a requested batch size against [`MAX_BATCH`].
    pub(crate) fn validate_batch_size(&self, requested: usize) -> Result<usize, PartitionError> {
        if requested > MAX_BATCH {
            return Err(PartitionError::ArgumentInvalid(format!(
                "requested batch size {requested} exceeds the maximum of {MAX_BATCH}"
            )));
        }
        Ok(requested)
    }

    /// Runs `fut` under the configured fabric timeout and the caller's
    /// cancellation token. Every store call is a suspension point per the
    /// concurrency model; this is the one place that enforces both limits.
    pub(crate) async fn guarded<F, Out>(
        &self,
        cancel: &CancellationToken,
        fut: F,
    ) -> Result<Out, PartitionError>
    where
        F: Future<Output = Result<Out, StoreError>>,
    {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(PartitionError::Cancelled),
            res = tokio::time::timeout(self.config.fabric_operation_timeout(), fut) => match res {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(err)) => Err(err.into()),
                Err(_elapsed) => Err(PartitionError::Transient(StoreError::Timeout)),
            },
        }
    }

    /// Monotone-min install; tolerated to be relaxed/stale between sweeps.
    pub(crate) fn advance_next_expiration(&self, candidate: i64) {
        self.next_expiration.fetch_min(candidate, Ordering::AcqRel);
    }

    pub(crate) fn next_expiration(&self) -> i64 {
        self.next_expiration.load(Ordering::Acquire)
    }

    pub(crate) fn set_next_expiration(&self, value: i64) {
        self.next_expiration.store(value, Ordering::Release);
    }

    /// `count`: total for a band, or one of the special selectors above.
    pub async fn count(&self, queue: i32, cancel: &CancellationToken) -> Result<u64, PartitionError> {
        let selector = self.classify_selector(queue)?;
        let mut tx = self.store.begin().await;
        let outcome = self
            .guarded(cancel, async {
                match selector {
                    QuerySelector::Band(band) => self.store.queue_count(&mut tx, band).await,
                    QuerySelector::AllBands => self.store.queue_count_all(&mut tx).await,
                    QuerySelector::Leases => self.store.lease_count(&mut tx).await,
                    QuerySelector::Expired => self.store.expired_count(&mut tx).await,
                    QuerySelector::Items => self.store.item_count(&mut tx).await,
                }
            })
            .await;
        match outcome {
            Ok(count) => {
                self.store.commit(tx).await?;
                Ok(count)
            }
            Err(err) => {
                self.store.abort(tx).await;
                Err(err)
            }
        }
    }

    /// `items`: a page of the item table, independent of queue/lease state.
    pub async fn items(
        &self,
        skip: usize,
        top: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<pq_core::QueueItem<T>>, PartitionError> {
        let top = self.validate_batch_size(top)?;
        let mut tx = self.store.begin().await;
        let outcome = self
            .guarded(cancel, self.store.item_enumerate(&mut tx, skip, top))
            .await;
        match outcome {
            Ok(rows) => {
                self.store.commit(tx).await?;
                Ok(rows)
            }
            Err(err) => {
                self.store.abort(tx).await;
                Err(err)
            }
        }
    }
}

#[async_trait::async_trait]
impl<T, S> CapacitySource for PartitionReplica<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    async fn capacity_sample(&self) -> CapacitySample {
        let mut tx = self.store.begin().await;
        let queue_count = self.store.queue_count_all(&mut tx).await.unwrap_or(0);
        let lease_count = self.store.lease_count(&mut tx).await.unwrap_or(0);
        let expired_count = self.store.expired_count(&mut tx).await.unwrap_or(0);
        let item_count = self.store.item_count(&mut tx).await.unwrap_or(0);
        self.store.abort(tx).await;
        CapacitySample {
            queue_count,
            lease_count,
            expired_count,
            item_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::health::OperationCounters;
    use crate::store::memory::InMemoryStateStore;

    use super::*;

    #[test]
    fn number_of_queues_above_the_maximum_is_rejected() {
        let mut config = PartitionConfig::default();
        config.number_of_queues = MAX_NUMBER_OF_QUEUES + 1;
        let err = PartitionReplica::new(
            0,
            InMemoryStateStore::<String>::new(config.number_of_queues as usize),
            Arc::new(config),
            Arc::new(OperationCounters::new()),
        )
        .unwrap_err();
        assert!(matches!(err, PartitionError::ArgumentInvalid(_)));
    }

    #[test]
    fn number_of_queues_at_the_maximum_is_accepted() {
        let mut config = PartitionConfig::default();
        config.number_of_queues = MAX_NUMBER_OF_QUEUES;
        let result = PartitionReplica::new(
            0,
            InMemoryStateStore::<String>::new(config.number_of_queues as usize),
            Arc::new(config),
            Arc::new(OperationCounters::new()),
        );
        assert!(result.is_ok());
    }
}
