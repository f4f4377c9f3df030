//! Dequeue: scans priority bands low-to-high, draining orphans and
//! moving absolute-expired items to the expired table along the way,
//! leasing everything else it returns.

use std::time::Instant;

use pq_core::{now_millis, QueueItem};
use tokio_util::sync::CancellationToken;

use crate::error::PartitionError;
use crate::store::{LockMode, PartitionStateStore};

use super::PartitionReplica;

/// Bounded local retry budget for store failures encountered mid-scan:
/// abort that iteration, increment a local error counter, retry up to
/// this many times before giving up on the scan.
const MAX_ITERATION_ERRORS: u32 = 5;

/// Result of one single-key dequeue transaction.
enum DequeueStep<T> {
    /// The band had nothing left; advance to the next one.
    BandEmpty,
    /// A key was popped and the transaction committed, but nothing is
    /// handed back to the caller (orphan key, absolute expiry, or a
    /// zero-duration fire-and-forget lease) -- retry the same band, since
    /// it may still hold further items.
    Drained,
    /// A key was popped, leased, and is returned to the caller.
    Returned(QueueItem<T>),
}

impl<T, S> PartitionReplica<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    /// Dequeues up to `count` items from bands `start_band..=end_band`
    /// (`end_band == -1` means "the last configured band").
    pub async fn dequeue(
        &self,
        count: usize,
        start_band: i32,
        end_band: i32,
        cancel: &CancellationToken,
    ) -> Result<Vec<QueueItem<T>>, PartitionError> {
        let count = self.validate_batch_size(count)?;
        let start = self.validate_band(start_band)?;
        let end = if end_band == -1 {
            self.config().number_of_queues as usize - 1
        } else {
            self.validate_band(end_band)?
        };
        if start > end {
            return Err(PartitionError::ArgumentInvalid(format!(
                "start_band {start_band} is after end_band {end_band}"
            )));
        }

        let started = Instant::now();
        let mut returned = Vec::with_capacity(count);
        let mut band = start;
        let mut errors = 0_u32;

        while returned.len() < count && band <= end && errors < MAX_ITERATION_ERRORS {
            match self.dequeue_one(band, cancel).await {
                Ok(DequeueStep::Returned(item)) => returned.push(item),
                Ok(DequeueStep::Drained) => {}
                Ok(DequeueStep::BandEmpty) => band += 1,
                Err(err) => {
                    errors += 1;
                    tracing::warn!(error = %err, band, errors, "dequeue scan hit a store error");
                }
            }
        }

        self.counters().record_dequeue(started.elapsed());
        Ok(returned)
    }

    /// One dequeue transaction against a single band: pops a key, resolves
    /// its item row, and either leases it, expires it, or discards it as
    /// an orphan.
    async fn dequeue_one(
        &self,
        band: usize,
        cancel: &CancellationToken,
    ) -> Result<DequeueStep<T>, PartitionError> {
        let mut tx = self.store().begin().await;
        let outcome = self
            .guarded(cancel, async {
                let Some(key) = self.store().queue_try_dequeue(&mut tx, band).await? else {
                    return Ok(DequeueStep::BandEmpty);
                };

                let Some(mut item) = self.store().item_get(&mut tx, &key, LockMode::Update).await? else {
                    // Orphan key: the item row was deleted while the key was
                    // still queued. Discard it; the band still advances.
                    tracing::debug!(key = %key, band, "dequeue drained orphan key");
                    return Ok(DequeueStep::Drained);
                };

                let now = now_millis();
                if item.is_expired_at(now) {
                    self.store().item_remove(&mut tx, &key).await?;
                    self.store().expired_put(&mut tx, key, item).await?;
                    return Ok(DequeueStep::Drained);
                }

                if item.lease_duration_secs == 0 {
                    // Fire-and-forget: not exercised by current
                    // configuration, but permitted. Treated as delivered
                    // without a lease -- the key leaves the queue for good.
                    item.dequeue_count += 1;
                    self.store().item_put(&mut tx, key, item).await?;
                    return Ok(DequeueStep::Drained);
                }

                let leased_until = now.saturating_add((item.lease_duration_secs as i64).saturating_mul(1000));
                item.leased_until = leased_until;
                item.dequeue_count += 1;
                self.store().item_put(&mut tx, key, item.clone()).await?;
                self.store().lease_upsert(&mut tx, key, leased_until).await?;
                self.advance_next_expiration(leased_until);
                Ok(DequeueStep::Returned(item))
            })
            .await;

        match outcome {
            Ok(step) => {
                self.store().commit(tx).await?;
                Ok(step)
            }
            Err(err) => {
                self.store().abort(tx).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use pq_core::ItemKey;
    use tokio_util::sync::CancellationToken;

    use crate::config::PartitionConfig;
    use crate::health::OperationCounters;
    use crate::store::memory::{InMemoryStateStore, MemoryTx};
    use crate::store::{LockMode, PartitionStateStore, StoreError};

    use super::*;

    fn replica(config: PartitionConfig) -> PartitionReplica<String, InMemoryStateStore<String>> {
        let bands = config.number_of_queues as usize;
        PartitionReplica::new(0, InMemoryStateStore::new(bands), Arc::new(config), Arc::new(OperationCounters::new())).unwrap()
    }

    /// Wraps an [`InMemoryStateStore`] and delegates the first
    /// `succeed_for` calls to `queue_try_dequeue` normally, then fails
    /// every call after that -- used to exercise the scan's local error
    /// budget once a band starts erroring, without a real faulty store.
    struct FlakyStore {
        inner: InMemoryStateStore<String>,
        succeed_for: AtomicU32,
    }

    impl FlakyStore {
        fn new(inner: InMemoryStateStore<String>, succeed_for: u32) -> Self {
            Self { inner, succeed_for: AtomicU32::new(succeed_for) }
        }
    }

    #[async_trait]
    impl PartitionStateStore<String> for FlakyStore {
        type Tx = MemoryTx<String>;

        async fn begin(&self) -> Self::Tx {
            self.inner.begin().await
        }

        async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError> {
            self.inner.commit(tx).await
        }

        async fn abort(&self, tx: Self::Tx) {
            self.inner.abort(tx).await;
        }

        async fn item_get(
            &self,
            tx: &mut Self::Tx,
            key: &ItemKey,
            lock_mode: LockMode,
        ) -> Result<Option<QueueItem<String>>, StoreError> {
            self.inner.item_get(tx, key, lock_mode).await
        }

        async fn item_put(&self, tx: &mut Self::Tx, key: ItemKey, row: QueueItem<String>) -> Result<(), StoreError> {
            self.inner.item_put(tx, key, row).await
        }

        async fn item_remove(&self, tx: &mut Self::Tx, key: &ItemKey) -> Result<Option<QueueItem<String>>, StoreError> {
            self.inner.item_remove(tx, key).await
        }

        async fn item_count(&self, tx: &mut Self::Tx) -> Result<u64, StoreError> {
            self.inner.item_count(tx).await
        }

        async fn item_enumerate(
            &self,
            tx: &mut Self::Tx,
            skip: usize,
            take: usize,
        ) -> Result<Vec<QueueItem<String>>, StoreError> {
            self.inner.item_enumerate(tx, skip, take).await
        }

        async fn lease_upsert(&self, tx: &mut Self::Tx, key: ItemKey, leased_until: i64) -> Result<(), StoreError> {
            self.inner.lease_upsert(tx, key, leased_until).await
        }

        async fn lease_remove(&self, tx: &mut Self::Tx, key: &ItemKey) -> Result<Option<i64>, StoreError> {
            self.inner.lease_remove(tx, key).await
        }

        async fn lease_count(&self, tx: &mut Self::Tx) -> Result<u64, StoreError> {
            self.inner.lease_count(tx).await
        }

        async fn lease_enumerate(&self, tx: &mut Self::Tx) -> Result<Vec<(ItemKey, i64)>, StoreError> {
            self.inner.lease_enumerate(tx).await
        }

        async fn expired_put(&self, tx: &mut Self::Tx, key: ItemKey, row: QueueItem<String>) -> Result<(), StoreError> {
            self.inner.expired_put(tx, key, row).await
        }

        async fn expired_remove(&self, tx: &mut Self::Tx, key: &ItemKey) -> Result<Option<QueueItem<String>>, StoreError> {
            self.inner.expired_remove(tx, key).await
        }

        async fn expired_count(&self, tx: &mut Self::Tx) -> Result<u64, StoreError> {
            self.inner.expired_count(tx).await
        }

        async fn queue_enqueue(&self, tx: &mut Self::Tx, band: usize, key: ItemKey) -> Result<(), StoreError> {
            self.inner.queue_enqueue(tx, band, key).await
        }

        async fn queue_try_dequeue(&self, tx: &mut Self::Tx, band: usize) -> Result<Option<ItemKey>, StoreError> {
            if self.succeed_for.load(Ordering::Relaxed) == 0 {
                return Err(StoreError::Transient("injected failure".into()));
            }
            self.succeed_for.fetch_sub(1, Ordering::Relaxed);
            self.inner.queue_try_dequeue(tx, band).await
        }

        async fn queue_try_peek(&self, tx: &mut Self::Tx, band: usize) -> Result<Option<ItemKey>, StoreError> {
            self.inner.queue_try_peek(tx, band).await
        }

        async fn queue_enumerate(
            &self,
            tx: &mut Self::Tx,
            band: usize,
            skip: usize,
            take: usize,
        ) -> Result<Vec<ItemKey>, StoreError> {
            self.inner.queue_enumerate(tx, band, skip, take).await
        }

        async fn queue_count(&self, tx: &mut Self::Tx, band: usize) -> Result<u64, StoreError> {
            self.inner.queue_count(tx, band).await
        }

        async fn queue_count_all(&self, tx: &mut Self::Tx) -> Result<u64, StoreError> {
            self.inner.queue_count_all(tx).await
        }

        fn band_count(&self) -> usize {
            self.inner.band_count()
        }
    }

    #[tokio::test]
    async fn priority_order_drains_low_bands_first() {
        let replica = replica(PartitionConfig::default());
        let cancel = CancellationToken::new();
        replica.enqueue(vec!["a".into()], 2, 0, 0, &cancel).await.unwrap();
        replica.enqueue(vec!["b".into()], 0, 0, 0, &cancel).await.unwrap();
        replica.enqueue(vec!["c".into()], 1, 0, 0, &cancel).await.unwrap();

        let first = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
        assert_eq!(first[0].payload, "b");
        let second = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
        assert_eq!(second[0].payload, "c");
        let third = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
        assert_eq!(third[0].payload, "a");
    }

    #[tokio::test]
    async fn dequeue_leases_and_increments_count() {
        let replica = replica(PartitionConfig::default());
        let cancel = CancellationToken::new();
        replica.enqueue(vec!["x".into()], 0, 5, 0, &cancel).await.unwrap();
        let items = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].dequeue_count, 1);
        assert!(items[0].is_leased());
        assert_eq!(replica.count(crate::replica::QUEUE_LEASES, &cancel).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn empty_queue_returns_empty_vec() {
        let replica = replica(PartitionConfig::default());
        let cancel = CancellationToken::new();
        let items = replica.dequeue(5, 0, -1, &cancel).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn orphan_key_is_drained_without_error() {
        let replica = replica(PartitionConfig::default());
        let cancel = CancellationToken::new();
        let rows = replica.enqueue(vec!["y".into()], 0, 0, 0, &cancel).await.unwrap();
        replica.delete(rows[0].key, &cancel).await.unwrap();

        assert_eq!(replica.count(0, &cancel).await.unwrap(), 1);
        let items = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
        assert!(items.is_empty());
        assert_eq!(replica.count(0, &cancel).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn exhausting_the_error_budget_returns_what_was_already_dequeued() {
        let config = PartitionConfig::default();
        let bands = config.number_of_queues as usize;
        // Band 0 drains cleanly (two pops plus the one that finds it
        // empty); every call after that -- band 1 onward -- fails.
        let store = FlakyStore::new(InMemoryStateStore::new(bands), 3);
        let replica = PartitionReplica::new(0, store, Arc::new(config), Arc::new(OperationCounters::new())).unwrap();
        let cancel = CancellationToken::new();

        replica.enqueue(vec!["a".into(), "b".into()], 0, 0, 0, &cancel).await.unwrap();

        let items = replica.dequeue(10, 0, -1, &cancel).await.unwrap();
        assert_eq!(items.len(), 2);
    }
}
