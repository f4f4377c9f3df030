//! In-memory reference implementation of [`PartitionStateStore`].
//!
//! Stands in for a replicated-log-backed store: a single
//! `tokio::sync::Mutex` enforces the one-writer-at-a-time rule, and each
//! transaction works against a private clone of the partition state taken
//! at `begin()`. `commit()` swaps the clone back in; `abort()` just drops
//! it. This makes every transaction trivially isolated at the cost of an
//! `O(size)` clone per call, which is fine for a single partition's worth
//! of state held in memory.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use pq_core::{ItemKey, QueueItem};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LockMode, PartitionStateStore, StoreError};

#[derive(Clone)]
struct Inner<T> {
    items: BTreeMap<ItemKey, QueueItem<T>>,
    leases: BTreeMap<ItemKey, i64>,
    expired: BTreeMap<ItemKey, QueueItem<T>>,
    bands: Vec<VecDeque<ItemKey>>,
}

impl<T: Clone> Inner<T> {
    fn new(band_count: usize) -> Self {
        Self {
            items: BTreeMap::new(),
            leases: BTreeMap::new(),
            expired: BTreeMap::new(),
            bands: vec![VecDeque::new(); band_count],
        }
    }
}

/// A transaction against an [`InMemoryStateStore`].
///
/// Holds the store's mutex for its entire lifetime, so only one
/// transaction can be open at a time; `working` is the snapshot the
/// transaction reads and writes, discarded on [`abort`](PartitionStateStore::abort)
/// or folded back into the guard on [`commit`](PartitionStateStore::commit).
pub struct MemoryTx<T> {
    guard: OwnedMutexGuard<Inner<T>>,
    working: Inner<T>,
}

/// An in-memory [`PartitionStateStore`] holding one partition's item,
/// lease, expired, and priority-band state behind a single mutex.
pub struct InMemoryStateStore<T> {
    band_count: usize,
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T: Clone + Send + 'static> InMemoryStateStore<T> {
    /// Creates an empty store with `band_count` priority bands.
    ///
    /// # Panics
    ///
    /// Panics if `band_count` is zero; a partition always has at least one
    /// priority band.
    #[must_use]
    pub fn new(band_count: usize) -> Self {
        assert!(band_count > 0, "a partition needs at least one priority band");
        Self {
            band_count,
            inner: Arc::new(Mutex::new(Inner::new(band_count))),
        }
    }
}

#[async_trait]
impl<T> PartitionStateStore<T> for InMemoryStateStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Tx = MemoryTx<T>;

    async fn begin(&self) -> Self::Tx {
        let guard = Arc::clone(&self.inner).lock_owned().await;
        let working = guard.clone();
        MemoryTx { guard, working }
    }

    async fn commit(&self, mut tx: Self::Tx) -> Result<(), StoreError> {
        *tx.guard = tx.working;
        Ok(())
    }

    async fn abort(&self, _tx: Self::Tx) {}

    async fn item_get(
        &self,
        tx: &mut Self::Tx,
        key: &ItemKey,
        _lock_mode: LockMode,
    ) -> Result<Option<QueueItem<T>>, StoreError> {
        Ok(tx.working.items.get(key).cloned())
    }

    async fn item_put(
        &self,
        tx: &mut Self::Tx,
        key: ItemKey,
        row: QueueItem<T>,
    ) -> Result<(), StoreError> {
        tx.working.items.insert(key, row);
        Ok(())
    }

    async fn item_remove(
        &self,
        tx: &mut Self::Tx,
        key: &ItemKey,
    ) -> Result<Option<QueueItem<T>>, StoreError> {
        Ok(tx.working.items.remove(key))
    }

    async fn item_count(&self, tx: &mut Self::Tx) -> Result<u64, StoreError> {
        Ok(tx.working.items.len() as u64)
    }

    async fn item_enumerate(
        &self,
        tx: &mut Self::Tx,
        skip: usize,
        take: usize,
    ) -> Result<Vec<QueueItem<T>>, StoreError> {
        Ok(tx
            .working
            .items
            .values()
            .skip(skip)
            .take(take)
            .cloned()
            .collect())
    }

    async fn lease_upsert(
        &self,
        tx: &mut Self::Tx,
        key: ItemKey,
        leased_until: i64,
    ) -> Result<(), StoreError> {
        tx.working.leases.insert(key, leased_until);
        Ok(())
    }

    async fn lease_remove(
        &self,
        tx: &mut Self::Tx,
        key: &ItemKey,
    ) -> Result<Option<i64>, StoreError> {
        Ok(tx.working.leases.remove(key))
    }

    async fn lease_count(&self, tx: &mut Self::Tx) -> Result<u64, StoreError> {
        Ok(tx.working.leases.len() as u64)
    }

    async fn lease_enumerate(&self, tx: &mut Self::Tx) -> Result<Vec<(ItemKey, i64)>, StoreError> {
        Ok(tx
            .working
            .leases
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect())
    }

    async fn expired_put(
        &self,
        tx: &mut Self::Tx,
        key: ItemKey,
        row: QueueItem<T>,
    ) -> Result<(), StoreError> {
        tx.working.expired.insert(key, row);
        Ok(())
    }

    async fn expired_remove(
        &self,
        tx: &mut Self::Tx,
        key: &ItemKey,
    ) -> Result<Option<QueueItem<T>>, StoreError> {
        Ok(tx.working.expired.remove(key))
    }

    async fn expired_count(&self, tx: &mut Self::Tx) -> Result<u64, StoreError> {
        Ok(tx.working.expired.len() as u64)
    }

    async fn queue_enqueue(
        &self,
        tx: &mut Self::Tx,
        band: usize,
        key: ItemKey,
    ) -> Result<(), StoreError> {
        let queue = tx
            .working
            .bands
            .get_mut(band)
            .ok_or_else(|| StoreError::Transient(format!("no such priority band: {band}")))?;
        queue.push_back(key);
        Ok(())
    }

    async fn queue_try_dequeue(
        &self,
        tx: &mut Self::Tx,
        band: usize,
    ) -> Result<Option<ItemKey>, StoreError> {
        let queue = tx
            .working
            .bands
            .get_mut(band)
            .ok_or_else(|| StoreError::Transient(format!("no such priority band: {band}")))?;
        Ok(queue.pop_front())
    }

    async fn queue_try_peek(
        &self,
        tx: &mut Self::Tx,
        band: usize,
    ) -> Result<Option<ItemKey>, StoreError> {
        let queue = tx
            .working
            .bands
            .get(band)
            .ok_or_else(|| StoreError::Transient(format!("no such priority band: {band}")))?;
        Ok(queue.front().copied())
    }

    async fn queue_enumerate(
        &self,
        tx: &mut Self::Tx,
        band: usize,
        skip: usize,
        take: usize,
    ) -> Result<Vec<ItemKey>, StoreError> {
        let queue = tx
            .working
            .bands
            .get(band)
            .ok_or_else(|| StoreError::Transient(format!("no such priority band: {band}")))?;
        Ok(queue.iter().skip(skip).take(take).copied().collect())
    }

    async fn queue_count(&self, tx: &mut Self::Tx, band: usize) -> Result<u64, StoreError> {
        let queue = tx
            .working
            .bands
            .get(band)
            .ok_or_else(|| StoreError::Transient(format!("no such priority band: {band}")))?;
        Ok(queue.len() as u64)
    }

    async fn queue_count_all(&self, tx: &mut Self::Tx) -> Result<u64, StoreError> {
        Ok(tx.working.bands.iter().map(|q| q.len() as u64).sum())
    }

    fn band_count(&self) -> usize {
        self.band_count
    }
}
