//! Partition state store adapter.
//!
//! Generalizes a `StorageEngine`-style synchronous key-value trait into
//! the small, fixed multi-collection contract the partition replica
//! needs: an item table, a lease table, an expired table, and `K` FIFO
//! priority bands, composed into one all-or-nothing transaction per
//! call. The replica (see [`crate::replica`]) is the only caller;
//! [`memory::InMemoryStateStore`] is the one reference implementation,
//! standing in for the replicated-log-backed store this contract treats
//! as an external black box.
//!
//! The trait is generic over the opaque payload type `T` rather than over
//! arbitrary map/queue shapes, because exactly one schema is ever needed
//! here: swapping in a real store means swapping the implementation, not
//! adding new collections.

pub mod memory;

use async_trait::async_trait;
use pq_core::{ItemKey, QueueItem};

/// Failure surface a [`PartitionStateStore`] can present to the replica.
///
/// `Transient`, `Timeout`, and `ObjectClosed` are retried by the caller;
/// `NotPrimary` is surfaced so the client can re-resolve its endpoint.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The operation failed for a reason expected to clear up on retry
    /// (e.g. the underlying log is temporarily unavailable).
    #[error("transient store error: {0}")]
    Transient(String),
    /// This replica is no longer (or not yet) the primary.
    #[error("not primary")]
    NotPrimary,
    /// The collection handle was closed out from under the caller; treated
    /// like `Transient` after refreshing the handle.
    #[error("object closed: {0}")]
    ObjectClosed(String),
    /// The operation did not complete within the configured timeout.
    #[error("store operation timed out")]
    Timeout,
}

impl StoreError {
    /// Whether this failure should be retried by the caller.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NotPrimary)
    }
}

/// Lock mode requested on an item-table read: `Shared` allows concurrent
/// readers, `Update` takes exclusive ownership for the remainder of the
/// transaction so a subsequent write in the same transaction cannot race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Update,
}

/// Opens the item/lease/expired/queue collections and runs transactions
/// against them as a single unit.
///
/// All reads within one transaction are serializable; commit is
/// linearizable across replicas of the same partition (in the reference
/// [`memory::InMemoryStateStore`], "replicas" is a single process, so this
/// reduces to "commit is atomic").
#[async_trait]
pub trait PartitionStateStore<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// A single in-flight transaction. Every map/queue call below takes
    /// `&mut Self::Tx` until it is consumed by [`commit`](Self::commit) or
    /// [`abort`](Self::abort).
    type Tx: Send;

    /// Begins a new transaction. Blocks until any prior transaction against
    /// this partition has committed or aborted -- there is exactly one
    /// logical writer per partition at a time.
    async fn begin(&self) -> Self::Tx;

    /// Commits a transaction, making its effects visible.
    async fn commit(&self, tx: Self::Tx) -> Result<(), StoreError>;

    /// Aborts a transaction, discarding its effects.
    async fn abort(&self, tx: Self::Tx);

    // --- item table ---

    async fn item_get(
        &self,
        tx: &mut Self::Tx,
        key: &ItemKey,
        lock_mode: LockMode,
    ) -> Result<Option<QueueItem<T>>, StoreError>;

    async fn item_put(
        &self,
        tx: &mut Self::Tx,
        key: ItemKey,
        row: QueueItem<T>,
    ) -> Result<(), StoreError>;

    async fn item_remove(
        &self,
        tx: &mut Self::Tx,
        key: &ItemKey,
    ) -> Result<Option<QueueItem<T>>, StoreError>;

    async fn item_count(&self, tx: &mut Self::Tx) -> Result<u64, StoreError>;

    async fn item_enumerate(
        &self,
        tx: &mut Self::Tx,
        skip: usize,
        take: usize,
    ) -> Result<Vec<QueueItem<T>>, StoreError>;

    // --- lease table ---

    async fn lease_upsert(
        &self,
        tx: &mut Self::Tx,
        key: ItemKey,
        leased_until: i64,
    ) -> Result<(), StoreError>;

    async fn lease_remove(
        &self,
        tx: &mut Self::Tx,
        key: &ItemKey,
    ) -> Result<Option<i64>, StoreError>;

    async fn lease_count(&self, tx: &mut Self::Tx) -> Result<u64, StoreError>;

    /// All `(key, leased_until)` pairs, in unspecified order -- the
    /// sweeper only needs to find expired leases, not walk them in any
    /// particular order.
    async fn lease_enumerate(&self, tx: &mut Self::Tx) -> Result<Vec<(ItemKey, i64)>, StoreError>;

    // --- expired table ---

    async fn expired_put(
        &self,
        tx: &mut Self::Tx,
        key: ItemKey,
        row: QueueItem<T>,
    ) -> Result<(), StoreError>;

    async fn expired_remove(
        &self,
        tx: &mut Self::Tx,
        key: &ItemKey,
    ) -> Result<Option<QueueItem<T>>, StoreError>;

    async fn expired_count(&self, tx: &mut Self::Tx) -> Result<u64, StoreError>;

    // --- priority queue bands ---

    async fn queue_enqueue(
        &self,
        tx: &mut Self::Tx,
        band: usize,
        key: ItemKey,
    ) -> Result<(), StoreError>;

    async fn queue_try_dequeue(
        &self,
        tx: &mut Self::Tx,
        band: usize,
    ) -> Result<Option<ItemKey>, StoreError>;

    async fn queue_try_peek(
        &self,
        tx: &mut Self::Tx,
        band: usize,
    ) -> Result<Option<ItemKey>, StoreError>;

    /// A page of keys currently sitting in `band`, front-to-back, without
    /// removing them. Backs `peekkeys`.
    async fn queue_enumerate(
        &self,
        tx: &mut Self::Tx,
        band: usize,
        skip: usize,
        take: usize,
    ) -> Result<Vec<ItemKey>, StoreError>;

    async fn queue_count(&self, tx: &mut Self::Tx, band: usize) -> Result<u64, StoreError>;

    async fn queue_count_all(&self, tx: &mut Self::Tx) -> Result<u64, StoreError>;

    /// Number of priority bands this store was configured with.
    fn band_count(&self) -> usize;
}
