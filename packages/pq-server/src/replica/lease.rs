//! Extend/release lease. `release_lease` is `extend_lease` with a
//! duration of zero; both run as a single transaction covering every key
//! in the batch and return one boolean per key.

use std::time::Instant;

use pq_core::{now_millis, ItemKey};
use tokio_util::sync::CancellationToken;

use crate::error::PartitionError;
use crate::store::{LockMode, PartitionStateStore};

use super::PartitionReplica;

impl<T, S> PartitionReplica<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    /// `lease_duration_secs == 0` releases every key instead of extending
    /// it; see [`Self::release_lease`].
    pub async fn extend_lease(
        &self,
        keys: &[ItemKey],
        lease_duration_secs: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<bool>, PartitionError> {
        self.check_partitions(keys)?;
        let started = Instant::now();

        let mut tx = self.store().begin().await;
        let outcome = self
            .guarded(cancel, async {
                let mut results = Vec::with_capacity(keys.len());
                for &key in keys {
                    let ok = if lease_duration_secs == 0 {
                        self.release_one(&mut tx, key).await?
                    } else {
                        self.extend_one(&mut tx, key, lease_duration_secs).await?
                    };
                    results.push(ok);
                }
                Ok(results)
            })
            .await;

        match outcome {
            Ok(results) => {
                self.store().commit(tx).await?;
                self.counters().record_extend(started.elapsed());
                Ok(results)
            }
            Err(err) => {
                self.store().abort(tx).await;
                Err(err)
            }
        }
    }

    /// `extend_lease(keys, 0)`.
    pub async fn release_lease(
        &self,
        keys: &[ItemKey],
        cancel: &CancellationToken,
    ) -> Result<Vec<bool>, PartitionError> {
        self.extend_lease(keys, 0, cancel).await
    }

    async fn extend_one(
        &self,
        tx: &mut S::Tx,
        key: ItemKey,
        lease_duration_secs: u64,
    ) -> Result<bool, crate::store::StoreError> {
        let Some(mut item) = self.store().item_get(tx, &key, LockMode::Update).await? else {
            return Ok(false);
        };
        let leased_until = now_millis().saturating_add((lease_duration_secs as i64).saturating_mul(1000));
        item.lease_duration_secs = lease_duration_secs;
        item.leased_until = leased_until;
        self.store().item_put(tx, key, item).await?;
        self.store().lease_upsert(tx, key, leased_until).await?;
        self.advance_next_expiration(leased_until);
        Ok(true)
    }

    async fn release_one(&self, tx: &mut S::Tx, key: ItemKey) -> Result<bool, crate::store::StoreError> {
        let had_lease = self.store().lease_remove(tx, &key).await?.is_some();
        if had_lease {
            self.store().item_remove(tx, &key).await?;
        }
        Ok(had_lease)
    }
}
