//! Lease sweeper: the background task that reaps expired leases on
//! the primary.
//!
//! A dedicated long-lived `tokio::task` driven by `tokio::select!`
//! against a `watch` shutdown receiver -- a periodic tick racing a
//! shutdown signal, not an ad-hoc timer callback, so a long tick can't
//! reenter itself.

use std::sync::Arc;

use pq_core::now_millis;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::PartitionConfig;
use crate::error::PartitionError;
use crate::replica::PartitionReplica;
use crate::store::{LockMode, PartitionStateStore};

/// A running sweeper task. Dropping this handle does not stop the task;
/// call [`LeaseSweeper::stop`] explicitly, mirroring the role controller's
/// requirement that task lifecycle be driven by role transitions, not by
/// scope exit.
pub struct LeaseSweeper {
    shutdown: watch::Sender<bool>,
}

impl LeaseSweeper {
    /// Spawns the sweeper loop for `replica`.
    pub fn spawn<T, S>(replica: Arc<PartitionReplica<T, S>>) -> Self
    where
        T: Clone + Send + Sync + 'static,
        S: PartitionStateStore<T> + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let config = replica.config_arc();
        tokio::spawn(async move {
            tokio::time::sleep(config.lease_check_start_delay()).await;
            let mut interval = tokio::time::interval(config.lease_check_interval());
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        sweep_tick(&replica).await;
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

async fn sweep_tick<T, S>(replica: &PartitionReplica<T, S>)
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    let now = now_millis();
    if replica.next_expiration() > now {
        return;
    }

    let cancel = CancellationToken::new();
    match sweep_once(replica, now, &cancel).await {
        Ok(candidate) => replica.set_next_expiration(candidate),
        Err(err) => {
            // Never propagate: log and force a retry on the next tick by
            // resetting the cursor to "now".
            tracing::error!(error = %err, "lease sweep failed, forcing retry next tick");
            replica.set_next_expiration(now);
        }
    }
}

/// Runs one sweep immediately, outside the task's own timer -- used by an
/// operator forcing a sweep ahead of schedule, and by tests that would
/// otherwise have to wait out `lease_check_interval_secs`.
pub async fn sweep_once_now<T, S>(replica: &PartitionReplica<T, S>, cancel: &CancellationToken) -> Result<(), PartitionError>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    let now = now_millis();
    let candidate = sweep_once(replica, now, cancel).await?;
    replica.set_next_expiration(candidate);
    Ok(())
}

/// One full sweep transaction: reclassify every expired lease, and return
/// the earliest still-live `leased_until` seen (the new `next_expiration`).
async fn sweep_once<T, S>(
    replica: &PartitionReplica<T, S>,
    now: i64,
    cancel: &CancellationToken,
) -> Result<i64, PartitionError>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    let store = replica.store();
    let mut tx = store.begin().await;
    let outcome = replica
        .guarded(cancel, async {
            let leases = store.lease_enumerate(&mut tx).await?;
            let mut candidate = i64::MAX;
            let mut reaped = 0_u32;
            for (key, leased_until) in leases {
                if leased_until <= now {
                    expire_one(replica, &mut tx, key).await?;
                    reaped += 1;
                } else {
                    candidate = candidate.min(leased_until);
                }
            }
            if reaped > 0 {
                tracing::debug!(reaped, "lease sweep reclaimed expired leases");
            }
            Ok(candidate)
        })
        .await;

    match outcome {
        Ok(candidate) => {
            store.commit(tx).await?;
            Ok(candidate)
        }
        Err(err) => {
            store.abort(tx).await;
            Err(err)
        }
    }
}

/// Handles one expired lease: demotes the item back into its band if it
/// still has retry budget, or moves it to the expired table if it
/// doesn't. Always removes the lease entry, which is idempotent.
async fn expire_one<T, S>(
    replica: &PartitionReplica<T, S>,
    tx: &mut S::Tx,
    key: pq_core::ItemKey,
) -> Result<(), crate::store::StoreError>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    let store = replica.store();
    if let Some(mut item) = store.item_get(tx, &key, LockMode::Update).await? {
        if item.dequeue_count >= replica.config().maximum_dequeue_count {
            store.item_remove(tx, &key).await?;
            store.expired_put(tx, key, item).await?;
        } else {
            let new_band = (item.queue_band - 1).max(0);
            item.queue_band = new_band;
            item.leased_until = pq_core::NO_LEASE;
            store.item_put(tx, key, item).await?;
            let band_index = usize::try_from(new_band).unwrap_or(0);
            store.queue_enqueue(tx, band_index, key).await?;
        }
    }
    store.lease_remove(tx, &key).await?;
    Ok(())
}
