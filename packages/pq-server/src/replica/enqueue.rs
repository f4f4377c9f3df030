//! Enqueue: allocate a key per payload, stamp lease/expiry defaults,
//! insert into the item table, and append to the target band.

use std::time::Instant;

use pq_core::{now_millis, ItemKey, QueueItem, NO_LEASE};
use tokio_util::sync::CancellationToken;

use crate::error::PartitionError;
use crate::store::PartitionStateStore;

use super::PartitionReplica;

impl<T, S> PartitionReplica<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    /// Enqueues `payloads` into `band`. `lease_duration_secs == 0` and
    /// `expiration_secs == 0` both mean "use the configured default" --
    /// the two defaults are resolved independently, per the corrected
    /// reading of the source's enqueue-path ambiguity (see the design
    /// notes): `lease = if caller == 0 { configured } else { caller }`,
    /// and likewise for expiration.
    pub async fn enqueue(
        &self,
        payloads: Vec<T>,
        band: i32,
        lease_duration_secs: u64,
        expiration_secs: u64,
        cancel: &CancellationToken,
    ) -> Result<Vec<QueueItem<T>>, PartitionError> {
        let band_index = self.validate_band(band)?;

        let lease_duration_secs = if lease_duration_secs == 0 {
            self.config().lease_duration().as_secs()
        } else {
            lease_duration_secs
        };
        let expiration_secs = if expiration_secs == 0 {
            self.config().item_expiration().map_or(0, |d| d.as_secs())
        } else {
            expiration_secs
        };

        let started = Instant::now();
        let enqueued_at = now_millis();
        let expires_at = if expiration_secs == 0 {
            i64::MAX
        } else {
            enqueued_at.saturating_add((expiration_secs as i64).saturating_mul(1000))
        };

        let rows: Vec<QueueItem<T>> = payloads
            .into_iter()
            .map(|payload| QueueItem {
                key: ItemKey::new(self.partition_id()),
                queue_band: band,
                payload,
                lease_duration_secs,
                leased_until: NO_LEASE,
                enqueued_at,
                expires_at,
                dequeue_count: 0,
            })
            .collect();

        let mut tx = self.store().begin().await;
        let outcome = self
            .guarded(cancel, async {
                for row in &rows {
                    self.store().item_put(&mut tx, row.key, row.clone()).await?;
                    self.store().queue_enqueue(&mut tx, band_index, row.key).await?;
                }
                Ok(())
            })
            .await;

        match outcome {
            Ok(()) => {
                self.store().commit(tx).await?;
                self.counters().record_enqueue(started.elapsed());
                Ok(rows)
            }
            Err(err) => {
                self.store().abort(tx).await;
                Err(err)
            }
        }
    }
}
