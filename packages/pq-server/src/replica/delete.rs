//! Delete: removes the item row and whichever index (lease or
//! expired) currently references it. A key left behind in a priority
//! band is tolerated -- it is drained as an orphan on the next dequeue or
//! peek.

use pq_core::{QueueItem, NO_LEASE};
use tokio_util::sync::CancellationToken;

use crate::error::PartitionError;
use crate::store::PartitionStateStore;

use super::PartitionReplica;

impl<T, S> PartitionReplica<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    pub async fn delete(
        &self,
        key: pq_core::ItemKey,
        cancel: &CancellationToken,
    ) -> Result<Option<QueueItem<T>>, PartitionError> {
        self.check_partition(key)?;

        let mut tx = self.store().begin().await;
        let outcome = self
            .guarded(cancel, async {
                let Some(item) = self.store().item_remove(&mut tx, &key).await? else {
                    return Ok(None);
                };
                if item.leased_until != NO_LEASE {
                    self.store().lease_remove(&mut tx, &key).await?;
                }
                self.store().expired_remove(&mut tx, &key).await?;
                Ok(Some(item))
            })
            .await;

        match outcome {
            Ok(item) => {
                self.store().commit(tx).await?;
                Ok(item)
            }
            Err(err) => {
                self.store().abort(tx).await;
                Err(err)
            }
        }
    }
}
