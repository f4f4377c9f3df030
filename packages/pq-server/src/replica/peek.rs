//! Peek: the non-destructive sibling of dequeue, plus `peekkeys`,
//! a raw listing of the keys sitting in one band.

use pq_core::{now_millis, ItemKey, QueueItem};
use tokio_util::sync::CancellationToken;

use crate::error::PartitionError;
use crate::store::{LockMode, PartitionStateStore};

use super::PartitionReplica;

/// Result of peeking a single band once.
enum PeekStep<T> {
    /// The band was empty; advance to the next one.
    BandEmpty,
    /// The front key was an orphan or absolutely expired and was drained
    /// (garbage-collected); the caller should peek the same band again.
    Drained,
    /// The front key names a live item; returned without being removed.
    Found(QueueItem<T>),
}

impl<T, S> PartitionReplica<T, S>
where
    T: Clone + Send + Sync + 'static,
    S: PartitionStateStore<T>,
{
    /// Returns the first live item across bands `start_band..=end_band`
    /// without removing it, garbage-collecting any orphaned or expired
    /// keys it encounters along the way.
    pub async fn peek(
        &self,
        start_band: i32,
        end_band: i32,
        cancel: &CancellationToken,
    ) -> Result<Option<QueueItem<T>>, PartitionError> {
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

        let mut band = start;
        while band <= end {
            match self.peek_one(band, cancel).await? {
                PeekStep::Found(item) => return Ok(Some(item)),
                PeekStep::Drained => {}
                PeekStep::BandEmpty => band += 1,
            }
        }
        Ok(None)
    }

    async fn peek_one(&self, band: usize, cancel: &CancellationToken) -> Result<PeekStep<T>, PartitionError> {
        let mut tx = self.store().begin().await;
        let outcome = self
            .guarded(cancel, async {
                let Some(key) = self.store().queue_try_peek(&mut tx, band).await? else {
                    return Ok(PeekStep::BandEmpty);
                };

                let row = self.store().item_get(&mut tx, &key, LockMode::Shared).await?;
                match row {
                    None => {
                        self.store().queue_try_dequeue(&mut tx, band).await?;
                        tracing::debug!(key = %key, band, "peek drained orphan key");
                        Ok(PeekStep::Drained)
                    }
                    Some(item) if item.is_expired_at(now_millis()) => {
                        self.store().queue_try_dequeue(&mut tx, band).await?;
                        self.store().item_remove(&mut tx, &key).await?;
                        self.store().expired_put(&mut tx, key, item).await?;
                        Ok(PeekStep::Drained)
                    }
                    Some(item) => Ok(PeekStep::Found(item)),
                }
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

    /// `peekkeys`: a raw page of the keys sitting in `band`, front-to-back,
    /// performing no garbage collection.
    pub async fn peek_keys(
        &self,
        band: i32,
        skip: usize,
        top: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ItemKey>, PartitionError> {
        let band = self.validate_band(band)?;
        let top = self.validate_batch_size(top)?;
        let mut tx = self.store().begin().await;
        let outcome = self
            .guarded(cancel, self.store().queue_enumerate(&mut tx, band, skip, top))
            .await;
        match outcome {
            Ok(keys) => {
                self.store().commit(tx).await?;
                Ok(keys)
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
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::config::PartitionConfig;
    use crate::health::OperationCounters;
    use crate::store::memory::InMemoryStateStore;

    use super::*;

    fn replica() -> PartitionReplica<String, InMemoryStateStore<String>> {
        PartitionReplica::new(
            0,
            InMemoryStateStore::new(5),
            Arc::new(PartitionConfig::default()),
            Arc::new(OperationCounters::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn peek_returns_front_item_without_removing_it() {
        let replica = replica();
        let cancel = CancellationToken::new();
        replica.enqueue(vec!["a".into()], 1, 0, 0, &cancel).await.unwrap();

        let peeked = replica.peek(0, -1, &cancel).await.unwrap().unwrap();
        assert_eq!(peeked.payload, "a");
        assert_eq!(replica.count(1, &cancel).await.unwrap(), 1);

        let peeked_again = replica.peek(0, -1, &cancel).await.unwrap().unwrap();
        assert_eq!(peeked_again.payload, "a");
    }

    #[tokio::test]
    async fn peek_skips_orphans_and_empty_bands() {
        let replica = replica();
        let cancel = CancellationToken::new();
        let rows = replica.enqueue(vec!["y".into()], 0, 0, 0, &cancel).await.unwrap();
        replica.delete(rows[0].key, &cancel).await.unwrap();
        replica.enqueue(vec!["z".into()], 1, 0, 0, &cancel).await.unwrap();

        let peeked = replica.peek(0, -1, &cancel).await.unwrap().unwrap();
        assert_eq!(peeked.payload, "z");
        assert_eq!(replica.count(0, &cancel).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn peek_keys_lists_without_removing() {
        let replica = replica();
        let cancel = CancellationToken::new();
        let rows = replica
            .enqueue(vec!["a".into(), "b".into()], 0, 0, 0, &cancel)
            .await
            .unwrap();
        let keys = replica.peek_keys(0, 0, 10, &cancel).await.unwrap();
        assert_eq!(keys, vec![rows[0].key, rows[1].key]);
        assert_eq!(replica.count(0, &cancel).await.unwrap(), 2);
    }
}
