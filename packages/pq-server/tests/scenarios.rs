//! End-to-end scenarios exercising the replica's public operations
//! together, as a caller issuing one HTTP request per call would see
//! them, rather than one operation in isolation.

use std::sync::Arc;
use std::time::Duration;

use pq_server::config::PartitionConfig;
use pq_server::health::OperationCounters;
use pq_server::replica::{PartitionReplica, QUEUE_EXPIRED};
use pq_server::store::memory::InMemoryStateStore;
use tokio_util::sync::CancellationToken;

fn replica_with(config: PartitionConfig) -> Arc<PartitionReplica<String, InMemoryStateStore<String>>> {
    let band_count = config.number_of_queues as usize;
    Arc::new(
        PartitionReplica::new(0, InMemoryStateStore::new(band_count), Arc::new(config), Arc::new(OperationCounters::new()))
            .unwrap(),
    )
}

#[tokio::test]
async fn priority_order_drains_low_bands_first() {
    let replica = replica_with(PartitionConfig::default());
    let cancel = CancellationToken::new();

    replica.enqueue(vec!["A".to_string()], 2, 0, 0, &cancel).await.unwrap();
    replica.enqueue(vec!["B".to_string()], 0, 0, 0, &cancel).await.unwrap();
    replica.enqueue(vec!["C".to_string()], 1, 0, 0, &cancel).await.unwrap();

    let first = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
    let second = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
    let third = replica.dequeue(1, 0, -1, &cancel).await.unwrap();

    assert_eq!(first[0].payload, "B");
    assert_eq!(second[0].payload, "C");
    assert_eq!(third[0].payload, "A");
}

#[tokio::test]
async fn lease_expiry_demotes_band_then_expires_after_retry_budget() {
    let mut config = PartitionConfig::default();
    config.maximum_dequeue_count = 3;
    config.lease_duration_secs = 1;
    // Sweeper runs manually in this test, not on its own timer.
    config.lease_check_start_delay_secs = 3600;
    let replica = replica_with(config);
    let cancel = CancellationToken::new();

    replica.enqueue(vec!["X".to_string()], 2, 0, 0, &cancel).await.unwrap();

    // First dequeue: lands in band 2, dequeue_count becomes 1.
    let rows = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
    assert_eq!(rows[0].queue_band, 2);
    assert_eq!(rows[0].dequeue_count, 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    pq_server::sweeper::sweep_once_now(&replica, &cancel).await.unwrap();

    let rows = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
    assert_eq!(rows[0].payload, "X");
    assert_eq!(rows[0].dequeue_count, 2);
    assert_eq!(rows[0].queue_band, 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    pq_server::sweeper::sweep_once_now(&replica, &cancel).await.unwrap();

    let rows = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
    assert_eq!(rows[0].dequeue_count, 3);
    assert_eq!(rows[0].queue_band, 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    pq_server::sweeper::sweep_once_now(&replica, &cancel).await.unwrap();

    assert_eq!(replica.count(QUEUE_EXPIRED, &cancel).await.unwrap(), 1);
    assert!(replica.dequeue(1, 0, -1, &cancel).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_during_lease_leaves_an_orphan_key_until_the_next_scan() {
    let replica = replica_with(PartitionConfig::default());
    let cancel = CancellationToken::new();

    replica.enqueue(vec!["Y".to_string()], 0, 0, 0, &cancel).await.unwrap();
    let rows = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
    let key = rows[0].key;

    let before_item = replica.count(pq_server::replica::QUEUE_ITEMS, &cancel).await.unwrap();
    let before_lease = replica.count(pq_server::replica::QUEUE_LEASES, &cancel).await.unwrap();
    let before_queue = replica.count(0, &cancel).await.unwrap();

    let deleted = replica.delete(key, &cancel).await.unwrap();
    assert!(deleted.is_some());

    assert_eq!(replica.count(pq_server::replica::QUEUE_ITEMS, &cancel).await.unwrap(), before_item - 1);
    assert_eq!(replica.count(pq_server::replica::QUEUE_LEASES, &cancel).await.unwrap(), before_lease - 1);
    // The orphan key is still sitting in its band until the next scan drains it.
    assert_eq!(replica.count(0, &cancel).await.unwrap(), before_queue);

    assert!(replica.dequeue(1, 0, -1, &cancel).await.unwrap().is_empty());
    assert_eq!(replica.count(0, &cancel).await.unwrap(), 0);
}

#[tokio::test]
async fn extend_then_release_removes_item_and_lease_but_not_the_band_entry() {
    let mut config = PartitionConfig::default();
    config.lease_duration_secs = 10;
    let replica = replica_with(config);
    let cancel = CancellationToken::new();

    replica.enqueue(vec!["Z".to_string()], 0, 0, 0, &cancel).await.unwrap();
    let rows = replica.dequeue(1, 0, -1, &cancel).await.unwrap();
    let key = rows[0].key;

    let extended = replica.extend_lease(&[key], 60, &cancel).await.unwrap();
    assert_eq!(extended, vec![true]);

    let queue_count_before = replica.count(0, &cancel).await.unwrap();
    let released = replica.release_lease(&[key], &cancel).await.unwrap();
    assert_eq!(released, vec![true]);

    assert_eq!(replica.count(pq_server::replica::QUEUE_ITEMS, &cancel).await.unwrap(), 0);
    assert_eq!(replica.count(pq_server::replica::QUEUE_LEASES, &cancel).await.unwrap(), 0);
    assert_eq!(replica.count(0, &cancel).await.unwrap(), queue_count_before);
}
