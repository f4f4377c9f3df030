//! The item-table row: a key, its payload, and its lease/expiry metadata.

use serde::{Deserialize, Serialize};

use crate::item_key::ItemKey;

/// Sentinel used for "no lease currently held" / "not currently leased".
pub const NO_LEASE: i64 = i64::MAX;

/// An enqueued item: key, priority band, payload, and lease/TTL bookkeeping.
///
/// Mutated by dequeue (lease acquisition), extend-lease, and the sweeper;
/// destroyed by delete or terminal expiry. `T` is the opaque payload type --
/// the HTTP surface fixes it to [`serde_json::Value`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem<T> {
    /// Identifier returned to the caller; routes key-addressed operations.
    pub key: ItemKey,
    /// Priority band this item currently lives in (or last lived in, once
    /// leased/expired). Lower is more urgent.
    pub queue_band: i32,
    /// The opaque payload.
    pub payload: T,
    /// Lease duration in seconds last applied to this item. Zero means
    /// "fire and forget" (never leased).
    pub lease_duration_secs: u64,
    /// Absolute millis-since-epoch when the current lease expires.
    /// [`NO_LEASE`] means "not currently leased".
    pub leased_until: i64,
    /// Absolute millis-since-epoch when this item was enqueued (initially;
    /// unchanged by re-enqueue via the sweeper).
    pub enqueued_at: i64,
    /// Absolute millis-since-epoch time-to-live. `i64::MAX` means "never".
    pub expires_at: i64,
    /// Monotonically increasing count of lease acquisitions via dequeue.
    pub dequeue_count: u32,
}

impl<T> QueueItem<T> {
    /// `true` if this item currently holds a lease (`leased_until != NO_LEASE`).
    #[must_use]
    pub fn is_leased(&self) -> bool {
        self.leased_until != NO_LEASE
    }

    /// `true` if `now` (millis since epoch) is at or past `expires_at`.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Maps the payload, keeping all lease/expiry metadata unchanged.
    pub fn map_payload<U>(self, f: impl FnOnce(T) -> U) -> QueueItem<U> {
        QueueItem {
            key: self.key,
            queue_band: self.queue_band,
            payload: f(self.payload),
            lease_duration_secs: self.lease_duration_secs,
            leased_until: self.leased_until,
            enqueued_at: self.enqueued_at,
            expires_at: self.expires_at,
            dequeue_count: self.dequeue_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> QueueItem<String> {
        QueueItem {
            key: ItemKey::new(0),
            queue_band: 2,
            payload: "hello".to_string(),
            lease_duration_secs: 60,
            leased_until: NO_LEASE,
            enqueued_at: 1000,
            expires_at: i64::MAX,
            dequeue_count: 0,
        }
    }

    #[test]
    fn is_leased_reflects_sentinel() {
        let mut item = sample();
        assert!(!item.is_leased());
        item.leased_until = 5000;
        assert!(item.is_leased());
    }

    #[test]
    fn is_expired_at_compares_against_expires_at() {
        let item = sample();
        assert!(!item.is_expired_at(2000));

        let mut expiring = sample();
        expiring.expires_at = 5000;
        assert!(expiring.is_expired_at(5000));
        assert!(expiring.is_expired_at(6000));
        assert!(!expiring.is_expired_at(4999));
    }

    #[test]
    fn map_payload_preserves_metadata() {
        let item = sample();
        let mapped = item.clone().map_payload(|s| s.len());
        assert_eq!(mapped.payload, 5);
        assert_eq!(mapped.key, item.key);
        assert_eq!(mapped.queue_band, item.queue_band);
        assert_eq!(mapped.dequeue_count, item.dequeue_count);
    }
}
