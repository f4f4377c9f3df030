//! `pq-core` -- shared wire types for the partitioned priority lease-queue.
//!
//! This crate has no I/O. It provides:
//!
//! - [`item_key`]: the 32-byte [`ItemKey`] ("pop receipt") codec
//! - [`queue_item`]: the [`QueueItem`] row shape shared by the replica and
//!   the HTTP wire format
//! - [`error`]: the error-kind taxonomy and HTTP-status classification used
//!   by both the replica (to map errors to status codes) and the client
//!   (to decide what to retry)
//! - [`time`]: a wall-clock millis helper

pub mod error;
pub mod item_key;
pub mod queue_item;
pub mod time;

pub use error::ErrorKind;
pub use item_key::{ItemKey, ItemKeyParseError, BYTE_LEN, HEX_LEN};
pub use queue_item::{QueueItem, NO_LEASE};
pub use time::now_millis;

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
