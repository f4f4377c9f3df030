//! `pq-client` -- partition-aware fan-out client for the priority
//! lease-queue. Spreads unaddressed operations round-robin across
//! partitions, routes key-addressed operations directly by partition id,
//! and retries transient failures per a configurable policy.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod retry;

pub use client::PartitionClient;
pub use endpoint::{Endpoint, EndpointCache, EndpointResolver, StaticEndpointResolver};
pub use error::ClientError;
pub use retry::RetryPolicy;
