//! HTTP handler definitions for the `api/` surface.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports all handler functions for convenient access
//! when building the router.

pub mod health;
pub mod queue;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use queue::{
    count_handler, delete_handler, dequeue_handler, enqueue_handler, extend_release_handler,
    items_handler, peek_handler, peek_keys_handler, priority_count_handler,
};

use std::sync::Arc;
use std::time::Instant;

use super::{NetworkConfig, ShutdownController};
use crate::store::memory::InMemoryStateStore;
use crate::PartitionReplica;

/// The payload type the HTTP surface fixes the otherwise-generic core to:
/// an arbitrary JSON value, since the wire format is JSON and the core
/// itself never inspects the payload.
pub type JsonReplica = PartitionReplica<serde_json::Value, InMemoryStateStore<serde_json::Value>>;

/// Shared application state passed to all axum handlers via `State` extraction.
#[derive(Clone)]
pub struct AppState {
    pub replica: Arc<JsonReplica>,
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
    pub start_time: Instant,
}
