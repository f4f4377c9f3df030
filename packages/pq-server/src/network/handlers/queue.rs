//! Handlers for the queue data-plane operations: `prioritycount`,
//! `count`, the root GET (dequeue), `peek`, `peekkeys`, `items`, the `{band}`
//! POST (enqueue), the root PUT (extend/release), and `{key}` DELETE.

use axum::extract::{Path, Query, State};
use axum::Json;
use pq_core::{ItemKey, QueueItem};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::error::PartitionError;
use crate::replica::MAX_BATCH;

/// Default batch size when a query omits `count`/`top`.
const DEFAULT_BATCH: usize = 32;

pub async fn priority_count_handler(State(state): State<AppState>) -> Json<u32> {
    Json(state.replica.priority_count())
}

#[derive(Deserialize)]
pub struct CountQuery {
    queue: i32,
}

pub async fn count_handler(
    State(state): State<AppState>,
    Query(query): Query<CountQuery>,
) -> Result<Json<u64>, PartitionError> {
    let cancel = CancellationToken::new();
    let count = state.replica.count(query.queue, &cancel).await?;
    Ok(Json(count))
}

#[derive(Deserialize)]
pub struct DequeueQuery {
    #[serde(default)]
    count: Option<usize>,
    #[serde(default)]
    startqueue: Option<i32>,
    #[serde(default)]
    endqueue: Option<i32>,
    #[serde(default)]
    requestid: Option<String>,
}

pub async fn dequeue_handler(
    State(state): State<AppState>,
    Query(query): Query<DequeueQuery>,
) -> Result<Json<Vec<QueueItem<serde_json::Value>>>, PartitionError> {
    tracing::debug!(requestid = query.requestid.as_deref().unwrap_or(""), "dequeue");
    let cancel = CancellationToken::new();
    let count = query.count.unwrap_or(DEFAULT_BATCH).min(MAX_BATCH);
    let start = query.startqueue.unwrap_or(0);
    let end = query.endqueue.unwrap_or(-1);
    let items = state.replica.dequeue(count, start, end, &cancel).await?;
    Ok(Json(items))
}

#[derive(Deserialize)]
pub struct PeekQuery {
    #[serde(default)]
    startqueue: Option<i32>,
    #[serde(default)]
    endqueue: Option<i32>,
    #[serde(default)]
    requestid: Option<String>,
}

pub async fn peek_handler(
    State(state): State<AppState>,
    Query(query): Query<PeekQuery>,
) -> Result<Json<Option<QueueItem<serde_json::Value>>>, PartitionError> {
    tracing::debug!(requestid = query.requestid.as_deref().unwrap_or(""), "peek");
    let cancel = CancellationToken::new();
    let start = query.startqueue.unwrap_or(0);
    let end = query.endqueue.unwrap_or(-1);
    let item = state.replica.peek(start, end, &cancel).await?;
    Ok(Json(item))
}

#[derive(Deserialize)]
pub struct PeekKeysQuery {
    queue: i32,
    #[serde(default)]
    top: Option<usize>,
    #[serde(default)]
    skip: Option<usize>,
    #[serde(default)]
    requestid: Option<String>,
}

pub async fn peek_keys_handler(
    State(state): State<AppState>,
    Query(query): Query<PeekKeysQuery>,
) -> Result<Json<Vec<ItemKey>>, PartitionError> {
    tracing::debug!(requestid = query.requestid.as_deref().unwrap_or(""), "peekkeys");
    let cancel = CancellationToken::new();
    let top = query.top.unwrap_or(DEFAULT_BATCH).min(MAX_BATCH);
    let skip = query.skip.unwrap_or(0);
    let keys = state.replica.peek_keys(query.queue, skip, top, &cancel).await?;
    Ok(Json(keys))
}

#[derive(Deserialize)]
pub struct ItemsQuery {
    #[serde(default)]
    top: Option<usize>,
    #[serde(default)]
    skip: Option<usize>,
    #[serde(default)]
    requestid: Option<String>,
}

pub async fn items_handler(
    State(state): State<AppState>,
    Query(query): Query<ItemsQuery>,
) -> Result<Json<Vec<QueueItem<serde_json::Value>>>, PartitionError> {
    tracing::debug!(requestid = query.requestid.as_deref().unwrap_or(""), "items");
    let cancel = CancellationToken::new();
    let top = query.top.unwrap_or(DEFAULT_BATCH).min(MAX_BATCH);
    let skip = query.skip.unwrap_or(0);
    let items = state.replica.items(skip, top, &cancel).await?;
    Ok(Json(items))
}

#[derive(Deserialize)]
pub struct EnqueueQuery {
    #[serde(default, rename = "leaseSeconds")]
    lease_seconds: Option<u64>,
    #[serde(default, rename = "expirationMinutes")]
    expiration_minutes: Option<u64>,
    #[serde(default)]
    requestid: Option<String>,
}

pub async fn enqueue_handler(
    State(state): State<AppState>,
    Path(band): Path<i32>,
    Query(query): Query<EnqueueQuery>,
    Json(payloads): Json<Vec<serde_json::Value>>,
) -> Result<Json<Vec<QueueItem<serde_json::Value>>>, PartitionError> {
    tracing::debug!(requestid = query.requestid.as_deref().unwrap_or(""), band, "enqueue");
    let cancel = CancellationToken::new();
    let lease_seconds = query.lease_seconds.unwrap_or(0);
    let expiration_secs = query.expiration_minutes.unwrap_or(0).saturating_mul(60);
    let rows = state
        .replica
        .enqueue(payloads, band, lease_seconds, expiration_secs, &cancel)
        .await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct ExtendReleaseQuery {
    #[serde(default, rename = "leaseSeconds")]
    lease_seconds: u64,
    #[serde(default)]
    requestid: Option<String>,
}

pub async fn extend_release_handler(
    State(state): State<AppState>,
    Query(query): Query<ExtendReleaseQuery>,
    Json(keys): Json<Vec<ItemKey>>,
) -> Result<Json<Vec<bool>>, PartitionError> {
    tracing::debug!(requestid = query.requestid.as_deref().unwrap_or(""), "extend_release");
    let cancel = CancellationToken::new();
    let results = state.replica.extend_lease(&keys, query.lease_seconds, &cancel).await?;
    Ok(Json(results))
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    requestid: Option<String>,
}

pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<ItemKey>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<Option<QueueItem<serde_json::Value>>>, PartitionError> {
    tracing::debug!(requestid = query.requestid.as_deref().unwrap_or(""), "delete");
    let cancel = CancellationToken::new();
    let item = state.replica.delete(key, &cancel).await?;
    Ok(Json(item))
}
