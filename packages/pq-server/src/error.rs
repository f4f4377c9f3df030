//! Partition-level error taxonomy.
//!
//! One enum per the kinds in [`pq_core::ErrorKind`], carrying whatever
//! context each kind needs; the HTTP adapter classifies these into status
//! codes via [`PartitionError::kind`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pq_core::ErrorKind;
use serde::Serialize;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    #[error("argument invalid: {0}")]
    ArgumentInvalid(String),

    #[error("key belongs to partition {key_partition}, this replica owns {this_partition}")]
    PartitionMismatch { key_partition: u64, this_partition: u64 },

    #[error("transient store failure: {0}")]
    Transient(StoreError),

    #[error("this replica is not primary")]
    NotPrimary,

    #[error("operation cancelled")]
    Cancelled,

    #[error("fatal error: {0}")]
    Fatal(String),
}

impl PartitionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ArgumentInvalid(_) => ErrorKind::ArgumentInvalid,
            Self::PartitionMismatch { .. } => ErrorKind::PartitionMismatch,
            Self::Transient(_) => ErrorKind::Transient,
            Self::NotPrimary => ErrorKind::NotPrimary,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Fatal(_) => ErrorKind::Fatal,
        }
    }
}

/// `StoreError::NotPrimary` is surfaced as-is; every other store failure is
/// transient from the replica's point of view.
impl From<StoreError> for PartitionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotPrimary => Self::NotPrimary,
            other => Self::Transient(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: String,
}

impl IntoResponse for PartitionError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind().http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind().to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_not_primary_maps_to_not_primary() {
        let err: PartitionError = StoreError::NotPrimary.into();
        assert!(matches!(err, PartitionError::NotPrimary));
        assert_eq!(err.kind(), ErrorKind::NotPrimary);
    }

    #[test]
    fn other_store_errors_are_transient() {
        let err: PartitionError = StoreError::Timeout.into();
        assert!(matches!(err, PartitionError::Transient(StoreError::Timeout)));
        assert_eq!(err.kind(), ErrorKind::Transient);
    }

    #[test]
    fn into_response_maps_argument_invalid_to_400() {
        let response = PartitionError::ArgumentInvalid("bad band".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn into_response_maps_partition_mismatch_to_417() {
        let response = PartitionError::PartitionMismatch { key_partition: 1, this_partition: 0 }.into_response();
        assert_eq!(response.status().as_u16(), 417);
    }
}
