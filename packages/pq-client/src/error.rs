//! Client-side error type: wraps transport failures and non-2xx responses
//! from the partition's HTTP surface, classified the same way
//! `pq_core::http_status_is_retryable` classifies a raw status code.

use pq_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error calling partition {partition_id}: {source}")]
    Transport {
        partition_id: u64,
        #[source]
        source: reqwest::Error,
    },
    #[error("partition {partition_id} returned {status}: {body}")]
    Response { partition_id: u64, status: u16, body: String },
    #[error("retry budget exhausted after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
    #[error("response body did not match the expected shape: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether a caller-side retry loop should try again: transport
    /// errors and retryable HTTP statuses, never a decode failure or an
    /// exhausted budget.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Response { status, .. } => pq_core::http_status_is_retryable(*status),
            Self::RetriesExhausted { .. } | Self::Decode(_) => false,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transient,
            Self::Response { status, .. } if pq_core::http_status_is_retryable(*status) => ErrorKind::Transient,
            Self::Response { status, .. } if *status == 417 => ErrorKind::PartitionMismatch,
            Self::Response { .. } => ErrorKind::ArgumentInvalid,
            Self::RetriesExhausted { .. } | Self::Decode(_) => ErrorKind::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_status_is_retryable() {
        let err = ClientError::Response { partition_id: 0, status: 500, body: String::new() };
        assert!(err.is_retryable());
    }

    #[test]
    fn argument_invalid_status_is_not_retryable() {
        let err = ClientError::Response { partition_id: 0, status: 400, body: String::new() };
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::ArgumentInvalid);
    }
}
