//! The error taxonomy shared by the partition replica and the fan-out
//! client: kinds, not concrete types, so each layer can attach its own
//! context without the caller needing to match on a fixed set of structs.

use std::fmt;

/// Kind of failure a partition operation can produce.
///
/// Mirrors the taxonomy used throughout the core: `ArgumentInvalid` and
/// `PartitionMismatch` are rejected before any state change and are
/// user-visible 4xx; `Transient` is retried per a configured policy;
/// `NotPrimary` is surfaced to the caller for endpoint re-resolution;
/// `Cancelled` is returned as-is; `Fatal` covers serialization failures
/// and programmer errors and is never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ArgumentInvalid,
    PartitionMismatch,
    Transient,
    NotPrimary,
    Cancelled,
    Fatal,
}

impl ErrorKind {
    /// Whether an operation returning this kind should be retried by a
    /// caller-side retry policy.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }

    /// The HTTP status code this kind maps to on the wire: 400 for
    /// out-of-range arguments, 417 for precondition violations (partition
    /// mismatch), 500 for everything else that isn't a client concern to
    /// retry locally.
    #[must_use]
    pub fn http_status_code(self) -> u16 {
        match self {
            Self::ArgumentInvalid => 400,
            Self::PartitionMismatch => 417,
            Self::Transient | Self::NotPrimary | Self::Fatal => 500,
            Self::Cancelled => 499,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ArgumentInvalid => "argument_invalid",
            Self::PartitionMismatch => "partition_mismatch",
            Self::Transient => "transient",
            Self::NotPrimary => "not_primary",
            Self::Cancelled => "cancelled",
            Self::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Classifies an HTTP response status the way the client's transport-level
/// retry policy does: 500 and 503 are retryable, 400-417 except 429 are
/// not, and any other 5xx defaults to retryable.
#[must_use]
pub fn http_status_is_retryable(status: u16) -> bool {
    match status {
        500 | 503 => true,
        429 => true,
        400..=417 => false,
        500..=599 => true,
        _ => false,
    }
}
