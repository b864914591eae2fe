//! Error — top-level error taxonomy for an ETL run.
//!
//! Per-line and per-file problems never reach this type; they are absorbed
//! by the classifier and the worker pool. What remains here is either fatal
//! for one source or fatal for the whole run.

use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;
use crate::conf::ConfigError;
use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Forbidden: usage API rejected the configured key (region {0})")]
    Forbidden(String),
    #[error("Object store error: {0}")]
    Storage(#[from] StorageError),
    #[error("Usage API error: {0}")]
    Api(ApiError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Run cancelled")]
    Cancelled,
    #[error("{failed} of {total} sources failed")]
    SourcesFailed { failed: usize, total: usize },
    #[error("Failed to write {path}: {source}")]
    Output {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<ApiError> for EtlError {
    /// Authorization failures keep their own variant so callers can tell
    /// broken credentials apart from a flaky endpoint.
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Forbidden(region) => EtlError::Forbidden(region),
            other => EtlError::Api(other),
        }
    }
}

impl EtlError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            EtlError::Forbidden(_) => 10,
            EtlError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Errors that stop the whole run rather than just the current source.
    pub fn halts_run(&self) -> bool {
        matches!(self, EtlError::Forbidden(_) | EtlError::Cancelled)
    }
}
