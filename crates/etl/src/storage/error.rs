//! Error — object-store error type shared by the live client and the fake.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object store request failed: {0}")]
    Request(String),
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("Object store operation timed out after {0:?}")]
    Timeout(Duration),
    #[error("Unexpected object store response ({status}): {body}")]
    Status { status: u16, body: String },
    #[error("Bucket lists no objects")]
    EmptyBucket,
    #[error("Object name does not follow the log naming convention: {0}")]
    InvalidName(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Malformed object store response: {0}")]
    Decode(#[from] serde_json::Error),
}
