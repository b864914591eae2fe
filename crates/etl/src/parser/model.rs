use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What a request path is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Live playback (`/hls/...`, `/cmaf/...`).
    ManifestId,
    /// Recorded playback (`/recordings/...`).
    StreamId,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::ManifestId => "manifest_id",
            EntityKind::StreamId => "stream_id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How HTTP status codes are bucketed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Every status is coalesced to `"200"`.
    #[default]
    Collapsed,
    /// Each status keeps its own bucket.
    PerStatus,
}

/// One attributable log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedRecord {
    /// `YYYY-MM-DDHH`
    pub date_hour: String,
    pub entity_id: String,
    pub kind: EntityKind,
    pub client_ip: String,
    pub file_size: i64,
    pub bytes_from_origin: i64,
    pub bytes_to_client: i64,
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Empty,
    Comment,
    TooFewFields(usize),
    /// Status field was `-`.
    MissingStatus,
    /// Path did not classify and the byte count did not parse.
    Unattributable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Record(ClassifiedRecord),
    /// Bytes sent to a client for a path that names no entity.
    NonEntity(i64),
    Skip(SkipReason),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    #[error("path has {0} segments, need at least 4")]
    TooFewSegments(usize),
    #[error("unsupported file extension: {0:?}")]
    WrongExtension(String),
    #[error("not a playback path prefix: {0:?}")]
    UnknownPrefix(String),
    #[error("empty entity id")]
    EmptyId,
}
