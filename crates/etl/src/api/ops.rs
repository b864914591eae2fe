//! Usage API trait — checkpoint lookup and aggregate delivery.
//!
//! `live.rs` talks HTTP to the real service; `fake.rs` is a test double.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use super::ApiError;
use crate::aggregate::UsageBatch;

/// Outcome of a checkpoint lookup for one region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkpoint {
    /// The last object name that was successfully exported.
    Resume(String),
    /// The service has no record for this region.
    Fresh,
}

/// `GET /region/{name}` response body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionCheckpoint {
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub region: String,
}

impl From<RegionCheckpoint> for Checkpoint {
    fn from(value: RegionCheckpoint) -> Self {
        if value.file_name.is_empty() {
            Checkpoint::Fresh
        } else {
            Checkpoint::Resume(value.file_name)
        }
    }
}

pub trait UsageApi: Send + Sync {
    fn get_checkpoint<'a>(
        &'a self,
        region: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Checkpoint, ApiError>> + Send + 'a>>;

    fn post_usage<'a>(
        &'a self,
        batch: &'a UsageBatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + 'a>>;
}
