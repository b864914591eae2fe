//! Fake — in-memory usage API for deterministic testing.
//!
//! Checkpoints are seeded per region; every accepted batch is recorded so
//! tests can assert on exactly what would have been exported.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

use super::ops::{Checkpoint, UsageApi};
use super::ApiError;
use crate::aggregate::UsageBatch;

#[derive(Default)]
struct Inner {
    checkpoints: HashMap<String, String>,
    forbidden: HashSet<String>,
    posted: Vec<UsageBatch>,
    fail_posts: bool,
}

/// A fake usage API for deterministic testing.
pub struct FakeApi {
    inner: Mutex<Inner>,
    checkpoint_calls: AtomicUsize,
    post_calls: AtomicUsize,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            checkpoint_calls: AtomicUsize::new(0),
            post_calls: AtomicUsize::new(0),
        }
    }

    /// Seed the last exported object name for `region`.
    pub async fn set_checkpoint(&self, region: &str, file_name: &str) {
        self.inner
            .lock()
            .await
            .checkpoints
            .insert(region.to_string(), file_name.to_string());
    }

    /// Reject every call for `region` with 403.
    pub async fn forbid(&self, region: &str) {
        self.inner.lock().await.forbidden.insert(region.to_string());
    }

    /// Make every post fail with a 500.
    pub async fn fail_posts(&self, fail: bool) {
        self.inner.lock().await.fail_posts = fail;
    }

    /// All batches accepted so far, in post order.
    pub async fn posted(&self) -> Vec<UsageBatch> {
        self.inner.lock().await.posted.clone()
    }

    pub fn checkpoint_calls(&self) -> usize {
        self.checkpoint_calls.load(Ordering::Relaxed)
    }

    pub fn post_calls(&self) -> usize {
        self.post_calls.load(Ordering::Relaxed)
    }
}

impl Default for FakeApi {
    fn default() -> Self {
        Self::new()
    }
}

impl UsageApi for FakeApi {
    fn get_checkpoint<'a>(
        &'a self,
        region: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Checkpoint, ApiError>> + Send + 'a>> {
        Box::pin(async move {
            self.checkpoint_calls.fetch_add(1, Ordering::Relaxed);
            let inner = self.inner.lock().await;
            if inner.forbidden.contains(region) {
                return Err(ApiError::Forbidden(region.to_string()));
            }
            Ok(match inner.checkpoints.get(region) {
                Some(name) => Checkpoint::Resume(name.clone()),
                None => Checkpoint::Fresh,
            })
        })
    }

    fn post_usage<'a>(
        &'a self,
        batch: &'a UsageBatch,
    ) -> Pin<Box<dyn Future<Output = Result<(), ApiError>> + Send + 'a>> {
        Box::pin(async move {
            self.post_calls.fetch_add(1, Ordering::Relaxed);
            let mut inner = self.inner.lock().await;
            if inner.forbidden.contains(&batch.region) {
                return Err(ApiError::Forbidden(batch.region.clone()));
            }
            if inner.fail_posts {
                return Err(ApiError::Status {
                    endpoint: "fake://api/cdn-data".to_string(),
                    status: 500,
                    body: "injected failure".to_string(),
                });
            }
            inner.posted.push(batch.clone());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_checkpoint_seeded_and_fresh() {
        let api = FakeApi::new();
        api.set_checkpoint("us-east", "a/cds/2021/10/24/cds_20211024-070000.gz").await;

        assert_eq!(
            api.get_checkpoint("us-east").await.unwrap(),
            Checkpoint::Resume("a/cds/2021/10/24/cds_20211024-070000.gz".to_string())
        );
        assert_eq!(api.get_checkpoint("eu-west").await.unwrap(), Checkpoint::Fresh);
        assert_eq!(api.checkpoint_calls(), 2);
    }

    #[tokio::test]
    async fn test_forbidden_region() {
        let api = FakeApi::new();
        api.forbid("us-east").await;
        let err = api.get_checkpoint("us-east").await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(ref r) if r == "us-east"));
    }
}
