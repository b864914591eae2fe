//! Fake — in-memory object store for deterministic testing.
//!
//! Provides a [`FakeStore`] that implements [`ObjectStore`] over a sorted
//! map of object names, with the same range/prefix/delimiter semantics as
//! the live client. Call counters let tests assert which operations ran.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;

use super::ops::{ListQuery, Listing, ObjectBody, ObjectStore};
use super::StorageError;

/// Mutable inner state protected by a mutex.
#[derive(Default)]
struct Inner {
    objects: BTreeMap<String, Bytes>,
    broken: HashSet<String>,
    list_failure: Option<String>,
    fetch_delay: Option<Duration>,
}

/// A fake object store for deterministic testing.
pub struct FakeStore {
    inner: Mutex<Inner>,
    list_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
}

impl FakeStore {
    /// Create an empty fake store.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            list_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        }
    }

    /// Seed an object.
    pub async fn put(&self, name: &str, body: impl Into<Bytes>) {
        self.inner.lock().await.objects.insert(name.to_string(), body.into());
    }

    /// Make fetches of `name` fail with a request error.
    pub async fn break_object(&self, name: &str) {
        self.inner.lock().await.broken.insert(name.to_string());
    }

    /// Make every listing fail.
    pub async fn fail_listing(&self, message: &str) {
        self.inner.lock().await.list_failure = Some(message.to_string());
    }

    /// Delay every fetch, to exercise timeouts.
    pub async fn set_fetch_delay(&self, delay: Duration) {
        self.inner.lock().await.fetch_delay = Some(delay);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::Relaxed)
    }
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for FakeStore {
    fn list<'a>(
        &'a self,
        query: &'a ListQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Listing, StorageError>> + Send + 'a>> {
        Box::pin(async move {
            self.list_calls.fetch_add(1, Ordering::Relaxed);
            let state = self.inner.lock().await;
            if let Some(message) = &state.list_failure {
                return Err(StorageError::Request(message.clone()));
            }

            Ok(Listing::from_sorted(state.objects.keys().map(String::as_str), query))
        })
    }

    fn fetch<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectBody, StorageError>> + Send + 'a>> {
        Box::pin(async move {
            self.fetch_calls.fetch_add(1, Ordering::Relaxed);
            let (body, delay) = {
                let state = self.inner.lock().await;
                if state.broken.contains(name) {
                    return Err(StorageError::Request(format!("injected failure for {}", name)));
                }
                let body = state
                    .objects
                    .get(name)
                    .cloned()
                    .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
                (body, state.fetch_delay)
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let body: ObjectBody = Box::pin(tokio_stream::iter(vec![Ok(body)]));
            Ok(body)
        })
    }
}
