//! Storage module — object-store access: trait, live GCS client, local
//! directory store, fake, naming.

pub mod error;
pub mod ops;
pub mod naming;
pub mod gcs;
pub mod local;
pub mod fake;

pub use error::StorageError;
pub use ops::{ListQuery, Listing, ObjectBody, ObjectStore};
pub use gcs::GcsStore;
pub use local::LocalStore;
pub use fake::FakeStore;

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio_stream::StreamExt;

/// Run a listing bounded by `timeout`.
pub async fn list_with_timeout(
    store: &dyn ObjectStore,
    query: &ListQuery,
    timeout: Duration,
) -> Result<Listing, StorageError> {
    tokio::time::timeout(timeout, store.list(query))
        .await
        .map_err(|_| StorageError::Timeout(timeout))?
}

/// Download a whole object, bounded by `timeout` from request to last byte.
pub async fn read_object(
    store: &dyn ObjectStore,
    name: &str,
    timeout: Duration,
) -> Result<Bytes, StorageError> {
    let download = async {
        let mut body = store.fetch(name).await?;
        let mut buf = BytesMut::new();
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    };

    tokio::time::timeout(timeout, download)
        .await
        .map_err(|_| StorageError::Timeout(timeout))?
}
