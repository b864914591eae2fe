//! Local — read-only object store over a directory tree.
//!
//! Object names are paths relative to the root with `/` separators, so
//! the same listing semantics apply as for a bucket.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use bytes::Bytes;
use tracing::debug;
use walkdir::WalkDir;

use super::ops::{ListQuery, Listing, ObjectBody, ObjectStore};
use super::StorageError;

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(StorageError::NotFound(root.display().to_string()));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Every regular file under `root`, as sorted relative names.
fn walk(root: &Path) -> Result<Vec<String>, StorageError> {
    let mut names = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| StorageError::Request(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let name: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        names.push(name.join("/"));
    }
    names.sort();
    Ok(names)
}

impl ObjectStore for LocalStore {
    fn list<'a>(
        &'a self,
        query: &'a ListQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Listing, StorageError>> + Send + 'a>> {
        Box::pin(async move {
            let root = self.root.clone();
            let names = tokio::task::spawn_blocking(move || walk(&root))
                .await
                .map_err(|e| StorageError::Request(e.to_string()))??;
            debug!("Walked {} files under {}", names.len(), self.root.display());
            Ok(Listing::from_sorted(names.iter().map(String::as_str), query))
        })
    }

    fn fetch<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectBody, StorageError>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.root.join(name);
            let data = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => StorageError::NotFound(name.to_string()),
                _ => StorageError::Request(format!("{}: {}", path.display(), e)),
            })?;
            let body: ObjectBody = Box::pin(tokio_stream::iter(vec![Ok(Bytes::from(data))]));
            Ok(body)
        })
    }
}
