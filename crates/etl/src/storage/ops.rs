//! Object store trait — the operations the ETL consumes from a bucket.
//!
//! `gcs.rs` provides the live implementation over the JSON API,
//! `local.rs` a directory tree, `fake.rs` an in-memory test double.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use tokio_stream::Stream;

use super::StorageError;

/// Byte stream of an object body, as delivered by the store.
pub type ObjectBody = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Listing request. Offsets bound a lexicographic range:
/// `start_offset` is inclusive, `end_offset` is exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub prefix: String,
    pub delimiter: Option<String>,
    pub start_offset: Option<String>,
    pub end_offset: Option<String>,
    /// Maximum number of entries (objects plus prefixes) to return.
    pub limit: Option<usize>,
}

impl ListQuery {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.start_offset = Some(start.into());
        self.end_offset = Some(end.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `name` falls under the prefix and inside the offset range.
    pub fn matches(&self, name: &str) -> bool {
        if !name.starts_with(&self.prefix) {
            return false;
        }
        if let Some(start) = &self.start_offset {
            if name < start.as_str() {
                return false;
            }
        }
        if let Some(end) = &self.end_offset {
            if name >= end.as_str() {
                return false;
            }
        }
        true
    }
}

/// Result of a listing, both in lexicographic order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    /// Directory-style prefixes (only populated when a delimiter was given).
    pub prefixes: Vec<String>,
    /// Full object names.
    pub objects: Vec<String>,
}

impl Listing {
    /// Answer `query` from a full, lexicographically sorted set of names.
    pub fn from_sorted<'a>(names: impl IntoIterator<Item = &'a str>, query: &ListQuery) -> Self {
        let mut listing = Listing::default();
        let mut entries = 0;
        for name in names.into_iter().filter(|n| query.matches(n)) {
            if query.limit.is_some_and(|limit| entries >= limit) {
                break;
            }
            let rest = &name[query.prefix.len()..];
            let dir = query
                .delimiter
                .as_deref()
                .and_then(|d| rest.find(d).map(|i| &name[..query.prefix.len() + i + d.len()]));
            match dir {
                // Names sharing a prefix are contiguous when sorted.
                Some(dir) if listing.prefixes.last().map(String::as_str) == Some(dir) => {}
                Some(dir) => {
                    listing.prefixes.push(dir.to_string());
                    entries += 1;
                }
                None => {
                    listing.objects.push(name.to_string());
                    entries += 1;
                }
            }
        }
        listing
    }
}

/// Async interface over a bucket of log objects.
///
/// Object-safe thanks to `Pin<Box<…>>` returns. Implementations must be
/// `Send + Sync`; one instance is shared read-only by every worker.
pub trait ObjectStore: Send + Sync {
    fn list<'a>(
        &'a self,
        query: &'a ListQuery,
    ) -> Pin<Box<dyn Future<Output = Result<Listing, StorageError>> + Send + 'a>>;

    fn fetch<'a>(
        &'a self,
        name: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<ObjectBody, StorageError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAMES: &[&str] = &[
        "a/cds/2021/10/24/cds_20211024-070000.gz",
        "a/cds/2021/10/24/cds_20211024-081500.gz",
        "b/cds/2021/10/24/cds_20211024-070000.gz",
    ];

    #[test]
    fn test_range_is_half_open() {
        let query = ListQuery::with_prefix("a/cds/").range(
            "a/cds/2021/10/24/cds_20211024-070000",
            "a/cds/2021/10/24/cds_20211024-080000",
        );
        let listing = Listing::from_sorted(NAMES.iter().copied(), &query);
        assert_eq!(listing.objects, vec![NAMES[0].to_string()]);
    }

    #[test]
    fn test_delimiter_groups_prefixes() {
        let query = ListQuery::with_prefix("").delimiter("/");
        let listing = Listing::from_sorted(NAMES.iter().copied(), &query);
        assert_eq!(listing.prefixes, vec!["a/".to_string(), "b/".to_string()]);
        assert!(listing.objects.is_empty());
    }

    #[test]
    fn test_limit_counts_entries() {
        let query = ListQuery::with_prefix("").limit(2);
        let listing = Listing::from_sorted(NAMES.iter().copied(), &query);
        assert_eq!(listing.objects.len(), 2);
    }
}
