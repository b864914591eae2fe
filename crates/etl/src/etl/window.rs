//! Window — hour windows and where a source's walk starts.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, info};

use crate::api::{Checkpoint, UsageApi};
use crate::error::EtlError;
use crate::storage::naming::{object_name_at, parse_object_time, source_prefix, truncate_to_hour};
use crate::storage::{list_with_timeout, ListQuery, ObjectStore};

/// One hour of one source: `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingWindow {
    pub source: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ProcessingWindow {
    /// The window containing `at`.
    pub fn starting_at(source: &str, at: DateTime<Utc>) -> Self {
        let start = truncate_to_hour(at);
        Self {
            source: source.to_string(),
            start,
            end: start + TimeDelta::hours(1),
        }
    }

    pub fn next(&self) -> Self {
        Self::starting_at(&self.source, self.end)
    }

    /// Whether the whole hour is in the past at `now`.
    pub fn is_complete_at(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }

    /// Listing for this window. With `resume_from`, the range starts at that
    /// object instead of the top of the hour.
    pub fn query(&self, resume_from: Option<&str>) -> ListQuery {
        let start = match resume_from {
            Some(name) => name.to_string(),
            None => object_name_at(&self.source, self.start),
        };
        ListQuery::with_prefix(source_prefix(&self.source)).range(start, object_name_at(&self.source, self.end))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStart {
    /// Top of the first hour to process.
    pub start: DateTime<Utc>,
    /// Checkpoint object already exported, if resuming.
    pub resume_from: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartPoint {
    Resolved(ResolvedStart),
    /// No checkpoint and no objects under the source.
    EmptySource,
}

/// Find where `source` should start: the API checkpoint for `region`, else
/// its earliest object.
pub async fn resolve_window(
    api: &dyn UsageApi,
    store: &dyn ObjectStore,
    source: &str,
    region: &str,
    list_timeout: Duration,
) -> Result<StartPoint, EtlError> {
    match api.get_checkpoint(region).await? {
        Checkpoint::Resume(name) => {
            let at = parse_object_time(&name)?;
            info!("Resuming source {} ({}) after {}", source, region, name);
            return Ok(StartPoint::Resolved(ResolvedStart {
                start: truncate_to_hour(at),
                resume_from: Some(name),
            }));
        }
        Checkpoint::Fresh => debug!("No checkpoint for region {}", region),
    }

    let query = ListQuery::with_prefix(source_prefix(source)).limit(1);
    let listing = list_with_timeout(store, &query, list_timeout).await?;
    match listing.objects.first() {
        Some(name) => {
            let at = parse_object_time(name)?;
            info!("Starting source {} ({}) from earliest object {}", source, region, name);
            Ok(StartPoint::Resolved(ResolvedStart {
                start: truncate_to_hour(at),
                resume_from: None,
            }))
        }
        None => Ok(StartPoint::EmptySource),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::api::FakeApi;
    use crate::storage::FakeStore;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_window_truncates_and_advances() {
        let at = Utc.with_ymd_and_hms(2021, 10, 24, 23, 42, 10).unwrap();
        let w = ProcessingWindow::starting_at("src", at);
        assert_eq!(w.start, Utc.with_ymd_and_hms(2021, 10, 24, 23, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2021, 10, 25, 0, 0, 0).unwrap());

        let next = w.next();
        assert_eq!(next.start, w.end);
        assert!(!w.is_complete_at(at));
        assert!(w.is_complete_at(w.end));
    }

    #[test]
    fn test_window_query_crosses_midnight() {
        let w = ProcessingWindow::starting_at("src", Utc.with_ymd_and_hms(2021, 10, 24, 23, 0, 0).unwrap());
        let q = w.query(None);
        assert_eq!(q.prefix, "src/cds/");
        assert_eq!(q.start_offset.as_deref(), Some("src/cds/2021/10/24/cds_20211024-230000"));
        assert_eq!(q.end_offset.as_deref(), Some("src/cds/2021/10/25/cds_20211025-000000"));
    }

    #[test]
    fn test_window_query_resume() {
        let w = ProcessingWindow::starting_at("src", Utc.with_ymd_and_hms(2021, 10, 24, 7, 0, 0).unwrap());
        let q = w.query(Some("src/cds/2021/10/24/cds_20211024-071500.gz"));
        assert_eq!(q.start_offset.as_deref(), Some("src/cds/2021/10/24/cds_20211024-071500.gz"));
    }

    #[tokio::test]
    async fn test_resolve_from_checkpoint() {
        let api = FakeApi::new();
        api.set_checkpoint("us-east", "src/cds/2021/10/24/cds_20211024-073010.gz").await;
        let store = FakeStore::new();

        let start = resolve_window(&api, &store, "src", "us-east", TIMEOUT).await.unwrap();
        assert_eq!(
            start,
            StartPoint::Resolved(ResolvedStart {
                start: Utc.with_ymd_and_hms(2021, 10, 24, 7, 0, 0).unwrap(),
                resume_from: Some("src/cds/2021/10/24/cds_20211024-073010.gz".to_string()),
            })
        );
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_from_earliest_object() {
        let api = FakeApi::new();
        let store = FakeStore::new();
        store.put("src/cds/2021/10/24/cds_20211024-095959.gz", "x").await;
        store.put("src/cds/2021/10/24/cds_20211024-081500.gz", "x").await;
        store.put("other/cds/2021/01/01/cds_20210101-000000.gz", "x").await;

        let start = resolve_window(&api, &store, "src", "us-east", TIMEOUT).await.unwrap();
        assert_eq!(
            start,
            StartPoint::Resolved(ResolvedStart {
                start: Utc.with_ymd_and_hms(2021, 10, 24, 8, 0, 0).unwrap(),
                resume_from: None,
            })
        );
    }

    #[tokio::test]
    async fn test_resolve_empty_source() {
        let start = resolve_window(&FakeApi::new(), &FakeStore::new(), "src", "us-east", TIMEOUT)
            .await
            .unwrap();
        assert_eq!(start, StartPoint::EmptySource);
    }

    #[tokio::test]
    async fn test_resolve_forbidden_skips_listing() {
        let api = FakeApi::new();
        api.forbid("us-east").await;
        let store = FakeStore::new();

        let err = resolve_window(&api, &store, "src", "us-east", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, EtlError::Forbidden(_)));
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_resolve_bad_checkpoint_name() {
        let api = FakeApi::new();
        api.set_checkpoint("us-east", "src/cds/garbage.gz").await;
        let err = resolve_window(&api, &FakeStore::new(), "src", "us-east", TIMEOUT).await.unwrap_err();
        assert!(matches!(err, EtlError::Storage(_)));
    }
}
