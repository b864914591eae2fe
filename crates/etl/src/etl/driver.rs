//! Driver — walk one source hour by hour up to the last complete hour.
//!
//! Per hour: list the window's objects, run the worker pool into a fresh
//! aggregator, drain it, flatten, post the window's single batch. Hours run
//! strictly one after another; only the files inside an hour are processed
//! in parallel.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::run::Source;
use super::window::{resolve_window, ProcessingWindow, StartPoint};
use crate::aggregate::{spawn_aggregator, WindowMeta};
use crate::api::{ApiError, UsageApi};
use crate::error::EtlError;
use crate::metrics::RunMetrics;
use crate::storage::{list_with_timeout, ObjectStore};
use crate::worker::{run_pool, PoolSettings};

/// Source of "now"; injectable for tests.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub pool: PoolSettings,
    pub intake_capacity: usize,
    pub list_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HourOutcome {
    Exported { records: usize },
    /// The batch was not accepted; the hour still advances.
    ExportFailed { records: usize },
    /// Objects were scanned but nothing was attributable.
    NothingToExport,
    /// Only the checkpoint object itself was in range.
    AlreadyProcessed,
    /// No objects yet for this hour.
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Caught up to the current, incomplete hour.
    CaughtUp,
    /// An hour had no objects; retried on the next run.
    EmptyHour,
    /// Nothing has ever been delivered for this source.
    EmptySource,
}

#[derive(Debug, Clone)]
pub struct SourceReport {
    pub source: String,
    pub region: String,
    pub hours: Vec<(DateTime<Utc>, HourOutcome)>,
    pub failed_files: usize,
    pub stop: StopReason,
}

impl SourceReport {
    fn new(source: &Source, stop: StopReason) -> Self {
        Self {
            source: source.id.clone(),
            region: source.region.clone(),
            hours: Vec::new(),
            failed_files: 0,
            stop,
        }
    }

    pub fn hours_exported(&self) -> usize {
        self.hours
            .iter()
            .filter(|(_, o)| matches!(o, HourOutcome::Exported { .. }))
            .count()
    }
}

pub struct SourceDriver {
    store: Arc<dyn ObjectStore>,
    api: Arc<dyn UsageApi>,
    settings: DriverSettings,
    metrics: Arc<RunMetrics>,
    cancel: CancellationToken,
    clock: Clock,
}

impl SourceDriver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        api: Arc<dyn UsageApi>,
        settings: DriverSettings,
        metrics: Arc<RunMetrics>,
        cancel: CancellationToken,
        clock: Clock,
    ) -> Self {
        Self {
            store,
            api,
            settings,
            metrics,
            cancel,
            clock,
        }
    }

    /// Process every complete hour of `source` from its resolved start.
    pub async fn run(&self, source: &Source) -> Result<SourceReport, EtlError> {
        let start = resolve_window(
            self.api.as_ref(),
            self.store.as_ref(),
            &source.id,
            &source.region,
            self.settings.list_timeout,
        )
        .await?;

        let resolved = match start {
            StartPoint::Resolved(resolved) => resolved,
            StartPoint::EmptySource => {
                info!("Source {} ({}) has no objects", source.id, source.region);
                return Ok(SourceReport::new(source, StopReason::EmptySource));
            }
        };

        let mut report = SourceReport::new(source, StopReason::CaughtUp);
        let mut window = ProcessingWindow::starting_at(&source.id, resolved.start);
        let mut resume_from = resolved.resume_from;

        loop {
            if self.cancel.is_cancelled() {
                return Err(EtlError::Cancelled);
            }
            if !window.is_complete_at((self.clock)()) {
                break;
            }

            let (outcome, failed_files) = self.process_hour(source, &window, resume_from.take()).await?;
            report.failed_files += failed_files;

            if outcome == HourOutcome::Empty {
                info!("No objects for {} at {}, stopping until next run", source.id, window.start);
                self.metrics.record_empty_hour();
                report.stop = StopReason::EmptyHour;
                break;
            }
            report.hours.push((window.start, outcome));
            window = window.next();
        }

        info!(
            "Source {} ({}) done: {} hours, {} exported, {} failed files, stop={:?}",
            source.id,
            source.region,
            report.hours.len(),
            report.hours_exported(),
            report.failed_files,
            report.stop
        );
        Ok(report)
    }

    async fn process_hour(
        &self,
        source: &Source,
        window: &ProcessingWindow,
        resume_from: Option<String>,
    ) -> Result<(HourOutcome, usize), EtlError> {
        let query = window.query(resume_from.as_deref());
        let listing = list_with_timeout(self.store.as_ref(), &query, self.settings.list_timeout).await?;
        let mut objects = listing.objects;

        if let Some(checkpoint) = &resume_from {
            objects.retain(|name| name != checkpoint);
            if objects.is_empty() {
                info!("Hour {} of {} already exported up to {}", window.start, source.id, checkpoint);
                return Ok((HourOutcome::AlreadyProcessed, 0));
            }
        }
        let Some(last_file) = objects.last().cloned() else {
            return Ok((HourOutcome::Empty, 0));
        };

        info!("Processing {} objects for {} ({}) at {}", objects.len(), source.id, source.region, window.start);

        let (intake, aggregator) = spawn_aggregator(self.settings.intake_capacity);
        let failures = run_pool(
            self.store.clone(),
            objects,
            &self.settings.pool,
            intake,
            &self.cancel,
            self.metrics.clone(),
        )
        .await;

        if self.cancel.is_cancelled() {
            aggregator.abort();
            warn!("Cancelled during {} of {}, discarding partial hour", window.start, source.id);
            return Err(EtlError::Cancelled);
        }

        let store = aggregator.finish().await?;
        info!(
            "Aggregated {} buckets for {} at {} ({} non-entity bytes, {} failed files)",
            store.len(),
            source.id,
            window.start,
            store.non_entity_bytes(),
            failures.len()
        );

        let meta = WindowMeta {
            region: source.region.clone(),
            window_start: window.start,
            last_file,
            policy: self.settings.pool.policy,
        };
        let batch = store.flatten(&meta)?;
        drop(store);

        let Some(batch) = batch else {
            return Ok((HourOutcome::NothingToExport, failures.len()));
        };

        let records = batch.data.len();
        let outcome = match self.api.post_usage(&batch).await {
            Ok(()) => {
                self.metrics.record_export(records);
                HourOutcome::Exported { records }
            }
            Err(ApiError::Forbidden(region)) => return Err(EtlError::Forbidden(region)),
            Err(e) => {
                error!("Export of {} records for {} at {} failed: {}", records, source.region, window.start, e);
                self.metrics.record_export_failure();
                HourOutcome::ExportFailed { records }
            }
        };
        Ok((outcome, failures.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use chrono::TimeZone;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    use crate::api::FakeApi;
    use crate::parser::StatusPolicy;
    use crate::storage::FakeStore;

    fn gz(lines: &[String]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        for line in lines {
            writeln!(enc, "{}", line).unwrap();
        }
        enc.finish().unwrap()
    }

    fn line(hour: u32, ip: &str, path: &str) -> String {
        format!(
            "2021-10-24\t{:02}:10:00\tGET\t{}\thttps\t-\tUA\t100\t10\t1000\t1.1.1.1\t0.5\t200\t-\t{}\t-\t-",
            hour, ip, path
        )
    }

    fn source() -> Source {
        Source {
            id: "src".to_string(),
            region: "us-east".to_string(),
        }
    }

    fn driver(store: Arc<FakeStore>, api: Arc<FakeApi>, now: DateTime<Utc>) -> SourceDriver {
        SourceDriver::new(
            store,
            api,
            DriverSettings {
                pool: PoolSettings {
                    pool_size: 3,
                    fetch_timeout: Duration::from_secs(5),
                    policy: StatusPolicy::Collapsed,
                },
                intake_capacity: 16,
                list_timeout: Duration::from_secs(5),
            },
            Arc::new(RunMetrics::new()),
            CancellationToken::new(),
            Arc::new(move || now),
        )
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 10, 24, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_resume_skips_checkpoint_object() {
        let store = Arc::new(FakeStore::new());
        store.put("src/cds/2021/10/24/cds_20211024-071000.gz", gz(&[line(7, "a", "/hls/m1/x.ts")])).await;
        store.put("src/cds/2021/10/24/cds_20211024-073000.gz", gz(&[line(7, "b", "/hls/m1/x.ts")])).await;
        let api = Arc::new(FakeApi::new());
        api.set_checkpoint("us-east", "src/cds/2021/10/24/cds_20211024-071000.gz").await;

        let report = driver(store, api.clone(), at(8, 5)).run(&source()).await.unwrap();

        assert_eq!(report.stop, StopReason::CaughtUp);
        let posted = api.posted().await;
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].data[0].total_views, 1);
        assert_eq!(posted[0].file_name, "src/cds/2021/10/24/cds_20211024-073000.gz");
    }

    #[tokio::test]
    async fn test_resume_with_nothing_new_advances() {
        let store = Arc::new(FakeStore::new());
        store.put("src/cds/2021/10/24/cds_20211024-075900.gz", gz(&[line(7, "a", "/hls/m1/x.ts")])).await;
        store.put("src/cds/2021/10/24/cds_20211024-081000.gz", gz(&[line(8, "a", "/hls/m1/x.ts")])).await;
        let api = Arc::new(FakeApi::new());
        api.set_checkpoint("us-east", "src/cds/2021/10/24/cds_20211024-075900.gz").await;

        let report = driver(store, api.clone(), at(9, 30)).run(&source()).await.unwrap();

        assert_eq!(
            report.hours.iter().map(|(_, o)| o.clone()).collect::<Vec<_>>(),
            vec![
                HourOutcome::AlreadyProcessed,
                HourOutcome::Exported { records: 1 }
            ]
        );
        assert_eq!(api.post_calls(), 1);
    }

    #[tokio::test]
    async fn test_unattributable_hour_is_not_exported() {
        let store = Arc::new(FakeStore::new());
        store.put("src/cds/2021/10/24/cds_20211024-071000.gz", gz(&[line(7, "a", "/static/a/b.js")])).await;
        let api = Arc::new(FakeApi::new());

        let report = driver(store, api.clone(), at(8, 0)).run(&source()).await.unwrap();

        assert_eq!(report.hours, vec![(at(7, 0), HourOutcome::NothingToExport)]);
        assert_eq!(api.post_calls(), 0);
    }

    #[tokio::test]
    async fn test_export_failure_still_advances() {
        let store = Arc::new(FakeStore::new());
        store.put("src/cds/2021/10/24/cds_20211024-071000.gz", gz(&[line(7, "a", "/hls/m1/x.ts")])).await;
        store.put("src/cds/2021/10/24/cds_20211024-081000.gz", gz(&[line(8, "a", "/hls/m1/x.ts")])).await;
        let api = Arc::new(FakeApi::new());
        api.fail_posts(true).await;

        let report = driver(store, api.clone(), at(9, 0)).run(&source()).await.unwrap();

        assert_eq!(report.hours.len(), 2);
        assert!(report.hours.iter().all(|(_, o)| matches!(o, HourOutcome::ExportFailed { records: 1 })));
        assert_eq!(api.post_calls(), 2);
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_source() {
        let store = Arc::new(FakeStore::new());
        store.put("src/cds/2021/10/24/cds_20211024-071000.gz", gz(&[line(7, "a", "/hls/m1/x.ts")])).await;
        let api = Arc::new(FakeApi::new());
        api.set_checkpoint("us-east", "src/cds/2021/10/24/cds_20211024-065000.gz").await;
        store.fail_listing("backend unavailable").await;

        let err = driver(store, api, at(9, 0)).run(&source()).await.unwrap_err();
        assert!(matches!(err, EtlError::Storage(_)));
    }

    #[tokio::test]
    async fn test_cancelled_before_first_hour() {
        let store = Arc::new(FakeStore::new());
        store.put("src/cds/2021/10/24/cds_20211024-071000.gz", gz(&[line(7, "a", "/hls/m1/x.ts")])).await;
        let api = Arc::new(FakeApi::new());
        let d = driver(store, api.clone(), at(9, 0));
        d.cancel.cancel();

        let err = d.run(&source()).await.unwrap_err();
        assert!(matches!(err, EtlError::Cancelled));
        assert_eq!(api.post_calls(), 0);
    }

    #[tokio::test]
    async fn test_window_posts_one_batch_across_hour_boundary() {
        let store = Arc::new(FakeStore::new());
        let lines = [
            line(7, "a", "/hls/m1/x.ts").replace("07:10:00", "07:59:58"),
            line(8, "b", "/hls/m1/x.ts").replace("08:10:00", "08:00:03"),
        ];
        store.put("src/cds/2021/10/24/cds_20211024-075900.gz", gz(&lines)).await;
        let api = Arc::new(FakeApi::new());

        let report = driver(store, api.clone(), at(8, 30)).run(&source()).await.unwrap();

        assert_eq!(report.hours, vec![(at(7, 0), HourOutcome::Exported { records: 1 })]);
        let posted = api.posted().await;
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].date, at(7, 0).timestamp());
        assert_eq!(posted[0].file_name, "src/cds/2021/10/24/cds_20211024-075900.gz");
        assert_eq!(posted[0].data[0].total_views, 2);
        assert_eq!(posted[0].data[0].unique_users, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_fetch_discards_hour() {
        let store = Arc::new(FakeStore::new());
        store.put("src/cds/2021/10/24/cds_20211024-071000.gz", gz(&[line(7, "a", "/hls/m1/x.ts")])).await;
        store.put("src/cds/2021/10/24/cds_20211024-073000.gz", gz(&[line(7, "b", "/hls/m1/x.ts")])).await;
        store.set_fetch_delay(Duration::from_secs(3)).await;
        let api = Arc::new(FakeApi::new());
        let d = driver(store.clone(), api.clone(), at(9, 0));

        let cancel = d.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            cancel.cancel();
        });

        let err = d.run(&source()).await.unwrap_err();
        assert!(matches!(err, EtlError::Cancelled));
        assert!(store.fetch_calls() > 0);
        assert_eq!(api.post_calls(), 0);
        assert!(api.posted().await.is_empty());
    }
}
