//! Run — probe the bucket, pick sources, drive each in turn.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::driver::{system_clock, Clock, DriverSettings, SourceDriver, SourceReport};
use crate::api::UsageApi;
use crate::conf::{EtlConfig, RegionMap};
use crate::error::EtlError;
use crate::metrics::{MetricsSnapshot, RunMetrics};
use crate::storage::naming::trim_dir;
use crate::storage::{list_with_timeout, ListQuery, ObjectStore, StorageError};
use crate::worker::PoolSettings;

const SOURCE_DELIMITER: &str = "/";

/// One log-producing CDN source and the region it reports under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Source {
    pub id: String,
    pub region: String,
}

#[derive(Debug)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
    pub failed: Vec<(Source, String)>,
    pub metrics: MetricsSnapshot,
}

pub struct Etl {
    store: Arc<dyn ObjectStore>,
    api: Arc<dyn UsageApi>,
    regions: RegionMap,
    staging: bool,
    probe_timeout: Duration,
    settings: DriverSettings,
    metrics: Arc<RunMetrics>,
    cancel: CancellationToken,
    clock: Clock,
}

impl Etl {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        api: Arc<dyn UsageApi>,
        regions: RegionMap,
        config: &EtlConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            api,
            regions,
            staging: config.staging,
            probe_timeout: config.storage.probe_timeout(),
            settings: DriverSettings {
                pool: PoolSettings {
                    pool_size: config.pool_size,
                    fetch_timeout: config.storage.fetch_timeout(),
                    policy: config.status_buckets,
                },
                intake_capacity: config.intake_capacity,
                list_timeout: config.storage.list_timeout(),
            },
            metrics: Arc::new(RunMetrics::new()),
            cancel,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Check that the bucket can be listed and holds at least one object.
    pub async fn probe(&self) -> Result<(), EtlError> {
        let query = ListQuery::with_prefix("").limit(1);
        let listing = list_with_timeout(self.store.as_ref(), &query, self.probe_timeout).await?;
        let Some(first) = listing.objects.first() else {
            return Err(StorageError::EmptyBucket.into());
        };
        debug!("Bucket probe ok (first object {})", first);
        Ok(())
    }

    /// Top-level directories of the bucket that map to a region of this
    /// run's kind (staging or production).
    pub async fn discover_sources(&self) -> Result<Vec<Source>, EtlError> {
        let query = ListQuery::with_prefix("").delimiter(SOURCE_DELIMITER);
        let listing = list_with_timeout(self.store.as_ref(), &query, self.settings.list_timeout).await?;

        let mut sources = Vec::new();
        for prefix in &listing.prefixes {
            let id = trim_dir(prefix);
            let Some(region) = self.regions.region_for(id) else {
                debug!("Skipping unmapped source {}", id);
                continue;
            };
            if self.regions.is_staging(region) != self.staging {
                debug!("Skipping source {} ({}) for staging={}", id, region, self.staging);
                continue;
            }
            sources.push(Source {
                id: id.to_string(),
                region: region.to_string(),
            });
        }

        info!("Discovered {} sources ({} directories in bucket)", sources.len(), listing.prefixes.len());
        Ok(sources)
    }

    /// Process every selected source. Authorization failures and
    /// cancellation stop the run; other per-source errors are collected.
    pub async fn run(&self) -> Result<RunReport, EtlError> {
        self.probe().await?;
        let sources = self.discover_sources().await?;

        let driver = SourceDriver::new(
            self.store.clone(),
            self.api.clone(),
            self.settings.clone(),
            self.metrics.clone(),
            self.cancel.clone(),
            self.clock.clone(),
        );

        let mut report = RunReport {
            sources: Vec::new(),
            failed: Vec::new(),
            metrics: MetricsSnapshot::default(),
        };
        for source in &sources {
            if self.cancel.is_cancelled() {
                return Err(EtlError::Cancelled);
            }
            match driver.run(source).await {
                Ok(r) => report.sources.push(r),
                Err(e) if e.halts_run() => {
                    error!("Stopping run at source {} ({}): {}", source.id, source.region, e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Source {} ({}) failed: {}", source.id, source.region, e);
                    report.failed.push((source.clone(), e.to_string()));
                }
            }
        }

        report.metrics = self.metrics.snapshot();
        info!(
            "Run finished: {} sources ok, {} failed, metrics={}",
            report.sources.len(),
            report.failed.len(),
            serde_json::to_string(&report.metrics).unwrap_or_default()
        );

        if !report.failed.is_empty() {
            return Err(EtlError::SourcesFailed {
                failed: report.failed.len(),
                total: sources.len(),
            });
        }
        Ok(report)
    }
}
