//! Analyze — offline aggregation of a local folder of gzip CDN logs.
//!
//! Runs the same worker pool, classifier and aggregator as the ETL over a
//! [`LocalStore`], then writes one CSV row per aggregate bucket instead of
//! posting to the usage API. No checkpoints are read or written.

pub mod csv;

pub use self::csv::{render_csv, CSV_HEADER};

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::aggregate::spawn_aggregator;
use crate::conf::EtlConfig;
use crate::error::EtlError;
use crate::metrics::{MetricsSnapshot, RunMetrics};
use crate::storage::{ListQuery, LocalStore, ObjectStore};
use crate::worker::{run_pool, FileFailure, PoolSettings};

const LOG_EXTENSION: &str = ".gz";

#[derive(Debug)]
pub struct AnalyzeReport {
    pub files: usize,
    pub failed: Vec<FileFailure>,
    pub rows: usize,
    pub non_entity_bytes: i64,
    pub metrics: MetricsSnapshot,
}

pub struct Analyzer {
    store: Arc<LocalStore>,
    output: PathBuf,
    pool: PoolSettings,
    intake_capacity: usize,
    metrics: Arc<RunMetrics>,
    cancel: CancellationToken,
}

impl Analyzer {
    pub fn new(config: &EtlConfig, cancel: CancellationToken) -> Result<Self, EtlError> {
        let store = LocalStore::new(&config.analyze.input_dir)?;
        Ok(Self {
            store: Arc::new(store),
            output: PathBuf::from(&config.analyze.output),
            pool: PoolSettings {
                pool_size: config.pool_size,
                fetch_timeout: config.storage.fetch_timeout(),
                policy: config.status_buckets,
            },
            intake_capacity: config.intake_capacity,
            metrics: Arc::new(RunMetrics::new()),
            cancel,
        })
    }

    pub async fn run(&self) -> Result<AnalyzeReport, EtlError> {
        let listing = self.store.list(&ListQuery::with_prefix("")).await?;
        let files: Vec<String> = listing
            .objects
            .into_iter()
            .filter(|name| name.ends_with(LOG_EXTENSION))
            .collect();
        info!("Analyzing {} log files under {}", files.len(), self.store.root().display());

        let total = files.len();
        let (intake, aggregator) = spawn_aggregator(self.intake_capacity);
        let failed = run_pool(
            self.store.clone(),
            files,
            &self.pool,
            intake,
            &self.cancel,
            self.metrics.clone(),
        )
        .await;

        if self.cancel.is_cancelled() {
            aggregator.abort();
            warn!("Cancelled, nothing written to {}", self.output.display());
            return Err(EtlError::Cancelled);
        }
        for failure in &failed {
            error!("Skipped {}: {}", failure.object, failure.error);
        }

        let store = aggregator.finish().await?;
        let body = render_csv(&store);
        tokio::fs::write(&self.output, body)
            .await
            .map_err(|source| EtlError::Output {
                path: self.output.clone(),
                source,
            })?;

        let report = AnalyzeReport {
            files: total,
            failed,
            rows: store.len(),
            non_entity_bytes: store.non_entity_bytes(),
            metrics: self.metrics.snapshot(),
        };
        info!(
            "Wrote {} rows to {} ({} files, {} failed, {} non-entity bytes)",
            report.rows,
            self.output.display(),
            report.files,
            report.failed.len(),
            report.non_entity_bytes
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use crate::conf::RunMode;

    fn gz(lines: &[String]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        for line in lines {
            writeln!(enc, "{}", line).unwrap();
        }
        enc.finish().unwrap()
    }

    fn line(time: &str, ip: &str, path: &str) -> String {
        format!(
            "2021-10-24\t{}\tGET\t{}\thttps\t-\tUA\t100\t10\t1000\t1.1.1.1\t0.5\t200\t-\t{}\t-\t-",
            time, ip, path
        )
    }

    fn config(input: &std::path::Path, output: &std::path::Path) -> EtlConfig {
        let mut cfg = EtlConfig::default();
        cfg.mode = RunMode::Analyze;
        cfg.pool_size = 2;
        cfg.analyze.input_dir = input.display().to_string();
        cfg.analyze.output = output.display().to_string();
        cfg
    }

    #[tokio::test]
    async fn test_analyze_folder_to_csv() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let output = out.path().join("usage.csv");

        std::fs::create_dir_all(input.path().join("nested")).unwrap();
        std::fs::write(
            input.path().join("a.gz"),
            gz(&[
                line("07:10:00", "10.0.0.1", "/hls/video+m1/0/seg.ts"),
                line("07:11:00", "10.0.0.2", "/hls/video+m1/0/seg.ts"),
            ]),
        )
        .unwrap();
        std::fs::write(
            input.path().join("nested/b.gz"),
            gz(&[
                line("08:00:00", "10.0.0.1", "/recordings/videorec+s1/source.mp4"),
                line("08:01:00", "10.0.0.3", "/static/app.js"),
            ]),
        )
        .unwrap();
        std::fs::write(input.path().join("README.txt"), "not a log").unwrap();

        let analyzer = Analyzer::new(&config(input.path(), &output), CancellationToken::new()).unwrap();
        let report = analyzer.run().await.unwrap();

        assert_eq!(report.files, 2);
        assert!(report.failed.is_empty());
        assert_eq!(report.rows, 2);
        assert_eq!(report.non_entity_bytes, 1000);
        assert_eq!(report.metrics.files_processed, 2);

        let csv = std::fs::read_to_string(&output).unwrap();
        let rows: Vec<&str> = csv.lines().collect();
        assert_eq!(rows[0], CSV_HEADER);
        assert_eq!(rows[1], "2021-10-2407,manifest_id,m1,200,2,2,20,2000,200");
        assert_eq!(rows[2], "2021-10-2408,stream_id,s1,200,1,1,10,1000,100");
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_bad_file_is_skipped() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let output = out.path().join("usage.csv");
        std::fs::write(input.path().join("good.gz"), gz(&[line("07:10:00", "a", "/hls/m1/x.ts")])).unwrap();
        std::fs::write(input.path().join("bad.gz"), b"not gzip").unwrap();

        let report = Analyzer::new(&config(input.path(), &output), CancellationToken::new())
            .unwrap()
            .run()
            .await
            .unwrap();

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].object, "bad.gz");
        assert_eq!(report.rows, 1);
    }

    #[test]
    fn test_missing_input_dir() {
        let out = tempfile::tempdir().unwrap();
        let cfg = config(std::path::Path::new("/nonexistent/cdn-logs"), &out.path().join("x.csv"));
        let err = Analyzer::new(&cfg, CancellationToken::new()).err().unwrap();
        assert!(matches!(err, EtlError::Storage(_)));
    }

    #[tokio::test]
    async fn test_cancelled_writes_nothing() {
        let input = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let output = out.path().join("usage.csv");
        std::fs::write(input.path().join("a.gz"), gz(&[line("07:10:00", "a", "/hls/m1/x.ts")])).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = Analyzer::new(&config(input.path(), &output), cancel).unwrap().run().await.unwrap_err();

        assert!(matches!(err, EtlError::Cancelled));
        assert!(!output.exists());
    }
}
