//! Pool — fixed set of workers draining one hour's object list.
//!
//! Ordering on completion: the job queue empties, every worker returns,
//! and only then is the caller's intake handle dropped. Per-file failures
//! are logged and returned; they never stop the other workers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::scan::{process_object, ScanError};
use crate::aggregate::IntakeSender;
use crate::metrics::RunMetrics;
use crate::parser::StatusPolicy;
use crate::storage::ObjectStore;

#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub pool_size: usize,
    pub fetch_timeout: Duration,
    pub policy: StatusPolicy,
}

/// An object whose contribution was lost.
#[derive(Debug)]
pub struct FileFailure {
    pub object: String,
    pub error: ScanError,
}

/// Process `jobs` with `settings.pool_size` concurrent workers.
///
/// Consumes `intake`; when this returns, no sender created by the pool is
/// still alive.
pub async fn run_pool(
    store: Arc<dyn ObjectStore>,
    jobs: Vec<String>,
    settings: &PoolSettings,
    intake: IntakeSender,
    cancel: &CancellationToken,
    metrics: Arc<RunMetrics>,
) -> Vec<FileFailure> {
    let total = jobs.len();
    let queue = Arc::new(Mutex::new(VecDeque::from(jobs)));
    let workers = settings.pool_size.max(1).min(total.max(1));

    let mut set = JoinSet::new();
    for worker_id in 0..workers {
        let store = store.clone();
        let queue = queue.clone();
        let intake = intake.clone();
        let cancel = cancel.clone();
        let metrics = metrics.clone();
        let settings = settings.clone();

        set.spawn(async move {
            let mut failures = Vec::new();
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                let Some(name) = queue.lock().await.pop_front() else {
                    break;
                };

                match process_object(store.clone(), &name, settings.fetch_timeout, settings.policy, &intake, &cancel).await {
                    Ok(summary) => {
                        debug!("Worker {} scanned {}: {} lines, {} records", worker_id, name, summary.lines, summary.records);
                        metrics.record_scan(&summary);
                        metrics.record_file(true);
                    }
                    Err(ScanError::Cancelled) => break,
                    Err(e) => {
                        error!("Failed to process {}: {}", name, e);
                        metrics.record_file(false);
                        failures.push(FileFailure { object: name, error: e });
                    }
                }
            }
            failures
        });
    }

    let mut failures = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(f) => failures.extend(f),
            Err(e) => error!("File worker task failed: {}", e),
        }
    }
    drop(intake);

    debug!("Pool finished {} objects with {} failures", total, failures.len());
    failures
}
