//! Scan — one object: download, gunzip, split lines, classify.
//!
//! A file contributes all of its records or none. Results are buffered
//! until the whole object has decoded, then forwarded to the intake.

use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::aggregate::{Intake, IntakeClosed, IntakeSender};
use crate::parser::{classify, LineOutcome, SkipReason, StatusPolicy};
use crate::storage::{self, ObjectStore, StorageError};

/// Lines between cancellation checks while decoding.
const CANCEL_CHECK_INTERVAL: u64 = 4096;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("fetch failed: {0}")]
    Storage(#[from] StorageError),
    #[error("gzip decode failed: {0}")]
    Decompress(#[from] std::io::Error),
    #[error(transparent)]
    IntakeClosed(#[from] IntakeClosed),
    #[error("cancelled")]
    Cancelled,
    #[error("scan task failed: {0}")]
    Join(String),
}

/// Line counts for one object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub lines: u64,
    pub records: u64,
    pub non_entity: u64,
    pub skipped: u64,
    pub dropped_status: u64,
    pub unattributable: u64,
}

impl ScanSummary {
    fn record(&mut self, outcome: &LineOutcome) {
        self.lines += 1;
        match outcome {
            LineOutcome::Record(_) => self.records += 1,
            LineOutcome::NonEntity(_) => self.non_entity += 1,
            LineOutcome::Skip(SkipReason::MissingStatus) => self.dropped_status += 1,
            LineOutcome::Skip(SkipReason::Unattributable) => self.unattributable += 1,
            LineOutcome::Skip(_) => self.skipped += 1,
        }
    }
}

/// Decode a gzip body and classify every line, handing outcomes to `sink`.
///
/// Concatenated gzip members are read as one stream. Invalid UTF-8 is
/// replaced rather than rejected; a trailing `\r` is stripped.
pub fn scan_object<F>(
    body: &[u8],
    policy: StatusPolicy,
    cancel: &CancellationToken,
    mut sink: F,
) -> Result<ScanSummary, ScanError>
where
    F: FnMut(LineOutcome),
{
    let mut reader = BufReader::new(MultiGzDecoder::new(body));
    let mut summary = ScanSummary::default();
    let mut buf = Vec::with_capacity(1024);

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        if summary.lines % CANCEL_CHECK_INTERVAL == 0 && cancel.is_cancelled() {
            return Err(ScanError::Cancelled);
        }

        let mut line = buf.as_slice();
        if let Some(stripped) = line.strip_suffix(b"\n") {
            line = stripped;
        }
        if let Some(stripped) = line.strip_suffix(b"\r") {
            line = stripped;
        }

        let outcome = classify(&String::from_utf8_lossy(line), policy);
        summary.record(&outcome);
        sink(outcome);
    }

    Ok(summary)
}

/// Fetch, decode and forward one object to the aggregator.
pub async fn process_object(
    store: Arc<dyn ObjectStore>,
    name: &str,
    fetch_timeout: Duration,
    policy: StatusPolicy,
    intake: &IntakeSender,
    cancel: &CancellationToken,
) -> Result<ScanSummary, ScanError> {
    let body: Bytes = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ScanError::Cancelled),
        result = storage::read_object(store.as_ref(), name, fetch_timeout) => result?,
    };
    debug!("Fetched {} ({} bytes)", name, body.len());

    let token = cancel.clone();
    let (items, summary) = tokio::task::spawn_blocking(move || {
        let mut items = Vec::new();
        let summary = scan_object(&body, policy, &token, |outcome| match outcome {
            LineOutcome::Record(record) => items.push(Intake::Record(record)),
            LineOutcome::NonEntity(bytes) => items.push(Intake::NonEntity(bytes)),
            LineOutcome::Skip(_) => {}
        })?;
        Ok::<_, ScanError>((items, summary))
    })
    .await
    .map_err(|e| ScanError::Join(e.to_string()))??;

    let forward = async {
        for item in items {
            intake.send(item).await?;
        }
        Ok::<_, ScanError>(())
    };
    tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ScanError::Cancelled),
        result = forward => result?,
    }

    Ok(summary)
}
