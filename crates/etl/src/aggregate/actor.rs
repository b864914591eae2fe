//! Actor — single task owning the window's [`AggregateStore`].
//!
//! Workers hold [`IntakeSender`] clones. The channel closes when the last
//! clone is dropped; only then does [`AggregatorHandle::finish`] resolve, so
//! every record sent before the close is applied before the store is read.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::store::AggregateStore;
use crate::error::EtlError;
use crate::parser::ClassifiedRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intake {
    Record(ClassifiedRecord),
    NonEntity(i64),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("aggregator intake is closed")]
pub struct IntakeClosed;

#[derive(Debug, Clone)]
pub struct IntakeSender {
    tx: mpsc::Sender<Intake>,
}

impl IntakeSender {
    /// Waits for queue space when the aggregator is behind.
    pub async fn send(&self, item: Intake) -> Result<(), IntakeClosed> {
        self.tx.send(item).await.map_err(|_| IntakeClosed)
    }
}

pub struct AggregatorHandle {
    task: JoinHandle<AggregateStore>,
}

impl AggregatorHandle {
    /// Wait for the intake to drain and take the store.
    ///
    /// Every [`IntakeSender`] must be dropped first or this never returns.
    pub async fn finish(self) -> Result<AggregateStore, EtlError> {
        self.task
            .await
            .map_err(|e| EtlError::InvariantViolation(format!("aggregator task failed: {}", e)))
    }

    /// Stop without draining; pending records are discarded.
    pub fn abort(self) {
        self.task.abort();
    }
}

/// Start an aggregator for one window with a bounded intake queue.
pub fn spawn_aggregator(capacity: usize) -> (IntakeSender, AggregatorHandle) {
    let (tx, mut rx) = mpsc::channel::<Intake>(capacity.max(1));

    let task = tokio::spawn(async move {
        let mut store = AggregateStore::new();
        let mut received: u64 = 0;
        while let Some(item) = rx.recv().await {
            received += 1;
            match item {
                Intake::Record(record) => store.apply(record),
                Intake::NonEntity(bytes) => store.apply_non_entity(bytes),
            }
        }
        debug!("Aggregator drained: {} items, {} buckets", received, store.len());
        store
    });

    (IntakeSender { tx }, AggregatorHandle { task })
}
