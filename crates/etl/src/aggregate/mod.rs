//! Aggregate module — hourly per-entity usage counters.
//!
//! - `store.rs`: the counter map itself (plain, single-owner)
//! - `actor.rs`: the task that owns a store and receives every mutation
//! - `export.rs`: flatten into the window batch for the usage API

pub mod store;
pub mod actor;
pub mod export;

pub use store::{AggregateBucket, AggregateKey, AggregateStore};
pub use actor::{spawn_aggregator, AggregatorHandle, Intake, IntakeClosed, IntakeSender};
pub use export::{ExportRecord, UsageBatch, WindowMeta};
