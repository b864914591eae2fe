//! Parser module — CDN access-log line classification.
//!
//! - `model.rs`: classified records, entity kinds, outcomes
//! - `path.rs`: request-path grammar (`/<prefix>/<id>/.../<file>.<ext>`)
//! - `classify.rs`: tab-separated line → [`LineOutcome`]
//!
//! Classification never fails the batch: every line maps to a record,
//! a non-entity byte count, or a skip reason.

pub mod model;
pub mod path;
pub mod classify;

pub use model::{ClassifiedRecord, ClassifyError, EntityKind, LineOutcome, SkipReason, StatusPolicy};
pub use path::entity_from_path;
pub use classify::classify;
