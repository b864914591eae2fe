//! API module — the external usage service: checkpoint lookup and export.

pub mod error;
pub mod ops;
pub mod live;
pub mod fake;

pub use error::ApiError;
pub use ops::{Checkpoint, UsageApi};
pub use live::HttpUsageApi;
pub use fake::FakeApi;
