//! Worker module — parallel fetch, gunzip and classify of one hour's objects.

pub mod scan;
pub mod pool;

pub use scan::{process_object, scan_object, ScanError, ScanSummary};
pub use pool::{run_pool, FileFailure, PoolSettings};
