// Domain-driven module structure for the CDN usage ETL.

// Collaborators
pub mod storage;
pub mod api;
pub mod conf;

// Core pipeline
pub mod parser;
pub mod aggregate;
pub mod worker;
pub mod etl;
pub mod analyze;

// Infrastructure
pub mod error;
pub mod metrics;
pub mod runtime;

pub use error::EtlError;
