//! Conf module — configuration model, layered loading, region map.

pub mod model;
pub mod load;
pub mod regions;

pub use model::{AnalyzeSettings, ApiSettings, EtlConfig, LogFormat, LoggingConfig, RunMode, StorageSettings};
pub use regions::RegionMap;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("Failed to read region map {path}: {source}")]
    RegionFile {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse region map {path}: {source}")]
    RegionParse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
