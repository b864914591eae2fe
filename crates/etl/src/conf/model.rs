//! Model — configuration structs and their defaults.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::parser::StatusPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EtlConfig {
    pub mode: RunMode,
    /// Bucket holding every source's log objects.
    pub bucket: String,
    pub storage: StorageSettings,
    pub api: ApiSettings,
    /// Process only staging regions (true) or only production regions (false).
    pub staging: bool,
    /// Region-name suffix that marks a staging region.
    pub staging_suffix: String,
    /// Number of concurrent file workers per hour.
    pub pool_size: usize,
    /// Bound of the record queue between workers and the aggregator.
    pub intake_capacity: usize,
    pub status_buckets: StatusPolicy,
    /// Optional TOML file with a `[names]` table of source → region.
    pub regions_file: Option<String>,
    /// Inline source → region entries, merged over `regions_file`.
    pub regions: HashMap<String, String>,
    pub analyze: AnalyzeSettings,
    pub logging: LoggingConfig,
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            bucket: String::new(),
            storage: StorageSettings::default(),
            api: ApiSettings::default(),
            staging: true,
            staging_suffix: "-monster".to_string(),
            pool_size: 10,
            intake_capacity: 1024,
            status_buckets: StatusPolicy::default(),
            regions_file: None,
            regions: HashMap::new(),
            analyze: AnalyzeSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// What a run does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Walk the bucket hour by hour and post usage to the API.
    #[default]
    Etl,
    /// Aggregate a local folder of gzip logs into a CSV file.
    Analyze,
}

/// Offline aggregation of downloaded logs.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyzeSettings {
    /// Folder searched recursively for `.gz` log files.
    pub input_dir: String,
    /// CSV file to write.
    pub output: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageSettings {
    pub endpoint: String,
    /// Static OAuth bearer token; anonymous access when unset.
    pub access_token: Option<String>,
    pub list_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            endpoint: "https://storage.googleapis.com".to_string(),
            access_token: None,
            list_timeout_secs: 15,
            fetch_timeout_secs: 600,
            probe_timeout_secs: 5,
        }
    }
}

impl StorageSettings {
    pub fn list_timeout(&self) -> Duration {
        Duration::from_secs(self.list_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSettings {
    pub url: String,
    pub key: String,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            key: String::new(),
            timeout_secs: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "cdn_etl=info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}
