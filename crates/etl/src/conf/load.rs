//! Load — layered configuration loading and validation.
//!
//! Priority: environment (`CDN_ETL_*`) > `$CDN_ETL_CONFIG` > local
//! `cdn-etl.toml` > `/etc/cdn-etl/cdn-etl.toml` > compiled defaults.

use std::env;

use reqwest::Url;
use tracing::info;

use super::model::{EtlConfig, RunMode};
use super::ConfigError;

const ENV_PREFIX: &str = "CDN_ETL";
const CONFIG_FILE_VAR: &str = "CDN_ETL_CONFIG";
const CONFIG_PATHS: &[&str] = &["/etc/cdn-etl/cdn-etl", "cdn-etl"];

impl EtlConfig {
    /// Load configuration from files and environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let explicit = env::var(CONFIG_FILE_VAR).ok().filter(|p| !p.is_empty());
        Self::load_from(explicit.as_deref())
    }

    /// Same layering as [`EtlConfig::load`] with an explicit extra file.
    /// An explicitly named file must exist.
    pub fn load_from(path: Option<&str>) -> Result<Self, ConfigError> {
        let defaults = config::Config::try_from(&EtlConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        for path in CONFIG_PATHS {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        if let Some(path) = path {
            info!("Loading configuration from: {}", path);
            builder = builder.add_source(config::File::with_name(path).required(true));
        }

        // CDN_ETL_API__KEY -> api.key
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Reject configurations the selected mode cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pool_size == 0 {
            return Err(ConfigError::Invalid("pool_size must be > 0".to_string()));
        }
        if self.intake_capacity == 0 {
            return Err(ConfigError::Invalid("intake_capacity must be > 0".to_string()));
        }
        if self.storage.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("storage.fetch_timeout_secs must be > 0".to_string()));
        }
        match self.mode {
            RunMode::Etl => self.validate_etl(),
            RunMode::Analyze => self.validate_analyze(),
        }
    }

    fn validate_analyze(&self) -> Result<(), ConfigError> {
        if self.analyze.input_dir.is_empty() {
            return Err(ConfigError::Invalid("analyze.input_dir must not be empty".to_string()));
        }
        if self.analyze.output.is_empty() {
            return Err(ConfigError::Invalid("analyze.output must not be empty".to_string()));
        }
        Ok(())
    }

    fn validate_etl(&self) -> Result<(), ConfigError> {
        if self.bucket.is_empty() {
            return Err(ConfigError::Invalid("bucket must not be empty".to_string()));
        }
        if self.api.url.is_empty() {
            return Err(ConfigError::Invalid("api.url must not be empty".to_string()));
        }
        if self.api.key.is_empty() {
            return Err(ConfigError::Invalid("api.key must not be empty".to_string()));
        }
        match Url::parse(&self.api.url) {
            Ok(url) if url.host_str().is_some() => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "api.url is not a valid URL: {}",
                    self.api.url
                )))
            }
        }
        if Url::parse(&self.storage.endpoint).is_err() {
            return Err(ConfigError::Invalid(format!(
                "storage.endpoint is not a valid URL: {}",
                self.storage.endpoint
            )));
        }
        let timeouts = [
            ("storage.list_timeout_secs", self.storage.list_timeout_secs),
            ("storage.probe_timeout_secs", self.storage.probe_timeout_secs),
            ("api.timeout_secs", self.api.timeout_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{} must be > 0", name)));
            }
        }
        Ok(())
    }
}
