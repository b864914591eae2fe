//! Boot — logging init, live client construction, ETL and analyzer assembly.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::analyze::Analyzer;
use crate::api::HttpUsageApi;
use crate::conf::{EtlConfig, LogFormat, LoggingConfig, RegionMap};
use crate::error::EtlError;
use crate::etl::Etl;
use crate::storage::GcsStore;

/// Phase 1: thread-local subscriber for logging while configuration loads.
pub fn init_basic_logging() -> tracing::subscriber::DefaultGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cdn_etl=info"));
    let subscriber = fmt().with_env_filter(filter).with_target(true).finish();
    tracing::subscriber::set_default(subscriber)
}

/// Phase 2: global subscriber from configuration. `RUST_LOG` wins over
/// `logging.level`.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Json => {
            let layer = fmt::layer().json().with_target(true).with_thread_ids(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogFormat::Pretty => {
            let layer = fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

/// Build the live object store and API clients and the [`Etl`] over them.
pub fn boot(config: &EtlConfig, cancel: CancellationToken) -> Result<Etl, EtlError> {
    let regions = RegionMap::load(
        config.regions_file.as_deref().map(Path::new),
        &config.regions,
        &config.staging_suffix,
    )?;
    info!("Region map: {} sources", regions.len());

    let store = GcsStore::new(&config.storage, &config.bucket)?;
    info!("Object store: bucket={} endpoint={}", config.bucket, config.storage.endpoint);

    let api = HttpUsageApi::new(&config.api)?;
    info!("Usage API: {}", config.api.url);

    info!(
        "Workers={} intake_capacity={} staging={} status_buckets={:?}",
        config.pool_size, config.intake_capacity, config.staging, config.status_buckets
    );

    Ok(Etl::new(Arc::new(store), Arc::new(api), regions, config, cancel))
}

/// Build the offline analyzer over the configured input folder.
pub fn boot_analyzer(config: &EtlConfig, cancel: CancellationToken) -> Result<Analyzer, EtlError> {
    info!(
        "Analyze: input={} output={} workers={} status_buckets={:?}",
        config.analyze.input_dir, config.analyze.output, config.pool_size, config.status_buckets
    );
    Analyzer::new(config, cancel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config() -> EtlConfig {
        let mut cfg = EtlConfig::default();
        cfg.bucket = "cdn-logs".to_string();
        cfg.api.url = "http://localhost:3004".to_string();
        cfg.api.key = "k".to_string();
        cfg.regions = HashMap::from([("aaa".to_string(), "us-east".to_string())]);
        cfg
    }

    #[test]
    fn test_boot_builds_clients() {
        assert!(boot(&config(), CancellationToken::new()).is_ok());
    }

    #[test]
    fn test_boot_analyzer_needs_existing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = EtlConfig::default();
        cfg.analyze.input_dir = dir.path().display().to_string();
        cfg.analyze.output = dir.path().join("out.csv").display().to_string();
        assert!(boot_analyzer(&cfg, CancellationToken::new()).is_ok());

        cfg.analyze.input_dir = "/nonexistent/cdn-logs".to_string();
        assert!(matches!(
            boot_analyzer(&cfg, CancellationToken::new()),
            Err(EtlError::Storage(_))
        ));
    }

    #[test]
    fn test_boot_missing_region_file() {
        let mut cfg = config();
        cfg.regions_file = Some("/nonexistent/regions.toml".to_string());
        let err = boot(&cfg, CancellationToken::new()).err().unwrap();
        assert!(matches!(err, EtlError::Config(_)));
    }
}
