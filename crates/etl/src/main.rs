use std::process::ExitCode;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use cdn_etl::conf::{EtlConfig, RunMode};
use cdn_etl::runtime::{boot, stop};
use cdn_etl::EtlError;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.downcast_ref::<EtlError>().map(EtlError::exit_code).unwrap_or(1);
            ExitCode::from(code as u8)
        }
    }
}

async fn run() -> Result<()> {
    // Phase 1: thread-local logging until the configured subscriber is installed
    let basic_logging = boot::init_basic_logging();
    info!("Starting cdn-etl v{}", env!("CARGO_PKG_VERSION"));

    let config = EtlConfig::load()
        .map_err(EtlError::from)
        .context("Failed to load configuration")
        .and_then(|config| {
            config
                .validate()
                .map_err(EtlError::from)
                .context("Configuration validation failed")?;
            Ok(config)
        })
        .inspect_err(|e| error!("{:#}", e))?;

    // Phase 2
    drop(basic_logging);
    boot::init_logging(&config.logging);

    let cancel = CancellationToken::new();
    stop::cancel_on_signal(cancel.clone());

    let result = match config.mode {
        RunMode::Etl => run_etl(&config, cancel.clone()).await,
        RunMode::Analyze => run_analyze(&config, cancel.clone()).await,
    };
    cancel.cancel();
    result
}

async fn run_etl(config: &EtlConfig, cancel: CancellationToken) -> Result<()> {
    let etl = boot::boot(config, cancel)
        .context("Failed to initialise clients")
        .inspect_err(|e| error!("{:#}", e))?;
    let report = etl
        .run()
        .await
        .context("ETL run failed")
        .inspect_err(|e| error!("{:#}", e))?;

    info!(
        "Processed {} sources, {} hours exported",
        report.sources.len(),
        report.sources.iter().map(|s| s.hours_exported()).sum::<usize>()
    );
    Ok(())
}

async fn run_analyze(config: &EtlConfig, cancel: CancellationToken) -> Result<()> {
    let analyzer = boot::boot_analyzer(config, cancel)
        .context("Failed to open input folder")
        .inspect_err(|e| error!("{:#}", e))?;
    let report = analyzer
        .run()
        .await
        .context("Analyze run failed")
        .inspect_err(|e| error!("{:#}", e))?;

    info!("Analyzed {} files into {} rows", report.files, report.rows);
    Ok(())
}
