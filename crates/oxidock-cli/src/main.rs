//! oxidock — Ensemble docking pipeline driver.
//! Entry point for the batch binary.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use oxidock_engine::config::{parse_input_list, EngineConfig};
use oxidock_engine::{BatchProgress, EnsembleConsole, ExternalSuite, MinimizeOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oxidock=debug,info")),
        )
        .init();

    info!("oxidock starting up...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = EngineConfig::load(config_path.as_deref())?;
    info!(
        workdir = %config.workdir.display(),
        workers = config.workers,
        precision = %config.precision,
        "Configuration loaded"
    );

    let pairs = parse_input_list(&config.input_list)?;
    info!(pairs = pairs.len(), "Input list parsed");

    let suite = Arc::new(
        ExternalSuite::new(&config.suite_root)
            .with_command_timeout(config.task_timeout().map(|t| t + Duration::from_secs(60))),
    );

    let (progress_tx, progress_rx) = broadcast::channel::<BatchProgress>(256);
    tokio::spawn(log_progress(progress_rx));

    let mut console = EnsembleConsole::new(suite, &config.workdir, pairs)?
        .with_workers(config.workers)
        .with_task_timeout(config.task_timeout())
        .with_progress(progress_tx);

    let started = chrono::Local::now();
    info!("Start: {}", started.format("%Y-%m-%d %H:%M:%S"));

    console
        .minimize_all(
            &MinimizeOptions::default(),
            config.keep_single_chain,
            config.overwrite,
        )
        .await?;
    console
        .generate_grids(config.grid_box_size, config.overwrite)
        .await?;
    console.split_minimized().await?;
    console
        .split_ligands(&config.ligand_library, config.overwrite)
        .await?;
    console.build_mapping(config.precision).await?;
    console
        .dock_all(config.precision, config.calc_rmsd, config.overwrite)
        .await?;
    let data = console.extract_all(config.precision).await?;

    let data_path = console
        .dirs()
        .result
        .join(format!("docking_data_{}.json", config.precision));
    std::fs::write(&data_path, serde_json::to_string_pretty(&data)?)?;
    info!(
        records = data.len(),
        path = %data_path.display(),
        "Docking data written"
    );

    let ended = chrono::Local::now();
    info!("End: {}", ended.format("%Y-%m-%d %H:%M:%S"));
    let elapsed = (ended - started).to_std().unwrap_or_default();
    info!("Duration: {elapsed:?}");
    Ok(())
}

async fn log_progress(mut rx: broadcast::Receiver<BatchProgress>) {
    loop {
        match rx.recv().await {
            Ok(event) => debug!(
                job = %event.job_name,
                completed = event.completed,
                total = event.total,
                "Batch progress"
            ),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
