//! Scheduler daemon for the media processing pipeline.

use clap::Parser;
use media_pipeline::{BroadcastPublisher, Daemon, FileId};
use media_pipeline_cli::{init_tracing, load_config};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Admits queued media files for processing and keeps pipeline state tidy
#[derive(Parser, Debug)]
#[command(name = "media-pipeline")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Override the storage root
    #[arg(long)]
    storage_root: Option<PathBuf>,

    /// Override the state directory of the record store
    #[arg(long)]
    state_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let config = match load_config(&args.config, args.storage_root, args.state_dir) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(config = %args.config.display(), error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let publisher = Arc::new(BroadcastPublisher::default());
    let daemon = match Daemon::new(config, publisher).await {
        Ok(daemon) => daemon,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize daemon");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = daemon.start_status_server() {
        tracing::error!(error = %e, "Failed to start status server");
        return ExitCode::FAILURE;
    }

    // The transcoding executor runs out of process; here dequeued ids are
    // only logged.
    let (dispatch_tx, mut dispatch_rx) = mpsc::channel::<FileId>(16);
    let executor = tokio::spawn(async move {
        while let Some(file_id) = dispatch_rx.recv().await {
            tracing::info!(file_id = %file_id, "File ready for transcoding");
        }
    });

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    let result = daemon.run_until(dispatch_tx, shutdown).await;
    let _ = executor.await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Daemon error");
            ExitCode::FAILURE
        }
    }
}
