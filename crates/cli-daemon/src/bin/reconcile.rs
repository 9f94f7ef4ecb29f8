//! Reports variant rows whose file is missing from the storage root and,
//! with `--fix`, deletes those rows. Files on disk are never touched.

use clap::Parser;
use media_pipeline::{
    JsonStore, PathLayout, ReconcileOptions, ReconcileReport, ReconciliationScanner,
};
use media_pipeline_cli::{init_tracing, load_config};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Reconcile variant records with files on disk (dry run by default)
#[derive(Parser, Debug)]
#[command(name = "media-reconcile")]
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

    /// Delete rows whose file is missing
    #[arg(long)]
    fix: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    let report = match run(&args).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(error = %e, "Reconciliation failed");
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode report");
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&report, args.fix);
    }

    if report.has_errors() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn run(args: &Args) -> Result<ReconcileReport, Box<dyn std::error::Error>> {
    let config = load_config(&args.config, args.storage_root.clone(), args.state_dir.clone())?;
    // Never create the storage tree here: a wrong root would make every
    // row look dangling.
    let layout = PathLayout::from_root(&config.storage.root);
    let store = Arc::new(JsonStore::open(&config.storage.state_dir).await?);

    let options = ReconcileOptions {
        dry_run: !args.fix,
        fix: args.fix,
    };
    let scanner = ReconciliationScanner::new(layout, store);
    Ok(scanner.reconcile(options).await?)
}

fn print_report(report: &ReconcileReport, fix: bool) {
    for issue in &report.issues {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            issue.file_id,
            issue.variant,
            issue.path.display(),
            issue.issue,
            issue.action
        );
    }
    for error in &report.errors {
        println!("ERROR\t{}", error);
    }

    println!(
        "Scanned {} variant rows: {} missing, {} fixed, {} errors{}",
        report.scanned,
        report.issues.len(),
        report.fixed,
        report.errors.len(),
        if fix || report.issues.is_empty() {
            ""
        } else {
            " (dry run, pass --fix to delete)"
        }
    );
}
