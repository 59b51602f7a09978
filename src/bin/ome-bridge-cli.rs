//! ome-bridge-cli - convert between OME-TIFF and OME-Zarr v0.5.
//!
//! This binary is pure wiring: it parses arguments, installs a
//! `tracing` subscriber, and dispatches into `ome_bridge`'s library
//! entry points. No conversion logic lives here.

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ome_bridge::cli::{Cli, Command};
use ome_bridge::convert;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::ToZarr(args) => run_to_zarr(args).await,
        Command::ToTiff(args) => run_to_tiff(args).await,
    }
}

async fn run_to_zarr(args: ome_bridge::cli::ToZarrArgs) -> ExitCode {
    info!("reading {}", args.input.display());
    match convert::to_zarr(&args.input, &args.output).await {
        Ok(written) => {
            info!(
                "wrote {written} file(s) to {}",
                args.output.display()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("to-zarr failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_to_tiff(args: ome_bridge::cli::ToTiffArgs) -> ExitCode {
    info!("reading {}", args.input.display());
    let result = convert::to_tiff(
        &args.input,
        &args.output,
        args.tile_size,
        args.compression(),
        Some(args.deflate_level),
        args.tiff_format(),
        args.max_concurrency,
    )
    .await;

    match result {
        Ok(()) => {
            info!("wrote {}", args.output.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("to-tiff failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
