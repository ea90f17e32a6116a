//! Entry point for the frame_merge application.
//! Handles CLI parsing and logging setup, then hands the validated configuration to the merger.

use anyhow::{Context, Result};
use clap::Parser;
use frame_merge::{get_parallel_info, Merger};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Args;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_tracing(args.verbose);

    println!(
        r#"
------------------------------------------------------------------
                     frame_merge
          Detector frame merging for NetCDF-4 files
------------------------------------------------------------------
"#
    );

    get_parallel_info().log();

    let config = args
        .into_config()
        .context("Failed to build merge configuration")?;
    let input = config.input.clone();

    let mut merger = Merger::new(config).context("Invalid merge configuration")?;
    let report = merger
        .process()
        .with_context(|| format!("Failed to merge frames of {}", input.display()))?;

    report.print_summary();
    println!("✅ Finished merging into {}", report.output.display());

    Ok(())
}

/// Log to stderr; `RUST_LOG` takes precedence over the verbosity flag
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
