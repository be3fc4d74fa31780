//! Scanpath CLI - drives layer and scan generation for an LPBF build.
//!
//! Usage:
//!   scanpath-cli layers <config.json>   run one layer-generation batch
//!   scanpath-cli scans <config.json>    run one scan-generation batch
//!   scanpath-cli run <config.json>      generate everything, start to finish
//!
//! Every subcommand takes the path to a build configuration file. Fatal
//! errors produce an error report next to the configuration file and exit
//! code -1; the resume checkpoint is left untouched so a fixed run picks up
//! where the failed one stopped.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, LevelFilter};
use scanpath::config::BuildConfig;
use scanpath::pipeline::{
    clear_status_files, create_scan_archive, run_layer_batch, run_scan_batch,
};
use scanpath::report::{append_error_report, clear_error_report};
use scanpath::scanpath::StripeTracker;
use std::path::PathBuf;
use std::process::exit;

/// Laser scan-path generation for powder-bed-fusion additive manufacturing
#[derive(Parser, Debug)]
#[command(name = "scanpath-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Process one batch of layer generation
    Layers {
        /// Build configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Process one batch of scan generation
    Scans {
        /// Build configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Generate all layers and scans, then package the results
    Run {
        /// Build configuration file
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        LevelFilter::Debug
    } else if cli.verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let (config_path, result) = match &cli.command {
        Commands::Layers { config } => (config.clone(), cmd_layers(config)),
        Commands::Scans { config } => (config.clone(), cmd_scans(config)),
        Commands::Run { config } => (config.clone(), cmd_run(config)),
    };

    if let Err(err) = result {
        let stage = match &cli.command {
            Commands::Layers { .. } => "layer generation",
            Commands::Scans { .. } => "scan generation",
            Commands::Run { .. } => "scanpath generation",
        };
        let report_dir = config_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let _ = append_error_report(&report_dir, stage, &format!("{err:#}"));
        eprintln!("Error in {stage}: {err:#}");
        exit(-1);
    }
}

fn load_config(path: &PathBuf) -> Result<BuildConfig> {
    BuildConfig::from_file(path).context("failed to load the build configuration")
}

fn cmd_layers(config_path: &PathBuf) -> Result<()> {
    let config = load_config(config_path)?;
    let outcome = run_layer_batch(&config).context("layer batch failed")?;
    println!(
        "Layers {}..{} of {} complete{}",
        outcome.first_layer,
        outcome.last_layer,
        outcome.total_layers,
        if outcome.finished { " (finished)" } else { "" }
    );
    Ok(())
}

fn cmd_scans(config_path: &PathBuf) -> Result<()> {
    let config = load_config(config_path)?;
    let mut stripes = StripeTracker::new(&config);
    let outcome = run_scan_batch(&config, &mut stripes).context("scan batch failed")?;
    println!(
        "Scans {}..{} of {} complete{}",
        outcome.first_layer,
        outcome.last_layer,
        outcome.total_layers,
        if outcome.finished { " (finished)" } else { "" }
    );
    Ok(())
}

fn cmd_run(config_path: &PathBuf) -> Result<()> {
    let config = load_config(config_path)?;

    // A full run starts from scratch: stale checkpoints and reports from
    // prior runs would otherwise mask this run's results.
    if let Some(dir) = config_path.parent() {
        clear_error_report(dir);
    }
    clear_status_files(&config);

    info!("beginning layer generation");
    let progress = ProgressBar::new(1);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] layer {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.set_message("building layers...");
    loop {
        let outcome = run_layer_batch(&config).context("layer generation failed")?;
        progress.set_length(outcome.total_layers as u64);
        progress.set_position(outcome.last_layer as u64);
        if outcome.finished {
            break;
        }
    }
    progress.finish_with_message("layers done");

    info!("beginning scan generation");
    let progress = ProgressBar::new(1);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] scan {pos}/{len} {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );
    progress.set_message("building scan paths...");
    let mut stripes = StripeTracker::new(&config);
    loop {
        let outcome = run_scan_batch(&config, &mut stripes).context("scan generation failed")?;
        progress.set_length(outcome.total_layers as u64);
        progress.set_position(outcome.last_layer as u64);
        if outcome.finished {
            break;
        }
    }
    progress.finish_with_message("scans done");

    if config.general.create_scan_zip {
        let archive = create_scan_archive(&config).context("zip packaging failed")?;
        println!("Scan archive written to {}", archive.display());
    }

    clear_status_files(&config);
    println!("Scanpath generation complete");
    println!("  Layers: {}", config.layer_dir().display());
    println!("  Scans:  {}", config.scan_dir().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
