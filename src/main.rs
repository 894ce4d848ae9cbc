// SPDX-License-Identifier: GPL-3.0-only

use clap::{Args, Parser, Subcommand};
use edgecam::Config;
use edgecam::constants::detection;
use std::path::PathBuf;
use tracing::warn;

mod cli;

#[derive(Parser)]
#[command(name = "edgecam")]
#[command(about = "Camera preview with real-time edge detection")]
#[command(version = edgecam::constants::app_info::version())]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the preview pipeline against the built-in test cameras
    Run(RunArgs),

    /// List available cameras
    List,

    /// Print the effective configuration
    Config {
        /// Write the configuration back to disk
        #[arg(short, long)]
        save: bool,
    },
}

#[derive(Args, Default)]
pub struct RunArgs {
    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(short, long)]
    pub seconds: Option<u64>,

    /// Start in edge-detection mode
    #[arg(short, long)]
    pub detect: bool,

    /// Low hysteresis threshold
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u32).range(0..=detection::MAX_THRESHOLD as i64)
    )]
    pub threshold: Option<u32>,

    /// High/low threshold ratio
    #[arg(
        short,
        long,
        value_parser = clap::value_parser!(u32).range(1..=detection::MAX_RATIO as i64)
    )]
    pub ratio: Option<u32>,

    /// Chroma pixel stride produced by the test cameras
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=2))]
    pub pixel_stride: u8,

    /// Extra bytes at the end of every luma row from the test cameras
    #[arg(long, default_value_t = 0)]
    pub luma_padding: usize,

    /// Frame rate of the test cameras
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Toggle detection mode every N seconds
    #[arg(long)]
    pub toggle_every: Option<u64>,

    /// Skip the GPU renderer
    #[arg(long)]
    pub no_render: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let loaded = match &cli.config_file {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let log_filter = loaded.as_ref().ok().and_then(|c| c.log_filter.clone());

    // RUST_LOG wins over -v, which wins over the config file
    // Examples: RUST_LOG=debug, RUST_LOG=edgecam=trace
    let default_filter = match cli.verbose {
        0 => log_filter.unwrap_or_else(|| "warn".into()),
        1 => "info".into(),
        2 => "debug".into(),
        _ => "trace".into(),
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let config = loaded.unwrap_or_else(|e| {
        warn!(error = %e, "Using default configuration");
        Config::default()
    });

    match cli.command {
        Some(Commands::Run(args)) => cli::run(config, args),
        Some(Commands::List) => cli::list_cameras(),
        Some(Commands::Config { save }) => cli::show_config(&config, cli.config_file, save),
        None => cli::run(config, RunArgs::default_run()),
    }
}

impl RunArgs {
    /// Arguments used when no subcommand is given
    fn default_run() -> Self {
        Self {
            pixel_stride: 2,
            fps: 30,
            ..Default::default()
        }
    }
}
