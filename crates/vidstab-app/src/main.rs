//! VidStab - Video stabilizer
//!
//! Usage:
//!   vidstab analyze <INPUT>             Print video properties and camera path statistics
//!   vidstab stabilize <INPUT> [OPTIONS] Stabilize a video file or an image directory

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

mod commands;

#[derive(Parser)]
#[command(name = "vidstab", about = "Stabilize shaky video", version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Job options shared by both subcommands. Flags override the config file.
#[derive(Args, Debug, Default)]
pub struct JobArgs {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Smoothing algorithm, e.g. generic, still, panning-b
    #[arg(short, long)]
    pub algorithm: Option<String>,

    /// Smoothing strength, each step widens the window by one second
    #[arg(short, long)]
    pub strength: Option<u32>,

    /// Crop: "auto" or a fixed zoom ratio such as 0.05
    #[arg(long)]
    pub crop: Option<String>,

    /// Output frame rate, e.g. 30 or 30000/1001
    #[arg(long)]
    pub fps: Option<String>,

    /// Output codec: h264 or h265
    #[arg(long)]
    pub codec: Option<String>,

    /// Mask image; non-black pixels are ignored while tracking
    #[arg(long)]
    pub mask: Option<PathBuf>,

    /// Output size of image sequences, e.g. 1920x1080
    #[arg(long)]
    pub resolution: Option<String>,

    /// Keep the audio of the original
    #[arg(long)]
    pub keep_audio: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the camera motion without rendering
    Analyze {
        /// Video file or directory of images
        input: PathBuf,

        /// Print the raw trajectory as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        job: JobArgs,
    },

    /// Stabilize a video
    Stabilize {
        /// Video file or directory of images
        input: PathBuf,

        /// Output file; defaults to a free name in the output directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output directory
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,

        #[command(flatten)]
        job: JobArgs,
    },
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    info!("VidStab {} starting...", env!("CARGO_PKG_VERSION"));
    vidstab_media::init();

    match cli.command {
        Commands::Analyze { input, json, job } => commands::analyze(&input, json, &job),
        Commands::Stabilize {
            input,
            output,
            output_dir,
            job,
        } => commands::stabilize(&input, output, &output_dir, &job),
    }
}
