//! Soundboard CLI - mixes PCM and media files into a single stream.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{MixCommand, SoundsCommand};

/// Soundboard CLI - mixes sounds into one 16-bit stereo 48kHz PCM stream.
///
/// Inputs are raw PCM files, any media ffmpeg can decode, or sound names
/// from the configuration file.
///
/// Configuration is stored in ~/.soundboard/config.yaml
#[derive(Parser)]
#[command(name = "soundboard")]
#[command(about = "Real-time PCM soundboard mixer")]
#[command(version)]
pub struct Cli {
    /// Config file (default is ~/.soundboard/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mix inputs into one PCM stream
    Mix(MixCommand),
    /// List configured sounds
    Sounds(SoundsCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr, stdout may carry PCM.
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::Mix(cmd) => cmd.run(&cli).await,
        Commands::Sounds(cmd) => cmd.run(&cli),
    }
}
