//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::{AspectArg, ResolutionArg, TierArg};

/// Generate a cinematic CPU reveal video with Veo
#[derive(Parser, Debug)]
#[command(name = "cpu-reveal")]
#[command(version, about = "Cinematic CPU reveal videos from a text prompt", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Log progress (same as RUST_LOG=info)
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate one video and exit
    Generate(GenerateArgs),
    /// Check whether an API key is available
    Check,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args, Debug, Default)]
pub struct GenerateArgs {
    /// Visual directive (default: configured prompt)
    pub prompt: Option<String>,

    /// Read the visual directive from a file
    #[arg(long, conflicts_with = "prompt")]
    pub prompt_file: Option<PathBuf>,

    /// Aspect ratio
    #[arg(long, short)]
    pub aspect: Option<AspectArg>,

    /// Output resolution
    #[arg(long, short)]
    pub resolution: Option<ResolutionArg>,

    /// Render engine
    #[arg(long, short)]
    pub tier: Option<TierArg>,

    /// Where to save the video (default: configured output directory)
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Print the video link without downloading
    #[arg(long, conflicts_with = "output")]
    pub no_download: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
