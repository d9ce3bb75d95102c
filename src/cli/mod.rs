//! Command-line interface for the optimarr service.
//!
//! The CLI is a thin operational front-end over the facade, exercising it
//! exactly as the HTTP layer would:
//! - `serve` - run the job manager and scanner until interrupted
//! - `scan` - run one full scan and print the summary
//! - `enqueue` - create a job from the shell
//! - `info` - probe a media file and print its metadata

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::Result;
use crate::core::jobs::JobKind;
use crate::services::transcoder::Resolution;

/// Main CLI application structure defining the top-level interface.
#[derive(Parser, Debug)]
#[command(name = "optimarr")]
#[command(about = "Self-hosted media optimization service")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the service core until interrupted
    Serve,

    /// Run one full scan over the configured watch directories
    Scan,

    /// Enqueue a single job
    Enqueue(EnqueueArgs),

    /// Probe a media file and print its metadata
    Info(InfoArgs),
}

/// Arguments for the `enqueue` subcommand.
#[derive(clap::Args, Debug)]
pub struct EnqueueArgs {
    /// Job kind
    #[arg(long, value_enum)]
    pub kind: JobKindArg,

    /// Input path (within the source root)
    #[arg(long)]
    pub source: String,

    /// Output path (within the output root)
    #[arg(long)]
    pub dest: String,

    /// Advisory priority
    #[arg(long, default_value_t = 0)]
    pub priority: i32,

    /// Generate a subtitle sidecar after transcoding
    #[arg(long)]
    pub subtitles: bool,

    /// Upscale video
    #[arg(long)]
    pub upscale: bool,

    /// Target resolution when upscaling
    #[arg(long, value_enum)]
    pub resolution: Option<ResolutionArg>,
}

/// Arguments for the `info` subcommand.
#[derive(clap::Args, Debug)]
pub struct InfoArgs {
    /// Media file to probe (within the source root)
    pub path: String,
}

/// CLI-facing job kind.
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum JobKindArg {
    Extract,
    Optimize,
    Test,
}

impl From<JobKindArg> for JobKind {
    fn from(value: JobKindArg) -> Self {
        match value {
            JobKindArg::Extract => JobKind::Extract,
            JobKindArg::Optimize => JobKind::Optimize,
            JobKindArg::Test => JobKind::Test,
        }
    }
}

/// CLI-facing resolution.
#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum ResolutionArg {
    /// 1920x1080
    #[value(name = "1080p")]
    FullHd,
    /// 3840x2160
    #[value(name = "4k")]
    UltraHd,
}

impl From<ResolutionArg> for Resolution {
    fn from(value: ResolutionArg) -> Self {
        match value {
            ResolutionArg::FullHd => Resolution::FullHd,
            ResolutionArg::UltraHd => Resolution::UltraHd,
        }
    }
}

/// Parse the process arguments and execute the selected subcommand.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::commands::dispatch(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_serve() {
        let cli = Cli::try_parse_from(["optimarr", "serve"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve));
    }

    #[test]
    fn test_cli_parses_enqueue() {
        let cli = Cli::try_parse_from([
            "optimarr",
            "enqueue",
            "--kind",
            "optimize",
            "--source",
            "/m/a.mkv",
            "--dest",
            "/out/a_optimized.mkv",
            "--upscale",
            "--resolution",
            "4k",
        ])
        .unwrap();
        let Commands::Enqueue(args) = cli.command else {
            panic!("expected enqueue");
        };
        assert!(matches!(args.kind, JobKindArg::Optimize));
        assert!(args.upscale);
        assert!(matches!(args.resolution, Some(ResolutionArg::UltraHd)));
        assert_eq!(args.priority, 0);
    }

    #[test]
    fn test_cli_global_config_flag() {
        let cli = Cli::try_parse_from(["optimarr", "scan", "--config", "/etc/optimarr.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/etc/optimarr.toml")));
    }
}
