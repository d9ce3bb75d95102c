//! Command execution for the optimarr CLI.
//!
//! Each subcommand builds the facade from configuration and drives it the
//! same way the HTTP layer does. The `dispatch` function is the single
//! routing point between parsed arguments and command logic.

use log::info;

use crate::Result;
use crate::cli::{Cli, Commands, EnqueueArgs, InfoArgs};
use crate::config::load_config;
use crate::facade::{EnqueueRequest, Facade};

/// Route a parsed CLI invocation to its command handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let facade = Facade::build(config)?;
    match cli.command {
        Commands::Serve => serve(&facade).await,
        Commands::Scan => scan(&facade).await,
        Commands::Enqueue(args) => enqueue(&facade, args).await,
        Commands::Info(args) => info_command(&facade, args).await,
    }
}

/// Run the service core until interrupted.
async fn serve(facade: &Facade) -> Result<()> {
    facade.start()?;
    info!("optimarr {} serving; press ctrl-c to stop", crate::VERSION);
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    facade.shutdown().await;
    Ok(())
}

/// Run one full scan and print the summary.
async fn scan(facade: &Facade) -> Result<()> {
    let summary = facade.scan_now().await?;
    println!(
        "scan complete: {} matched, {} enqueued",
        summary.found, summary.enqueued
    );
    Ok(())
}

/// Enqueue a single job and print its id.
async fn enqueue(facade: &Facade, args: EnqueueArgs) -> Result<()> {
    let job = facade
        .enqueue(EnqueueRequest {
            kind: args.kind.into(),
            source_path: args.source,
            destination_path: args.dest,
            priority: args.priority,
            create_subtitles: args.subtitles,
            upscale: args.upscale,
            resolution: args.resolution.map(Into::into),
        })
        .await?;
    println!("{}", job.id);
    Ok(())
}

/// Probe a media file and print its metadata document.
async fn info_command(facade: &Facade, args: InfoArgs) -> Result<()> {
    let info = facade.media_info(&args.path).await?;
    println!(
        "duration: {:.1}s\nsize: {} bytes",
        info.duration_seconds, info.size_bytes
    );
    println!("{}", serde_json::to_string_pretty(&info.raw)?);
    Ok(())
}
