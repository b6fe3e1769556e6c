use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;
mod commands;
mod config;
mod db;

use cli::{Args, Mode};

/// Initialize tracing with dual output:
/// 1. Console output (stdout)
/// 2. File output (~/.volgres/server.log) for persistence
fn initialize_tracing() -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,\
         volgres_server=debug,\
         volgres_engine=debug,\
         sqlx::query=warn"
            .into()
    });

    // Set up file logging to ~/.volgres/server.log
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    let volgres_dir = PathBuf::from(home).join(".volgres");
    std::fs::create_dir_all(&volgres_dir).ok();

    let file_appender = tracing_appender::rolling::never(&volgres_dir, "server.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Keep the guard alive for the lifetime of the program; dropping it
    // stops file logging
    std::mem::forget(guard);

    let console_layer = fmt::layer().with_writer(std::io::stdout);
    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    initialize_tracing()?;

    match args.mode {
        Mode::Serve {
            spec,
            port,
            interval,
        } => commands::serve::run_serve(spec, port, interval).await,
        Mode::Validate { spec } => commands::validate::run_validate(spec).await,
        Mode::Status { cluster, output } => commands::status::run_status(cluster, output).await,
        Mode::Events {
            cluster,
            limit,
            output,
        } => commands::events::run_events(cluster, limit, output).await,
    }
}
