//! Quakemap - Live earthquake intensity map.
//!
//! Polls an earthquake feed, shades county shapes by reported intensity,
//! and serves the result as a live dashboard.

use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

mod cli;
mod client;
mod color;
mod dashboard;
mod detect;
mod errors;
mod markers;
mod models;
mod output;
mod projection;
mod server;
mod surface;
mod token;
mod topology;
mod view;

use cli::{Cli, Command};
use client::QuakeClient;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    match cli.command {
        Command::Serve(args) => cmd_serve(args),
        Command::List(args) => cmd_list(args),
    }
}

/// Initialize tracing subscriber.
fn init_tracing(verbose: bool, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the `list` command - one-shot fetch of the current list.
fn cmd_list(args: cli::ListArgs) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("failed to create tokio runtime")?;

    let mut events = runtime.block_on(async {
        let client = QuakeClient::new(&args.api_host, &args.api_host, "Taiwan")
            .context("failed to create feed client")?;
        let tokens = args.token.source().into_provider(client.http());
        client
            .fetch_earthquakes(&tokens)
            .await
            .context("failed to fetch earthquake list")
    })?;

    events.truncate(args.limit);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    output::write_events(&mut handle, &events, args.format)?;

    Ok(())
}

/// Execute the `serve` command - start the dashboard server.
fn cmd_serve(args: cli::ServeArgs) -> Result<()> {
    let config = server::ServerConfig {
        port: args.port,
        host: args.host.clone(),
        api_host: args.api_host.clone(),
        map_base: args.map_base.clone(),
        region: args.region.clone(),
        static_dir: args.static_dir.clone(),
        viewport_width: args.viewport_width,
        tokens: args.token.source(),
    };

    config.validate()?;

    // Print startup message
    let url = format!("http://{}:{}", args.host, args.port);
    println!("\x1b[1m🌏 Quakemap\x1b[0m");
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("  Local:   \x1b[96m{url}\x1b[0m");
    println!("  Feed:    {}", args.api_host);
    println!("  Map:     {}/static/json/{}.json", config.map_base(), args.region);
    println!("  Refresh: {}s", server::REFRESH_INTERVAL.as_secs());
    println!("\x1b[2m───────────────────────────────────────\x1b[0m");
    println!("\x1b[2mPress Ctrl+C to stop\x1b[0m\n");

    // Open browser if requested (using xdg-open/open command)
    if args.open {
        #[cfg(target_os = "linux")]
        let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
        #[cfg(target_os = "macos")]
        let _ = std::process::Command::new("open").arg(&url).spawn();
        #[cfg(target_os = "windows")]
        let _ = std::process::Command::new("cmd").args(["/c", "start", &url]).spawn();
    }

    // Run the async server on tokio runtime
    tokio::runtime::Runtime::new()
        .context("failed to create tokio runtime")?
        .block_on(server::run_server(config))
}
