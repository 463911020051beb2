mod cli;

use segcast::{config, encoder, host, receiver, server};

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Cancel `token` on Ctrl+C or SIGTERM.
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        server::shutdown_signal().await;
        tracing::info!("Shutdown signal received");
        token.cancel();
    });
}

async fn start_host(
    source: PathBuf,
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting segcast host");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    host::run_host(config, &source, cancel).await
}

async fn join_host(
    address: String,
    port: Option<u16>,
    output: Option<PathBuf>,
    config_path: Option<&Path>,
) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let port = port.unwrap_or(config.server.port);
    let output = output.unwrap_or(config.receiver.output_dir);

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let summary = receiver::run_receiver(&address, port, &output, cancel).await?;

    println!(
        "Received {} segments ({} bytes) in {:.1}s ({:.1} KiB/s) into {}",
        summary.segments,
        summary.bytes,
        summary.elapsed.as_secs_f64(),
        summary.rate_kib_per_sec(),
        output.display()
    );
    if !summary.complete {
        println!("Warning: the connection ended in the middle of a segment");
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "segcast=trace,segcast_core=trace,segcast_protocol=trace".to_string()
        } else {
            "segcast=debug,segcast_core=debug,segcast_protocol=debug".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Host { source, host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_host(source, host, port, cli.config.as_deref()))
        }
        Commands::Join {
            address,
            port,
            output,
        } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(join_host(address, port, output, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = config::load_config_or_default(config_path)?;
    let tools = encoder::check_tools(&config.encoder);
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version);
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("ffmpeg is missing. Install it to host media files; directory sources still work.");
    }

    Ok(())
}
