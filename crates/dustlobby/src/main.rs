//! `dustlobby` binary: load config, install logging, serve.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use dustlobby::prelude::*;

/// Lobby server for timed Dustforce races.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// TOML config file. Every field is optional.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// WebSocket listen address, overriding the config.
    #[arg(long)]
    ws_addr: Option<String>,

    /// Admin API listen address, overriding the config.
    #[arg(long)]
    admin_addr: Option<String>,

    /// Run without the score feed.
    #[arg(long)]
    no_feed: bool,

    /// Log everything at debug level.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "debug" } else { "dustlobby=info,warn" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut config = ServerConfig::load(cli.config.as_deref())
        .context("loading configuration")?;
    if let Some(addr) = cli.ws_addr {
        config.ws_addr = addr;
    }
    if let Some(addr) = cli.admin_addr {
        config.admin_addr = addr;
    }
    if cli.no_feed {
        config.feed_url = None;
    }

    let server = DustlobbyServer::builder(config)
        .build()
        .await
        .context("starting server")?;
    tracing::info!(
        ws = %server.local_addr()?,
        admin = %server.admin_addr()?,
        "listening"
    );
    server.run().await?;
    Ok(())
}
