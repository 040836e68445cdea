//! Serve command - run the webhook server and merge queues

use anyhow::Context;
use backport_bot::app::{App, shutdown_on_ctrl_c};
use backport_bot::config::load_config;
use std::net::SocketAddr;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Run until Ctrl-C
pub async fn run_serve(path: &Path, addr: Option<&str>, port: Option<u16>) -> anyhow::Result<()> {
    let config = load_config(path)?;
    let address = addr.unwrap_or(&config.server.address);
    let port = port.unwrap_or(config.server.port);
    let listen: SocketAddr = format!("{address}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {address}:{port}"))?;

    let shutdown = CancellationToken::new();
    let app = App::build(&config, shutdown.clone()).context("failed to start bot")?;
    info!(repos = config.repos.len(), "bot ready");

    tokio::spawn(shutdown_on_ctrl_c(shutdown));
    app.serve(listen).await?;
    Ok(())
}
