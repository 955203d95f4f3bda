use std::path::PathBuf;

use clap::Parser;
use eyre::{eyre, Result};
use tracing::debug;
use triadstream::Listener;
use triadtrust::logging::init_tracing;
use triadtrust::TriadConfig;

/// Run the Triad handshake for every configured client.
#[derive(Debug, Parser)]
#[command(name = "triad", version)]
struct Cli {
    /// Configuration file location
    #[arg(long, default_value = "./triad.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config =
        TriadConfig::load(&cli.config).map_err(|err| eyre!("failed to load config: {err}"))?;
    init_tracing(&config.logging).map_err(|err| eyre!("failed to set up tracing: {err}"))?;
    debug!(?config, "config loaded");

    let (trusted, trusted_task) =
        Listener::spawn(config.trusted_factory()?, config.trusted_listener());
    let (server, server_task) = Listener::spawn(
        config.server_factory(trusted.clone()),
        config.server_listener(),
    );

    for mut client in config.clients() {
        let outcome = client.handshake(&server).await;
        println!("{}: {outcome}", client.id());
    }

    server.finish()?;
    server_task.await?;
    trusted.finish()?;
    trusted_task.await?;

    Ok(())
}
