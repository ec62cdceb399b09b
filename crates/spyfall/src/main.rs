use std::path::PathBuf;

use clap::Parser;
use spyfall::prelude::*;

/// Spyfall Server - room and game server for the Spyfall party game
#[derive(Parser, Debug)]
#[command(name = "spyfall-server", version, about)]
struct Args {
    /// TOML config file; every key is optional
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the server to, overriding the config file
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "spyfall=info,spyfall_room=info,spyfall_session=info,spyfall_transport=info".into()
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    tracing::info!(bind = %config.bind, config = ?args.config, "starting spyfall server");
    let server = SpyfallServer::builder().config(config).build().await?;

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }
    Ok(())
}
