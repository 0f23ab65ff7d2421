use anyhow::Result;
use clap::Parser;
use fiction_folder::api::{build_router, AppState};
use fiction_folder::config::{Cli, Config};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::load(&cli)?;
    let level = if cfg.logging_enabled {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let addr: SocketAddr = cfg.bind.parse()?;
    let state = AppState::new(cfg).await?;
    tracing::info!(%addr, "fiction-folder listening");
    axum::Server::bind(&addr)
        .serve(build_router(state).into_make_service())
        .await?;
    Ok(())
}
