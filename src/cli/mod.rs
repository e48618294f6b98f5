use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;

use crate::app::{app, AppState};
use crate::config::AppConfig;
use crate::database::{DatabaseManager, MemoryStore, PgStore, Store};
use crate::models;

#[derive(Parser)]
#[command(name = "quill-api")]
#[command(about = "Quill API - blog backend with policy-enforced model API")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server")]
    Serve {
        #[arg(long, help = "Port to listen on (overrides QUILL_API_PORT)")]
        port: Option<u16>,

        #[arg(long, help = "Use the in-memory store instead of PostgreSQL")]
        memory: bool,
    },

    #[command(about = "Create tables for every registered entity")]
    Migrate,
}

pub async fn run(cli: Cli, config: &AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve { port, memory } => serve(config, port, memory).await,
        Commands::Migrate => migrate(config).await,
    }
}

async fn serve(config: &AppConfig, port: Option<u16>, memory: bool) -> anyhow::Result<()> {
    let registry = models::registry();

    let store: Arc<dyn Store> = if memory {
        info!("Using in-memory store");
        Arc::new(MemoryStore::new(&registry))
    } else {
        let pool = DatabaseManager::connect(&config.database).await?;
        Arc::new(PgStore::new(pool).with_query_logging(config.database.enable_query_logging))
    };

    if config.security.jwt_secret.is_empty() {
        tracing::warn!("JWT_SECRET is not set; every request will be anonymous and login is disabled");
    }

    let router = app(AppState::new(store, registry, config.clone()));

    let bind_addr = format!("0.0.0.0:{}", port.unwrap_or(config.api.port));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    info!("Quill API listening on http://{}", bind_addr);
    axum::serve(listener, router).await.context("server")?;
    Ok(())
}

async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let pool = DatabaseManager::connect(&config.database).await?;
    DatabaseManager::migrate(&pool, &models::registry()).await?;
    pool.close().await;
    Ok(())
}
