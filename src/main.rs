//! Shelfmark Backend - library lending service
//!
//! This is the main entry point for the Shelfmark backend API.
//! All operations are exposed via GraphQL at /graphql.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shelfmark::app::{AppState, build_app};
use shelfmark::config::{Config, StoreBackend};
use shelfmark::db::{DocumentStore, MemoryStore, SqliteStore};
use shelfmark::graphql::{RequestTimeout, SchemaServices, build_schema};
use shelfmark::lending::{LoanLedger, SystemClock};
use shelfmark::services::{AuthService, CatalogService, UserService};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shelfmark=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting Shelfmark Backend");
    if config.jwt_secret_generated {
        tracing::warn!("JWT_SECRET not set; using a random secret, tokens will not survive a restart");
    }

    let store = open_store(&config).await?;
    tracing::info!(backend = store.backend(), "Document store connected");

    let lending = config.lending_config();
    let auth = AuthService::new(store.clone(), config.auth_config());
    let schema = build_schema(SchemaServices {
        ledger: LoanLedger::from_config(store.clone(), Arc::new(SystemClock), &lending),
        catalog: CatalogService::new(store.clone(), lending.retry.clone()),
        users: UserService::new(store.clone(), auth.clone(), lending.retry.clone()),
        auth: auth.clone(),
        request_timeout: RequestTimeout(lending.request_timeout),
    });
    tracing::info!("GraphQL schema built");

    let app = build_app(AppState {
        schema,
        auth,
        store,
    });

    let ip = config
        .host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("Invalid HOST '{}'", config.host))?;
    let addr = SocketAddr::new(ip, config.port);
    tracing::info!("Listening on {}", addr);
    tracing::info!("GraphQL playground: http://localhost:{}/graphql", config.port);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn DocumentStore>> {
    match &config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory document store; data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Sqlite(url) => {
            ensure_parent_dir(url)?;
            let store = SqliteStore::connect_with_retry(
                url,
                config.database_max_connections,
                Duration::from_secs(5),
            )
            .await;
            Ok(Arc::new(store))
        }
    }
}

/// Create the directory holding the SQLite file so `create_if_missing` works
fn ensure_parent_dir(url: &str) -> anyhow::Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:");
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
