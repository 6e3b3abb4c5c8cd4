use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rest_jwt_api::config::AppConfig;
use rest_jwt_api::database::{DatabaseManager, InMemoryUserRepository, PgUserRepository, UserRepository};
use rest_jwt_api::{app, AppState};

#[derive(Parser)]
#[command(name = "rest-jwt-api")]
#[command(about = "Users REST API with JWT authentication")]
#[command(version)]
struct Cli {
    #[arg(long, help = "Address to bind (overrides HOST)")]
    host: Option<String>,

    #[arg(long, help = "Port to listen on (overrides PORT)")]
    port: Option<u16>,

    #[arg(long, help = "Keep users in memory instead of Postgres")]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env();
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.validate().context("invalid configuration")?;
    tracing::info!("Starting in {:?} mode", config.environment);

    let database = if cli.in_memory {
        tracing::warn!("Using in-memory user storage; data is lost on exit");
        None
    } else {
        let database = DatabaseManager::connect(&config.database)
            .await
            .context("database initialisation failed")?;
        database.migrate().await.context("migrations failed")?;
        Some(database)
    };

    let repo: Arc<dyn UserRepository> = match &database {
        Some(database) => Arc::new(PgUserRepository::new(database.pool())),
        None => Arc::new(InMemoryUserRepository::new()),
    };

    let state = AppState::new(&config, repo);
    tracing::info!(
        "Issuing tokens as {:?}, valid for {}s",
        state.tokens.issuer(),
        state.tokens.expires_in()
    );
    let router = app(state, config.security.enable_cors);

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Listening on http://{}", bind_addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(database) = database {
        database.close().await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
