use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use realty_api::app::{router, AppState};
use realty_api::config::config;
use realty_api::database::{DatabaseManager, MemoryStore, PgStore, Store};
use realty_api::push::PushDispatcher;

#[derive(Parser)]
#[command(name = "realty-api")]
#[command(about = "Real-estate marketplace API server")]
#[command(version)]
struct Args {
    /// Serve from an in-process store instead of Postgres (data is lost on exit)
    #[arg(long)]
    memory: bool,

    /// Apply sql/schema.sql before serving
    #[arg(long)]
    init_schema: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug")))
        .init();

    let args = Args::parse();

    // Initialize configuration (this loads the config singleton)
    let config = config();
    tracing::info!("Starting Realty API in {:?} mode", config.environment);
    if config.security.jwt_secret.is_empty() {
        anyhow::bail!("JWT_SECRET must be set outside development");
    }

    let store: Arc<dyn Store> = if args.memory {
        tracing::warn!("Using the in-memory store; nothing will be persisted");
        Arc::new(MemoryStore::new())
    } else {
        let pool = DatabaseManager::connect().await?;
        if args.init_schema {
            DatabaseManager::apply_schema(&pool).await?;
        }
        Arc::new(PgStore::new(pool))
    };

    let push = PushDispatcher::from_config(store.clone());
    let app = router(AppState::new(store, push));

    let bind_addr = format!("0.0.0.0:{}", config.api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Realty API listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
