//! dominion-api server binary.

use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dominion_api::{router, AppState};
use dominion_core::defaults::{CELL_RESOLUTION, SERVER_HOST, SERVER_PORT};
use dominion_core::geo::default_indexer;
use dominion_db::{Database, PoolConfig};
use dominion_engine::{ImportOptions, ImportOrchestrator, InfluenceAggregator};
use dominion_strava::{StravaClient, StravaConfig, StravaTokenProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing with configurable output
    //
    // Environment variables:
    //   LOG_FORMAT  - "json" or "text" (default: "text")
    //   LOG_FILE    - path to log file (optional, enables file logging)
    //   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
    //   RUST_LOG    - standard env filter
    //                 (default: "dominion_api=debug,dominion_engine=debug,tower_http=debug")
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dominion_api=debug,dominion_engine=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(env_filter);

    // Optionally create a file appender with daily rotation
    let _file_guard = if let Some(ref path) = log_file {
        let file_dir = std::path::Path::new(path)
            .parent()
            .unwrap_or(std::path::Path::new("."));
        let file_name = std::path::Path::new(path)
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("dominion-api.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(log_ansi.unwrap_or(false)); // no ANSI in files by default
            registry.with(layer).init();
        }
        Some(guard)
    } else {
        // Console-only output
        if log_format == "json" {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            let mut layer = tracing_subscriber::fmt::layer();
            if let Some(ansi) = log_ansi {
                layer = layer.with_ansi(ansi);
            }
            registry.with(layer).init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );

    // Get configuration from environment
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "postgres://localhost/dominion".to_string());
    let host = std::env::var("HOST").unwrap_or_else(|_| SERVER_HOST.to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(SERVER_PORT);
    let verify_token = std::env::var("STRAVA_VERIFY_TOKEN").unwrap_or_default();
    if verify_token.is_empty() {
        tracing::warn!("STRAVA_VERIFY_TOKEN not set, webhook subscriptions will be rejected");
    }

    // Connect to database
    info!("Connecting to database...");
    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    info!("Database connected");
    dominion_db::log_pool_metrics(db.pool());

    // Run pending database migrations on startup
    info!("Running database migrations...");
    db.migrate().await?;
    info!("Database migrations complete");

    let indexer = default_indexer()?;
    let aggregator = InfluenceAggregator::new(
        Arc::new(db.activities.clone()),
        Arc::new(db.influence.clone()),
        Arc::new(db.commits.clone()),
        Arc::new(indexer),
    );

    let strava = StravaConfig::from_env();
    info!(
        api_base = %strava.api_base,
        timeout_secs = strava.timeout_seconds,
        "Strava client configured"
    );
    let feed = StravaClient::new(strava.clone())?;
    let tokens = StravaTokenProvider::new(strava, db.credentials.clone())?;
    let orchestrator = ImportOrchestrator::new(aggregator, Arc::new(feed), Arc::new(tokens));

    let import = ImportOptions::from_env();
    info!(
        page_size = import.page_size,
        max_pages = ?import.max_pages,
        resolution = CELL_RESOLUTION,
        "Import configured"
    );

    let app = router(AppState::new(orchestrator, import, verify_token))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
