use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;
use drive_relay::api::middleware::request_id::{REQUEST_ID_HEADER, request_id_middleware};
use drive_relay::config::RelayConfig;
use drive_relay::infrastructure::storage;
use drive_relay::services::cloud_providers::google_drive::GoogleDriveProvider;
use drive_relay::services::resumable::TusClient;
use drive_relay::services::worker::BackgroundWorker;
use drive_relay::{AppState, create_app};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port for the API server
    #[arg(short, long, default_value_t = 3020)]
    port: u16,

    /// Local storage directory (overrides RELAY_DATA_DIR)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initial Environment & Logging Setup
    dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drive_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Drive Relay...");

    // 2. Configuration & Infrastructure
    let mut config = RelayConfig::from_env();
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    info!(
        "⚙️  Relay Config: Chunk Size={}KB, Retention={}h, Delete After Upload={}, Demo={}",
        config.tus_chunk_size / 1024,
        config.local_retention_hours,
        config.delete_after_upload,
        config.demo_token.is_some()
    );

    let storage = storage::setup_storage(&config).await?;
    let http = reqwest::Client::builder()
        .user_agent(concat!("drive-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let api_base = config
        .drive_api_url
        .parse::<url::Url>()
        .with_context(|| format!("invalid GOOGLE_DRIVE_API_URL {}", config.drive_api_url))?;

    let provider = Arc::new(GoogleDriveProvider::new(http.clone(), api_base));
    let uploader = Arc::new(TusClient::new(http.clone(), config.tus_chunk_size));
    let state = AppState::new(
        config.clone(),
        storage.clone(),
        provider,
        uploader.clone(),
        http,
    );

    // 3. Background Cleanup Worker
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker = BackgroundWorker::new(
        storage,
        state.progress.clone(),
        uploader,
        config.local_retention(),
        config.cleanup_interval(),
        shutdown_rx,
    );
    let worker_handle = tokio::spawn(worker.run());
    info!("👷 Worker service initialized.");

    // 4. API Server
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &axum::http::Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "http_request",
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id,
            )
        })
        .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
            info!("📥 {} {}", request.method(), request.uri());
        })
        .on_response(
            |response: &axum::http::Response<_>,
             latency: std::time::Duration,
             _span: &tracing::Span| {
                info!(
                    "📤 Finished in {:?} with status {}",
                    latency,
                    response.status()
                );
            },
        );

    // The request id is assigned outside the trace layer so spans can carry it.
    let app = create_app(state)
        .layer(trace_layer)
        .layer(axum::middleware::from_fn(request_id_middleware));
    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("✅ API Server listening on: http://0.0.0.0:{}", args.port);
    info!("📖 Swagger UI documentation: http://localhost:{}/swagger-ui", args.port);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Server runtime error: {}", e);
    }

    // 5. Stop the worker
    info!("🛑 Shutting down relay services...");
    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;

    info!("👋 Relay exited cleanly.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, initiating graceful shutdown...");
        },
    }
}
