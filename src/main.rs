use std::sync::Arc;

use capbridge::api;
use capbridge::auth::build_allowed_key_set;
use capbridge::config::{load_config, AppConfig};
use capbridge::observability::init_tracing;
use capbridge::state::AppState;
use capbridge::upstream::QueueClient;

fn main() {
    let config = load_config("config.yaml").unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {e}");
        eprintln!("Please copy 'config.example.yaml' to 'config.yaml' and modify as needed.");
        std::process::exit(1);
    });

    init_tracing(&config.features.log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize Tokio runtime: {e}");
            std::process::exit(1);
        });

    runtime.block_on(async move {
        run(config).await;
    });
}

async fn run(config: AppConfig) {
    let host = config.server.host.clone();
    let port = config.server.port;

    let client = QueueClient::new(&config.upstream, &config.server).unwrap_or_else(|e| {
        eprintln!("Failed to build upstream client: {e}");
        std::process::exit(1);
    });
    let allowed_client_keys = build_allowed_key_set(&config);
    let origin = config.upstream.origin.clone();
    let state = Arc::new(AppState::new(config, client, allowed_client_keys));
    let app = api::router(state);

    tracing::info!("capbridge starting on {host}:{port} (upstream: {origin})");

    let listener = tokio::net::TcpListener::bind(format!("{host}:{port}"))
        .await
        .unwrap_or_else(|err| {
            eprintln!("Failed to bind to {host}:{port}: {err}");
            std::process::exit(1);
        });

    tracing::info!("capbridge is ready to accept connections");
    if let Err(err) = axum::serve(listener, app).await {
        eprintln!("Server error: {err}");
    }
}
