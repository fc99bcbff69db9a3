use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fluxgen_comfyui::api::ComfyUIApi;
use fluxgen_core::workflow::load_template;
use fluxgen_pipeline::service::GenerationService;
use fluxgen_pipeline::store::{InMemoryTaskStore, TaskStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fluxgen_api::background;
use fluxgen_api::config::ServerConfig;
use fluxgen_api::router::build_app_router;
use fluxgen_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "fluxgen_api=debug,fluxgen_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        comfyui_url = %config.comfyui_url,
        max_queue_size = config.max_queue_size,
        "Loaded server configuration"
    );
    if config.request_timeout() > Duration::from_secs(config.request_timeout_secs) {
        tracing::warn!(
            configured_secs = config.request_timeout_secs,
            effective_secs = config.request_timeout().as_secs(),
            "REQUEST_TIMEOUT_SECS is shorter than a full result resolution, raising it"
        );
    }

    // --- Workflow template ---
    let template = load_template(&config.workflow_file).unwrap_or_else(|e| {
        panic!(
            "Failed to load workflow template {}: {e}",
            config.workflow_file.display()
        )
    });
    tracing::info!(
        path = %config.workflow_file.display(),
        nodes = template.len(),
        "Workflow template loaded"
    );

    // --- Output directory ---
    tokio::fs::create_dir_all(&config.output_dir)
        .await
        .expect("Failed to create output directory");

    // --- ComfyUI ---
    let engine = Arc::new(ComfyUIApi::new(config.comfyui_url.clone()));
    match engine.ping().await {
        Ok(()) => tracing::info!(url = %config.comfyui_url, "ComfyUI reachable"),
        Err(e) => tracing::warn!(
            url = %config.comfyui_url,
            error = %e,
            "ComfyUI not reachable, starting anyway"
        ),
    }

    // --- Generation service ---
    let store: Arc<dyn TaskStore> = Arc::new(InMemoryTaskStore::new());
    let service = GenerationService::new(
        engine,
        template,
        Arc::clone(&store),
        config.generation_config(),
    )
    .expect("Workflow template does not match the expected layout");

    // --- Background jobs ---
    let eviction_cancel = CancellationToken::new();
    let eviction_handle = tokio::spawn(background::task_eviction::run(
        Arc::clone(&store),
        Duration::from_secs(config.task_eviction_interval_secs.max(1)),
        eviction_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        service: Arc::new(service),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    eviction_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), eviction_handle).await;
    tracing::info!("Task eviction job stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
