mod models;
mod handlers;
mod routes;
mod docs;
mod config;
mod clients;
mod sync;
mod persist;
mod run;
mod ws;

use std::panic;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::HeaderValue;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use clients::project_store_client::{DiscardSink, get_project_store_client, init_project_store_client};
use config::Config;
use docs::ApiDoc;
use persist::debounce::{PersistDebouncer, ProjectSink};
use routes::create_api_routes;
use run::ExecutionDispatcher;
use sync::broadcast::Broadcaster;
use sync::registry::SessionRegistry;
use sync::room::RoomManager;
use ws::handler::websocket_handler;

/// Shared server state: created at server start, torn down at shutdown
pub struct AppState {
    pub broadcaster: Broadcaster,
    pub dispatcher: ExecutionDispatcher,
}

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "nviam_collab=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // Wire up the project store client if one is configured
    let sink: Arc<dyn ProjectSink> = if let Some(url) = &config.project_store_url {
        match init_project_store_client(url.clone()) {
            Ok(()) => info!("Project store client initialized ({})", url),
            Err(e) => error!("Failed to initialize project store client: {}", e),
        }
        match get_project_store_client() {
            Some(client) => client,
            None => Arc::new(DiscardSink),
        }
    } else {
        warn!("No project store URL configured - file tree snapshots will not be persisted");
        Arc::new(DiscardSink)
    };

    // Collaboration engine state
    let registry = SessionRegistry::new();
    let rooms = RoomManager::new();
    let debouncer =
        PersistDebouncer::new(Duration::from_millis(config.persist_debounce_ms), sink);
    let broadcaster = Broadcaster::new(registry, rooms, debouncer);
    let dispatcher = ExecutionDispatcher::new(&config, broadcaster.clone());
    if config.exec_service_url.is_none() {
        warn!("No execution service URL configured - non-JS/Python runs will fail");
    }

    let app_state = Arc::new(AppState {
        broadcaster: broadcaster.clone(),
        dispatcher,
    });

    // CORS policy
    let cors = match &config.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> =
                origins.split(',').filter_map(|o| o.trim().parse().ok()).collect();
            CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
        }
        None => CorsLayer::permissive(),
    };

    // Create API routes
    let api_routes = create_api_routes(app_state.clone());

    // WebSocket attach point, one topic per project
    let ws_routes = Router::new()
        .route("/ws/:project_id", get(websocket_handler))
        .with_state(app_state.clone());

    // Combine all routes
    let app_routes = Router::new()
        // Mount API routes
        .nest("/api", api_routes)
        // Mount WebSocket routes
        .merge(ws_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start the HTTP server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws/:project_id", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server failed to start");

    // Best-effort flush of anything still waiting on a debounce timer.
    // Failures here are unobserved by design.
    broadcaster.debouncer().flush_all().await;
    info!("Shutdown complete");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
