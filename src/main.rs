//! Inventory Viz - collapsible tree view over a cloud resource inventory export.

mod config;
mod error;
mod hierarchy;
mod inventory;
mod layout;
mod record;
mod scene;
mod view;
mod view_loop;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use config::AppConfig;
use inventory::{InventorySource, SnapshotError};
use scene::Scene;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use view::ViewController;
use view_loop::ViewHandle;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    source: Arc<dyn InventorySource>,
    view: ViewHandle,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "inventory_viz=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let source = inventory::from_config(&config.source);
    info!("Inventory source: {} ({:?})", source.name(), config.source);

    // Refuse to start on a snapshot that doesn't form a tree.
    let (snapshot, tree) = inventory::load(source.as_ref()).await?;

    let controller = ViewController::new(tree, config.layout.clone());
    let view = view_loop::spawn(controller, snapshot.fingerprint);

    let state = AppState { source, view };

    // Build router
    let app = Router::new()
        .route("/healthz", get(health))
        .route("/data", get(get_data))
        .route("/scene", get(get_scene))
        .route("/nodes/:id/activate", post(activate_node))
        .route("/reload", post(reload))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on http://{}", addr);
    let signals = ShutdownSignals::install()?;
    axum::serve(listener, app)
        .with_graceful_shutdown(signals.wait())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Ctrl-C, plus SIGTERM and SIGQUIT on unix. Handlers are registered by
/// `install`, so a signal that arrives before `wait` is polled still counts.
struct ShutdownSignals {
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    quit: tokio::signal::unix::Signal,
}

impl ShutdownSignals {
    fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            Ok(Self {
                terminate: signal(SignalKind::terminate())?,
                quit: signal(SignalKind::quit())?,
            })
        }
        #[cfg(not(unix))]
        {
            Ok(Self {})
        }
    }

    #[cfg_attr(not(unix), allow(unused_mut))]
    async fn wait(mut self) {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl-C"),
            _ = self.terminate.recv() => info!("Received SIGTERM"),
            _ = self.quit.recv() => info!("Received SIGQUIT"),
        }
        #[cfg(not(unix))]
        ctrl_c.await;

        info!("Shutdown signal received");
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check: is the inventory source reachable?
async fn health(State(state): State<AppState>) -> Result<&'static str, (StatusCode, String)> {
    state.source.ping().await.map_err(|e| {
        error!("Health check failed: {:#}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
    })?;
    Ok("ok")
}

/// Current records in the 7-field export format.
async fn get_data(State(state): State<AppState>) -> Result<impl IntoResponse, (StatusCode, String)> {
    let rows = state.view.export().await.map_err(internal)?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], rows))
}

/// Latest rendered scene.
async fn get_scene(State(state): State<AppState>) -> Result<Json<Scene>, (StatusCode, String)> {
    state.view.render().await.map(Json).map_err(internal)
}

/// Click on a node: toggle it and return the re-rendered scene.
async fn activate_node(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Scene>, (StatusCode, String)> {
    match state.view.activate(id).await.map_err(internal)? {
        Some(scene) => Ok(Json(scene)),
        None => Err((StatusCode::NOT_FOUND, format!("Unknown node: {}", id))),
    }
}

#[derive(serde::Serialize)]
struct ReloadResponse {
    changed: bool,
    fingerprint: String,
    scene: Scene,
}

/// Re-fetch the export and swap in a new tree if the snapshot changed.
async fn reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, (StatusCode, String)> {
    let snapshot = state.source.fetch_rows().await.map_err(|e| {
        error!("Inventory fetch failed: {:#}", e);
        (StatusCode::BAD_GATEWAY, format!("Inventory fetch failed: {:#}", e))
    })?;

    if snapshot.fingerprint == state.view.fingerprint().await.map_err(internal)? {
        info!("Snapshot {} unchanged, keeping view state", snapshot.fingerprint);
        let scene = state.view.render().await.map_err(internal)?;
        return Ok(Json(ReloadResponse {
            changed: false,
            fingerprint: snapshot.fingerprint,
            scene,
        }));
    }

    let tree = snapshot.build().map_err(|e: SnapshotError| {
        warn!("Rejected snapshot {}: {}", snapshot.fingerprint, e);
        (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    })?;

    let scene = state
        .view
        .replace(tree, snapshot.fingerprint.clone())
        .await
        .map_err(internal)?;

    Ok(Json(ReloadResponse {
        changed: true,
        fingerprint: snapshot.fingerprint,
        scene,
    }))
}

// ============================================================================
// Helper functions
// ============================================================================

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    error!("View loop error: {:#}", e);
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}
