use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use volgres_engine::EventStore;
use volgres_models::VolumeObservation;

/// Observability snapshot built at the end of each reconcile pass.
///
/// A read-only projection of event history plus the latest status; the
/// durable event table remains the single source of truth.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterSnapshot {
    pub cluster: String,
    pub pass_id: String,
    pub completed_at: DateTime<Utc>,
    pub volumes: Vec<VolumeObservation>,
}

pub type SharedSnapshot = Arc<RwLock<Option<ClusterSnapshot>>>;

/// Shared API state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub cluster: String,
    pub snapshot: SharedSnapshot,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/clusters/:name/volumes", get(list_volumes))
        .route("/api/clusters/:name/events", get(list_events))
        .layer(cors)
        .with_state(state)
}

/// Start the API server
pub async fn start_server(port: u16, state: AppState) -> Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("✓ API server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

// ============================================================================
// Health Check
// ============================================================================

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "volgres",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ============================================================================
// Volumes
// ============================================================================

async fn list_volumes(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ClusterSnapshot>, AppError> {
    if name != state.cluster {
        return Err(AppError::NotFound(format!("Cluster '{}' not found", name)));
    }
    match state.snapshot.read().await.clone() {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(AppError::NotReady(
            "No reconcile pass has completed yet".to_string(),
        )),
    }
}

// ============================================================================
// Events
// ============================================================================

#[derive(Debug, Deserialize)]
struct EventsQuery {
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

async fn list_events(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    if name != state.cluster {
        return Err(AppError::NotFound(format!("Cluster '{}' not found", name)));
    }
    let store = EventStore::new(state.pool.clone());
    let events = store
        .load_latest(&state.cluster, query.limit.clamp(1, 500))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "cluster": state.cluster,
        "events": events,
    })))
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
enum AppError {
    NotFound(String),
    NotReady(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::NotReady(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        // Lazy pool: handlers that reject before touching the database
        // never open a connection
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/volgres")
            .unwrap();
        AppState {
            pool,
            cluster: "prod".to_string(),
            snapshot: Arc::new(RwLock::new(None)),
        }
    }

    #[tokio::test]
    async fn test_unknown_cluster_is_not_found() {
        match list_volumes(State(state()), Path("staging".to_string())).await {
            Err(AppError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_known_cluster_before_first_pass_is_not_ready() {
        match list_volumes(State(state()), Path("prod".to_string())).await {
            Err(AppError::NotReady(_)) => {}
            other => panic!("expected NotReady, got {:?}", other),
        }
    }
}
