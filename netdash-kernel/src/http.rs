/**
 * API REST NETDASH - Serveur HTTP du tableau de bord
 *
 * RÔLE :
 * Traduit les requêtes HTTP en opérations `Storage`, valide la forme des
 * entrées et annonce chaque mutation réussie sur le flux WebSocket.
 *
 * FONCTIONNEMENT :
 * - Routes : /health, /system/health, /api/devices, /api/network, /ws
 * - Sérialisation JSON camelCase, erreurs au format {"error": "..."}
 * - 400 forme invalide, 404 appareil inconnu, 500 stockage indisponible
 * - Log de chaque requête /api (méthode, chemin, statut, durée, extrait JSON)
 *
 * SÉCURITÉ :
 * - Si une clé API est configurée, header x-api-key obligatoire
 *   sur toutes les routes sauf /health
 */

use axum::body::{to_bytes, Body};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::health::{HealthTracker, KernelHealth};
use crate::models::{Device, DeviceId, DevicePatch, NetworkStats, NewDevice};
use crate::notify::{BroadcastNotifier, Notifier};
use crate::storage::{Storage, StorageError};

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub notifier: BroadcastNotifier,
    pub health_tracker: HealthTracker,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, notifier: BroadcastNotifier) -> Self {
        Self {
            storage,
            notifier,
            health_tracker: HealthTracker::new(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.is_empty()).map(Arc::from);
        self
    }
}

/// Erreurs exposées aux clients
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Unavailable(String),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(_) => ApiError::NotFound("Device not found".into()),
            StorageError::Invalid(reason) => {
                debug!(%reason, "value rejected by storage");
                ApiError::Validation("Invalid device data".into())
            }
            StorageError::Unavailable(reason) => ApiError::Unavailable(reason),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(msg) => {
                debug!(%msg, "rejected request");
                (StatusCode::BAD_REQUEST, msg)
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Unavailable(reason) => {
                error!(%reason, "storage unavailable");
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage unavailable".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn parse_device_id(raw: &str) -> Result<DeviceId, ApiError> {
    raw.trim()
        .parse::<DeviceId>()
        .map_err(|_| ApiError::Validation("Invalid device ID".into()))
}

async fn require_api_key(State(app): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    let Some(expected) = app.api_key.as_deref() else {
        return Ok(next.run(req).await);
    };

    // Health check toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        warn!(path = %req.uri().path(), "rejected request without valid api key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(req).await)
}

const LOG_LINE_MAX_CHARS: usize = 80;

/// `GET /api/devices 200 in 3ms :: [{"id":1,...` tronqué à 80 caractères
fn request_log_line(method: &Method, path: &str, status: StatusCode, elapsed_ms: u128, body: &[u8]) -> String {
    let mut line = format!("{method} {path} {} in {elapsed_ms}ms", status.as_u16());
    if !body.is_empty() {
        line.push_str(" :: ");
        line.push_str(&String::from_utf8_lossy(body));
    }
    if line.chars().count() > LOG_LINE_MAX_CHARS {
        line = line.chars().take(LOG_LINE_MAX_CHARS - 1).collect();
        line.push('…');
    }
    line
}

async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;
    if !path.starts_with("/api") {
        return response;
    }

    // le corps est relu pour l'extrait puis remis tel quel dans la réponse
    let (parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, %path, "failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    info!("{}", request_log_line(&method, &path, parts.status, start.elapsed().as_millis(), &bytes));
    Response::from_parts(parts, Body::from(bytes))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/api/devices", get(list_devices).post(create_device))
        .route("/api/devices/{id}", get(get_device).patch(update_device))
        .route("/api/devices/{id}/toggle-block", post(toggle_block))
        .route("/api/network/stats", get(latest_stats))
        .route("/api/network/history", get(stats_history))
        .route("/ws", get(crate::ws::ws_handler))
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .layer(middleware::from_fn(log_requests))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> ApiResult<KernelHealth> {
    let health = app.health_tracker.get_health(app.storage.as_ref(), &app.notifier)?;
    Ok(Json(health))
}

// GET /api/devices
async fn list_devices(State(app): State<AppState>) -> ApiResult<Vec<Device>> {
    Ok(Json(app.storage.list_devices()?))
}

// GET /api/devices/{id}
async fn get_device(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Device> {
    let id = parse_device_id(&id)?;
    app.storage
        .get_device(id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Device not found".into()))
}

// POST /api/devices
async fn create_device(
    State(app): State<AppState>,
    payload: Result<Json<NewDevice>, JsonRejection>,
) -> ApiResult<Device> {
    let Json(input) = payload.map_err(|e| {
        debug!(error = %e, "invalid device body");
        ApiError::Validation("Invalid device data".into())
    })?;

    let device = app.storage.create_device(input)?;
    app.notifier.publish_change();
    Ok(Json(device))
}

// PATCH /api/devices/{id}
async fn update_device(
    State(app): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<DevicePatch>, JsonRejection>,
) -> ApiResult<Device> {
    let id = parse_device_id(&id)?;
    let Json(patch) = payload.map_err(|e| {
        debug!(error = %e, "invalid device patch");
        ApiError::Validation("Invalid device data".into())
    })?;

    let device = app.storage.update_device(id, patch)?;
    app.notifier.publish_change();
    Ok(Json(device))
}

// POST /api/devices/{id}/toggle-block
async fn toggle_block(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Device> {
    let id = parse_device_id(&id)?;
    let device = app.storage.toggle_block(id)?;
    info!(id, blocked = device.is_blocked, "device block toggled");
    app.notifier.publish_change();
    Ok(Json(device))
}

// GET /api/network/stats
async fn latest_stats(State(app): State<AppState>) -> ApiResult<NetworkStats> {
    let (stats, inserted) = app.storage.latest_or_baseline()?;
    if inserted {
        // la base synthétisée est un vrai échantillon
        app.notifier.publish_change();
    }
    Ok(Json(stats))
}

// GET /api/network/history
async fn stats_history(State(app): State<AppState>) -> ApiResult<Vec<NetworkStats>> {
    Ok(Json(app.storage.list_stats()?))
}
