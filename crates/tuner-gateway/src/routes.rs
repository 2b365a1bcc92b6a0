use crate::error::ApiError;
use crate::state::GatewayState;
use apply_engine::ApplyJob;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use camera_backends::{AdapterKind, CameraHandle, DiscoveredCamera, ScanParams};
use common::{CameraCapabilities, CameraSettings, OptimizationResult};
use optimizer::OptimizationRequest;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/api/optimize", post(optimize))
        .route("/api/discover", post(discover))
        .route("/api/cameras/capabilities", post(capabilities))
        .route("/api/cameras/settings", post(current_settings))
        .route("/api/cameras/apply", post(start_apply))
        .route("/api/jobs", get(list_jobs))
        .route("/api/jobs/:job_id", get(job_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn metrics() -> Result<String, ApiError> {
    telemetry::metrics::gather().map_err(ApiError::from)
}

async fn optimize(
    State(state): State<GatewayState>,
    Json(request): Json<OptimizationRequest>,
) -> Result<Json<OptimizationResult>, ApiError> {
    let result = state.orchestrator.optimize(&request).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct DiscoverRequest {
    adapter: AdapterKind,
    #[serde(default)]
    scan: Option<ScanParams>,
}

async fn discover(
    State(state): State<GatewayState>,
    Json(request): Json<DiscoverRequest>,
) -> Result<Json<Vec<DiscoveredCamera>>, ApiError> {
    let backend = state.engine.backend(request.adapter)?;
    let params = request.scan.unwrap_or_default();
    let cameras = backend.discover(&params).await?;
    Ok(Json(cameras))
}

#[derive(Debug, Deserialize)]
struct CameraQuery {
    adapter: AdapterKind,
    handle: CameraHandle,
}

async fn capabilities(
    State(state): State<GatewayState>,
    Json(request): Json<CameraQuery>,
) -> Result<Json<CameraCapabilities>, ApiError> {
    let backend = state.engine.backend(request.adapter)?;
    let caps = backend.capabilities(&request.handle).await?;
    Ok(Json(caps))
}

async fn current_settings(
    State(state): State<GatewayState>,
    Json(request): Json<CameraQuery>,
) -> Result<Json<CameraSettings>, ApiError> {
    let backend = state.engine.backend(request.adapter)?;
    let settings = backend.current_settings(&request.handle).await?;
    Ok(Json(settings))
}

#[derive(Debug, Deserialize)]
struct StartApplyRequest {
    camera_id: String,
    handle: CameraHandle,
    settings: CameraSettings,
    adapter: AdapterKind,
    #[serde(default = "default_verify")]
    verify: bool,
}

fn default_verify() -> bool {
    true
}

#[derive(Debug, Serialize)]
struct StartApplyResponse {
    job_id: String,
}

async fn start_apply(
    State(state): State<GatewayState>,
    Json(request): Json<StartApplyRequest>,
) -> Result<Json<StartApplyResponse>, ApiError> {
    let job_id = state
        .engine
        .start_job(
            &request.camera_id,
            request.handle,
            request.settings,
            request.adapter,
            request.verify,
        )
        .await?;
    Ok(Json(StartApplyResponse { job_id }))
}

async fn job_status(
    State(state): State<GatewayState>,
    Path(job_id): Path<String>,
) -> Result<Json<ApplyJob>, ApiError> {
    let job = state.engine.job_status(&job_id).await?;
    Ok(Json(job))
}

async fn list_jobs(State(state): State<GatewayState>) -> Json<Vec<ApplyJob>> {
    Json(state.engine.list_jobs().await)
}
