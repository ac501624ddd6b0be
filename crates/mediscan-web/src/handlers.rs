//! HTTP处理器：服务信息、仪表盘与系统设置

use crate::response::{ApiResponse, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    response::{IntoResponse, Json},
};
use chrono::Utc;
use mediscan_core::SettingsUpdate;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "MediScan API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "patients": "/api/patients",
            "analysis": "/api/analysis",
            "appointments": "/api/appointments",
            "dashboard": "/api/dashboard",
            "settings": "/api/settings"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ========== 仪表盘 ==========

pub async fn dashboard_stats(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let stats = state.dashboard.stats(Utc::now()).await?;
    Ok(ApiResponse::ok(stats))
}

pub async fn dashboard_charts(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let charts = state.dashboard.charts(Utc::now()).await?;
    Ok(ApiResponse::ok(charts))
}

pub async fn dashboard_recent(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let recent = state.dashboard.recent(Utc::now()).await?;
    Ok(ApiResponse::ok(recent))
}

// ========== 系统设置 ==========

#[derive(Debug, Deserialize)]
pub struct PasswordRequest {
    #[serde(default)]
    pub password: String,
}

pub async fn get_settings(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let settings = state.settings.get().await?;
    Ok(ApiResponse::ok(settings))
}

pub async fn update_settings(
    State(state): State<AppState>,
    payload: Result<Json<SettingsUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(update) = payload?;
    let settings = state.settings.update(update).await?;
    Ok(ApiResponse::ok(settings).with_message("Settings updated successfully"))
}

pub async fn verify_admin(
    State(state): State<AppState>,
    payload: Result<Json<PasswordRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let verified = state.settings.verify_admin(&request.password).await?;
    Ok(ApiResponse::ok(json!({ "verified": verified })))
}

/// 触发模型训练，原样转发上游响应
pub async fn trigger_training(
    State(state): State<AppState>,
    payload: Result<Json<PasswordRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let result = state.settings.train(&request.password, Utc::now()).await?;
    info!("Model training triggered");
    Ok(Json(result))
}
