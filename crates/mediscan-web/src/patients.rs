//! 患者接口

use crate::response::{ApiResponse, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::Utc;
use mediscan_workflow::{PatientFilter, PatientPatch};
use serde_json::json;

pub async fn create_patient(
    State(state): State<AppState>,
    payload: Result<Json<PatientPatch>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(patch) = payload?;
    let patient = state.patients.register(patch, Utc::now()).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(patient)))
}

pub async fn list_patients(
    State(state): State<AppState>,
    params: Result<Query<PatientFilter>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(filter) = params?;
    let query = filter.into_query()?;
    let page = state.patients.list(&query).await?;
    Ok(ApiResponse::paged(page))
}

pub async fn get_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let patient = state.patients.get(&id).await?;
    Ok(ApiResponse::ok(patient))
}

pub async fn update_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<PatientPatch>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(patch) = payload?;
    let patient = state.patients.update(&id, patch, Utc::now()).await?;
    Ok(ApiResponse::ok(patient))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let removed = state.patients.delete(&id).await?;
    Ok(ApiResponse::ok(json!({ "deletedAnalyses": removed }))
        .with_message("Patient and associated analyses deleted"))
}
