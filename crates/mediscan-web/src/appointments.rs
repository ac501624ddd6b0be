//! 预约接口

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
use mediscan_workflow::{AppointmentFilter, AppointmentPatch, NewAppointment};
use serde_json::json;

pub async fn create_appointment(
    State(state): State<AppState>,
    payload: Result<Json<NewAppointment>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let appointment = state.appointments.create(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(appointment)))
}

pub async fn list_appointments(
    State(state): State<AppState>,
    params: Result<Query<AppointmentFilter>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(filter) = params?;
    let appointments = state.appointments.list(filter, Utc::now()).await?;
    Ok(ApiResponse::list(appointments))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let appointment = state.appointments.get(&id).await?;
    Ok(ApiResponse::ok(appointment))
}

pub async fn update_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AppointmentPatch>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(patch) = payload?;
    let appointment = state.appointments.update(&id, patch, Utc::now()).await?;
    Ok(ApiResponse::ok(appointment))
}

pub async fn delete_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.appointments.delete(&id).await?;
    Ok(ApiResponse::ok(json!({})).with_message("Appointment deleted"))
}
