//! 诊断记录接口

use crate::response::{ApiError, ApiResponse, ApiResult};
use crate::state::AppState;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Multipart, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use chrono::Utc;
use mediscan_core::MediscanError;
use mediscan_reporting::ReportFormat;
use mediscan_workflow::{AnalysisPatch, NewAnalysis, RenderedReport};
use serde::Deserialize;
use tracing::debug;

/// 上传表单中的图像字段名
const IMAGE_FIELD: &str = "image";

struct UploadedFile {
    file_name: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

async fn read_image_field(multipart: &mut Multipart) -> ApiResult<UploadedFile> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?.to_vec();
        return Ok(UploadedFile {
            file_name,
            content_type,
            data,
        });
    }
    Err(MediscanError::validation("Please upload an image").into())
}

pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let expose = state.expose_error_details;
    let file = read_image_field(&mut multipart)
        .await
        .map_err(|e| e.with_details(expose))?;
    debug!(
        "Received upload {} ({} bytes, {:?})",
        file.file_name,
        file.data.len(),
        file.content_type
    );

    let outcome = state
        .analyses
        .upload(&file.file_name, file.content_type.as_deref(), &file.data)
        .await
        .map_err(|e| ApiError::from(e).with_details(expose))?;
    Ok(ApiResponse::ok(outcome))
}

pub async fn save_analysis(
    State(state): State<AppState>,
    payload: Result<Json<NewAnalysis>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let saved = state.analyses.save(request, Utc::now()).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(saved)))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisListParams {
    pub patient_id: Option<String>,
}

pub async fn list_analyses(
    State(state): State<AppState>,
    params: Result<Query<AnalysisListParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = params?;
    let analyses = state.analyses.list(params.patient_id.as_deref()).await?;
    Ok(ApiResponse::list(analyses))
}

pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let analysis = state.analyses.get(&id).await?;
    Ok(ApiResponse::ok(analysis))
}

pub async fn review_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<AnalysisPatch>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(patch) = payload?;
    let analysis = state.analyses.review(&id, patch, Utc::now()).await?;
    Ok(ApiResponse::ok(analysis))
}

pub async fn generate_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let analysis = state.analyses.generate_report(&id, Utc::now()).await?;
    Ok(ApiResponse::ok(analysis).with_message("Report generated successfully"))
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    pub format: Option<String>,
}

pub async fn view_report(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<ReportParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let format = match params.format.as_deref().map(str::trim).filter(|f| !f.is_empty()) {
        Some(raw) => raw.parse::<ReportFormat>()?,
        None => ReportFormat::default(),
    };

    let response = match state.analyses.render_report(&id, format).await? {
        RenderedReport::Html(html) => Html(html).into_response(),
        RenderedReport::Pdf(bytes) => {
            let name: String = id
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
                .collect();
            (
                [
                    (header::CONTENT_TYPE, "application/pdf".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("inline; filename=\"{}.pdf\"", name),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
    };
    Ok(response)
}
