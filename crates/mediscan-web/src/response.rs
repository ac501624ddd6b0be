//! 统一响应格式与错误映射

use axum::{
    extract::multipart::MultipartError,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use mediscan_core::MediscanError;
use mediscan_database::Page;
use serde::Serialize;
use tracing::{error, warn};

/// 响应信封 `{success, data?, message?, count?, totalPages?, currentPage?, details?}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            count: None,
            total_pages: None,
            current_page: None,
            details: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.count = Some(count as u64);
        self
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    /// 分页列表，`count` 为本页条数
    pub fn paged(page: Page<T>) -> Self {
        let total_pages = page.total_pages();
        let current_page = page.page;
        let mut response = Self::ok(page.items);
        response.count = response.data.as_ref().map(|items| items.len() as u64);
        response.total_pages = Some(total_pages);
        response.current_page = Some(current_page);
        response
    }

    pub fn list(items: Vec<T>) -> Self {
        let count = items.len();
        Self::ok(items).with_count(count)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// HTTP 层错误，包装领域错误
#[derive(Debug)]
pub struct ApiError {
    error: MediscanError,
    details: Option<String>,
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.error {
            MediscanError::Validation(_) | MediscanError::InvalidStateTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            MediscanError::Permission(_) => StatusCode::UNAUTHORIZED,
            MediscanError::NotFound(_) => StatusCode::NOT_FOUND,
            MediscanError::Conflict(_) => StatusCode::CONFLICT,
            MediscanError::Upstream(_) => StatusCode::BAD_GATEWAY,
            MediscanError::Config(_)
            | MediscanError::Database(_)
            | MediscanError::Storage(_)
            | MediscanError::Io(_)
            | MediscanError::Serialization(_)
            | MediscanError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 附带完整错误描述，仅在配置允许时生效
    pub fn with_details(mut self, expose: bool) -> Self {
        if expose {
            self.details = Some(self.error.to_string());
        }
        self
    }
}

impl From<MediscanError> for ApiError {
    fn from(error: MediscanError) -> Self {
        Self {
            error,
            details: None,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        MediscanError::validation(rejection.body_text()).into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        MediscanError::validation(rejection.body_text()).into()
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        MediscanError::validation(e.body_text()).into()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.error);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self.error);
        }

        let body = ApiResponse::<()> {
            success: false,
            data: None,
            message: Some(self.error.client_message()),
            count: None,
            total_pages: None,
            current_page: None,
            details: self.details,
        };
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (MediscanError::validation("x"), StatusCode::BAD_REQUEST),
            (
                MediscanError::InvalidStateTransition {
                    from: "Uploaded".into(),
                    event: "Review".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (MediscanError::Permission("x".into()), StatusCode::UNAUTHORIZED),
            (MediscanError::not_found("x"), StatusCode::NOT_FOUND),
            (MediscanError::Conflict("x".into()), StatusCode::CONFLICT),
            (MediscanError::Upstream("x".into()), StatusCode::BAD_GATEWAY),
            (MediscanError::Database("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from(error).status(), expected);
        }
    }

    #[test]
    fn test_envelope_omits_empty_fields() {
        let body = serde_json::to_value(ApiResponse::list(vec![1, 2, 3])).unwrap();
        assert_eq!(body, serde_json::json!({"success": true, "data": [1, 2, 3], "count": 3}));

        let page = Page { items: vec!["a"], total: 41, page: 2, limit: 20 };
        let body = serde_json::to_value(ApiResponse::paged(page)).unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(body["totalPages"], 3);
        assert_eq!(body["currentPage"], 2);
    }

    #[test]
    fn test_details_are_gated() {
        let hidden = ApiError::from(MediscanError::Internal("boom".into())).with_details(false);
        assert!(hidden.details.is_none());
        let shown = ApiError::from(MediscanError::Internal("boom".into())).with_details(true);
        assert_eq!(shown.details.as_deref(), Some("系统内部错误: boom"));
    }
}
