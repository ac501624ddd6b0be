//! 外部分类服务客户端

use crate::fallback;
use async_trait::async_trait;
use mediscan_core::{normalize_diagnosis, ConfidenceScores, Diagnosis, MediscanError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// 预测结果来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionSource {
    Model,
    Fallback,
}

/// 统一的预测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub diagnosis: Diagnosis,
    pub confidence_scores: ConfidenceScores,
    pub primary_confidence: f64,
    pub source: PredictionSource,
}

/// 分类器接口
#[async_trait]
pub trait Classifier: Send + Sync {
    /// 对磁盘上的图像分类；只有图像文件不可读时才返回错误
    async fn classify(&self, image: &Path) -> Result<Prediction>;
}

/// 分类服务调用失败原因，只用于日志
#[derive(Debug, Error)]
enum UpstreamFailure {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("service returned status {0}")]
    Status(reqwest::StatusCode),

    #[error("service reported failure")]
    Rejected,

    #[error("invalid response: {0}")]
    Invalid(String),
}

/// 分类服务响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PredictResponse {
    #[serde(default = "default_success")]
    success: bool,
    diagnosis: String,
    #[serde(default)]
    confidence_scores: ConfidenceScores,
    primary_confidence: f64,
}

fn default_success() -> bool {
    true
}

impl PredictResponse {
    fn into_prediction(self) -> std::result::Result<Prediction, UpstreamFailure> {
        if !self.success {
            return Err(UpstreamFailure::Rejected);
        }
        let diagnosis = normalize_diagnosis(&self.diagnosis)
            .map_err(|e| UpstreamFailure::Invalid(e.client_message()))?;
        self.confidence_scores
            .validate()
            .map_err(|e| UpstreamFailure::Invalid(e.client_message()))?;
        if !(self.primary_confidence.is_finite() && (0.0..=1.0).contains(&self.primary_confidence))
        {
            return Err(UpstreamFailure::Invalid(format!(
                "primary confidence {} out of range",
                self.primary_confidence
            )));
        }
        Ok(Prediction {
            diagnosis,
            confidence_scores: self.confidence_scores,
            primary_confidence: self.primary_confidence,
            source: PredictionSource::Model,
        })
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        _ => "image/jpeg",
    }
}

/// 分类服务 HTTP 客户端，任何上游失败都回退到确定性预测
#[derive(Debug, Clone)]
pub struct PredictionClient {
    client: reqwest::Client,
    base_url: String,
}

impl PredictionClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediscanError::Config(format!("HTTP client error: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request_model(
        &self,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> std::result::Result<Prediction, UpstreamFailure> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamFailure::Status(status));
        }

        let body: PredictResponse = response
            .json()
            .await
            .map_err(|e| UpstreamFailure::Invalid(e.to_string()))?;
        body.into_prediction()
    }
}

#[async_trait]
impl Classifier for PredictionClient {
    async fn classify(&self, image: &Path) -> Result<Prediction> {
        let bytes = tokio::fs::read(image).await?;
        let file_name = image
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("image")
            .to_string();

        debug!("Sending {} ({} bytes) to classification service", file_name, bytes.len());
        match self.request_model(&file_name, mime_for(image), bytes.clone()).await {
            Ok(prediction) => {
                info!(
                    "Classification service returned {} ({:.3})",
                    prediction.diagnosis, prediction.primary_confidence
                );
                Ok(prediction)
            }
            Err(failure) => {
                warn!(
                    "Classification service unavailable ({}), using fallback predictor for {}",
                    failure, file_name
                );
                Ok(fallback::predict(&bytes))
            }
        }
    }
}
