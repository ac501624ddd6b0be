//! 模型训练触发

use mediscan_core::{MediscanError, Result};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info};

/// 分类服务训练接口客户端，原样转发上游 JSON 响应
#[derive(Debug, Clone)]
pub struct TrainingClient {
    client: reqwest::Client,
    base_url: String,
}

impl TrainingClient {
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

    pub async fn trigger(&self, password: &str) -> Result<Value> {
        let url = format!("{}/train", self.base_url);
        info!("Triggering model training at {}", url);

        let response = self
            .client
            .post(&url)
            .json(&json!({ "password": password }))
            .send()
            .await
            .map_err(|e| {
                error!("Training request failed: {}", e);
                MediscanError::Upstream(format!("Failed to trigger training: {}", e))
            })?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            error!("Training service returned status {}", status);
            let detail = body
                .get("message")
                .or_else(|| body.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("status {}", status));
            return Err(MediscanError::Upstream(format!(
                "Failed to trigger training: {}",
                detail
            )));
        }
        Ok(body)
    }
}
