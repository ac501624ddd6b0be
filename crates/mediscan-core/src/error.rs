//! 错误定义模块

use thiserror::Error;

/// MediScan系统统一错误类型
#[derive(Error, Debug)]
pub enum MediscanError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("存储错误: {0}")]
    Storage(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("资源冲突: {0}")]
    Conflict(String),

    #[error("权限错误: {0}")]
    Permission(String),

    #[error("外部服务错误: {0}")]
    Upstream(String),

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl MediscanError {
    /// 面向客户端的错误信息（不带分类前缀）
    pub fn client_message(&self) -> String {
        match self {
            Self::Config(msg)
            | Self::Database(msg)
            | Self::Storage(msg)
            | Self::Validation(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg)
            | Self::Permission(msg)
            | Self::Upstream(msg)
            | Self::Internal(msg) => msg.clone(),
            Self::Io(e) => e.to_string(),
            Self::Serialization(e) => e.to_string(),
            Self::InvalidStateTransition { from, event } => {
                format!("Cannot apply '{}' to an analysis in state '{}'", event, from)
            }
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

/// MediScan系统统一结果类型
pub type Result<T> = std::result::Result<T, MediscanError>;
