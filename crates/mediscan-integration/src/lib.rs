//! # MediScan集成模块
//!
//! 与外部分类服务的集成：
//! - 预测客户端，将胸片转发到分类服务
//! - 确定性回退预测器，分类服务不可用时使用
//! - 模型训练触发

pub mod fallback;
pub mod prediction;
pub mod training;

pub use prediction::{Classifier, Prediction, PredictionClient, PredictionSource};
pub use training::TrainingClient;
