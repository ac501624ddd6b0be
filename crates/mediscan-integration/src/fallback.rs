//! 确定性回退预测器
//!
//! 分类服务不可用时，由图像内容哈希推导四个伪概率。同一图像总是得到
//! 相同的诊断和置信度；这不是医学分类器。

use crate::prediction::{Prediction, PredictionSource};
use mediscan_core::ConfidenceScores;
use sha2::{Digest, Sha256};

/// 各类别的正弦系数，顺序为 covid、normal、pneumonia、tuberculosis
const COEFFICIENTS: [f64; 4] = [1.1, 2.3, 3.7, 5.1];

/// 由哈希前 4 字节得到 [0,1] 内的种子
fn seed(image: &[u8]) -> f64 {
    let digest = Sha256::digest(image);
    let prefix = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    f64::from(prefix) / f64::from(u32::MAX)
}

pub fn predict(image: &[u8]) -> Prediction {
    let seed = seed(image);
    let raw = COEFFICIENTS.map(|k| ((seed * k).sin() + 1.0) / 2.0);
    let sum: f64 = raw.iter().sum();
    let normalized = if sum > 0.0 {
        raw.map(|v| v / sum)
    } else {
        [0.25; 4]
    };

    let confidence_scores = ConfidenceScores::from_ordered(normalized);
    let (diagnosis, primary_confidence) = confidence_scores.top();
    Prediction {
        diagnosis,
        confidence_scores,
        primary_confidence,
        source: PredictionSource::Fallback,
    }
}
