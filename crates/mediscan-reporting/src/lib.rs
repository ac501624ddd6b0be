//! # MediScan报告模块
//!
//! 仪表盘统计与诊断报告渲染（HTML 与 PDF）。

pub mod dashboard;
pub mod report;

pub use dashboard::*;
pub use report::{ReportFormat, ReportView};
