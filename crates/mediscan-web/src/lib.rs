//! # MediScan Web模块
//!
//! 提供 REST API：患者、诊断记录、预约、仪表盘与系统设置，
//! 以及上传图像和报告文件的静态访问。

pub mod analysis;
pub mod appointments;
pub mod handlers;
pub mod patients;
pub mod response;
pub mod server;
pub mod state;

pub use response::{ApiError, ApiResponse, ApiResult};
pub use server::{create_app, WebServer};
pub use state::AppState;
