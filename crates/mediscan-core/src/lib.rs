//! # MediScan Core
//!
//! 胸部X光诊断记录系统的核心模块，提供领域数据结构、错误定义和通用工具。

pub mod error;
pub mod models;
pub mod settings;
pub mod utils;

pub use error::{MediscanError, Result};
pub use models::*;
pub use settings::{Settings, SettingsUpdate};
