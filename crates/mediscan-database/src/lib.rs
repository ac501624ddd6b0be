//! # MediScan数据库模块
//!
//! 患者、诊断记录、预约和系统设置的持久化。`RecordStore` 是存储接口，
//! 提供 PostgreSQL 实现（生产）与内存实现（开发与测试）。

pub mod connection;
pub mod memory;
pub mod models;
pub mod queries;
pub mod store;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use queries::PgRecordStore;
pub use store::*;
