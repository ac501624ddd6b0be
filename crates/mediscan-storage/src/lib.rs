//! # MediScan存储模块
//!
//! 负责胸片上传文件和 PDF 报告的磁盘存储。

pub mod images;
pub mod reports;

pub use images::*;
pub use reports::*;
