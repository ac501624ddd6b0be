//! # MediScan工作流模块
//!
//! 编排存储、分类器与报告组件：
//! - 诊断记录状态机：上传 → 保存 → 审核 → 生成报告
//! - 诊断记录工作流：上传预测、保存、审核、报告生成
//! - 患者、预约与系统设置服务

pub mod appointments;
pub mod engine;
pub mod input;
pub mod patients;
pub mod resolve;
pub mod settings;
pub mod state_machine;

// 重新导出主要类型
pub use appointments::{AppointmentFilter, AppointmentPatch, AppointmentService, NewAppointment};
pub use engine::{AnalysisPatch, AnalysisWorkflow, NewAnalysis, RenderedReport, UploadOutcome};
pub use patients::{PatientFilter, PatientPatch, PatientService};
pub use settings::SettingsService;
pub use state_machine::{AnalysisEvent, AnalysisStateMachine};
