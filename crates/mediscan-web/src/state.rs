//! 应用共享状态

use mediscan_database::RecordStore;
use mediscan_integration::{Classifier, TrainingClient};
use mediscan_reporting::DashboardService;
use mediscan_storage::{ImageStore, ReportStore};
use mediscan_workflow::{AnalysisWorkflow, AppointmentService, PatientService, SettingsService};
use std::path::PathBuf;
use std::sync::Arc;

/// 各处理器共享的服务句柄
#[derive(Clone)]
pub struct AppState {
    pub patients: Arc<PatientService>,
    pub analyses: Arc<AnalysisWorkflow>,
    pub appointments: Arc<AppointmentService>,
    pub dashboard: Arc<DashboardService>,
    pub settings: Arc<SettingsService>,
    pub expose_error_details: bool,
}

impl AppState {
    pub fn new(
        store: Arc<dyn RecordStore>,
        images: ImageStore,
        reports: ReportStore,
        classifier: Arc<dyn Classifier>,
        training: TrainingClient,
        expose_error_details: bool,
    ) -> Self {
        Self {
            patients: Arc::new(PatientService::new(store.clone())),
            analyses: Arc::new(AnalysisWorkflow::new(
                store.clone(),
                images,
                reports,
                classifier,
            )),
            appointments: Arc::new(AppointmentService::new(store.clone())),
            dashboard: Arc::new(DashboardService::new(store.clone())),
            settings: Arc::new(SettingsService::new(store, training)),
            expose_error_details,
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.analyses.images().base_dir().to_path_buf()
    }

    pub fn report_dir(&self) -> PathBuf {
        self.analyses.reports().base_dir().to_path_buf()
    }

    /// 请求体上限：图像上限加上 multipart 编码余量
    pub fn body_limit(&self) -> usize {
        (self.analyses.images().max_bytes() as usize).saturating_add(1024 * 1024)
    }
}
