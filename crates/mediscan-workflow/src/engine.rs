//! 诊断记录工作流
//!
//! 协调图像存储、分类器、记录存储和报告渲染：
//! 上传预测 → 保存并关联患者 → 管理员审核 → 生成报告

use crate::input::{non_blank, present};
use crate::resolve;
use crate::state_machine::{AnalysisEvent, AnalysisStateMachine};
use chrono::{DateTime, Utc};
use mediscan_core::utils::{format_record_id, IdKind};
use mediscan_core::{
    ensure_unit_interval, normalize_diagnosis, Analysis, AnalysisDetail, AnalysisState,
    ApprovalStatus, ConfidenceScores, MediscanError, Patient, PatientSummary, ReportMetadata,
    Result,
};
use mediscan_database::RecordStore;
use mediscan_integration::{Classifier, Prediction};
use mediscan_reporting::{ReportFormat, ReportView};
use mediscan_storage::{ImageStore, ReportStore, UploadGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// 上传结果：图像地址加预测结果，不写入记录存储
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub image_url: String,
    pub image_path: String,
    #[serde(flatten)]
    pub prediction: Prediction,
}

/// 保存诊断记录的请求体
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnalysis {
    pub patient_id: Option<String>,
    pub image_path: Option<String>,
    pub image_url: Option<String>,
    pub diagnosis: Option<String>,
    pub primary_confidence: Option<f64>,
    pub confidence_scores: Option<ConfidenceScores>,
    pub doctor_notes: Option<String>,
    pub recommendations: Option<String>,
    pub created_by: Option<String>,
    pub reviewed_by: Option<String>,
    pub approval_status: Option<String>,
    pub report_metadata: Option<ReportMetadata>,
}

impl NewAnalysis {
    fn ensure_required(&self) -> Result<()> {
        let complete = present(&self.patient_id)
            && present(&self.image_path)
            && present(&self.image_url)
            && present(&self.diagnosis)
            && self.primary_confidence.is_some();
        if complete {
            Ok(())
        } else {
            Err(MediscanError::validation(
                "Missing required fields: patientId, imagePath, imageUrl, diagnosis, primaryConfidence",
            ))
        }
    }
}

/// 管理员审核补丁
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisPatch {
    pub reviewed_by: Option<String>,
    pub approval_status: Option<String>,
    pub doctor_notes: Option<String>,
    pub recommendations: Option<String>,
    pub diagnosis: Option<String>,
}

/// 渲染后的报告
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedReport {
    Html(String),
    Pdf(Vec<u8>),
}

/// 诊断记录工作流
pub struct AnalysisWorkflow {
    store: Arc<dyn RecordStore>,
    images: ImageStore,
    reports: ReportStore,
    classifier: Arc<dyn Classifier>,
    state_machine: AnalysisStateMachine,
}

impl AnalysisWorkflow {
    pub fn new(
        store: Arc<dyn RecordStore>,
        images: ImageStore,
        reports: ReportStore,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            store,
            images,
            reports,
            classifier,
            state_machine: AnalysisStateMachine::new(),
        }
    }

    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    pub fn reports(&self) -> &ReportStore {
        &self.reports
    }

    /// 保存上传图像并分类
    ///
    /// 分类阶段失败时删除已写入的文件。
    pub async fn upload(
        &self,
        original_name: &str,
        content_type: Option<&str>,
        data: &[u8],
    ) -> Result<UploadOutcome> {
        let stored = self.images.save(original_name, content_type, data).await?;
        let guard = UploadGuard::new(&stored.path);

        let prediction = self.classifier.classify(&stored.path).await?;
        guard.keep();

        info!(
            "Classified {} as {} ({:.3}, {:?})",
            stored.file_name, prediction.diagnosis, prediction.primary_confidence, prediction.source
        );
        Ok(UploadOutcome {
            image_url: stored.url,
            image_path: stored.path.to_string_lossy().into_owned(),
            prediction,
        })
    }

    /// 保存诊断记录并更新患者扫描计数
    ///
    /// 全部校验在任何写入之前完成。
    pub async fn save(&self, request: NewAnalysis, now: DateTime<Utc>) -> Result<AnalysisDetail> {
        request.ensure_required()?;

        let diagnosis = normalize_diagnosis(request.diagnosis.as_deref().unwrap_or_default())?;
        let primary_confidence = request.primary_confidence.unwrap_or_default();
        ensure_unit_interval(primary_confidence, "Primary confidence must be between 0 and 1")?;
        let confidence_scores = request.confidence_scores.unwrap_or_default();
        confidence_scores.validate()?;
        let approval_status = match non_blank(request.approval_status) {
            Some(raw) => raw.parse::<ApprovalStatus>()?,
            None => ApprovalStatus::default(),
        };

        let patient = resolve::patient(
            self.store.as_ref(),
            request.patient_id.as_deref().unwrap_or_default(),
        )
        .await?;
        let state = self
            .state_machine
            .transition(AnalysisState::Uploaded, AnalysisEvent::Save)?;

        let sequence = self.store.next_sequence(IdKind::Analysis).await?;
        let reviewed_by = non_blank(request.reviewed_by).unwrap_or_default();
        let analysis = Analysis {
            id: Uuid::new_v4(),
            analysis_id: format_record_id(IdKind::Analysis, now, sequence),
            patient_id: patient.id,
            image_path: request.image_path.unwrap_or_default(),
            image_url: request.image_url.unwrap_or_default(),
            diagnosis,
            confidence_scores,
            primary_confidence,
            doctor_notes: request.doctor_notes.unwrap_or_default(),
            recommendations: request.recommendations.unwrap_or_default(),
            analysis_date: now,
            report_generated: false,
            report_path: String::new(),
            reviewed_at: (!reviewed_by.is_empty()).then_some(now),
            reviewed_by,
            approval_status,
            created_by: non_blank(request.created_by)
                .unwrap_or_else(|| Analysis::DEFAULT_CREATOR.to_string()),
            report_metadata: request.report_metadata.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_analysis(&analysis).await?;

        let patient = self
            .store
            .record_patient_visit(patient.id, now)
            .await?
            .unwrap_or(patient);

        info!(
            "Saved analysis {} for patient {} ({:?})",
            analysis.analysis_id, patient.patient_id, state
        );
        Ok(AnalysisDetail {
            analysis,
            patient: Some(patient.summary()),
        })
    }

    /// 列出诊断记录，按创建时间倒序；患者引用无法解析时返回空列表
    pub async fn list(&self, patient_ref: Option<&str>) -> Result<Vec<AnalysisDetail>> {
        let patient_ref = patient_ref.map(str::trim).filter(|r| !r.is_empty());
        let analyses = match patient_ref {
            Some(reference) => match resolve::find_patient(self.store.as_ref(), reference).await? {
                Some(patient) => self.store.list_analyses(Some(patient.id), None).await?,
                None => Vec::new(),
            },
            None => self.store.list_analyses(None, None).await?,
        };
        self.with_patients(analyses).await
    }

    pub async fn get(&self, reference: &str) -> Result<AnalysisDetail> {
        let analysis = resolve::analysis(self.store.as_ref(), reference).await?;
        let patient = self.store.find_patient(analysis.patient_id).await?;
        Ok(AnalysisDetail {
            analysis,
            patient: patient.map(|p| p.summary()),
        })
    }

    /// 管理员审核，提供 reviewedBy 时记录审核时间
    pub async fn review(
        &self,
        reference: &str,
        patch: AnalysisPatch,
        now: DateTime<Utc>,
    ) -> Result<AnalysisDetail> {
        let mut analysis = resolve::analysis(self.store.as_ref(), reference).await?;
        self.state_machine
            .transition(analysis.state(), AnalysisEvent::Review)?;

        let diagnosis = match non_blank(patch.diagnosis) {
            Some(raw) => Some(normalize_diagnosis(&raw)?),
            None => None,
        };
        let approval_status = match non_blank(patch.approval_status) {
            Some(raw) => Some(raw.parse::<ApprovalStatus>()?),
            None => None,
        };

        if let Some(reviewer) = non_blank(patch.reviewed_by) {
            analysis.reviewed_by = reviewer;
            analysis.reviewed_at = Some(now);
        }
        if let Some(status) = approval_status {
            analysis.approval_status = status;
        }
        if let Some(diagnosis) = diagnosis {
            analysis.diagnosis = diagnosis;
        }
        if let Some(notes) = patch.doctor_notes {
            analysis.doctor_notes = notes;
        }
        if let Some(recommendations) = patch.recommendations {
            analysis.recommendations = recommendations;
        }
        analysis.updated_at = now;

        if !self.store.update_analysis(&analysis).await? {
            return Err(MediscanError::not_found("Analysis not found"));
        }

        info!(
            "Reviewed analysis {} ({})",
            analysis.analysis_id,
            analysis.approval_status.as_str()
        );
        self.get(&analysis.id.to_string()).await
    }

    /// 生成 PDF 报告并标记诊断记录
    pub async fn generate_report(
        &self,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<AnalysisDetail> {
        let mut analysis = resolve::analysis(self.store.as_ref(), reference).await?;
        self.state_machine
            .transition(analysis.state(), AnalysisEvent::GenerateReport)?;
        let patient = self.owner(&analysis).await?;
        let settings = self.store.load_settings().await?;

        let pdf = ReportView::build(&analysis, &patient, &settings).render_pdf()?;
        let report = self.reports.write(&analysis.analysis_id, &pdf).await?;

        let regenerated = analysis.report_generated;
        analysis.report_generated = true;
        analysis.report_path = report.url.clone();
        analysis.updated_at = now;

        let persisted = self.store.update_analysis(&analysis).await;
        if !matches!(persisted, Ok(true)) {
            // 已有报告时文件已被覆盖，记录仍指向它
            if !regenerated {
                self.reports.remove(&report).await;
            }
            persisted?;
            return Err(MediscanError::not_found("Analysis not found"));
        }

        info!(
            "Generated report {} for analysis {}",
            report.url, analysis.analysis_id
        );
        Ok(AnalysisDetail {
            analysis,
            patient: Some(patient.summary()),
        })
    }

    /// 渲染报告视图，不修改记录
    pub async fn render_report(&self, reference: &str, format: ReportFormat) -> Result<RenderedReport> {
        let analysis = resolve::analysis(self.store.as_ref(), reference).await?;
        let patient = self.owner(&analysis).await?;
        let settings = self.store.load_settings().await?;
        let view = ReportView::build(&analysis, &patient, &settings);

        match format {
            ReportFormat::Html => Ok(RenderedReport::Html(view.render_html()?)),
            ReportFormat::Pdf => Ok(RenderedReport::Pdf(view.render_pdf()?)),
        }
    }

    async fn owner(&self, analysis: &Analysis) -> Result<Patient> {
        self.store
            .find_patient(analysis.patient_id)
            .await?
            .ok_or_else(|| {
                warn!(
                    "Analysis {} references missing patient {}",
                    analysis.analysis_id, analysis.patient_id
                );
                MediscanError::not_found("Patient not found")
            })
    }

    async fn with_patients(&self, analyses: Vec<Analysis>) -> Result<Vec<AnalysisDetail>> {
        let mut summaries: HashMap<Uuid, Option<PatientSummary>> = HashMap::new();
        let mut details = Vec::with_capacity(analyses.len());
        for analysis in analyses {
            if !summaries.contains_key(&analysis.patient_id) {
                let summary = self
                    .store
                    .find_patient(analysis.patient_id)
                    .await?
                    .map(|p| p.summary());
                summaries.insert(analysis.patient_id, summary);
            }
            let patient = summaries.get(&analysis.patient_id).cloned().flatten();
            details.push(AnalysisDetail { analysis, patient });
        }
        Ok(details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mediscan_core::utils::is_valid_record_id;
    use mediscan_core::{Diagnosis, Gender, PatientDetails};
    use mediscan_database::MemoryStore;
    use mediscan_integration::PredictionSource;
    use serde_json::json;
    use std::path::Path;
    use tempfile::TempDir;

    struct FixedClassifier;

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn classify(&self, image: &Path) -> Result<Prediction> {
            assert!(image.exists());
            Ok(Prediction {
                diagnosis: Diagnosis::Pneumonia,
                confidence_scores: ConfidenceScores::from_ordered([0.05, 0.1, 0.8, 0.05]),
                primary_confidence: 0.8,
                source: PredictionSource::Model,
            })
        }
    }

    struct UnreadableClassifier;

    #[async_trait]
    impl Classifier for UnreadableClassifier {
        async fn classify(&self, _image: &Path) -> Result<Prediction> {
            Err(MediscanError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "unreadable",
            )))
        }
    }

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3];

    struct Fixture {
        _dir: TempDir,
        store: Arc<MemoryStore>,
        workflow: AnalysisWorkflow,
        patient: Patient,
    }

    async fn fixture(classifier: Arc<dyn Classifier>) -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let patient = Patient::new(
            "PID-20261018-0001".to_string(),
            PatientDetails {
                full_name: "Ravi Kumar".to_string(),
                age: 58,
                gender: Gender::Male,
                phone_number: "9876543210".to_string(),
                email: None,
                address: None,
                emergency_contact_name: None,
                emergency_contact_phone: None,
                blood_group: None,
                medical_conditions: None,
            },
            Utc::now(),
        );
        store.insert_patient(&patient).await.unwrap();

        let workflow = AnalysisWorkflow::new(
            store.clone(),
            ImageStore::new(dir.path().join("uploads"), 10 * 1024 * 1024),
            ReportStore::new(dir.path().join("reports")),
            classifier,
        );
        Fixture { _dir: dir, store, workflow, patient }
    }

    fn new_analysis(value: serde_json::Value) -> NewAnalysis {
        serde_json::from_value(value).unwrap()
    }

    fn files_in(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_end_to_end_flow() {
        let fx = fixture(Arc::new(FixedClassifier)).await;

        let upload = fx.workflow.upload("chest.png", Some("image/png"), PNG).await.unwrap();
        assert!(upload.image_url.starts_with("/uploads/"));
        assert!(upload.image_url.ends_with("-chest.png"));
        assert_eq!(upload.prediction.diagnosis, Diagnosis::Pneumonia);
        assert!(Path::new(&upload.image_path).exists());
        assert_eq!(fx.store.list_analyses(None, None).await.unwrap().len(), 0);

        let saved = fx
            .workflow
            .save(
                new_analysis(json!({
                    "patientId": fx.patient.patient_id,
                    "imagePath": upload.image_path,
                    "imageUrl": upload.image_url,
                    "diagnosis": "Pneumonia",
                    "primaryConfidence": 0.8,
                    "confidenceScores": {"covid": 0.05, "normal": 0.1, "pneumonia": 0.8, "tuberculosis": 0.05}
                })),
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(is_valid_record_id(IdKind::Analysis, &saved.analysis.analysis_id));
        assert_eq!(saved.analysis.created_by, "AI System");
        assert_eq!(saved.analysis.approval_status, ApprovalStatus::Pending);

        let patient = fx.store.find_patient(fx.patient.id).await.unwrap().unwrap();
        assert_eq!(patient.total_scans, 1);
        assert!(patient.last_visit_date.is_some());

        let listed = fx.workflow.list(Some(&fx.patient.patient_id)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].analysis.id, saved.analysis.id);
        assert_eq!(listed[0].patient.as_ref().unwrap().full_name, "Ravi Kumar");

        let reported = fx
            .workflow
            .generate_report(&saved.analysis.analysis_id, Utc::now())
            .await
            .unwrap();
        assert!(reported.analysis.report_generated);
        assert_eq!(
            reported.analysis.report_path,
            format!("/reports/{}.pdf", saved.analysis.analysis_id)
        );
        let report_file = fx
            .workflow
            .reports()
            .base_dir()
            .join(format!("{}.pdf", saved.analysis.analysis_id));
        assert!(std::fs::read(report_file).unwrap().starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_upload_rejects_bad_type_without_files() {
        let fx = fixture(Arc::new(FixedClassifier)).await;
        let err = fx
            .workflow
            .upload("notes.gif", Some("image/gif"), b"GIF89a")
            .await
            .unwrap_err();
        assert_eq!(err.client_message(), "Only .png, .jpg and .jpeg format allowed!");
        assert_eq!(files_in(fx.workflow.images().base_dir()), 0);
    }

    #[tokio::test]
    async fn test_failed_classification_removes_upload() {
        let fx = fixture(Arc::new(UnreadableClassifier)).await;
        let result = fx.workflow.upload("scan.jpg", Some("image/jpeg"), PNG).await;
        assert!(result.is_err());
        assert_eq!(files_in(fx.workflow.images().base_dir()), 0);
    }

    #[tokio::test]
    async fn test_save_validation_precedes_writes() {
        let fx = fixture(Arc::new(FixedClassifier)).await;

        let err = fx
            .workflow
            .save(new_analysis(json!({"patientId": fx.patient.patient_id})), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(
            err.client_message(),
            "Missing required fields: patientId, imagePath, imageUrl, diagnosis, primaryConfidence"
        );

        let err = fx
            .workflow
            .save(
                new_analysis(json!({
                    "patientId": fx.patient.patient_id,
                    "imagePath": "uploads/1-x.png",
                    "imageUrl": "/uploads/1-x.png",
                    "diagnosis": "Normal",
                    "primaryConfidence": 1.5
                })),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.client_message(), "Primary confidence must be between 0 and 1");

        let err = fx
            .workflow
            .save(
                new_analysis(json!({
                    "patientId": "PID-20200101-0404",
                    "imagePath": "uploads/1-x.png",
                    "imageUrl": "/uploads/1-x.png",
                    "diagnosis": "Normal",
                    "primaryConfidence": 0.9
                })),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediscanError::NotFound(_)));

        assert!(fx.store.list_analyses(None, None).await.unwrap().is_empty());
        let patient = fx.store.find_patient(fx.patient.id).await.unwrap().unwrap();
        assert_eq!(patient.total_scans, 0);
    }

    #[tokio::test]
    async fn test_covid_label_is_normalized() {
        let fx = fixture(Arc::new(FixedClassifier)).await;
        let saved = fx
            .workflow
            .save(
                new_analysis(json!({
                    "patientId": fx.patient.id.to_string(),
                    "imagePath": "uploads/1-x.png",
                    "imageUrl": "/uploads/1-x.png",
                    "diagnosis": "COVID",
                    "primaryConfidence": 0.91,
                    "confidenceScores": {"covid": 0.91}
                })),
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(saved.analysis.diagnosis, Diagnosis::Covid19);
        assert_eq!(saved.analysis.confidence_scores.normal, 0.0);
        assert_eq!(
            saved.analysis.report_metadata.hospital_name,
            ReportMetadata::default().hospital_name
        );
    }

    #[tokio::test]
    async fn test_review_stamps_time_and_normalizes() {
        let fx = fixture(Arc::new(FixedClassifier)).await;
        let saved = fx
            .workflow
            .save(
                new_analysis(json!({
                    "patientId": fx.patient.patient_id,
                    "imagePath": "uploads/1-x.png",
                    "imageUrl": "/uploads/1-x.png",
                    "diagnosis": "Normal",
                    "primaryConfidence": 0.7
                })),
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(saved.analysis.reviewed_at.is_none());

        let reviewed = fx
            .workflow
            .review(
                &saved.analysis.analysis_id,
                AnalysisPatch {
                    reviewed_by: Some("Dr. Priya".to_string()),
                    approval_status: Some("Needs Review".to_string()),
                    diagnosis: Some("COVID".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(reviewed.analysis.reviewed_by, "Dr. Priya");
        assert!(reviewed.analysis.reviewed_at.is_some());
        assert_eq!(reviewed.analysis.approval_status, ApprovalStatus::NeedsReview);
        assert_eq!(reviewed.analysis.diagnosis, Diagnosis::Covid19);
        assert_eq!(reviewed.analysis.state(), AnalysisState::Reviewed);

        let err = fx
            .workflow
            .review(
                &saved.analysis.analysis_id,
                AnalysisPatch {
                    approval_status: Some("Maybe".to_string()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediscanError::Validation(_)));
    }

    #[tokio::test]
    async fn test_render_report_formats() {
        let fx = fixture(Arc::new(FixedClassifier)).await;
        let saved = fx
            .workflow
            .save(
                new_analysis(json!({
                    "patientId": fx.patient.patient_id,
                    "imagePath": "uploads/1-x.png",
                    "imageUrl": "/uploads/1-x.png",
                    "diagnosis": "Tuberculosis",
                    "primaryConfidence": 0.66
                })),
                Utc::now(),
            )
            .await
            .unwrap();

        match fx
            .workflow
            .render_report(&saved.analysis.analysis_id, ReportFormat::Html)
            .await
            .unwrap()
        {
            RenderedReport::Html(html) => {
                assert!(html.contains("Ravi Kumar"));
                assert!(html.contains("66.00%"));
            }
            other => panic!("unexpected report {:?}", other),
        }
        assert!(matches!(
            fx.workflow
                .render_report(&saved.analysis.analysis_id, ReportFormat::Pdf)
                .await
                .unwrap(),
            RenderedReport::Pdf(_)
        ));

        let err = fx
            .workflow
            .render_report("ANA-0-0", ReportFormat::Html)
            .await
            .unwrap_err();
        assert_eq!(err.client_message(), "Analysis not found");
    }
}
