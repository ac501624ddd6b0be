//! 核心数据模型定义

use crate::error::{MediscanError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ========== 枚举 ==========

/// 性别枚举
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "Male",
            Self::Female => "Female",
            Self::Other => "Other",
        }
    }
}

impl FromStr for Gender {
    type Err = MediscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Male" => Ok(Self::Male),
            "Female" => Ok(Self::Female),
            "Other" => Ok(Self::Other),
            _ => Err(MediscanError::validation(format!(
                "Invalid gender '{}': expected Male, Female or Other",
                s
            ))),
        }
    }
}

/// 血型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BloodGroup {
    #[serde(rename = "A+")]
    APositive,
    #[serde(rename = "A-")]
    ANegative,
    #[serde(rename = "B+")]
    BPositive,
    #[serde(rename = "B-")]
    BNegative,
    #[serde(rename = "AB+")]
    AbPositive,
    #[serde(rename = "AB-")]
    AbNegative,
    #[serde(rename = "O+")]
    OPositive,
    #[serde(rename = "O-")]
    ONegative,
}

impl BloodGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::APositive => "A+",
            Self::ANegative => "A-",
            Self::BPositive => "B+",
            Self::BNegative => "B-",
            Self::AbPositive => "AB+",
            Self::AbNegative => "AB-",
            Self::OPositive => "O+",
            Self::ONegative => "O-",
        }
    }
}

impl FromStr for BloodGroup {
    type Err = MediscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A+" => Ok(Self::APositive),
            "A-" => Ok(Self::ANegative),
            "B+" => Ok(Self::BPositive),
            "B-" => Ok(Self::BNegative),
            "AB+" => Ok(Self::AbPositive),
            "AB-" => Ok(Self::AbNegative),
            "O+" => Ok(Self::OPositive),
            "O-" => Ok(Self::ONegative),
            _ => Err(MediscanError::validation(format!("Invalid blood group '{}'", s))),
        }
    }
}

/// 诊断结果
///
/// 旧标签 "COVID" 在所有入站写入时规范化为 "COVID-19"。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Diagnosis {
    #[serde(rename = "COVID-19", alias = "COVID")]
    Covid19,
    Normal,
    Pneumonia,
    Tuberculosis,
}

impl Diagnosis {
    /// 分类器输出顺序
    pub const ALL: [Diagnosis; 4] = [
        Diagnosis::Covid19,
        Diagnosis::Normal,
        Diagnosis::Pneumonia,
        Diagnosis::Tuberculosis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Covid19 => "COVID-19",
            Self::Normal => "Normal",
            Self::Pneumonia => "Pneumonia",
            Self::Tuberculosis => "Tuberculosis",
        }
    }

    /// 在 confidenceScores 中对应的键
    pub fn score_key(&self) -> &'static str {
        match self {
            Self::Covid19 => "covid",
            Self::Normal => "normal",
            Self::Pneumonia => "pneumonia",
            Self::Tuberculosis => "tuberculosis",
        }
    }

    /// 阳性病例（非 Normal）
    pub fn is_positive(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Diagnosis {
    type Err = MediscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "COVID" | "COVID-19" => Ok(Self::Covid19),
            "Normal" => Ok(Self::Normal),
            "Pneumonia" => Ok(Self::Pneumonia),
            "Tuberculosis" => Ok(Self::Tuberculosis),
            other => Err(MediscanError::validation(format!(
                "Invalid diagnosis '{}': expected one of COVID-19, Normal, Pneumonia, Tuberculosis",
                other
            ))),
        }
    }
}

/// 诊断标签规范化，所有入站写入路径共用
pub fn normalize_diagnosis(raw: &str) -> Result<Diagnosis> {
    raw.parse()
}

/// 审核状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    #[serde(rename = "Needs Review")]
    NeedsReview,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::NeedsReview => "Needs Review",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = MediscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Approved" => Ok(Self::Approved),
            "Rejected" => Ok(Self::Rejected),
            "Needs Review" => Ok(Self::NeedsReview),
            _ => Err(MediscanError::validation(format!("Invalid approval status '{}'", s))),
        }
    }
}

/// 诊断记录生命周期状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnalysisState {
    Uploaded,        // 已上传，仅有预测结果
    Saved,           // 已保存并关联患者
    Reviewed,        // 管理员已审核
    ReportGenerated, // 已生成报告
}

/// 预约类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AppointmentType {
    #[serde(rename = "Follow-up")]
    FollowUp,
    #[serde(rename = "New Scan")]
    NewScan,
    Consultation,
    Emergency,
}

impl AppointmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FollowUp => "Follow-up",
            Self::NewScan => "New Scan",
            Self::Consultation => "Consultation",
            Self::Emergency => "Emergency",
        }
    }
}

impl FromStr for AppointmentType {
    type Err = MediscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Follow-up" => Ok(Self::FollowUp),
            "New Scan" => Ok(Self::NewScan),
            "Consultation" => Ok(Self::Consultation),
            "Emergency" => Ok(Self::Emergency),
            _ => Err(MediscanError::validation(format!("Invalid appointment type '{}'", s))),
        }
    }
}

/// 预约状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Completed,
    Cancelled,
    Missed,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "Scheduled",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
            Self::Missed => "Missed",
            Self::Rescheduled => "Rescheduled",
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = MediscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Scheduled" => Ok(Self::Scheduled),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            "Missed" => Ok(Self::Missed),
            "Rescheduled" => Ok(Self::Rescheduled),
            _ => Err(MediscanError::validation(format!("Invalid appointment status '{}'", s))),
        }
    }
}

// ========== 置信度 ==========

/// 校验数值位于 [0,1]
pub fn ensure_unit_interval(value: f64, message: &str) -> Result<()> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(MediscanError::validation(message))
    }
}

/// 各疾病类别的置信度
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceScores {
    pub covid: f64,
    pub normal: f64,
    pub pneumonia: f64,
    pub tuberculosis: f64,
}

impl ConfidenceScores {
    pub fn get(&self, diagnosis: Diagnosis) -> f64 {
        match diagnosis {
            Diagnosis::Covid19 => self.covid,
            Diagnosis::Normal => self.normal,
            Diagnosis::Pneumonia => self.pneumonia,
            Diagnosis::Tuberculosis => self.tuberculosis,
        }
    }

    /// 按分类器顺序排列
    pub fn entries(&self) -> [(Diagnosis, f64); 4] {
        Diagnosis::ALL.map(|d| (d, self.get(d)))
    }

    pub fn from_ordered(values: [f64; 4]) -> Self {
        Self {
            covid: values[0],
            normal: values[1],
            pneumonia: values[2],
            tuberculosis: values[3],
        }
    }

    /// 最高分类别，并列时取靠前者
    pub fn top(&self) -> (Diagnosis, f64) {
        self.entries()
            .into_iter()
            .fold((Diagnosis::Covid19, f64::NEG_INFINITY), |best, (d, v)| {
                if v > best.1 {
                    (d, v)
                } else {
                    best
                }
            })
    }

    pub fn validate(&self) -> Result<()> {
        for (_, value) in self.entries() {
            ensure_unit_interval(value, "Confidence scores must be between 0 and 1")?;
        }
        Ok(())
    }
}

// ========== 患者 ==========

/// 患者人口学信息（可编辑部分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDetails {
    pub full_name: String,
    pub age: i32,
    pub gender: Gender,
    pub phone_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emergency_contact_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blood_group: Option<BloodGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_conditions: Option<String>,
}

impl PatientDetails {
    pub const MIN_AGE: i32 = 1;
    pub const MAX_AGE: i32 = 120;

    pub fn validate(&self) -> Result<()> {
        if self.full_name.trim().is_empty() {
            return Err(MediscanError::validation("Full name is required"));
        }
        if !(Self::MIN_AGE..=Self::MAX_AGE).contains(&self.age) {
            return Err(MediscanError::validation(format!(
                "Age must be between {} and {}",
                Self::MIN_AGE,
                Self::MAX_AGE
            )));
        }
        if self.phone_number.trim().is_empty() {
            return Err(MediscanError::validation("Phone number is required"));
        }
        Ok(())
    }
}

/// 患者档案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub patient_id: String, // PID-YYYYMMDD-NNNN
    #[serde(flatten)]
    pub details: PatientDetails,
    pub registration_date: DateTime<Utc>,
    pub last_visit_date: Option<DateTime<Utc>>,
    pub total_scans: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn new(patient_id: String, details: PatientDetails, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            patient_id,
            details,
            registration_date: now,
            last_visit_date: None,
            total_scans: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> PatientSummary {
        PatientSummary {
            id: self.id,
            patient_id: self.patient_id.clone(),
            full_name: self.details.full_name.clone(),
            age: self.details.age,
            gender: self.details.gender,
            phone_number: self.details.phone_number.clone(),
        }
    }
}

/// 嵌入到诊断/预约响应中的患者摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSummary {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub patient_id: String,
    pub full_name: String,
    pub age: i32,
    pub gender: Gender,
    pub phone_number: String,
}

// ========== 诊断记录 ==========

pub const DEFAULT_HOSPITAL_NAME: &str = "METRO PULMONOLOGY CENTER";
pub const DEFAULT_HOSPITAL_ADDRESS: &str =
    "12/4, Medical Circle, Anna Salai, Chennai, Tamil Nadu - 600002";
pub const DEFAULT_HOSPITAL_PHONE: &str = "+91 44-2458-9000";
pub const DEFAULT_REGISTRATION_NUMBER: &str = "TN/CH/MDS-100249";
pub const DEFAULT_REPORTING_DOCTOR: &str = "Dr. AI Scan";

/// 报告抬头信息，每个字段可单独缺省
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportMetadata {
    pub hospital_name: String,
    pub hospital_address: String,
    pub hospital_phone: String,
    pub registration_number: String,
    pub reporting_doctor: String,
}

impl Default for ReportMetadata {
    fn default() -> Self {
        Self {
            hospital_name: DEFAULT_HOSPITAL_NAME.to_string(),
            hospital_address: DEFAULT_HOSPITAL_ADDRESS.to_string(),
            hospital_phone: DEFAULT_HOSPITAL_PHONE.to_string(),
            registration_number: DEFAULT_REGISTRATION_NUMBER.to_string(),
            reporting_doctor: DEFAULT_REPORTING_DOCTOR.to_string(),
        }
    }
}

/// 一次诊断记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Analysis {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub analysis_id: String, // ANA-<millis>-<seq>
    pub patient_id: Uuid,
    pub image_path: String,
    pub image_url: String,
    pub diagnosis: Diagnosis,
    pub confidence_scores: ConfidenceScores,
    pub primary_confidence: f64,
    pub doctor_notes: String,
    pub recommendations: String,
    pub analysis_date: DateTime<Utc>,
    pub report_generated: bool,
    pub report_path: String,
    pub reviewed_by: String,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub approval_status: ApprovalStatus,
    pub created_by: String,
    pub report_metadata: ReportMetadata,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Analysis {
    pub const DEFAULT_CREATOR: &'static str = "AI System";

    /// 当前生命周期状态
    pub fn state(&self) -> AnalysisState {
        if self.report_generated {
            AnalysisState::ReportGenerated
        } else if self.reviewed_at.is_some() {
            AnalysisState::Reviewed
        } else {
            AnalysisState::Saved
        }
    }
}

/// 带患者摘要的诊断记录，用于列表和详情响应
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisDetail {
    #[serde(flatten)]
    pub analysis: Analysis,
    pub patient: Option<PatientSummary>,
}

// ========== 预约 ==========

pub const DEFAULT_DOCTOR_NAME: &str = "Dr. AI Scan";
pub const DEFAULT_DEPARTMENT: &str = "Pulmonology";
pub const DEFAULT_ACTOR: &str = "System";

/// 预约记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub appointment_id: String, // APT-<millis>-<seq>
    pub patient_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub appointment_time: String,
    pub appointment_type: AppointmentType,
    pub doctor_name: String,
    pub department: String,
    pub status: AppointmentStatus,
    pub notes: String,
    pub reminder_sent: bool,
    pub completion_notes: String,
    pub related_analysis_id: Option<Uuid>,
    pub created_by: String,
    pub updated_by: String,
    pub cancel_reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 带患者摘要的预约记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppointmentDetail {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient: Option<PatientSummary>,
}
