//! 系统设置（全局单例）

use crate::error::Result;
use crate::models::{ensure_unit_interval, Diagnosis};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 提醒方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReminderMethod {
    #[serde(rename = "SMS")]
    Sms,
    Email,
    Both,
}

/// 预约提醒设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReminderSettings {
    pub enabled: bool,
    /// 预约前多少小时提醒
    pub reminder_time: u32,
    pub reminder_method: ReminderMethod,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            reminder_time: 24,
            reminder_method: ReminderMethod::Sms,
        }
    }
}

/// 邮件配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailConfig {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_user: String,
    pub smtp_password: String,
    pub from_email: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            smtp_user: String::new(),
            smtp_password: String::new(),
            from_email: "noreply@mediscan.ai".to_string(),
        }
    }
}

/// 备份频率
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackupFrequency {
    Daily,
    Weekly,
    Monthly,
}

/// 备份配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupConfig {
    pub enabled: bool,
    pub frequency: BackupFrequency,
    pub retention_days: u32,
    pub last_backup: Option<DateTime<Utc>>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: BackupFrequency::Daily,
            retention_days: 30,
            last_backup: None,
        }
    }
}

/// 审计日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditLogConfig {
    pub enabled: bool,
    pub log_patient_access: bool,
    pub log_report_generation: bool,
    pub log_admin_actions: bool,
}

impl Default for AuditLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_patient_access: true,
            log_report_generation: true,
            log_admin_actions: true,
        }
    }
}

/// 系统设置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    // 诊所信息
    pub clinic_name: String,
    pub clinic_logo: String,
    pub clinic_address: String,
    pub clinic_phone: String,
    pub clinic_email: String,
    pub registration_number: String,

    // 报告模板
    pub report_header_template: String,
    pub report_footer_template: String,
    pub default_recommendations: BTreeMap<Diagnosis, String>,

    // 预约
    pub appointment_duration: u32,
    pub reminder_settings: ReminderSettings,

    // 管理
    pub admin_password: String,
    pub admin_email: String,
    pub allow_patient_deletion: bool,
    pub allow_data_export: bool,
    pub require_approval_for_reports: bool,

    // AI模型
    pub model_version: String,
    pub model_path: String,
    pub confidence_threshold: f64,
    pub auto_retrain_enabled: bool,
    pub last_training_date: Option<DateTime<Utc>>,

    // 系统
    pub maintenance_mode: bool,
    pub max_upload_size: u32,
    pub allowed_image_formats: Vec<String>,

    pub email_config: EmailConfig,
    pub backup_config: BackupConfig,
    pub audit_log: AuditLogConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            clinic_name: "MediScan AI Clinic".to_string(),
            clinic_logo: String::new(),
            clinic_address: "12/4, Medical Circle, Anna Salai, Chennai, Tamil Nadu - 600002"
                .to_string(),
            clinic_phone: "+91 44-2458-9000".to_string(),
            clinic_email: "info@mediscan.ai".to_string(),
            registration_number: "TN/CH/MDS-100249".to_string(),
            report_header_template: String::new(),
            report_footer_template: String::new(),
            default_recommendations: BTreeMap::new(),
            appointment_duration: 30,
            reminder_settings: ReminderSettings::default(),
            admin_password: "admin123".to_string(),
            admin_email: "admin@mediscan.ai".to_string(),
            allow_patient_deletion: true,
            allow_data_export: true,
            require_approval_for_reports: false,
            model_version: "v4.2.1-PRO".to_string(),
            model_path: "./ai_model/lung_disease_model.h5".to_string(),
            confidence_threshold: 0.7,
            auto_retrain_enabled: false,
            last_training_date: None,
            maintenance_mode: false,
            max_upload_size: 10,
            allowed_image_formats: ["jpg", "jpeg", "png", "dcm"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            email_config: EmailConfig::default(),
            backup_config: BackupConfig::default(),
            audit_log: AuditLogConfig::default(),
        }
    }
}

impl Settings {
    /// 对外返回的副本，不包含管理员口令和 SMTP 口令
    pub fn redacted(&self) -> Self {
        let mut redacted = self.clone();
        redacted.admin_password.clear();
        redacted.email_config.smtp_password.clear();
        redacted
    }

    /// 服务端口令校验
    pub fn verify_admin_password(&self, candidate: &str) -> bool {
        !self.admin_password.is_empty() && self.admin_password == candidate
    }

    pub fn default_recommendation(&self, diagnosis: Diagnosis) -> Option<&str> {
        self.default_recommendations
            .get(&diagnosis)
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// 设置的部分更新，只修改提供的字段
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub clinic_name: Option<String>,
    pub clinic_logo: Option<String>,
    pub clinic_address: Option<String>,
    pub clinic_phone: Option<String>,
    pub clinic_email: Option<String>,
    pub registration_number: Option<String>,
    pub report_header_template: Option<String>,
    pub report_footer_template: Option<String>,
    pub default_recommendations: Option<BTreeMap<Diagnosis, String>>,
    pub admin_password: Option<String>,
    pub admin_email: Option<String>,
    pub model_version: Option<String>,
    pub confidence_threshold: Option<f64>,
    pub appointment_duration: Option<u32>,
    pub reminder_settings: Option<ReminderSettings>,
    pub email_config: Option<EmailConfig>,
    pub backup_config: Option<BackupConfig>,
    pub audit_log: Option<AuditLogConfig>,
    pub allow_patient_deletion: Option<bool>,
    pub allow_data_export: Option<bool>,
    pub require_approval_for_reports: Option<bool>,
    pub maintenance_mode: Option<bool>,
}

impl SettingsUpdate {
    /// 校验全部字段后再写入，失败时 `settings` 保持不变。
    /// 读取接口不返回 SMTP 口令，因此提交空口令时保留原值。
    pub fn apply(mut self, settings: &mut Settings) -> Result<()> {
        if let Some(threshold) = self.confidence_threshold {
            ensure_unit_interval(threshold, "Confidence threshold must be between 0 and 1")?;
        }
        if let Some(email) = self.email_config.as_mut() {
            if email.smtp_password.is_empty() {
                email.smtp_password = settings.email_config.smtp_password.clone();
            }
        }

        macro_rules! assign {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    settings.$field = value;
                })*
            };
        }

        assign!(
            clinic_name,
            clinic_logo,
            clinic_address,
            clinic_phone,
            clinic_email,
            registration_number,
            report_header_template,
            report_footer_template,
            default_recommendations,
            admin_password,
            admin_email,
            model_version,
            confidence_threshold,
            appointment_duration,
            reminder_settings,
            email_config,
            backup_config,
            audit_log,
            allow_patient_deletion,
            allow_data_export,
            require_approval_for_reports,
            maintenance_mode,
        );
        Ok(())
    }
}
