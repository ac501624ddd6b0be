//! 数据库模型

use chrono::{DateTime, Utc};
use mediscan_core::models::*;
use mediscan_core::{MediscanError, Result};
use sqlx::types::Json;
use sqlx::FromRow;
use std::str::FromStr;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询，枚举列以文本存储

fn parse_column<T: FromStr<Err = MediscanError>>(column: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| MediscanError::Database(format!("Invalid {} value '{}'", column, value)))
}

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub id: Uuid,
    pub patient_id: String,
    pub full_name: String,
    pub age: i32,
    pub gender: String,
    pub phone_number: String,
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub blood_group: Option<String>,
    pub medical_conditions: Option<String>,
    pub registration_date: DateTime<Utc>,
    pub last_visit_date: Option<DateTime<Utc>>,
    pub total_scans: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPatient> for Patient {
    type Error = MediscanError;

    fn try_from(row: DbPatient) -> Result<Self> {
        Ok(Patient {
            id: row.id,
            patient_id: row.patient_id,
            details: PatientDetails {
                full_name: row.full_name,
                age: row.age,
                gender: parse_column("gender", &row.gender)?,
                phone_number: row.phone_number,
                email: row.email,
                address: row.address,
                emergency_contact_name: row.emergency_contact_name,
                emergency_contact_phone: row.emergency_contact_phone,
                blood_group: row
                    .blood_group
                    .as_deref()
                    .map(|v| parse_column("blood_group", v))
                    .transpose()?,
                medical_conditions: row.medical_conditions,
            },
            registration_date: row.registration_date,
            last_visit_date: row.last_visit_date,
            total_scans: row.total_scans,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// 数据库诊断记录表
#[derive(Debug, FromRow)]
pub struct DbAnalysis {
    pub id: Uuid,
    pub analysis_id: String,
    pub patient_id: Uuid,
    pub image_path: String,
    pub image_url: String,
    pub diagnosis: String,
    pub score_covid: f64,
    pub score_normal: f64,
    pub score_pneumonia: f64,
    pub score_tuberculosis: f64,
    pub primary_confidence: f64,
    pub doctor_notes: String,
    pub recommendations: String,
    pub analysis_date: DateTime<Utc>,
    pub report_generated: bool,
    pub report_path: String,
    pub reviewed_by: String,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub approval_status: String,
    pub created_by: String,
    pub report_metadata: Json<ReportMetadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbAnalysis> for Analysis {
    type Error = MediscanError;

    fn try_from(row: DbAnalysis) -> Result<Self> {
        Ok(Analysis {
            id: row.id,
            analysis_id: row.analysis_id,
            patient_id: row.patient_id,
            image_path: row.image_path,
            image_url: row.image_url,
            diagnosis: parse_column("diagnosis", &row.diagnosis)?,
            confidence_scores: ConfidenceScores {
                covid: row.score_covid,
                normal: row.score_normal,
                pneumonia: row.score_pneumonia,
                tuberculosis: row.score_tuberculosis,
            },
            primary_confidence: row.primary_confidence,
            doctor_notes: row.doctor_notes,
            recommendations: row.recommendations,
            analysis_date: row.analysis_date,
            report_generated: row.report_generated,
            report_path: row.report_path,
            reviewed_by: row.reviewed_by,
            reviewed_at: row.reviewed_at,
            approval_status: parse_column("approval_status", &row.approval_status)?,
            created_by: row.created_by,
            report_metadata: row.report_metadata.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// 数据库预约表
#[derive(Debug, FromRow)]
pub struct DbAppointment {
    pub id: Uuid,
    pub appointment_id: String,
    pub patient_id: Uuid,
    pub appointment_date: DateTime<Utc>,
    pub appointment_time: String,
    pub appointment_type: String,
    pub doctor_name: String,
    pub department: String,
    pub status: String,
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

impl TryFrom<DbAppointment> for Appointment {
    type Error = MediscanError;

    fn try_from(row: DbAppointment) -> Result<Self> {
        Ok(Appointment {
            id: row.id,
            appointment_id: row.appointment_id,
            patient_id: row.patient_id,
            appointment_date: row.appointment_date,
            appointment_time: row.appointment_time,
            appointment_type: parse_column("appointment_type", &row.appointment_type)?,
            doctor_name: row.doctor_name,
            department: row.department,
            status: parse_column("status", &row.status)?,
            notes: row.notes,
            reminder_sent: row.reminder_sent,
            completion_notes: row.completion_notes,
            related_analysis_id: row.related_analysis_id,
            created_by: row.created_by,
            updated_by: row.updated_by,
            cancel_reason: row.cancel_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// 按诊断分组的计数行
#[derive(Debug, FromRow)]
pub struct DbDiagnosisCount {
    pub diagnosis: String,
    pub count: i64,
}

/// 按月分组的计数行
#[derive(Debug, FromRow)]
pub struct DbMonthlyCount {
    pub year: i32,
    pub month: i32,
    pub count: i64,
}
