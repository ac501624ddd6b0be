//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use crate::store::{
    AppointmentQuery, MonthlyCount, Page, PatientQuery, PatientSortField, RecordStore, SortOrder,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediscan_core::utils::IdKind;
use mediscan_core::{
    Analysis, Appointment, Diagnosis, MediscanError, Patient, PatientDetails, Result, Settings,
};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

const PATIENT_COLUMNS: &str = "id, patient_id, full_name, age, gender, phone_number, email, \
    address, emergency_contact_name, emergency_contact_phone, blood_group, medical_conditions, \
    registration_date, last_visit_date, total_scans, created_at, updated_at";

const APPOINTMENT_COLUMNS: &str = "id, appointment_id, patient_id, appointment_date, \
    appointment_time, appointment_type, doctor_name, department, status, notes, reminder_sent, \
    completion_notes, related_analysis_id, created_by, updated_by, cancel_reason, created_at, \
    updated_at";

/// 唯一约束冲突映射为 `Conflict`，其余为 `Database`
fn db_error(e: sqlx::Error) -> MediscanError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return MediscanError::Conflict(db.message().to_string());
        }
    }
    MediscanError::Database(e.to_string())
}

/// 转义 LIKE 通配符
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn order_clause(field: PatientSortField, order: SortOrder) -> String {
    let expression = match field {
        PatientSortField::FullName => "LOWER(full_name)".to_string(),
        other => other.column().to_string(),
    };
    // 与内存实现一致：空值视为最小
    let nulls = match order {
        SortOrder::Ascending => "NULLS FIRST",
        SortOrder::Descending => "NULLS LAST",
    };
    format!(
        " ORDER BY {} {} {}, id {}",
        expression,
        order.sql(),
        nulls,
        order.sql()
    )
}

fn push_patient_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &PatientQuery) {
    builder.push(" WHERE TRUE");
    if let Some(term) = query.search_term() {
        let pattern = escape_like(term);
        builder
            .push(" AND (full_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR patient_id ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR phone_number ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(gender) = query.gender {
        builder.push(" AND gender = ").push_bind(gender.as_str());
    }
    if let Some(min) = query.age_min {
        builder.push(" AND age >= ").push_bind(min);
    }
    if let Some(max) = query.age_max {
        builder.push(" AND age <= ").push_bind(max);
    }
}

fn push_appointment_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &AppointmentQuery) {
    builder.push(" WHERE TRUE");
    if let Some(patient_id) = query.patient_id {
        builder.push(" AND patient_id = ").push_bind(patient_id);
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = query.from {
        builder.push(" AND appointment_date >= ").push_bind(from);
    }
    if let Some(until) = query.until {
        builder.push(" AND appointment_date < ").push_bind(until);
    }
}

/// PostgreSQL 记录存储
#[derive(Clone)]
pub struct PgRecordStore {
    pool: DatabasePool,
}

impl PgRecordStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建患者表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS patients (
                id UUID PRIMARY KEY,
                patient_id VARCHAR(32) UNIQUE NOT NULL,
                full_name VARCHAR(255) NOT NULL,
                age INTEGER NOT NULL CHECK (age BETWEEN 1 AND 120),
                gender VARCHAR(8) NOT NULL,
                phone_number VARCHAR(32) NOT NULL,
                email VARCHAR(255),
                address TEXT,
                emergency_contact_name VARCHAR(255),
                emergency_contact_phone VARCHAR(32),
                blood_group VARCHAR(4),
                medical_conditions TEXT,
                registration_date TIMESTAMP WITH TIME ZONE NOT NULL,
                last_visit_date TIMESTAMP WITH TIME ZONE,
                total_scans BIGINT NOT NULL DEFAULT 0,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(pool)
        .await
        .map_err(db_error)?;

        // 创建诊断记录表，患者关联由业务层维护
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS analyses (
                id UUID PRIMARY KEY,
                analysis_id VARCHAR(64) UNIQUE NOT NULL,
                patient_id UUID NOT NULL,
                image_path VARCHAR(512) NOT NULL,
                image_url VARCHAR(512) NOT NULL,
                diagnosis VARCHAR(16) NOT NULL,
                score_covid DOUBLE PRECISION NOT NULL CHECK (score_covid BETWEEN 0 AND 1),
                score_normal DOUBLE PRECISION NOT NULL CHECK (score_normal BETWEEN 0 AND 1),
                score_pneumonia DOUBLE PRECISION NOT NULL CHECK (score_pneumonia BETWEEN 0 AND 1),
                score_tuberculosis DOUBLE PRECISION NOT NULL CHECK (score_tuberculosis BETWEEN 0 AND 1),
                primary_confidence DOUBLE PRECISION NOT NULL CHECK (primary_confidence BETWEEN 0 AND 1),
                doctor_notes TEXT NOT NULL DEFAULT '',
                recommendations TEXT NOT NULL DEFAULT '',
                analysis_date TIMESTAMP WITH TIME ZONE NOT NULL,
                report_generated BOOLEAN NOT NULL DEFAULT FALSE,
                report_path VARCHAR(512) NOT NULL DEFAULT '',
                reviewed_by VARCHAR(255) NOT NULL DEFAULT '',
                reviewed_at TIMESTAMP WITH TIME ZONE,
                approval_status VARCHAR(16) NOT NULL DEFAULT 'Pending',
                created_by VARCHAR(255) NOT NULL,
                report_metadata JSONB NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(pool)
        .await
        .map_err(db_error)?;

        // 创建预约表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS appointments (
                id UUID PRIMARY KEY,
                appointment_id VARCHAR(64) UNIQUE NOT NULL,
                patient_id UUID NOT NULL,
                appointment_date TIMESTAMP WITH TIME ZONE NOT NULL,
                appointment_time VARCHAR(16) NOT NULL,
                appointment_type VARCHAR(16) NOT NULL,
                doctor_name VARCHAR(255) NOT NULL,
                department VARCHAR(255) NOT NULL,
                status VARCHAR(16) NOT NULL DEFAULT 'Scheduled',
                notes TEXT NOT NULL DEFAULT '',
                reminder_sent BOOLEAN NOT NULL DEFAULT FALSE,
                completion_notes TEXT NOT NULL DEFAULT '',
                related_analysis_id UUID,
                created_by VARCHAR(255) NOT NULL,
                updated_by VARCHAR(255) NOT NULL,
                cancel_reason TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(pool)
        .await
        .map_err(db_error)?;

        // 设置单例表
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id SMALLINT PRIMARY KEY CHECK (id = 1),
                document JSONB NOT NULL,
                updated_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#,
        )
        .execute(pool)
        .await
        .map_err(db_error)?;

        for kind in [IdKind::Patient, IdKind::Analysis, IdKind::Appointment] {
            sqlx::query(&format!(
                "CREATE SEQUENCE IF NOT EXISTS {}",
                kind.sequence_name()
            ))
            .execute(pool)
            .await
            .map_err(db_error)?;
        }

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_patients_full_name ON patients(full_name)",
            "CREATE INDEX IF NOT EXISTS idx_patients_phone_number ON patients(phone_number)",
            "CREATE INDEX IF NOT EXISTS idx_patients_created_at ON patients(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_analyses_patient_id ON analyses(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_analyses_created_at ON analyses(created_at)",
            "CREATE INDEX IF NOT EXISTS idx_analyses_diagnosis ON analyses(diagnosis)",
            "CREATE INDEX IF NOT EXISTS idx_appointments_patient_id ON appointments(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_appointments_date ON appointments(appointment_date)",
            "CREATE INDEX IF NOT EXISTS idx_appointments_status ON appointments(status)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(db_error)?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn next_sequence(&self, kind: IdKind) -> Result<u64> {
        let value: i64 = sqlx::query_scalar("SELECT nextval($1::regclass)")
            .bind(kind.sequence_name())
            .fetch_one(self.pool.pool())
            .await
            .map_err(db_error)?;
        u64::try_from(value).map_err(|_| MediscanError::Database("Negative sequence value".into()))
    }

    // ========== 患者相关操作 ==========

    async fn insert_patient(&self, patient: &Patient) -> Result<()> {
        let d = &patient.details;
        sqlx::query(&format!(
            "INSERT INTO patients ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            PATIENT_COLUMNS
        ))
        .bind(patient.id)
        .bind(&patient.patient_id)
        .bind(&d.full_name)
        .bind(d.age)
        .bind(d.gender.as_str())
        .bind(&d.phone_number)
        .bind(&d.email)
        .bind(&d.address)
        .bind(&d.emergency_contact_name)
        .bind(&d.emergency_contact_phone)
        .bind(d.blood_group.map(|b| b.as_str()))
        .bind(&d.medical_conditions)
        .bind(patient.registration_date)
        .bind(patient.last_visit_date)
        .bind(patient.total_scans)
        .bind(patient.created_at)
        .bind(patient.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>> {
        sqlx::query_as::<_, DbPatient>(&format!(
            "SELECT {} FROM patients WHERE id = $1",
            PATIENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)?
        .map(Patient::try_from)
        .transpose()
    }

    async fn find_patient_by_code(&self, patient_id: &str) -> Result<Option<Patient>> {
        sqlx::query_as::<_, DbPatient>(&format!(
            "SELECT {} FROM patients WHERE patient_id = $1",
            PATIENT_COLUMNS
        ))
        .bind(patient_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)?
        .map(Patient::try_from)
        .transpose()
    }

    async fn list_patients(&self, query: &PatientQuery) -> Result<Page<Patient>> {
        let pool = self.pool.pool();

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM patients");
        push_patient_filters(&mut count, query);
        let total: i64 = count
            .build_query_scalar()
            .fetch_one(pool)
            .await
            .map_err(db_error)?;

        let mut select = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM patients",
            PATIENT_COLUMNS
        ));
        push_patient_filters(&mut select, query);
        select.push(order_clause(query.sort_by, query.order));
        select
            .push(" LIMIT ")
            .push_bind(i64::from(query.limit))
            .push(" OFFSET ")
            .push_bind(query.offset() as i64);

        let items = select
            .build_query_as::<DbPatient>()
            .fetch_all(pool)
            .await
            .map_err(db_error)?
            .into_iter()
            .map(Patient::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items,
            total: total.max(0) as u64,
            page: query.page,
            limit: query.limit,
        })
    }

    async fn update_patient_details(
        &self,
        id: Uuid,
        details: &PatientDetails,
        at: DateTime<Utc>,
    ) -> Result<Option<Patient>> {
        sqlx::query_as::<_, DbPatient>(&format!(
            r#"
            UPDATE patients SET
                full_name = $2, age = $3, gender = $4, phone_number = $5, email = $6,
                address = $7, emergency_contact_name = $8, emergency_contact_phone = $9,
                blood_group = $10, medical_conditions = $11, updated_at = $12
            WHERE id = $1
            RETURNING {}
        "#,
            PATIENT_COLUMNS
        ))
        .bind(id)
        .bind(&details.full_name)
        .bind(details.age)
        .bind(details.gender.as_str())
        .bind(&details.phone_number)
        .bind(&details.email)
        .bind(&details.address)
        .bind(&details.emergency_contact_name)
        .bind(&details.emergency_contact_phone)
        .bind(details.blood_group.map(|b| b.as_str()))
        .bind(&details.medical_conditions)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)?
        .map(Patient::try_from)
        .transpose()
    }

    async fn record_patient_visit(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Patient>> {
        sqlx::query_as::<_, DbPatient>(&format!(
            r#"
            UPDATE patients
            SET total_scans = total_scans + 1, last_visit_date = $2, updated_at = $2
            WHERE id = $1
            RETURNING {}
        "#,
            PATIENT_COLUMNS
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)?
        .map(Patient::try_from)
        .transpose()
    }

    async fn delete_patient_cascade(&self, id: Uuid) -> Result<Option<u64>> {
        let mut tx = self.pool.pool().begin().await.map_err(db_error)?;

        let deleted = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();
        if deleted == 0 {
            tx.rollback().await.map_err(db_error)?;
            return Ok(None);
        }

        let analyses = sqlx::query("DELETE FROM analyses WHERE patient_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?
            .rows_affected();

        tx.commit().await.map_err(db_error)?;
        Ok(Some(analyses))
    }

    async fn count_patients(&self) -> Result<u64> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM patients")
            .fetch_one(self.pool.pool())
            .await
            .map_err(db_error)?;
        Ok(total.max(0) as u64)
    }

    async fn recent_patients(&self, limit: u32) -> Result<Vec<Patient>> {
        sqlx::query_as::<_, DbPatient>(&format!(
            "SELECT {} FROM patients ORDER BY created_at DESC, id DESC LIMIT $1",
            PATIENT_COLUMNS
        ))
        .bind(i64::from(limit))
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_error)?
        .into_iter()
        .map(Patient::try_from)
        .collect()
    }

    // ========== 诊断记录相关操作 ==========

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<()> {
        let scores = &analysis.confidence_scores;
        sqlx::query(
            r#"
            INSERT INTO analyses (
                id, analysis_id, patient_id, image_path, image_url, diagnosis,
                score_covid, score_normal, score_pneumonia, score_tuberculosis,
                primary_confidence, doctor_notes, recommendations, analysis_date,
                report_generated, report_path, reviewed_by, reviewed_at, approval_status,
                created_by, report_metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $23)
        "#,
        )
        .bind(analysis.id)
        .bind(&analysis.analysis_id)
        .bind(analysis.patient_id)
        .bind(&analysis.image_path)
        .bind(&analysis.image_url)
        .bind(analysis.diagnosis.as_str())
        .bind(scores.covid)
        .bind(scores.normal)
        .bind(scores.pneumonia)
        .bind(scores.tuberculosis)
        .bind(analysis.primary_confidence)
        .bind(&analysis.doctor_notes)
        .bind(&analysis.recommendations)
        .bind(analysis.analysis_date)
        .bind(analysis.report_generated)
        .bind(&analysis.report_path)
        .bind(&analysis.reviewed_by)
        .bind(analysis.reviewed_at)
        .bind(analysis.approval_status.as_str())
        .bind(&analysis.created_by)
        .bind(Json(&analysis.report_metadata))
        .bind(analysis.created_at)
        .bind(analysis.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_analysis(&self, id: Uuid) -> Result<Option<Analysis>> {
        sqlx::query_as::<_, DbAnalysis>("SELECT * FROM analyses WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_error)?
            .map(Analysis::try_from)
            .transpose()
    }

    async fn find_analysis_by_code(&self, analysis_id: &str) -> Result<Option<Analysis>> {
        sqlx::query_as::<_, DbAnalysis>("SELECT * FROM analyses WHERE analysis_id = $1")
            .bind(analysis_id)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(db_error)?
            .map(Analysis::try_from)
            .transpose()
    }

    async fn list_analyses(
        &self,
        patient_id: Option<Uuid>,
        limit: Option<u32>,
    ) -> Result<Vec<Analysis>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM analyses WHERE TRUE");
        if let Some(patient_id) = patient_id {
            builder.push(" AND patient_id = ").push_bind(patient_id);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = limit {
            builder.push(" LIMIT ").push_bind(i64::from(limit));
        }

        builder
            .build_query_as::<DbAnalysis>()
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_error)?
            .into_iter()
            .map(Analysis::try_from)
            .collect()
    }

    async fn update_analysis(&self, analysis: &Analysis) -> Result<bool> {
        let scores = &analysis.confidence_scores;
        let result = sqlx::query(
            r#"
            UPDATE analyses SET
                patient_id = $2, image_path = $3, image_url = $4, diagnosis = $5,
                score_covid = $6, score_normal = $7, score_pneumonia = $8, score_tuberculosis = $9,
                primary_confidence = $10, doctor_notes = $11, recommendations = $12,
                report_generated = $13, report_path = $14, reviewed_by = $15, reviewed_at = $16,
                approval_status = $17, report_metadata = $18, updated_at = $19
            WHERE id = $1
        "#,
        )
        .bind(analysis.id)
        .bind(analysis.patient_id)
        .bind(&analysis.image_path)
        .bind(&analysis.image_url)
        .bind(analysis.diagnosis.as_str())
        .bind(scores.covid)
        .bind(scores.normal)
        .bind(scores.pneumonia)
        .bind(scores.tuberculosis)
        .bind(analysis.primary_confidence)
        .bind(&analysis.doctor_notes)
        .bind(&analysis.recommendations)
        .bind(analysis.report_generated)
        .bind(&analysis.report_path)
        .bind(&analysis.reviewed_by)
        .bind(analysis.reviewed_at)
        .bind(analysis.approval_status.as_str())
        .bind(Json(&analysis.report_metadata))
        .bind(analysis.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_by_diagnosis(&self) -> Result<Vec<(Diagnosis, u64)>> {
        let rows = sqlx::query_as::<_, DbDiagnosisCount>(
            "SELECT diagnosis, COUNT(*) AS count FROM analyses GROUP BY diagnosis ORDER BY diagnosis",
        )
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_error)?;

        let mut counts = rows
            .into_iter()
            .map(|row| Ok((row.diagnosis.parse::<Diagnosis>()?, row.count.max(0) as u64)))
            .collect::<Result<Vec<_>>>()?;
        counts.sort_by_key(|(d, _)| *d);
        Ok(counts)
    }

    async fn monthly_scan_counts(&self, since: DateTime<Utc>) -> Result<Vec<MonthlyCount>> {
        let rows = sqlx::query_as::<_, DbMonthlyCount>(
            r#"
            SELECT
                EXTRACT(YEAR FROM created_at AT TIME ZONE 'UTC')::INT AS year,
                EXTRACT(MONTH FROM created_at AT TIME ZONE 'UTC')::INT AS month,
                COUNT(*) AS count
            FROM analyses
            WHERE created_at >= $1
            GROUP BY 1, 2
            ORDER BY 1, 2
        "#,
        )
        .bind(since)
        .fetch_all(self.pool.pool())
        .await
        .map_err(db_error)?;

        Ok(rows
            .into_iter()
            .map(|row| MonthlyCount {
                year: row.year,
                month: row.month.max(1) as u32,
                count: row.count.max(0) as u64,
            })
            .collect())
    }

    // ========== 预约相关操作 ==========

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO appointments ({}) VALUES \
             ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)",
            APPOINTMENT_COLUMNS
        ))
        .bind(appointment.id)
        .bind(&appointment.appointment_id)
        .bind(appointment.patient_id)
        .bind(appointment.appointment_date)
        .bind(&appointment.appointment_time)
        .bind(appointment.appointment_type.as_str())
        .bind(&appointment.doctor_name)
        .bind(&appointment.department)
        .bind(appointment.status.as_str())
        .bind(&appointment.notes)
        .bind(appointment.reminder_sent)
        .bind(&appointment.completion_notes)
        .bind(appointment.related_analysis_id)
        .bind(&appointment.created_by)
        .bind(&appointment.updated_by)
        .bind(&appointment.cancel_reason)
        .bind(appointment.created_at)
        .bind(appointment.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>> {
        sqlx::query_as::<_, DbAppointment>(&format!(
            "SELECT {} FROM appointments WHERE id = $1",
            APPOINTMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)?
        .map(Appointment::try_from)
        .transpose()
    }

    async fn find_appointment_by_code(&self, appointment_id: &str) -> Result<Option<Appointment>> {
        sqlx::query_as::<_, DbAppointment>(&format!(
            "SELECT {} FROM appointments WHERE appointment_id = $1",
            APPOINTMENT_COLUMNS
        ))
        .bind(appointment_id)
        .fetch_optional(self.pool.pool())
        .await
        .map_err(db_error)?
        .map(Appointment::try_from)
        .transpose()
    }

    async fn list_appointments(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {} FROM appointments",
            APPOINTMENT_COLUMNS
        ));
        push_appointment_filters(&mut builder, query);
        builder.push(" ORDER BY appointment_date ASC, appointment_time ASC, id ASC");

        builder
            .build_query_as::<DbAppointment>()
            .fetch_all(self.pool.pool())
            .await
            .map_err(db_error)?
            .into_iter()
            .map(Appointment::try_from)
            .collect()
    }

    async fn count_appointments(&self, query: &AppointmentQuery) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM appointments");
        push_appointment_filters(&mut builder, query);
        let total: i64 = builder
            .build_query_scalar()
            .fetch_one(self.pool.pool())
            .await
            .map_err(db_error)?;
        Ok(total.max(0) as u64)
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE appointments SET
                patient_id = $2, appointment_date = $3, appointment_time = $4,
                appointment_type = $5, doctor_name = $6, department = $7, status = $8,
                notes = $9, reminder_sent = $10, completion_notes = $11,
                related_analysis_id = $12, updated_by = $13, cancel_reason = $14, updated_at = $15
            WHERE id = $1
        "#,
        )
        .bind(appointment.id)
        .bind(appointment.patient_id)
        .bind(appointment.appointment_date)
        .bind(&appointment.appointment_time)
        .bind(appointment.appointment_type.as_str())
        .bind(&appointment.doctor_name)
        .bind(&appointment.department)
        .bind(appointment.status.as_str())
        .bind(&appointment.notes)
        .bind(appointment.reminder_sent)
        .bind(&appointment.completion_notes)
        .bind(appointment.related_analysis_id)
        .bind(&appointment.updated_by)
        .bind(&appointment.cancel_reason)
        .bind(appointment.updated_at)
        .execute(self.pool.pool())
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(db_error)?;
        Ok(result.rows_affected() > 0)
    }

    // ========== 设置相关操作 ==========

    async fn load_settings(&self) -> Result<Settings> {
        let pool = self.pool.pool();

        sqlx::query("INSERT INTO settings (id, document) VALUES (1, $1) ON CONFLICT (id) DO NOTHING")
            .bind(Json(Settings::default()))
            .execute(pool)
            .await
            .map_err(db_error)?;

        let document: Json<Settings> =
            sqlx::query_scalar("SELECT document FROM settings WHERE id = 1")
                .fetch_one(pool)
                .await
                .map_err(db_error)?;
        Ok(document.0)
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (id, document, updated_at) VALUES (1, $1, NOW())
            ON CONFLICT (id) DO UPDATE SET document = EXCLUDED.document, updated_at = NOW()
        "#,
        )
        .bind(Json(settings))
        .execute(self.pool.pool())
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn record_training_date(&self, at: DateTime<Utc>) -> Result<()> {
        let pool = self.pool.pool();

        sqlx::query("INSERT INTO settings (id, document) VALUES (1, $1) ON CONFLICT (id) DO NOTHING")
            .bind(Json(Settings::default()))
            .execute(pool)
            .await
            .map_err(db_error)?;

        sqlx::query(
            r#"
            UPDATE settings
            SET document = jsonb_set(document, '{lastTrainingDate}', $1), updated_at = NOW()
            WHERE id = 1
        "#,
        )
        .bind(Json(at))
        .execute(pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }
}
