//! 预约服务

use crate::input::{non_blank, parse_date, present};
use crate::resolve;
use chrono::{DateTime, Utc};
use mediscan_core::utils::{format_record_id, utc_day_bounds, IdKind};
use mediscan_core::{
    Appointment, AppointmentDetail, AppointmentStatus, AppointmentType, MediscanError, Result,
    DEFAULT_ACTOR, DEFAULT_DEPARTMENT, DEFAULT_DOCTOR_NAME,
};
use mediscan_database::{AppointmentQuery, RecordStore};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// 创建预约的请求体
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAppointment {
    pub patient_id: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub appointment_type: Option<String>,
    pub doctor_name: Option<String>,
    pub department: Option<String>,
    pub notes: Option<String>,
    pub related_analysis_id: Option<String>,
    pub created_by: Option<String>,
}

/// 预约部分更新
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentPatch {
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    pub appointment_type: Option<String>,
    pub doctor_name: Option<String>,
    pub department: Option<String>,
    pub status: Option<String>,
    pub notes: Option<String>,
    pub reminder_sent: Option<bool>,
    pub completion_notes: Option<String>,
    pub related_analysis_id: Option<String>,
    pub cancel_reason: Option<String>,
    pub updated_by: Option<String>,
}

/// 预约列表查询参数
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentFilter {
    pub date: Option<String>,
    pub status: Option<String>,
    pub patient_id: Option<String>,
    pub upcoming: Option<String>,
}

impl AppointmentFilter {
    fn is_upcoming(&self) -> bool {
        self.upcoming.as_deref().map(str::trim) == Some("true")
    }
}

/// 预约服务
pub struct AppointmentService {
    store: Arc<dyn RecordStore>,
}

impl AppointmentService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn create(
        &self,
        request: NewAppointment,
        now: DateTime<Utc>,
    ) -> Result<AppointmentDetail> {
        let complete = present(&request.patient_id)
            && present(&request.appointment_date)
            && present(&request.appointment_time)
            && present(&request.appointment_type);
        if !complete {
            return Err(MediscanError::validation(
                "Missing required fields: patientId, appointmentDate, appointmentTime, appointmentType",
            ));
        }

        let appointment_date = parse_date(request.appointment_date.as_deref().unwrap_or_default())?;
        let appointment_type = request
            .appointment_type
            .as_deref()
            .unwrap_or_default()
            .trim()
            .parse::<AppointmentType>()?;
        let patient = resolve::patient(
            self.store.as_ref(),
            request.patient_id.as_deref().unwrap_or_default(),
        )
        .await?;
        let related_analysis_id = self.related_analysis(request.related_analysis_id).await?;

        let sequence = self.store.next_sequence(IdKind::Appointment).await?;
        let created_by = non_blank(request.created_by).unwrap_or_else(|| DEFAULT_ACTOR.to_string());
        let appointment = Appointment {
            id: Uuid::new_v4(),
            appointment_id: format_record_id(IdKind::Appointment, now, sequence),
            patient_id: patient.id,
            appointment_date,
            appointment_time: request.appointment_time.unwrap_or_default().trim().to_string(),
            appointment_type,
            doctor_name: non_blank(request.doctor_name)
                .unwrap_or_else(|| DEFAULT_DOCTOR_NAME.to_string()),
            department: non_blank(request.department)
                .unwrap_or_else(|| DEFAULT_DEPARTMENT.to_string()),
            status: AppointmentStatus::Scheduled,
            notes: request.notes.unwrap_or_default(),
            reminder_sent: false,
            completion_notes: String::new(),
            related_analysis_id,
            updated_by: created_by.clone(),
            created_by,
            cancel_reason: String::new(),
            created_at: now,
            updated_at: now,
        };
        self.store.insert_appointment(&appointment).await?;

        info!(
            "Scheduled appointment {} for patient {} on {} {}",
            appointment.appointment_id,
            patient.patient_id,
            appointment.appointment_date.format("%Y-%m-%d"),
            appointment.appointment_time
        );
        Ok(AppointmentDetail {
            appointment,
            patient: Some(patient.summary()),
        })
    }

    /// 按日期、时间升序列出预约；`upcoming=true` 覆盖日期和状态条件
    pub async fn list(
        &self,
        filter: AppointmentFilter,
        now: DateTime<Utc>,
    ) -> Result<Vec<AppointmentDetail>> {
        let mut query = AppointmentQuery::default();

        if let Some(reference) = non_blank(filter.patient_id.clone()) {
            match resolve::find_patient(self.store.as_ref(), &reference).await? {
                Some(patient) => query.patient_id = Some(patient.id),
                None => return Ok(Vec::new()),
            }
        }

        if filter.is_upcoming() {
            let upcoming = AppointmentQuery::upcoming(now);
            query.status = upcoming.status;
            query.from = upcoming.from;
        } else {
            if let Some(status) = non_blank(filter.status) {
                query.status = Some(status.trim().parse::<AppointmentStatus>()?);
            }
            if let Some(date) = non_blank(filter.date) {
                let (from, until) = utc_day_bounds(parse_date(&date)?.date_naive());
                query.from = Some(from);
                query.until = Some(until);
            }
        }

        let appointments = self.store.list_appointments(&query).await?;
        let mut details = Vec::with_capacity(appointments.len());
        for appointment in appointments {
            details.push(self.with_patient(appointment).await?);
        }
        Ok(details)
    }

    pub async fn get(&self, reference: &str) -> Result<AppointmentDetail> {
        let appointment = resolve::appointment(self.store.as_ref(), reference).await?;
        self.with_patient(appointment).await
    }

    /// 部分更新；取消需要原因，完成时写入完成备注
    pub async fn update(
        &self,
        reference: &str,
        patch: AppointmentPatch,
        now: DateTime<Utc>,
    ) -> Result<AppointmentDetail> {
        let status = match non_blank(patch.status) {
            Some(raw) => Some(raw.trim().parse::<AppointmentStatus>()?),
            None => None,
        };
        if status == Some(AppointmentStatus::Cancelled) && !present(&patch.cancel_reason) {
            return Err(MediscanError::validation(
                "Cancel reason is required when cancelling an appointment",
            ));
        }
        let appointment_date = match non_blank(patch.appointment_date) {
            Some(raw) => Some(parse_date(&raw)?),
            None => None,
        };
        let appointment_type = match non_blank(patch.appointment_type) {
            Some(raw) => Some(raw.trim().parse::<AppointmentType>()?),
            None => None,
        };

        let mut appointment = resolve::appointment(self.store.as_ref(), reference).await?;
        if let Some(related) = self.related_analysis(patch.related_analysis_id).await? {
            appointment.related_analysis_id = Some(related);
        }

        if let Some(date) = appointment_date {
            appointment.appointment_date = date;
        }
        if let Some(time) = non_blank(patch.appointment_time) {
            appointment.appointment_time = time.trim().to_string();
        }
        if let Some(kind) = appointment_type {
            appointment.appointment_type = kind;
        }
        if let Some(doctor) = non_blank(patch.doctor_name) {
            appointment.doctor_name = doctor;
        }
        if let Some(department) = non_blank(patch.department) {
            appointment.department = department;
        }
        if let Some(notes) = patch.notes {
            appointment.notes = notes;
        }
        if let Some(sent) = patch.reminder_sent {
            appointment.reminder_sent = sent;
        }
        if let Some(reason) = patch.cancel_reason {
            appointment.cancel_reason = reason;
        }
        match status {
            Some(AppointmentStatus::Completed) => {
                appointment.completion_notes = patch.completion_notes.unwrap_or_default();
            }
            _ => {
                if let Some(notes) = patch.completion_notes {
                    appointment.completion_notes = notes;
                }
            }
        }
        if let Some(status) = status {
            appointment.status = status;
        }
        if appointment.status == AppointmentStatus::Cancelled
            && appointment.cancel_reason.trim().is_empty()
        {
            return Err(MediscanError::validation(
                "Cancel reason cannot be cleared on a cancelled appointment",
            ));
        }
        appointment.updated_by =
            non_blank(patch.updated_by).unwrap_or_else(|| DEFAULT_ACTOR.to_string());
        appointment.updated_at = now;

        if !self.store.update_appointment(&appointment).await? {
            return Err(MediscanError::not_found("Appointment not found"));
        }

        info!(
            "Updated appointment {} ({})",
            appointment.appointment_id,
            appointment.status.as_str()
        );
        self.with_patient(appointment).await
    }

    pub async fn delete(&self, reference: &str) -> Result<()> {
        let appointment = resolve::appointment(self.store.as_ref(), reference).await?;
        if !self.store.delete_appointment(appointment.id).await? {
            return Err(MediscanError::not_found("Appointment not found"));
        }
        info!("Deleted appointment {}", appointment.appointment_id);
        Ok(())
    }

    async fn related_analysis(&self, reference: Option<String>) -> Result<Option<Uuid>> {
        match non_blank(reference) {
            Some(reference) => Ok(Some(
                resolve::analysis(self.store.as_ref(), &reference).await?.id,
            )),
            None => Ok(None),
        }
    }

    async fn with_patient(&self, appointment: Appointment) -> Result<AppointmentDetail> {
        let patient = self.store.find_patient(appointment.patient_id).await?;
        Ok(AppointmentDetail {
            appointment,
            patient: patient.map(|p| p.summary()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mediscan_core::utils::is_valid_record_id;
    use mediscan_core::{Gender, Patient, PatientDetails};
    use mediscan_database::MemoryStore;
    use serde_json::json;

    async fn setup() -> (AppointmentService, Patient) {
        let store = Arc::new(MemoryStore::new());
        let patient = Patient::new(
            "PID-20261018-0001".to_string(),
            PatientDetails {
                full_name: "Fatima Sheikh".to_string(),
                age: 29,
                gender: Gender::Female,
                phone_number: "9123456780".to_string(),
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
        (AppointmentService::new(store), patient)
    }

    fn request(value: serde_json::Value) -> NewAppointment {
        serde_json::from_value(value).unwrap()
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let (service, patient) = setup().await;
        let created = service
            .create(
                request(json!({
                    "patientId": patient.patient_id,
                    "appointmentDate": "2026-10-25",
                    "appointmentTime": "10:30",
                    "appointmentType": "Follow-up"
                })),
                Utc::now(),
            )
            .await
            .unwrap();

        let appointment = &created.appointment;
        assert!(is_valid_record_id(IdKind::Appointment, &appointment.appointment_id));
        assert_eq!(appointment.status, AppointmentStatus::Scheduled);
        assert_eq!(appointment.doctor_name, "Dr. AI Scan");
        assert_eq!(appointment.department, "Pulmonology");
        assert_eq!(appointment.created_by, "System");
        assert_eq!(created.patient.as_ref().unwrap().full_name, "Fatima Sheikh");
    }

    #[tokio::test]
    async fn test_create_validation() {
        let (service, patient) = setup().await;
        let err = service
            .create(request(json!({"patientId": patient.patient_id})), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(
            err.client_message(),
            "Missing required fields: patientId, appointmentDate, appointmentTime, appointmentType"
        );

        let err = service
            .create(
                request(json!({
                    "patientId": patient.patient_id,
                    "appointmentDate": "2026-10-25",
                    "appointmentTime": "10:30",
                    "appointmentType": "Surgery"
                })),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediscanError::Validation(_)));

        let err = service
            .create(
                request(json!({
                    "patientId": patient.patient_id,
                    "appointmentDate": "2026-10-25",
                    "appointmentTime": "10:30",
                    "appointmentType": "Consultation",
                    "relatedAnalysisId": "ANA-1-1"
                })),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.client_message(), "Analysis not found");
    }

    #[tokio::test]
    async fn test_cancel_requires_reason() {
        let (service, patient) = setup().await;
        let created = service
            .create(
                request(json!({
                    "patientId": patient.id.to_string(),
                    "appointmentDate": "2026-11-02",
                    "appointmentTime": "09:00",
                    "appointmentType": "New Scan"
                })),
                Utc::now(),
            )
            .await
            .unwrap();
        let id = created.appointment.appointment_id.clone();

        let err = service
            .update(
                &id,
                AppointmentPatch { status: Some("Cancelled".into()), ..Default::default() },
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.client_message(),
            "Cancel reason is required when cancelling an appointment"
        );
        assert_eq!(
            service.get(&id).await.unwrap().appointment.status,
            AppointmentStatus::Scheduled
        );

        let cancelled = service
            .update(
                &id,
                AppointmentPatch {
                    status: Some("Cancelled".into()),
                    cancel_reason: Some("Travelling".into()),
                    updated_by: Some("Reception".into()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(cancelled.appointment.status, AppointmentStatus::Cancelled);
        assert_eq!(cancelled.appointment.cancel_reason, "Travelling");
        assert_eq!(cancelled.appointment.updated_by, "Reception");

        for blank in ["", "   "] {
            let err = service
                .update(
                    &id,
                    AppointmentPatch { cancel_reason: Some(blank.into()), ..Default::default() },
                    Utc::now(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, MediscanError::Validation(_)));
        }
        let stored = service.get(&id).await.unwrap().appointment;
        assert_eq!(stored.status, AppointmentStatus::Cancelled);
        assert_eq!(stored.cancel_reason, "Travelling");

        let rescheduled = service
            .update(
                &id,
                AppointmentPatch {
                    status: Some("Rescheduled".into()),
                    cancel_reason: Some(String::new()),
                    ..Default::default()
                },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(rescheduled.appointment.status, AppointmentStatus::Rescheduled);
    }

    #[tokio::test]
    async fn test_complete_sets_notes_and_default_actor() {
        let (service, patient) = setup().await;
        let created = service
            .create(
                request(json!({
                    "patientId": patient.patient_id,
                    "appointmentDate": "2026-11-02",
                    "appointmentTime": "09:00",
                    "appointmentType": "Consultation",
                    "createdBy": "Dr. Rao"
                })),
                Utc::now(),
            )
            .await
            .unwrap();

        let completed = service
            .update(
                &created.appointment.id.to_string(),
                AppointmentPatch { status: Some("Completed".into()), ..Default::default() },
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(completed.appointment.status, AppointmentStatus::Completed);
        assert_eq!(completed.appointment.completion_notes, "");
        assert_eq!(completed.appointment.updated_by, "System");
        assert_eq!(completed.appointment.created_by, "Dr. Rao");
    }

    #[tokio::test]
    async fn test_list_filters_and_ordering() {
        let (service, patient) = setup().await;
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        for (date, time) in [
            ("2026-10-20", "15:00"),
            ("2026-10-20", "09:30"),
            ("2026-10-10", "11:00"),
        ] {
            service
                .create(
                    request(json!({
                        "patientId": patient.patient_id,
                        "appointmentDate": date,
                        "appointmentTime": time,
                        "appointmentType": "Follow-up"
                    })),
                    now - Duration::days(30),
                )
                .await
                .unwrap();
        }

        let all = service.list(AppointmentFilter::default(), now).await.unwrap();
        let times: Vec<_> = all.iter().map(|a| a.appointment.appointment_time.as_str()).collect();
        assert_eq!(times, vec!["11:00", "09:30", "15:00"]);

        let day = service
            .list(AppointmentFilter { date: Some("2026-10-20".into()), ..Default::default() }, now)
            .await
            .unwrap();
        assert_eq!(day.len(), 2);

        let upcoming = service
            .list(
                AppointmentFilter {
                    upcoming: Some("true".into()),
                    status: Some("Cancelled".into()),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();
        assert_eq!(upcoming.len(), 2);

        let unknown = service
            .list(
                AppointmentFilter { patient_id: Some("PID-19990101-0001".into()), ..Default::default() },
                now,
            )
            .await
            .unwrap();
        assert!(unknown.is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let (service, patient) = setup().await;
        let created = service
            .create(
                request(json!({
                    "patientId": patient.patient_id,
                    "appointmentDate": "2026-11-02",
                    "appointmentTime": "09:00",
                    "appointmentType": "Emergency"
                })),
                Utc::now(),
            )
            .await
            .unwrap();
        service.delete(&created.appointment.appointment_id).await.unwrap();
        let err = service.get(&created.appointment.appointment_id).await.unwrap_err();
        assert_eq!(err.client_message(), "Appointment not found");
    }
}
