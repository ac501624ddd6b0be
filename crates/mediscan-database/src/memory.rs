//! 内存存储实现，用于测试和未配置数据库时的本地运行

use crate::store::{AppointmentQuery, MonthlyCount, Page, PatientQuery, RecordStore};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use mediscan_core::utils::IdKind;
use mediscan_core::{
    Analysis, Appointment, Diagnosis, MediscanError, Patient, PatientDetails, Result, Settings,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    patients: HashMap<Uuid, Patient>,
    patient_codes: HashMap<String, Uuid>,
    analyses: HashMap<Uuid, Analysis>,
    analysis_codes: HashMap<String, Uuid>,
    appointments: HashMap<Uuid, Appointment>,
    appointment_codes: HashMap<String, Uuid>,
    settings: Option<Settings>,
}

/// 内存记录存储
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    patient_seq: AtomicU64,
    analysis_seq: AtomicU64,
    appointment_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sequence(&self, kind: IdKind) -> &AtomicU64 {
        match kind {
            IdKind::Patient => &self.patient_seq,
            IdKind::Analysis => &self.analysis_seq,
            IdKind::Appointment => &self.appointment_seq,
        }
    }
}

fn duplicate(kind: &str, code: &str) -> MediscanError {
    MediscanError::Conflict(format!("{} '{}' already exists", kind, code))
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn next_sequence(&self, kind: IdKind) -> Result<u64> {
        Ok(self.sequence(kind).fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn insert_patient(&self, patient: &Patient) -> Result<()> {
        let mut state = self.state.write().await;
        if state.patient_codes.contains_key(&patient.patient_id)
            || state.patients.contains_key(&patient.id)
        {
            return Err(duplicate("Patient", &patient.patient_id));
        }
        state.patient_codes.insert(patient.patient_id.clone(), patient.id);
        state.patients.insert(patient.id, patient.clone());
        Ok(())
    }

    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>> {
        Ok(self.state.read().await.patients.get(&id).cloned())
    }

    async fn find_patient_by_code(&self, patient_id: &str) -> Result<Option<Patient>> {
        let state = self.state.read().await;
        Ok(state
            .patient_codes
            .get(patient_id)
            .and_then(|id| state.patients.get(id))
            .cloned())
    }

    async fn list_patients(&self, query: &PatientQuery) -> Result<Page<Patient>> {
        let state = self.state.read().await;
        let mut matched: Vec<&Patient> =
            state.patients.values().filter(|p| query.matches(p)).collect();
        matched.sort_by(|a, b| query.compare(a, b));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(query.offset() as usize)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok(Page { items, total, page: query.page, limit: query.limit })
    }

    async fn update_patient_details(
        &self,
        id: Uuid,
        details: &PatientDetails,
        at: DateTime<Utc>,
    ) -> Result<Option<Patient>> {
        let mut state = self.state.write().await;
        Ok(state.patients.get_mut(&id).map(|patient| {
            patient.details = details.clone();
            patient.updated_at = at;
            patient.clone()
        }))
    }

    async fn record_patient_visit(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Patient>> {
        let mut state = self.state.write().await;
        Ok(state.patients.get_mut(&id).map(|patient| {
            patient.total_scans += 1;
            patient.last_visit_date = Some(at);
            patient.updated_at = at;
            patient.clone()
        }))
    }

    async fn delete_patient_cascade(&self, id: Uuid) -> Result<Option<u64>> {
        let mut state = self.state.write().await;
        let Some(patient) = state.patients.remove(&id) else {
            return Ok(None);
        };
        state.patient_codes.remove(&patient.patient_id);

        let owned: Vec<(Uuid, String)> = state
            .analyses
            .values()
            .filter(|a| a.patient_id == id)
            .map(|a| (a.id, a.analysis_id.clone()))
            .collect();
        for (analysis_id, code) in &owned {
            state.analyses.remove(analysis_id);
            state.analysis_codes.remove(code);
        }
        Ok(Some(owned.len() as u64))
    }

    async fn count_patients(&self) -> Result<u64> {
        Ok(self.state.read().await.patients.len() as u64)
    }

    async fn recent_patients(&self, limit: u32) -> Result<Vec<Patient>> {
        let state = self.state.read().await;
        let mut patients: Vec<&Patient> = state.patients.values().collect();
        patients.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(patients.into_iter().take(limit as usize).cloned().collect())
    }

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<()> {
        let mut state = self.state.write().await;
        if state.analysis_codes.contains_key(&analysis.analysis_id)
            || state.analyses.contains_key(&analysis.id)
        {
            return Err(duplicate("Analysis", &analysis.analysis_id));
        }
        state.analysis_codes.insert(analysis.analysis_id.clone(), analysis.id);
        state.analyses.insert(analysis.id, analysis.clone());
        Ok(())
    }

    async fn find_analysis(&self, id: Uuid) -> Result<Option<Analysis>> {
        Ok(self.state.read().await.analyses.get(&id).cloned())
    }

    async fn find_analysis_by_code(&self, analysis_id: &str) -> Result<Option<Analysis>> {
        let state = self.state.read().await;
        Ok(state
            .analysis_codes
            .get(analysis_id)
            .and_then(|id| state.analyses.get(id))
            .cloned())
    }

    async fn list_analyses(
        &self,
        patient_id: Option<Uuid>,
        limit: Option<u32>,
    ) -> Result<Vec<Analysis>> {
        let state = self.state.read().await;
        let mut analyses: Vec<&Analysis> = state
            .analyses
            .values()
            .filter(|a| patient_id.map_or(true, |p| a.patient_id == p))
            .collect();
        analyses.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        let limit = limit.map_or(usize::MAX, |l| l as usize);
        Ok(analyses.into_iter().take(limit).cloned().collect())
    }

    async fn update_analysis(&self, analysis: &Analysis) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.analyses.get_mut(&analysis.id) {
            Some(existing) => {
                *existing = analysis.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count_by_diagnosis(&self) -> Result<Vec<(Diagnosis, u64)>> {
        let state = self.state.read().await;
        let mut counts: BTreeMap<Diagnosis, u64> = BTreeMap::new();
        for analysis in state.analyses.values() {
            *counts.entry(analysis.diagnosis).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }

    async fn monthly_scan_counts(&self, since: DateTime<Utc>) -> Result<Vec<MonthlyCount>> {
        let state = self.state.read().await;
        let mut buckets: BTreeMap<(i32, u32), u64> = BTreeMap::new();
        for analysis in state.analyses.values().filter(|a| a.created_at >= since) {
            let key = (analysis.created_at.year(), analysis.created_at.month());
            *buckets.entry(key).or_default() += 1;
        }
        Ok(buckets
            .into_iter()
            .map(|((year, month), count)| MonthlyCount { year, month, count })
            .collect())
    }

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<()> {
        let mut state = self.state.write().await;
        if state.appointment_codes.contains_key(&appointment.appointment_id)
            || state.appointments.contains_key(&appointment.id)
        {
            return Err(duplicate("Appointment", &appointment.appointment_id));
        }
        state
            .appointment_codes
            .insert(appointment.appointment_id.clone(), appointment.id);
        state.appointments.insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>> {
        Ok(self.state.read().await.appointments.get(&id).cloned())
    }

    async fn find_appointment_by_code(&self, appointment_id: &str) -> Result<Option<Appointment>> {
        let state = self.state.read().await;
        Ok(state
            .appointment_codes
            .get(appointment_id)
            .and_then(|id| state.appointments.get(id))
            .cloned())
    }

    async fn list_appointments(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>> {
        let state = self.state.read().await;
        let mut appointments: Vec<&Appointment> = state
            .appointments
            .values()
            .filter(|a| query.matches(a))
            .collect();
        appointments.sort_by(|a, b| {
            a.appointment_date
                .cmp(&b.appointment_date)
                .then_with(|| a.appointment_time.cmp(&b.appointment_time))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(appointments.into_iter().cloned().collect())
    }

    async fn count_appointments(&self, query: &AppointmentQuery) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state.appointments.values().filter(|a| query.matches(a)).count() as u64)
    }

    async fn update_appointment(&self, appointment: &Appointment) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.appointments.get_mut(&appointment.id) {
            Some(existing) => {
                *existing = appointment.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_appointment(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state.write().await;
        match state.appointments.remove(&id) {
            Some(appointment) => {
                state.appointment_codes.remove(&appointment.appointment_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn load_settings(&self) -> Result<Settings> {
        let mut state = self.state.write().await;
        Ok(state.settings.get_or_insert_with(Settings::default).clone())
    }

    async fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.state.write().await.settings = Some(settings.clone());
        Ok(())
    }

    async fn record_training_date(&self, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .settings
            .get_or_insert_with(Settings::default)
            .last_training_date = Some(at);
        Ok(())
    }
}
