//! 记录引用解析
//!
//! 路径参数既可以是内部 UUID，也可以是业务标识符（PID-/ANA-/APT-）。

use mediscan_core::{Analysis, Appointment, MediscanError, Patient, Result};
use mediscan_database::RecordStore;
use uuid::Uuid;

pub async fn find_patient(store: &dyn RecordStore, reference: &str) -> Result<Option<Patient>> {
    let reference = reference.trim();
    match Uuid::parse_str(reference) {
        Ok(id) => store.find_patient(id).await,
        Err(_) => store.find_patient_by_code(reference).await,
    }
}

pub async fn patient(store: &dyn RecordStore, reference: &str) -> Result<Patient> {
    find_patient(store, reference)
        .await?
        .ok_or_else(|| MediscanError::not_found("Patient not found"))
}

pub async fn analysis(store: &dyn RecordStore, reference: &str) -> Result<Analysis> {
    let reference = reference.trim();
    let found = match Uuid::parse_str(reference) {
        Ok(id) => store.find_analysis(id).await?,
        Err(_) => store.find_analysis_by_code(reference).await?,
    };
    found.ok_or_else(|| MediscanError::not_found("Analysis not found"))
}

pub async fn appointment(store: &dyn RecordStore, reference: &str) -> Result<Appointment> {
    let reference = reference.trim();
    let found = match Uuid::parse_str(reference) {
        Ok(id) => store.find_appointment(id).await?,
        Err(_) => store.find_appointment_by_code(reference).await?,
    };
    found.ok_or_else(|| MediscanError::not_found("Appointment not found"))
}
