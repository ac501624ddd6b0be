//! 患者服务

use crate::resolve;
use chrono::{DateTime, Utc};
use mediscan_core::utils::{format_record_id, IdKind};
use mediscan_core::{BloodGroup, Gender, MediscanError, Patient, PatientDetails, Result};
use mediscan_database::{Page, PatientQuery, PatientSortField, RecordStore, SortOrder};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// 患者信息的部分字段，注册与更新共用
///
/// 系统维护的字段（patientId、totalScans、lastVisitDate）不在此列，客户端提供时被忽略。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientPatch {
    pub full_name: Option<String>,
    pub age: Option<i32>,
    pub gender: Option<Gender>,
    pub phone_number: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
    pub blood_group: Option<BloodGroup>,
    pub medical_conditions: Option<String>,
}

impl PatientPatch {
    /// 注册时要求必填字段齐全
    pub fn into_new_details(self) -> Result<PatientDetails> {
        let mut missing = Vec::new();
        if self.full_name.is_none() {
            missing.push("fullName");
        }
        if self.age.is_none() {
            missing.push("age");
        }
        if self.gender.is_none() {
            missing.push("gender");
        }
        if self.phone_number.is_none() {
            missing.push("phoneNumber");
        }

        match (self.full_name, self.age, self.gender, self.phone_number) {
            (Some(full_name), Some(age), Some(gender), Some(phone_number)) => {
                let details = PatientDetails {
                    full_name: full_name.trim().to_string(),
                    age,
                    gender,
                    phone_number: phone_number.trim().to_string(),
                    email: self.email,
                    address: self.address,
                    emergency_contact_name: self.emergency_contact_name,
                    emergency_contact_phone: self.emergency_contact_phone,
                    blood_group: self.blood_group,
                    medical_conditions: self.medical_conditions,
                };
                details.validate()?;
                Ok(details)
            }
            _ => Err(MediscanError::validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            ))),
        }
    }

    /// 在现有信息上应用补丁，结果重新校验
    pub fn apply_to(self, current: &PatientDetails) -> Result<PatientDetails> {
        let mut details = current.clone();
        if let Some(full_name) = self.full_name {
            details.full_name = full_name.trim().to_string();
        }
        if let Some(age) = self.age {
            details.age = age;
        }
        if let Some(gender) = self.gender {
            details.gender = gender;
        }
        if let Some(phone_number) = self.phone_number {
            details.phone_number = phone_number.trim().to_string();
        }
        if self.email.is_some() {
            details.email = self.email;
        }
        if self.address.is_some() {
            details.address = self.address;
        }
        if self.emergency_contact_name.is_some() {
            details.emergency_contact_name = self.emergency_contact_name;
        }
        if self.emergency_contact_phone.is_some() {
            details.emergency_contact_phone = self.emergency_contact_phone;
        }
        if self.blood_group.is_some() {
            details.blood_group = self.blood_group;
        }
        if self.medical_conditions.is_some() {
            details.medical_conditions = self.medical_conditions;
        }
        details.validate()?;
        Ok(details)
    }
}

/// 患者列表查询参数（原始字符串）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientFilter {
    pub search: Option<String>,
    pub gender: Option<String>,
    pub age_min: Option<String>,
    pub age_max: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

fn parse_number<T: std::str::FromStr>(name: &str, value: Option<&str>) -> Result<Option<T>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| MediscanError::validation(format!("Invalid {} '{}'", name, raw))),
    }
}

impl PatientFilter {
    pub fn into_query(self) -> Result<PatientQuery> {
        let gender = match self.gender.as_deref().map(str::trim).filter(|g| !g.is_empty()) {
            Some(raw) => Some(raw.parse::<Gender>()?),
            None => None,
        };
        let sort_by = match self.sort_by.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw.parse::<PatientSortField>()?,
            None => PatientSortField::default(),
        };

        let query = PatientQuery {
            search: self.search,
            gender,
            age_min: parse_number("ageMin", self.age_min.as_deref())?,
            age_max: parse_number("ageMax", self.age_max.as_deref())?,
            sort_by,
            order: SortOrder::from_param(self.order.as_deref()),
            page: parse_number("page", self.page.as_deref())?.unwrap_or(1),
            limit: parse_number("limit", self.limit.as_deref())?
                .unwrap_or(PatientQuery::DEFAULT_LIMIT),
        };
        query.validate()?;
        Ok(query)
    }
}

/// 患者服务
pub struct PatientService {
    store: Arc<dyn RecordStore>,
}

impl PatientService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// 注册新患者，患者号由存储序列生成
    pub async fn register(&self, patch: PatientPatch, now: DateTime<Utc>) -> Result<Patient> {
        let details = patch.into_new_details()?;
        let sequence = self.store.next_sequence(IdKind::Patient).await?;
        let patient = Patient::new(format_record_id(IdKind::Patient, now, sequence), details, now);
        self.store.insert_patient(&patient).await?;

        info!("Registered patient {}", patient.patient_id);
        Ok(patient)
    }

    pub async fn list(&self, query: &PatientQuery) -> Result<Page<Patient>> {
        query.validate()?;
        self.store.list_patients(query).await
    }

    pub async fn get(&self, reference: &str) -> Result<Patient> {
        resolve::patient(self.store.as_ref(), reference).await
    }

    pub async fn update(
        &self,
        reference: &str,
        patch: PatientPatch,
        now: DateTime<Utc>,
    ) -> Result<Patient> {
        let current = resolve::patient(self.store.as_ref(), reference).await?;
        let details = patch.apply_to(&current.details)?;
        let updated = self
            .store
            .update_patient_details(current.id, &details, now)
            .await?
            .ok_or_else(|| MediscanError::not_found("Patient not found"))?;

        info!("Updated patient {}", updated.patient_id);
        Ok(updated)
    }

    /// 级联删除，返回一并删除的诊断记录数
    pub async fn delete(&self, reference: &str) -> Result<u64> {
        let patient = resolve::patient(self.store.as_ref(), reference).await?;
        let removed = self
            .store
            .delete_patient_cascade(patient.id)
            .await?
            .ok_or_else(|| MediscanError::not_found("Patient not found"))?;

        info!(
            "Deleted patient {} with {} analyses",
            patient.patient_id, removed
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediscan_core::utils::is_valid_record_id;
    use mediscan_database::MemoryStore;
    use serde_json::json;

    fn patch(value: serde_json::Value) -> PatientPatch {
        serde_json::from_value(value).unwrap()
    }

    fn service() -> PatientService {
        PatientService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_register_generates_identifier() {
        let service = service();
        let patient = service
            .register(
                patch(json!({
                    "fullName": " Lakshmi Menon ",
                    "age": 47,
                    "gender": "Female",
                    "phoneNumber": "9840011223",
                    "patientId": "PID-CLIENT",
                    "totalScans": 99
                })),
                Utc::now(),
            )
            .await
            .unwrap();

        assert!(is_valid_record_id(IdKind::Patient, &patient.patient_id));
        assert_eq!(patient.details.full_name, "Lakshmi Menon");
        assert_eq!(patient.total_scans, 0);
        assert_eq!(service.get(&patient.patient_id).await.unwrap().id, patient.id);
        assert_eq!(service.get(&patient.id.to_string()).await.unwrap().id, patient.id);
    }

    #[tokio::test]
    async fn test_register_validation() {
        let service = service();
        let err = service
            .register(patch(json!({"fullName": "A", "gender": "Male"})), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.client_message(), "Missing required fields: age, phoneNumber");

        let err = service
            .register(
                patch(json!({"fullName": "A", "age": 130, "gender": "Male", "phoneNumber": "1"})),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediscanError::Validation(_)));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_get_distinct_ids() {
        let service = Arc::new(service());
        let now = Utc::now();
        let mut handles = Vec::new();
        for i in 0..20 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                service
                    .register(
                        patch(json!({
                            "fullName": format!("Patient {}", i),
                            "age": 30,
                            "gender": "Other",
                            "phoneNumber": "9000000000"
                        })),
                        now,
                    )
                    .await
                    .unwrap()
                    .patient_id
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn test_update_is_partial_and_validated() {
        let service = service();
        let patient = service
            .register(
                patch(json!({"fullName": "Arjun", "age": 33, "gender": "Male", "phoneNumber": "1"})),
                Utc::now(),
            )
            .await
            .unwrap();

        let updated = service
            .update(&patient.patient_id, patch(json!({"age": 34, "bloodGroup": "O-"})), Utc::now())
            .await
            .unwrap();
        assert_eq!(updated.details.age, 34);
        assert_eq!(updated.details.full_name, "Arjun");
        assert_eq!(updated.details.blood_group, Some(BloodGroup::ONegative));

        let err = service
            .update(&patient.patient_id, patch(json!({"fullName": "  "})), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, MediscanError::Validation(_)));

        let err = service
            .update("PID-20200101-9999", patch(json!({"age": 40})), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, MediscanError::NotFound(_)));
    }

    #[test]
    fn test_filter_parsing() {
        let filter = PatientFilter {
            gender: Some("Female".into()),
            age_min: Some("20".into()),
            sort_by: Some("age".into()),
            order: Some("asc".into()),
            page: Some("2".into()),
            limit: Some("5".into()),
            ..Default::default()
        };
        let query = filter.into_query().unwrap();
        assert_eq!(query.gender, Some(Gender::Female));
        assert_eq!(query.age_min, Some(20));
        assert_eq!(query.sort_by, PatientSortField::Age);
        assert_eq!(query.order, SortOrder::Ascending);
        assert_eq!((query.page, query.limit), (2, 5));

        let bad_sort = PatientFilter { sort_by: Some("password".into()), ..Default::default() };
        assert!(bad_sort.into_query().is_err());
        let bad_limit = PatientFilter { limit: Some("500".into()), ..Default::default() };
        assert!(bad_limit.into_query().is_err());
        let bad_age = PatientFilter { age_max: Some("old".into()), ..Default::default() };
        assert!(bad_age.into_query().is_err());
    }
}
