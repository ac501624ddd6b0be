//! 存储接口与查询条件

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mediscan_core::utils::IdKind;
use mediscan_core::{
    Analysis, Appointment, AppointmentStatus, Diagnosis, Gender, MediscanError, Patient,
    PatientDetails, Result, Settings,
};
use std::cmp::Ordering;
use std::str::FromStr;
use uuid::Uuid;

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }

    /// `asc` 为升序，其余均为降序
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("asc") => Self::Ascending,
            _ => Self::Descending,
        }
    }
}

/// 患者列表可排序字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatientSortField {
    #[default]
    CreatedAt,
    FullName,
    Age,
    PatientId,
    RegistrationDate,
    LastVisitDate,
    TotalScans,
}

impl PatientSortField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::FullName => "full_name",
            Self::Age => "age",
            Self::PatientId => "patient_id",
            Self::RegistrationDate => "registration_date",
            Self::LastVisitDate => "last_visit_date",
            Self::TotalScans => "total_scans",
        }
    }

    fn compare(&self, a: &Patient, b: &Patient) -> Ordering {
        match self {
            Self::CreatedAt => a.created_at.cmp(&b.created_at),
            Self::FullName => a
                .details
                .full_name
                .to_lowercase()
                .cmp(&b.details.full_name.to_lowercase()),
            Self::Age => a.details.age.cmp(&b.details.age),
            Self::PatientId => a.patient_id.cmp(&b.patient_id),
            Self::RegistrationDate => a.registration_date.cmp(&b.registration_date),
            Self::LastVisitDate => a.last_visit_date.cmp(&b.last_visit_date),
            Self::TotalScans => a.total_scans.cmp(&b.total_scans),
        }
    }
}

impl FromStr for PatientSortField {
    type Err = MediscanError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "createdAt" => Ok(Self::CreatedAt),
            "fullName" => Ok(Self::FullName),
            "age" => Ok(Self::Age),
            "patientId" => Ok(Self::PatientId),
            "registrationDate" => Ok(Self::RegistrationDate),
            "lastVisitDate" => Ok(Self::LastVisitDate),
            "totalScans" => Ok(Self::TotalScans),
            _ => Err(MediscanError::validation(format!("Cannot sort by '{}'", s))),
        }
    }
}

/// 患者列表查询条件
#[derive(Debug, Clone, PartialEq)]
pub struct PatientQuery {
    /// 姓名/患者号/电话的不区分大小写子串匹配
    pub search: Option<String>,
    pub gender: Option<Gender>,
    pub age_min: Option<i32>,
    pub age_max: Option<i32>,
    pub sort_by: PatientSortField,
    pub order: SortOrder,
    pub page: u32,
    pub limit: u32,
}

impl Default for PatientQuery {
    fn default() -> Self {
        Self {
            search: None,
            gender: None,
            age_min: None,
            age_max: None,
            sort_by: PatientSortField::CreatedAt,
            order: SortOrder::Descending,
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

impl PatientQuery {
    pub const DEFAULT_LIMIT: u32 = 20;
    pub const MAX_LIMIT: u32 = 100;

    pub fn validate(&self) -> Result<()> {
        if self.page == 0 {
            return Err(MediscanError::validation("page must be at least 1"));
        }
        if self.limit == 0 || self.limit > Self::MAX_LIMIT {
            return Err(MediscanError::validation(format!(
                "limit must be between 1 and {}",
                Self::MAX_LIMIT
            )));
        }
        Ok(())
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn matches(&self, patient: &Patient) -> bool {
        if let Some(term) = self.search_term() {
            let term = term.to_lowercase();
            let hit = [
                patient.details.full_name.as_str(),
                patient.patient_id.as_str(),
                patient.details.phone_number.as_str(),
            ]
            .iter()
            .any(|field| field.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        if self.gender.is_some_and(|g| g != patient.details.gender) {
            return false;
        }
        if self.age_min.is_some_and(|min| patient.details.age < min) {
            return false;
        }
        if self.age_max.is_some_and(|max| patient.details.age > max) {
            return false;
        }
        true
    }

    pub fn compare(&self, a: &Patient, b: &Patient) -> Ordering {
        let ordering = self.sort_by.compare(a, b).then_with(|| a.id.cmp(&b.id));
        match self.order {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// 分页结果
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            0
        } else {
            self.total.div_ceil(u64::from(self.limit))
        }
    }
}

/// 预约查询条件，时间区间为 `[from, until)`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentQuery {
    pub patient_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl AppointmentQuery {
    /// 未来的已预约记录
    pub fn upcoming(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(AppointmentStatus::Scheduled),
            from: Some(now),
            ..Default::default()
        }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.patient_id.map_or(true, |id| appointment.patient_id == id)
            && self.status.map_or(true, |s| appointment.status == s)
            && self.from.map_or(true, |from| appointment.appointment_date >= from)
            && self.until.map_or(true, |until| appointment.appointment_date < until)
    }
}

/// 按自然月统计的扫描数量
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthlyCount {
    pub year: i32,
    pub month: u32,
    pub count: u64,
}

/// 记录存储接口
///
/// 单条记录写入是原子的；除级联删除外不使用跨记录事务。
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// 取下一个序列值（原子递增）
    async fn next_sequence(&self, kind: IdKind) -> Result<u64>;

    // ========== 患者 ==========

    /// 插入患者，患者号重复时返回 `Conflict`
    async fn insert_patient(&self, patient: &Patient) -> Result<()>;
    async fn find_patient(&self, id: Uuid) -> Result<Option<Patient>>;
    async fn find_patient_by_code(&self, patient_id: &str) -> Result<Option<Patient>>;
    async fn list_patients(&self, query: &PatientQuery) -> Result<Page<Patient>>;
    /// 只更新人口学字段，不影响扫描计数
    async fn update_patient_details(
        &self,
        id: Uuid,
        details: &PatientDetails,
        at: DateTime<Utc>,
    ) -> Result<Option<Patient>>;
    /// 扫描计数原子加一并更新最近就诊时间
    async fn record_patient_visit(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Patient>>;
    /// 删除患者及其全部诊断记录，返回删除的诊断记录数；患者不存在时返回 `None`
    async fn delete_patient_cascade(&self, id: Uuid) -> Result<Option<u64>>;
    async fn count_patients(&self) -> Result<u64>;
    async fn recent_patients(&self, limit: u32) -> Result<Vec<Patient>>;

    // ========== 诊断记录 ==========

    async fn insert_analysis(&self, analysis: &Analysis) -> Result<()>;
    async fn find_analysis(&self, id: Uuid) -> Result<Option<Analysis>>;
    async fn find_analysis_by_code(&self, analysis_id: &str) -> Result<Option<Analysis>>;
    /// 按创建时间倒序
    async fn list_analyses(&self, patient_id: Option<Uuid>, limit: Option<u32>)
        -> Result<Vec<Analysis>>;
    /// 整条替换，记录不存在时返回 `false`
    async fn update_analysis(&self, analysis: &Analysis) -> Result<bool>;
    async fn count_by_diagnosis(&self) -> Result<Vec<(Diagnosis, u64)>>;
    async fn monthly_scan_counts(&self, since: DateTime<Utc>) -> Result<Vec<MonthlyCount>>;

    // ========== 预约 ==========

    async fn insert_appointment(&self, appointment: &Appointment) -> Result<()>;
    async fn find_appointment(&self, id: Uuid) -> Result<Option<Appointment>>;
    async fn find_appointment_by_code(&self, appointment_id: &str) -> Result<Option<Appointment>>;
    /// 按日期、时间升序
    async fn list_appointments(&self, query: &AppointmentQuery) -> Result<Vec<Appointment>>;
    async fn count_appointments(&self, query: &AppointmentQuery) -> Result<u64>;
    async fn update_appointment(&self, appointment: &Appointment) -> Result<bool>;
    async fn delete_appointment(&self, id: Uuid) -> Result<bool>;

    // ========== 设置 ==========

    /// 读取设置单例，不存在时以默认值幂等创建
    async fn load_settings(&self) -> Result<Settings>;
    async fn save_settings(&self, settings: &Settings) -> Result<()>;
    /// 只写入最近训练时间，不覆盖其他设置字段
    async fn record_training_date(&self, at: DateTime<Utc>) -> Result<()>;
}
