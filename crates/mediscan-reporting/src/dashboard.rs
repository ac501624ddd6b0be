//! 仪表盘统计

use chrono::{DateTime, Datelike, TimeZone, Utc};
use mediscan_core::utils::utc_day_bounds;
use mediscan_core::{
    AnalysisDetail, AppointmentDetail, Diagnosis, MediscanError, Patient, Result,
};
use mediscan_database::{AppointmentQuery, MonthlyCount, RecordStore};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// 图表覆盖的自然月数
pub const CHART_MONTHS: usize = 6;
/// 最近活动条数
pub const RECENT_LIMIT: u32 = 5;

const MONTH_NAMES: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// 各诊断类别计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosisBreakdown {
    pub covid: u64,
    pub pneumonia: u64,
    pub tuberculosis: u64,
    pub normal: u64,
}

impl DiagnosisBreakdown {
    pub fn from_counts(counts: &[(Diagnosis, u64)]) -> Self {
        let mut breakdown = Self::default();
        for (diagnosis, count) in counts {
            let slot = match diagnosis {
                Diagnosis::Covid19 => &mut breakdown.covid,
                Diagnosis::Pneumonia => &mut breakdown.pneumonia,
                Diagnosis::Tuberculosis => &mut breakdown.tuberculosis,
                Diagnosis::Normal => &mut breakdown.normal,
            };
            *slot += count;
        }
        breakdown
    }

    /// 阳性病例 = 非 Normal 之和
    pub fn positive(&self) -> u64 {
        self.covid + self.pneumonia + self.tuberculosis
    }

    pub fn total(&self) -> u64 {
        self.positive() + self.normal
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_patients: u64,
    pub total_scans: u64,
    pub positive_cases: u64,
    pub upcoming_appointments: u64,
    pub breakdown: DiagnosisBreakdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthBucket {
    pub year: i32,
    pub month: u32,
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardCharts {
    pub scans_by_month: Vec<MonthBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub recent_scans: Vec<AnalysisDetail>,
    pub recent_patients: Vec<Patient>,
    pub today_appointments: Vec<AppointmentDetail>,
}

/// 以 `now` 所在月结束的连续自然月，按时间升序
pub fn month_window(now: DateTime<Utc>, months: usize) -> Vec<(i32, u32)> {
    let current = now.year() * 12 + now.month0() as i32;
    (0..months as i32)
        .rev()
        .map(|back| {
            let index = current - back;
            (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
        })
        .collect()
}

/// 按窗口补零
pub fn fill_months(window: &[(i32, u32)], counts: &[MonthlyCount]) -> Vec<MonthBucket> {
    window
        .iter()
        .map(|&(year, month)| MonthBucket {
            year,
            month,
            label: format!("{} {}", MONTH_NAMES[(month - 1) as usize], year),
            count: counts
                .iter()
                .filter(|c| c.year == year && c.month == month)
                .map(|c| c.count)
                .sum(),
        })
        .collect()
}

/// 仪表盘服务
pub struct DashboardService {
    store: Arc<dyn RecordStore>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<DashboardStats> {
        let total_patients = self.store.count_patients().await?;
        let breakdown = DiagnosisBreakdown::from_counts(&self.store.count_by_diagnosis().await?);
        let upcoming_appointments = self
            .store
            .count_appointments(&AppointmentQuery::upcoming(now))
            .await?;

        Ok(DashboardStats {
            total_patients,
            total_scans: breakdown.total(),
            positive_cases: breakdown.positive(),
            upcoming_appointments,
            breakdown,
        })
    }

    pub async fn charts(&self, now: DateTime<Utc>) -> Result<DashboardCharts> {
        let window = month_window(now, CHART_MONTHS);
        let (first_year, first_month) = window
            .first()
            .copied()
            .ok_or_else(|| MediscanError::Internal("Empty chart window".to_string()))?;
        let since = Utc
            .with_ymd_and_hms(first_year, first_month, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| MediscanError::Internal("Invalid chart window start".to_string()))?;

        let counts = self.store.monthly_scan_counts(since).await?;
        debug!("Chart window starts {} with {} non-empty months", since, counts.len());
        Ok(DashboardCharts {
            scans_by_month: fill_months(&window, &counts),
        })
    }

    pub async fn recent(&self, now: DateTime<Utc>) -> Result<RecentActivity> {
        let mut recent_scans = Vec::new();
        for analysis in self.store.list_analyses(None, Some(RECENT_LIMIT)).await? {
            let patient = self.store.find_patient(analysis.patient_id).await?;
            recent_scans.push(AnalysisDetail {
                patient: patient.map(|p| p.summary()),
                analysis,
            });
        }

        let recent_patients = self.store.recent_patients(RECENT_LIMIT).await?;

        let (from, until) = utc_day_bounds(now.date_naive());
        let query = AppointmentQuery {
            from: Some(from),
            until: Some(until),
            ..Default::default()
        };
        let mut today_appointments = Vec::new();
        for appointment in self.store.list_appointments(&query).await? {
            let patient = self.store.find_patient(appointment.patient_id).await?;
            today_appointments.push(AppointmentDetail {
                patient: patient.map(|p| p.summary()),
                appointment,
            });
        }

        Ok(RecentActivity {
            recent_scans,
            recent_patients,
            today_appointments,
        })
    }
}
