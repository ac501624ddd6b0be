//! 通用工具函数

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// 业务标识符种类，每种使用独立的原子序列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Patient,
    Analysis,
    Appointment,
}

impl IdKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Patient => "PID",
            Self::Analysis => "ANA",
            Self::Appointment => "APT",
        }
    }

    /// 数据库序列名
    pub fn sequence_name(&self) -> &'static str {
        match self {
            Self::Patient => "patient_id_seq",
            Self::Analysis => "analysis_id_seq",
            Self::Appointment => "appointment_id_seq",
        }
    }
}

/// 生成业务标识符
///
/// 患者: `PID-<YYYYMMDD>-<seq:04>`；诊断与预约: `<前缀>-<毫秒时间戳>-<seq>`。
/// 唯一性由存储层的原子序列保证，时间部分只用于可读性。
pub fn format_record_id(kind: IdKind, now: DateTime<Utc>, sequence: u64) -> String {
    match kind {
        IdKind::Patient => format!(
            "{}-{}-{:04}",
            kind.prefix(),
            now.format("%Y%m%d"),
            sequence
        ),
        IdKind::Analysis | IdKind::Appointment => {
            format!("{}-{}-{}", kind.prefix(), now.timestamp_millis(), sequence)
        }
    }
}

/// 验证业务标识符格式
pub fn is_valid_record_id(kind: IdKind, id: &str) -> bool {
    let mut parts = id.splitn(3, '-');
    let (Some(prefix), Some(stamp), Some(seq)) = (parts.next(), parts.next(), parts.next()) else {
        return false;
    };
    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    let stamp_ok = match kind {
        IdKind::Patient => stamp.len() == 8 && digits(stamp),
        IdKind::Analysis | IdKind::Appointment => digits(stamp),
    };
    prefix == kind.prefix() && stamp_ok && digits(seq)
}

/// UTC 自然日区间 `[当日 00:00, 次日 00:00)`
pub fn utc_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));
    (start, start + Duration::days(1))
}

const MASK: &str = "***";

/// 隐藏连接串中的口令（userinfo 与 `password` 查询参数），仅用于日志。
/// 无法识别为 URL 的值整体隐藏。
pub fn mask_secret(value: &str) -> String {
    let Some((scheme, rest)) = value.split_once("://") else {
        return MASK.to_string();
    };

    let (location, query) = match rest.split_once('?') {
        Some((location, query)) => (location, Some(query)),
        None => (rest, None),
    };

    // 口令中可能含有 '@' 或 '/'，以最后一个 '@' 划分 userinfo
    let location = match location.rsplit_once('@') {
        Some((userinfo, host)) => match userinfo.split_once(':') {
            Some((user, _)) => format!("{}:{}@{}", user, MASK, host),
            None => format!("{}@{}", userinfo, host),
        },
        None => location.to_string(),
    };

    let mut masked = format!("{}://{}", scheme, location);
    if let Some(query) = query {
        let params: Vec<String> = query
            .split('&')
            .map(|pair| match pair.split_once('=') {
                Some((key, _)) if key.eq_ignore_ascii_case("password") => {
                    format!("{}={}", key, MASK)
                }
                _ => pair.to_string(),
            })
            .collect();
        masked.push('?');
        masked.push_str(&params.join("&"));
    }
    masked
}
