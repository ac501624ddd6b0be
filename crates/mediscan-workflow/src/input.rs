//! 请求字段处理

use chrono::{DateTime, NaiveDate, Utc};
use mediscan_core::utils::utc_day_bounds;
use mediscan_core::{MediscanError, Result};

/// 非空白字符串
pub fn present(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

/// 空白字符串视为未提供
pub fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// 解析日期，接受 `YYYY-MM-DD`（当日 00:00 UTC）或 RFC 3339 时间戳
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(utc_day_bounds(date).0);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| MediscanError::validation(format!("Invalid date '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_date_forms() {
        assert_eq!(
            parse_date("2026-10-20").unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date("2026-10-20T14:30:00+05:30").unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 20, 9, 0, 0).unwrap()
        );
        assert!(parse_date("20/10/2026").is_err());
    }

    #[test]
    fn test_blank_handling() {
        assert!(!present(&Some("  ".to_string())));
        assert!(present(&Some("x".to_string())));
        assert_eq!(non_blank(Some(String::new())), None);
    }
}
