//! Normalization helpers shared by the platform adapters: engagement heat
//! scoring, HTML stripping, and the timestamp formats Chinese social
//! platforms actually emit (absolute, month-day, and relative forms like
//! "5分钟前" or "昨天").

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use crystal_core::PLATFORM_TZ_OFFSET_HOURS;

/// Engagement heat: likes + 2·comments + 3·reposts.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn heat_score(likes: i64, comments: i64, reposts: i64) -> f64 {
    (likes + comments * 2 + reposts * 3) as f64
}

fn platform_tz() -> FixedOffset {
    FixedOffset::east_opt(PLATFORM_TZ_OFFSET_HOURS * 3600)
        .unwrap_or_else(|| unreachable!("fixed offset is in range"))
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

/// Parse a platform timestamp string into UTC.
///
/// Naive timestamps are interpreted in the platforms' fixed UTC+8 zone.
/// Year-less forms (`"12-07 10:30"`) take the current year; relative forms
/// are resolved against `now`. Returns `None` for anything unparseable —
/// the caller skips the record.
#[must_use]
pub fn parse_platform_time(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    let tz = platform_tz();

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return local_to_utc(naive, tz);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return local_to_utc(date.and_hms_opt(0, 0, 0)?, tz);
        }
    }
    // "12-07 10:30" carries no year; assume the current local year.
    let local_year = now.with_timezone(&tz).year();
    if let Ok(naive) = NaiveDateTime::parse_from_str(&format!("{local_year}-{s}"), "%Y-%m-%d %H:%M")
    {
        return local_to_utc(naive, tz);
    }

    parse_relative_time(s, now)
}

fn local_to_utc(naive: NaiveDateTime, tz: FixedOffset) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_relative_time(s: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if s.contains("刚刚") || s.contains('秒') {
        return Some(now);
    }
    let digits: String = s.chars().filter(char::is_ascii_digit).collect();
    let n: i64 = digits.parse().unwrap_or(1);
    if s.contains("分钟前") {
        Some(now - Duration::minutes(n))
    } else if s.contains("小时前") {
        Some(now - Duration::hours(n))
    } else if s.contains("昨天") {
        Some(now - Duration::days(1))
    } else if s.contains("天前") {
        Some(now - Duration::days(n))
    } else {
        None
    }
}

/// Parse weibo's RFC2822-ish `created_at` (`"Sat Dec 07 10:30:00 +0800 2024"`),
/// falling back to [`parse_platform_time`] for the mobile API's short forms.
#[must_use]
pub fn parse_weibo_time(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if let Ok(dt) = DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y") {
        return Some(dt.with_timezone(&Utc));
    }
    parse_platform_time(s, now)
}

/// Strip HTML tags from rich-text content (zhihu answers and articles).
#[must_use]
pub fn strip_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Truncate to at most `max_chars` characters (not bytes; content is CJK).
#[must_use]
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Platform ids arrive as either JSON strings or numbers; render both as a
/// string, rejecting empty and non-scalar values.
#[must_use]
pub fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Utc> {
        // 2025-08-01 04:00:00 UTC = 12:00 local (UTC+8).
        Utc.with_ymd_and_hms(2025, 8, 1, 4, 0, 0).unwrap()
    }

    #[test]
    fn heat_score_weights_engagement() {
        assert_eq!(heat_score(10, 5, 2), 26.0);
        assert_eq!(heat_score(0, 0, 0), 0.0);
    }

    #[test]
    fn absolute_timestamp_is_interpreted_as_utc_plus_8() {
        let parsed = parse_platform_time("2025-08-01 12:00:00", fixed_now()).unwrap();
        assert_eq!(parsed, fixed_now());
    }

    #[test]
    fn date_only_is_local_midnight() {
        let parsed = parse_platform_time("2025-08-01", fixed_now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 7, 31, 16, 0, 0).unwrap());
    }

    #[test]
    fn month_day_form_assumes_current_year() {
        let parsed = parse_platform_time("08-01 12:00", fixed_now()).unwrap();
        assert_eq!(parsed, fixed_now());
    }

    #[test]
    fn relative_minutes_subtract_from_now() {
        let parsed = parse_platform_time("5分钟前", fixed_now()).unwrap();
        assert_eq!(parsed, fixed_now() - Duration::minutes(5));
    }

    #[test]
    fn relative_hours_and_days() {
        assert_eq!(
            parse_platform_time("2小时前", fixed_now()).unwrap(),
            fixed_now() - Duration::hours(2)
        );
        assert_eq!(
            parse_platform_time("昨天", fixed_now()).unwrap(),
            fixed_now() - Duration::days(1)
        );
        assert_eq!(
            parse_platform_time("3天前", fixed_now()).unwrap(),
            fixed_now() - Duration::days(3)
        );
    }

    #[test]
    fn just_now_maps_to_now() {
        assert_eq!(parse_platform_time("刚刚", fixed_now()).unwrap(), fixed_now());
        assert_eq!(
            parse_platform_time("30秒前", fixed_now()).unwrap(),
            fixed_now()
        );
    }

    #[test]
    fn garbage_returns_none() {
        assert!(parse_platform_time("", fixed_now()).is_none());
        assert!(parse_platform_time("not a time", fixed_now()).is_none());
    }

    #[test]
    fn weibo_long_form_parses_with_offset() {
        let parsed = parse_weibo_time("Sat Dec 07 10:30:00 +0800 2024", fixed_now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 12, 7, 2, 30, 0).unwrap());
    }

    #[test]
    fn strip_html_removes_tags_keeps_text() {
        assert_eq!(strip_html("<p>看好<b>银行</b>股</p>"), "看好银行股");
        assert_eq!(strip_html("no tags"), "no tags");
    }

    #[test]
    fn truncate_chars_is_char_boundary_safe() {
        assert_eq!(truncate_chars("招商银行", 2), "招商");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }

    #[test]
    fn json_id_accepts_strings_and_numbers() {
        assert_eq!(json_id(&serde_json::json!("abc")).as_deref(), Some("abc"));
        assert_eq!(json_id(&serde_json::json!(42)).as_deref(), Some("42"));
        assert!(json_id(&serde_json::json!("")).is_none());
        assert!(json_id(&serde_json::json!(null)).is_none());
    }
}
