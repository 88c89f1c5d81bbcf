use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};

/// All three platforms operate in UTC+8; crawl windows are day-aligned there.
pub const PLATFORM_TZ_OFFSET_HOURS: i32 = 8;

/// The half-open-ish time window one crawl run collects. Both bounds are
/// inclusive, matching the platforms' second-granularity timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CrawlWindow {
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

fn platform_tz() -> FixedOffset {
    FixedOffset::east_opt(PLATFORM_TZ_OFFSET_HOURS * 3600)
        .unwrap_or_else(|| unreachable!("fixed offset is in range"))
}

/// Window covering one calendar day in the platform timezone.
#[must_use]
pub fn day_window(date: NaiveDate) -> CrawlWindow {
    let tz = platform_tz();
    let start = tz
        .from_local_datetime(&date.and_hms_opt(0, 0, 0).expect("midnight is valid"))
        .single()
        .expect("fixed offset has no DST gaps")
        .with_timezone(&Utc);
    let end = tz
        .from_local_datetime(&date.and_hms_opt(23, 59, 59).expect("end of day is valid"))
        .single()
        .expect("fixed offset has no DST gaps")
        .with_timezone(&Utc);
    CrawlWindow { start, end }
}

/// The window the daily job collects: yesterday in the platform timezone.
#[must_use]
pub fn previous_day_window(now: DateTime<Utc>) -> CrawlWindow {
    let local_today = now.with_timezone(&platform_tz()).date_naive();
    let yesterday = local_today.pred_opt().expect("date is not at the epoch floor");
    day_window(yesterday)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_window_spans_the_local_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let w = day_window(date);
        // 2024-03-15 00:00:00 +08:00 == 2024-03-14 16:00:00 UTC
        assert_eq!(w.start.to_rfc3339(), "2024-03-14T16:00:00+00:00");
        assert_eq!(w.end.to_rfc3339(), "2024-03-15T15:59:59+00:00");
    }

    #[test]
    fn previous_day_window_uses_the_platform_calendar() {
        // 01:00 UTC is already 09:00 the same day in UTC+8.
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 1, 0, 0).unwrap();
        let w = previous_day_window(now);
        assert_eq!(w, day_window(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()));
    }

    #[test]
    fn previous_day_window_crosses_the_utc_date_line() {
        // 20:00 UTC on the 14th is already the 15th in UTC+8, so
        // "yesterday" there is the 14th.
        let now = Utc.with_ymd_and_hms(2024, 3, 14, 20, 0, 0).unwrap();
        let w = previous_day_window(now);
        assert_eq!(w, day_window(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()));
    }

    #[test]
    fn contains_is_inclusive_on_both_bounds() {
        let w = day_window(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert!(w.contains(w.start));
        assert!(w.contains(w.end));
        assert!(!w.contains(w.end + chrono::Duration::seconds(1)));
    }
}
