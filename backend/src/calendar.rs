use crate::error::{CounselError, CounselResult};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

pub const FIRST_SLOT_HOUR: u32 = 9;
pub const LAST_SLOT_HOUR: u32 = 20;

/// Bookable start times: every half hour from 09:00 through 20:30.
pub fn time_slots() -> Vec<String> {
    (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR)
        .flat_map(|h| [0, 30].map(|m| format!("{:02}:{:02}", h, m)))
        .collect()
}

pub fn parse_date_safe(date_str: &str) -> Option<NaiveDate> {
    if date_str.trim().is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(date_str.trim(), "%Y%m%d"))
        .ok()
}

pub fn parse_date(date_str: &str) -> CounselResult<NaiveDate> {
    parse_date_safe(date_str).ok_or_else(|| {
        CounselError::validation(format!(
            "잘못된 날짜 형식입니다. YYYY-MM-DD 형식으로 입력해주세요. ({})",
            date_str
        ))
    })
}

pub fn parse_time_slot(time_str: &str) -> CounselResult<NaiveTime> {
    let invalid = || CounselError::validation(format!("선택할 수 없는 상담 시간입니다: {}", time_str));
    let time = NaiveTime::parse_from_str(time_str.trim(), "%H:%M").map_err(|_| invalid())?;
    let in_hours = (FIRST_SLOT_HOUR..=LAST_SLOT_HOUR).contains(&time.hour());
    if !in_hours || !(time.minute() == 0 || time.minute() == 30) {
        return Err(invalid());
    }
    Ok(time)
}

/// Wall-clock date and time at the center, as an instant.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> CounselResult<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| CounselError::validation("존재하지 않는 현지 시각입니다."))
}

pub fn start_of_day(date: NaiveDate, tz: Tz) -> CounselResult<DateTime<Utc>> {
    local_to_utc(date, NaiveTime::MIN, tz)
}

/// Half-open instant range covering the local days `start..=end`.
pub fn day_range(
    start: NaiveDate,
    end: NaiveDate,
    tz: Tz,
) -> CounselResult<(DateTime<Utc>, DateTime<Utc>)> {
    if end < start {
        return Err(CounselError::validation(
            "종료일은 시작일보다 빠를 수 없습니다.",
        ));
    }
    Ok((start_of_day(start, tz)?, start_of_day(end + Duration::days(1), tz)?))
}

/// Calendar view bound: an RFC 3339 instant, or a plain date taken as the
/// start of that local day (`inclusive_end` moves it to the next day).
pub fn parse_range_bound(raw: &str, tz: Tz, inclusive_end: bool) -> CounselResult<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(raw.trim()) {
        return Ok(instant.with_timezone(&Utc));
    }
    let date = parse_date(raw)?;
    if inclusive_end {
        start_of_day(date + Duration::days(1), tz)
    } else {
        start_of_day(date, tz)
    }
}

pub fn local_date(instant: DateTime<Utc>, tz: Tz) -> NaiveDate {
    instant.with_timezone(&tz).date_naive()
}

pub fn local_time_label(instant: DateTime<Utc>, tz: Tz) -> String {
    instant.with_timezone(&tz).format("%H:%M").to_string()
}

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub total: usize,
    pub done: usize,
    pub left: usize,
}

/// Counts appointments falling on the local day of `now`, split into those
/// already started and those still ahead.
pub fn summarize_day(starts: &[DateTime<Utc>], now: DateTime<Utc>, tz: Tz) -> DaySummary {
    let today = local_date(now, tz);
    starts
        .iter()
        .filter(|s| local_date(**s, tz) == today)
        .fold(DaySummary::default(), |mut acc, s| {
            acc.total += 1;
            if *s < now {
                acc.done += 1;
            } else {
                acc.left += 1;
            }
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::Asia::Seoul;

    fn seoul(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Seoul
            .with_ymd_and_hms(y, mo, d, h, mi, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn slots_cover_business_hours() {
        let slots = time_slots();
        assert_eq!(slots.len(), 24);
        assert_eq!(slots.first().map(String::as_str), Some("09:00"));
        assert_eq!(slots.last().map(String::as_str), Some("20:30"));
    }

    #[test]
    fn rejects_times_outside_the_grid() {
        assert!(parse_time_slot("10:00").is_ok());
        assert!(parse_time_slot("20:30").is_ok());
        assert!(parse_time_slot("08:30").is_err());
        assert!(parse_time_slot("21:00").is_err());
        assert!(parse_time_slot("10:15").is_err());
        assert!(parse_time_slot("ten").is_err());
    }

    #[test]
    fn accepts_both_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
        assert_eq!(parse_date_safe("2025-08-13"), Some(expected));
        assert_eq!(parse_date_safe("20250813"), Some(expected));
        assert_eq!(parse_date_safe("2025/08/13"), None);
        assert!(parse_date("").is_err());
    }

    #[test]
    fn local_slot_maps_to_utc() {
        let date = NaiveDate::from_ymd_opt(2025, 8, 13).unwrap();
        let time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        let instant = local_to_utc(date, time, Seoul).unwrap();
        assert_eq!(instant.to_rfc3339(), "2025-08-13T01:00:00+00:00");
        assert_eq!(local_time_label(instant, Seoul), "10:00");
        assert_eq!(local_date(instant, Seoul), date);
    }

    #[test]
    fn day_range_is_half_open_over_local_days() {
        let start = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 8, 31).unwrap();
        let (from, to) = day_range(start, end, Seoul).unwrap();
        assert_eq!(from, seoul(2025, 8, 1, 0, 0));
        assert_eq!(to, seoul(2025, 9, 1, 0, 0));
        assert!(day_range(end, start, Seoul).is_err());
    }

    #[test]
    fn range_bounds_accept_dates_and_instants() {
        let from = parse_range_bound("2025-08-01", Seoul, false).unwrap();
        assert_eq!(from, seoul(2025, 8, 1, 0, 0));
        let to = parse_range_bound("2025-08-31", Seoul, true).unwrap();
        assert_eq!(to, seoul(2025, 9, 1, 0, 0));
        let iso = parse_range_bound("2025-07-27T00:00:00+09:00", Seoul, true).unwrap();
        assert_eq!(iso, seoul(2025, 7, 27, 0, 0));
        assert!(parse_range_bound("next week", Seoul, false).is_err());
    }

    #[test]
    fn summarizes_today_around_now() {
        let now = seoul(2025, 8, 13, 14, 0);
        let starts = vec![
            seoul(2025, 8, 13, 9, 0),
            seoul(2025, 8, 13, 14, 0),
            seoul(2025, 8, 13, 20, 30),
            seoul(2025, 8, 12, 15, 0),
            seoul(2025, 8, 14, 0, 0),
        ];
        let summary = summarize_day(&starts, now, Seoul);
        assert_eq!(
            summary,
            DaySummary {
                total: 3,
                done: 1,
                left: 2
            }
        );
    }
}
