use std::collections::HashMap;

use chrono::{Datelike, NaiveDate, Utc};

/// Reporting window covering the previous calendar month.
#[derive(Debug, Clone)]
pub struct DateWindow {
    /// Date placeholders mapped to their display strings.
    pub placeholders: HashMap<String, String>,
    /// Filename-safe `YYYY-MM` of the reported month.
    pub filename_date: String,
    /// Inclusive start of the month, epoch milliseconds (day 1, 00:00:00.000 UTC).
    pub start_ts: i64,
    /// Inclusive end of the month, epoch milliseconds (last day, 23:59:59.999 UTC).
    pub end_ts: i64,
}

pub fn current_window() -> DateWindow {
    previous_month_window(Utc::now().date_naive())
}

pub fn previous_month_window(today: NaiveDate) -> DateWindow {
    let first_of_month =
        NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
    let end = first_of_month.pred_opt().unwrap_or(first_of_month);
    let start = NaiveDate::from_ymd_opt(end.year(), end.month(), 1).unwrap_or(end);

    let start_kr = start.format("%Y년 %m월 %d일").to_string();
    let end_kr = end.format("%Y년 %m월 %d일").to_string();

    let mut placeholders = HashMap::new();
    placeholders.insert("{{START_DATE}}".to_string(), start_kr.clone());
    placeholders.insert("{{END_DATE}}".to_string(), end_kr.clone());
    placeholders.insert("{{MONTH}}".to_string(), end.format("%m").to_string());
    placeholders.insert(
        "{{DATE_RANGE}}".to_string(),
        format!("{start_kr} ~ {end_kr}"),
    );
    placeholders.insert(
        "{{DATE_RANGE_HYPHEN}}".to_string(),
        format!("{} ~ {}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d")),
    );

    DateWindow {
        placeholders,
        filename_date: end.format("%Y-%m").to_string(),
        start_ts: start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default(),
        end_ts: end
            .and_hms_milli_opt(23, 59, 59, 999)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_covers_whole_previous_month() {
        let window = previous_month_window(day(2026, 8, 26));
        let start = day(2026, 7, 1).and_hms_opt(0, 0, 0).unwrap();
        let end = day(2026, 7, 31).and_hms_milli_opt(23, 59, 59, 999).unwrap();
        assert_eq!(window.start_ts, start.and_utc().timestamp_millis());
        assert_eq!(window.end_ts, end.and_utc().timestamp_millis());
        assert_eq!(window.filename_date, "2026-07");
        assert_eq!(window.placeholders["{{MONTH}}"], "07");
    }

    #[test]
    fn january_rolls_back_to_previous_year() {
        let window = previous_month_window(day(2026, 1, 15));
        assert_eq!(window.filename_date, "2025-12");
        assert_eq!(window.placeholders["{{MONTH}}"], "12");
        assert_eq!(
            window.placeholders["{{DATE_RANGE_HYPHEN}}"],
            "2025-12-01 ~ 2025-12-31"
        );
    }

    #[test]
    fn leap_february_keeps_its_29th_day() {
        let window = previous_month_window(day(2028, 3, 10));
        assert_eq!(
            window.placeholders["{{DATE_RANGE_HYPHEN}}"],
            "2028-02-01 ~ 2028-02-29"
        );
    }

    #[test]
    fn display_strings_use_korean_long_form() {
        let window = previous_month_window(day(2026, 8, 1));
        assert_eq!(window.placeholders["{{START_DATE}}"], "2026년 07월 01일");
        assert_eq!(window.placeholders["{{END_DATE}}"], "2026년 07월 31일");
        assert_eq!(
            window.placeholders["{{DATE_RANGE}}"],
            "2026년 07월 01일 ~ 2026년 07월 31일"
        );
    }

    #[test]
    fn all_five_date_tokens_present() {
        let window = previous_month_window(day(2026, 8, 26));
        for token in [
            "{{START_DATE}}",
            "{{END_DATE}}",
            "{{MONTH}}",
            "{{DATE_RANGE}}",
            "{{DATE_RANGE_HYPHEN}}",
        ] {
            assert!(window.placeholders.contains_key(token), "missing {token}");
        }
        assert_eq!(window.placeholders.len(), 5);
    }
}
