// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Comparison-request detection and deterministic comparison-period
//! derivation (§4.1).

use crate::patterns::make_time_range;
use chrono::{Datelike, Duration, NaiveDate};
use finops_core::{PeriodType, TimeRange, TimeRangeSource};
use once_cell::sync::Lazy;
use regex::Regex;

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static comparison pattern is valid regex")
}

static COMPARISON_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        rx(r"compar(?:e|ed|ing)\s+(?:to|with)\s+(?:the\s+)?(?:previous|prior|last)\s+(?:period|month|week|quarter|year)"),
        rx(r"(?:vs|versus|against)\s+(?:previous|prior|last)\s+(?:period|month|week|quarter|year)"),
        rx(r"(?:month|week|quarter|year)[\s-]over[\s-](?:month|week|quarter|year)"),
        rx(r"(?:mom|wow|qoq|yoy)\b"),
        rx(r"period[\s-]over[\s-]period"),
        rx(r"compare\s+periods?"),
    ]
});

/// Whether `text` asks for a period-over-period comparison.
pub fn is_comparison_request(text: &str) -> bool {
    let lowered = text.to_lowercase();
    COMPARISON_PATTERNS.iter().any(|p| p.is_match(&lowered))
}

fn end_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap() - Duration::days(1)
}

/// Derive the comparison period for `primary`, using the calendar-shape
/// rules from §4.1: a full calendar month/quarter/year compares against
/// its immediate predecessor (with year rollover as needed); anything
/// else compares against an equal-length immediately preceding window.
pub fn derive_comparison_period(primary: &TimeRange, today: NaiveDate) -> TimeRange {
    let days = primary.days();

    let (start, end, description) = match primary.period_type {
        PeriodType::CalendarMonthFull => {
            let end = primary.start - Duration::days(1);
            let start = end.with_day(1).unwrap();
            (start, end, format!("{} (comparison)", month_year_label(start)))
        }
        PeriodType::CalendarQuarterFull => {
            let quarter: u32 = primary
                .metadata
                .get("quarter")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            let year: i32 = primary
                .metadata
                .get("year")
                .and_then(|v| v.parse().ok())
                .unwrap_or(today.year());
            let (prev_quarter, prev_year) = if quarter == 1 { (4, year - 1) } else { (quarter - 1, year) };
            let start_month = (prev_quarter - 1) * 3 + 1;
            let start = NaiveDate::from_ymd_opt(prev_year, start_month, 1).unwrap();
            let end = end_of_month(prev_year, start_month + 2);
            (start, end, format!("Q{prev_quarter} {prev_year} (comparison)"))
        }
        PeriodType::CalendarYearFull => {
            let year: i32 = primary
                .metadata
                .get("year")
                .and_then(|v| v.parse().ok())
                .unwrap_or(today.year() - 1);
            let prev_year = year - 1;
            let start = NaiveDate::from_ymd_opt(prev_year, 1, 1).unwrap();
            let end = NaiveDate::from_ymd_opt(prev_year, 12, 31).unwrap();
            (start, end, format!("{prev_year} (comparison)"))
        }
        _ => {
            let end = primary.start - Duration::days(1);
            let start = end - Duration::days(days - 1);
            (start, end, format!("Previous {days} days (comparison)"))
        }
    };

    make_time_range(
        start,
        end,
        description,
        TimeRangeSource::Comparison,
        PeriodType::Comparison,
        Some(primary.granularity),
        Default::default(),
    )
}

fn month_year_label(date: NaiveDate) -> String {
    const NAMES: [&str; 12] = [
        "January", "February", "March", "April", "May", "June",
        "July", "August", "September", "October", "November", "December",
    ];
    format!("{} {}", NAMES[(date.month() - 1) as usize], date.year())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patterns::make_time_range;
    use std::collections::HashMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn detects_common_comparison_phrasings() {
        assert!(is_comparison_request("compare to the previous month"));
        assert!(is_comparison_request("costs MoM"));
        assert!(is_comparison_request("month over month spend"));
        assert!(!is_comparison_request("what did we spend last month"));
    }

    #[test]
    fn derives_prior_calendar_month() {
        let mut metadata = HashMap::new();
        metadata.insert("month".to_string(), "3".to_string());
        metadata.insert("year".to_string(), "2025".to_string());
        let primary = make_time_range(
            d(2025, 3, 1),
            d(2025, 3, 31),
            "March 2025 (full month)".to_string(),
            TimeRangeSource::Explicit,
            PeriodType::CalendarMonthFull,
            None,
            metadata,
        );
        let comparison = derive_comparison_period(&primary, d(2025, 3, 20));
        assert_eq!(comparison.start, d(2025, 2, 1));
        assert_eq!(comparison.end, d(2025, 2, 28));
    }

    #[test]
    fn derives_prior_quarter_with_year_rollover() {
        let mut metadata = HashMap::new();
        metadata.insert("quarter".to_string(), "1".to_string());
        metadata.insert("year".to_string(), "2025".to_string());
        let primary = make_time_range(
            d(2025, 1, 1),
            d(2025, 3, 31),
            "Q1 2025".to_string(),
            TimeRangeSource::Explicit,
            PeriodType::CalendarQuarterFull,
            None,
            metadata,
        );
        let comparison = derive_comparison_period(&primary, d(2025, 2, 1));
        assert_eq!(comparison.start, d(2024, 10, 1));
        assert_eq!(comparison.end, d(2024, 12, 31));
    }

    #[test]
    fn derives_equal_length_window_for_rolling_periods() {
        let primary = make_time_range(
            d(2025, 3, 1),
            d(2025, 3, 10),
            "Last 10 days".to_string(),
            TimeRangeSource::Explicit,
            PeriodType::Rolling,
            None,
            HashMap::new(),
        );
        let comparison = derive_comparison_period(&primary, d(2025, 3, 10));
        assert_eq!(comparison.start, d(2025, 2, 19));
        assert_eq!(comparison.end, d(2025, 2, 28));
        assert_eq!(comparison.days(), primary.days());
    }
}
