// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! The ordered `(pattern, handler)` table driving [`crate::parse`].
//!
//! Ordering is semantically significant: specific date ranges must be
//! tried before single dates, month-day-year before month-year, and
//! both before the loose relative-phrase patterns, or a more specific
//! phrase would be swallowed by a looser one.

use chrono::{Datelike, Duration, NaiveDate};
use finops_core::{Granularity, PeriodType, TimeRange, TimeRangeSource};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::HashMap;

type Handler = fn(&Captures<'_>, NaiveDate) -> TimeRange;

fn rx(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static time pattern is valid regex")
}

/// Build a fully populated [`TimeRange`], deriving granularity from the
/// span length unless the caller overrides it.
pub(crate) fn make_time_range(
    start: NaiveDate,
    end: NaiveDate,
    description: String,
    source: TimeRangeSource,
    period_type: PeriodType,
    granularity: Option<Granularity>,
    metadata: HashMap<String, String>,
) -> TimeRange {
    let days = (end - start).num_days() + 1;
    TimeRange {
        start,
        end,
        granularity: granularity.unwrap_or_else(|| TimeRange::derive_granularity(days)),
        description,
        source,
        period_type,
        metadata,
    }
}

fn explicit(
    start: NaiveDate,
    end: NaiveDate,
    description: impl Into<String>,
    period_type: PeriodType,
) -> TimeRange {
    make_time_range(
        start,
        end,
        description.into(),
        TimeRangeSource::Explicit,
        period_type,
        None,
        HashMap::new(),
    )
}

fn month_name_map() -> &'static HashMap<&'static str, u32> {
    static MAP: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
        [
            ("january", 1), ("february", 2), ("march", 3), ("april", 4),
            ("may", 5), ("june", 6), ("july", 7), ("august", 8),
            ("september", 9), ("october", 10), ("november", 11), ("december", 12),
            ("jan", 1), ("feb", 2), ("mar", 3), ("apr", 4),
            ("jun", 6), ("jul", 7), ("aug", 8),
            ("sep", 9), ("oct", 10), ("nov", 11), ("dec", 12),
        ]
        .into_iter()
        .collect()
    });
    &MAP
}

fn month_name(month: u32) -> &'static str {
    const NAMES: [&str; 12] = [
        "January", "February", "March", "April", "May", "June",
        "July", "August", "September", "October", "November", "December",
    ];
    NAMES[(month - 1) as usize]
}

/// Last day of `(year, month)`, computed by stepping to the first of
/// the following month and subtracting one day (handles December's
/// year rollover and every month's variable length uniformly).
fn end_of_month(year: i32, month: u32) -> NaiveDate {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1).unwrap() - Duration::days(1)
}

fn quarter_bounds(year: i32, quarter: u32) -> (NaiveDate, NaiveDate) {
    let start_month = (quarter - 1) * 3 + 1;
    let start = NaiveDate::from_ymd_opt(year, start_month, 1).unwrap();
    let end = end_of_month(year, start_month + 2);
    (start, end)
}

fn current_quarter(today: NaiveDate) -> u32 {
    (today.month() - 1) / 3 + 1
}

// --- relative-phrase handlers ---

fn parse_today(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    explicit(today, today, "Today", PeriodType::SingleDay)
}

fn parse_yesterday(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let yesterday = today - Duration::days(1);
    explicit(yesterday, yesterday, "Yesterday", PeriodType::SingleDay)
}

fn parse_last_n_days(c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let n: i64 = c[1].parse().unwrap_or(30);
    let start = today - Duration::days(n);
    let mut range = explicit(start, today, format!("Last {n} days"), PeriodType::Rolling);
    range.metadata.insert("days".to_string(), n.to_string());
    range
}

fn parse_last_n_weeks(c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let n: i64 = c[1].parse().unwrap_or(1);
    let start = today - Duration::weeks(n);
    let mut range = explicit(start, today, format!("Last {n} weeks"), PeriodType::Rolling);
    range.metadata.insert("weeks".to_string(), n.to_string());
    range
}

fn parse_last_n_months(c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let n: u32 = c[1].parse().unwrap_or(1);
    let first_of_current = today.with_day(1).unwrap();
    let end = first_of_current - Duration::days(1);
    let start_month_anchor = end.with_day(1).unwrap();
    let start = subtract_months(start_month_anchor, n.saturating_sub(1));
    let mut range = explicit(
        start,
        end,
        format!("Last {n} complete calendar months"),
        PeriodType::Rolling,
    );
    range.metadata.insert("months".to_string(), n.to_string());
    range
}

fn parse_last_n_years(c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let n: u32 = c[1].parse().unwrap_or(1);
    let start = subtract_years(today, n);
    let mut range = make_time_range(
        start,
        today,
        format!("Last {n} years"),
        TimeRangeSource::Explicit,
        PeriodType::Rolling,
        Some(Granularity::Monthly),
        HashMap::new(),
    );
    range.metadata.insert("years".to_string(), n.to_string());
    range
}

fn subtract_months(date: NaiveDate, months: u32) -> NaiveDate {
    let total = date.year() as i64 * 12 + date.month() as i64 - 1 - months as i64;
    let year = (total.div_euclid(12)) as i32;
    let month = (total.rem_euclid(12)) as u32 + 1;
    NaiveDate::from_ymd_opt(year, month, date.day().min(28)).unwrap()
}

fn subtract_years(date: NaiveDate, years: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year() - years as i32, date.month(), date.day().min(28)).unwrap()
}

// --- calendar-period handlers ---

fn parse_this_month(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let start = today.with_day(1).unwrap();
    explicit(
        start,
        today,
        format!("{} {} (month-to-date)", month_name(start.month()), start.year()),
        PeriodType::CalendarMonthPartial,
    )
}

fn parse_last_month(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let first_this_month = today.with_day(1).unwrap();
    let end = first_this_month - Duration::days(1);
    let start = end.with_day(1).unwrap();
    let mut range = explicit(
        start,
        end,
        format!("{} {} (full month)", month_name(start.month()), start.year()),
        PeriodType::CalendarMonthFull,
    );
    range.metadata.insert("month".to_string(), start.month().to_string());
    range.metadata.insert("year".to_string(), start.year().to_string());
    range
}

// The data model's `PeriodType` has no dedicated week variants (weeks
// fold into the "else: equal-length preceding window" branch of
// comparison derivation, same as any other rolling window), so these
// map to `Rolling` rather than a nonexistent `CalendarWeek*`.

fn parse_this_week(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    explicit(start, today, "This week (week-to-date)", PeriodType::Rolling)
}

fn parse_last_week(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let this_monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let last_sunday = this_monday - Duration::days(1);
    let last_monday = last_sunday - Duration::days(6);
    explicit(last_monday, last_sunday, "Last week (full week)", PeriodType::Rolling)
}

fn parse_this_quarter(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let quarter = current_quarter(today);
    let start_month = (quarter - 1) * 3 + 1;
    let start = NaiveDate::from_ymd_opt(today.year(), start_month, 1).unwrap();
    let mut range = explicit(
        start,
        today,
        format!("Q{quarter} {} (quarter-to-date)", today.year()),
        PeriodType::CalendarQuarterPartial,
    );
    range.metadata.insert("quarter".to_string(), quarter.to_string());
    range.metadata.insert("year".to_string(), today.year().to_string());
    range
}

fn parse_last_quarter(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let current = current_quarter(today);
    let (quarter, year) = if current == 1 { (4, today.year() - 1) } else { (current - 1, today.year()) };
    let (start, end) = quarter_bounds(year, quarter);
    let mut range = explicit(start, end, format!("Q{quarter} {year} (full quarter)"), PeriodType::CalendarQuarterFull);
    range.metadata.insert("quarter".to_string(), quarter.to_string());
    range.metadata.insert("year".to_string(), year.to_string());
    range
}

fn parse_specific_quarter(c: &Captures<'_>, _today: NaiveDate) -> TimeRange {
    let quarter: u32 = c[1].parse().unwrap_or(1);
    let year: i32 = c[2].parse().unwrap_or(2000);
    let (start, end) = quarter_bounds(year, quarter);
    let mut range = explicit(start, end, format!("Q{quarter} {year}"), PeriodType::CalendarQuarterFull);
    range.metadata.insert("quarter".to_string(), quarter.to_string());
    range.metadata.insert("year".to_string(), year.to_string());
    range
}

fn parse_quarter_current_year(c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let quarter: u32 = c[1].parse().unwrap_or(1);
    let year = today.year();
    let (start, end) = quarter_bounds(year, quarter);
    let mut range = explicit(start, end, format!("Q{quarter} {year}"), PeriodType::CalendarQuarterFull);
    range.metadata.insert("quarter".to_string(), quarter.to_string());
    range.metadata.insert("year".to_string(), year.to_string());
    range
}

fn parse_this_year(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap();
    make_time_range(
        start,
        today,
        format!("{} (year-to-date)", today.year()),
        TimeRangeSource::Explicit,
        PeriodType::CalendarYearPartial,
        Some(Granularity::Monthly),
        HashMap::new(),
    )
}

fn parse_last_year(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let year = today.year() - 1;
    let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(year, 12, 31).unwrap();
    let mut range = make_time_range(
        start,
        end,
        format!("{year} (full year)"),
        TimeRangeSource::Explicit,
        PeriodType::CalendarYearFull,
        Some(Granularity::Monthly),
        HashMap::new(),
    );
    range.metadata.insert("year".to_string(), year.to_string());
    range
}

fn parse_ytd(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let start = NaiveDate::from_ymd_opt(today.year(), 1, 1).unwrap();
    make_time_range(
        start,
        today,
        format!("Year-to-date {}", today.year()),
        TimeRangeSource::Explicit,
        PeriodType::CalendarYearPartial,
        Some(Granularity::Monthly),
        HashMap::new(),
    )
}

fn parse_mtd(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let start = today.with_day(1).unwrap();
    explicit(
        start,
        today,
        format!("Month-to-date ({} {})", month_name(today.month()), today.year()),
        PeriodType::CalendarMonthPartial,
    )
}

fn parse_wtd(_c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let start = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    explicit(start, today, "Week-to-date", PeriodType::Rolling)
}

fn parse_full_year(c: &Captures<'_>, today: NaiveDate) -> TimeRange {
    let year = c.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(today.year() - 1);
    let start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap();
    let end = NaiveDate::from_ymd_opt(year, 12, 31).unwrap();
    make_time_range(
        start,
        end,
        format!("{year} (full year)"),
        TimeRangeSource::Explicit,
        PeriodType::CalendarYearFull,
        Some(Granularity::Monthly),
        HashMap::new(),
    )
}

// --- explicit-date handlers ---

fn parse_month_year(c: &Captures<'_>, _today: NaiveDate) -> TimeRange {
    let month = month_name_map()[&c[1]];
    let year: i32 = c[2].parse().unwrap_or(2000);
    let start = NaiveDate::from_ymd_opt(year, month, 1).unwrap();
    let end = end_of_month(year, month);
    let mut range = explicit(start, end, format!("{} {year} (full month)", month_name(month)), PeriodType::CalendarMonthFull);
    range.metadata.insert("month".to_string(), month.to_string());
    range.metadata.insert("year".to_string(), year.to_string());
    range
}

fn parse_month_day_year(c: &Captures<'_>, _today: NaiveDate) -> TimeRange {
    let month = month_name_map()[&c[1]];
    let day: u32 = c[2].parse().unwrap_or(1);
    let year: i32 = c[3].parse().unwrap_or(2000);
    let date = NaiveDate::from_ymd_opt(year, month, day).unwrap_or_else(|| NaiveDate::from_ymd_opt(year, month, 1).unwrap());
    explicit(date, date, format!("{} {day}, {year}", month_name(month)), PeriodType::SpecificDate)
}

fn parse_date_range(c: &Captures<'_>, _today: NaiveDate) -> TimeRange {
    let start = NaiveDate::from_ymd_opt(
        c[1].parse().unwrap_or(2000),
        c[2].parse().unwrap_or(1),
        c[3].parse().unwrap_or(1),
    )
    .unwrap();
    let end = NaiveDate::from_ymd_opt(
        c[4].parse().unwrap_or(2000),
        c[5].parse().unwrap_or(1),
        c[6].parse().unwrap_or(1),
    )
    .unwrap();
    explicit(start, end, format!("{start} to {end}"), PeriodType::SpecificRange)
}

fn parse_single_date(c: &Captures<'_>, _today: NaiveDate) -> TimeRange {
    let date = NaiveDate::from_ymd_opt(
        c[1].parse().unwrap_or(2000),
        c[2].parse().unwrap_or(1),
        c[3].parse().unwrap_or(1),
    )
    .unwrap();
    explicit(date, date, date.format("%B %d, %Y").to_string(), PeriodType::SpecificDate)
}

/// The ordered pattern table. Order matters: specific dates before
/// month-day-year before month-year before relative phrases, and
/// date ranges before single dates.
pub(crate) static TIME_PATTERNS: Lazy<Vec<(Regex, Handler)>> = Lazy::new(|| {
    vec![
        (rx(r"(\d{4})-(\d{2})-(\d{2})\s*(?:to|through|-)\s*(\d{4})-(\d{2})-(\d{2})"), parse_date_range as Handler),
        (rx(r"(\d{4})-(\d{2})-(\d{2})"), parse_single_date),
        (
            rx(r"(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{1,2})(?:st|nd|rd|th)?\s*,?\s*(\d{4})"),
            parse_month_day_year,
        ),
        (
            rx(r"(january|february|march|april|may|june|july|august|september|october|november|december)\s+(\d{4})"),
            parse_month_year,
        ),
        (rx(r"(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)\s+(\d{4})"), parse_month_year),
        (rx(r"\btoday\b"), parse_today),
        (rx(r"\byesterday\b"), parse_yesterday),
        (rx(r"last\s+(\d+)\s+days?"), parse_last_n_days),
        (rx(r"past\s+(\d+)\s+days?"), parse_last_n_days),
        (rx(r"last\s+(\d+)\s+months?"), parse_last_n_months),
        (rx(r"past\s+(\d+)\s+months?"), parse_last_n_months),
        (rx(r"last\s+(\d+)\s+weeks?"), parse_last_n_weeks),
        (rx(r"past\s+(\d+)\s+weeks?"), parse_last_n_weeks),
        (rx(r"last\s+(\d+)\s+years?"), parse_last_n_years),
        (rx(r"past\s+(\d+)\s+years?"), parse_last_n_years),
        (rx(r"this\s+month"), parse_this_month),
        (rx(r"current\s+month"), parse_this_month),
        (rx(r"last\s+month"), parse_last_month),
        (rx(r"previous\s+month"), parse_last_month),
        (rx(r"this\s+week"), parse_this_week),
        (rx(r"current\s+week"), parse_this_week),
        (rx(r"last\s+week"), parse_last_week),
        (rx(r"previous\s+week"), parse_last_week),
        (rx(r"this\s+quarter"), parse_this_quarter),
        (rx(r"current\s+quarter"), parse_this_quarter),
        (rx(r"last\s+quarter"), parse_last_quarter),
        (rx(r"previous\s+quarter"), parse_last_quarter),
        (rx(r"q([1-4])\s+(\d{4})"), parse_specific_quarter),
        (rx(r"q([1-4])\b"), parse_quarter_current_year),
        (rx(r"this\s+year"), parse_this_year),
        (rx(r"current\s+year"), parse_this_year),
        (rx(r"last\s+year"), parse_last_year),
        (rx(r"previous\s+year"), parse_last_year),
        (rx(r"(?:ytd|year[\s-]to[\s-]date)"), parse_ytd),
        (rx(r"(?:mtd|month[\s-]to[\s-]date)"), parse_mtd),
        (rx(r"(?:wtd|week[\s-]to[\s-]date)"), parse_wtd),
        (rx(r"(?:whole|entire|full)\s+year\s*(\d{4})?"), parse_full_year),
    ]
});

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn last_n_months_excludes_current_partial_month() {
        let today = d(2025, 3, 15);
        let caps = rx(r"(\d+)").captures("3").unwrap();
        let range = parse_last_n_months(&caps, today);
        assert_eq!(range.start, d(2024, 12, 1));
        assert_eq!(range.end, d(2025, 2, 28));
    }

    #[test]
    fn last_quarter_rolls_over_year_boundary() {
        let today = d(2025, 1, 15);
        let caps = rx(r"x").captures("x").unwrap();
        let range = parse_last_quarter(&caps, today);
        assert_eq!(range.start, d(2024, 10, 1));
        assert_eq!(range.end, d(2024, 12, 31));
    }

    #[test]
    fn end_of_month_handles_december() {
        assert_eq!(end_of_month(2025, 12), d(2025, 12, 31));
        assert_eq!(end_of_month(2025, 2), d(2025, 2, 28));
        assert_eq!(end_of_month(2024, 2), d(2024, 2, 29));
    }
}
