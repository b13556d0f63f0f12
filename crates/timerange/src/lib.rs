// Copyright 2025 FinOps Query Engine Contributors
// SPDX-License-Identifier: Apache-2.0

//! Natural-language time range parsing and comparison-period derivation.
//!
//! [`parse`] turns a free-text phrase like "last 3 months" or "Q2 2025"
//! into an absolute [`finops_core::TimeRange`]; [`merge`] combines that
//! with a possibly-inherited conversation time range and, when the text
//! asks for one, a deterministically derived comparison period.
//!
//! Timezone handling uses a caller-supplied `FixedOffset` rather than a
//! full IANA tz database: the pipeline only ever needs "what day is it
//! right now for this user" to anchor relative phrases, and the
//! workspace carries no `chrono-tz` dependency.

mod comparison;
mod patterns;

pub use comparison::{derive_comparison_period, is_comparison_request};

use chrono::{FixedOffset, NaiveDate, Utc};
use finops_core::{ConversationContext, TimeRange, TimeRangeResult, TimeRangeSource};

/// Default rolling window, in days, used when no time expression is
/// found anywhere in the text or the conversation context.
pub const DEFAULT_WINDOW_DAYS: i64 = 30;

/// Today's date in `tz`, used to anchor every relative phrase.
fn today_in(tz: &FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(tz).date_naive()
}

/// Parse a time range out of free text, anchored to the given timezone
/// offset. Falls back to the default 30-day rolling window (with
/// `source = TimeRangeSource::Default`) when no pattern matches.
pub fn parse(text: &str, tz: &FixedOffset) -> TimeRange {
    let today = today_in(tz);
    let lowered = text.to_lowercase();

    for (regex, handler) in patterns::TIME_PATTERNS.iter() {
        if let Some(captures) = regex.captures(&lowered) {
            let range = handler(&captures, today);
            tracing::info!(
                description = %range.description,
                start = %range.start,
                end = %range.end,
                "time range parsed"
            );
            return range;
        }
    }

    tracing::info!("no time range found in text, using default 30-day window");
    default_time_range(today)
}

/// The default rolling window: the 30 days ending today, `source =
/// Default`, `period_type = Rolling`.
pub fn default_time_range(today: NaiveDate) -> TimeRange {
    let start = today - chrono::Duration::days(DEFAULT_WINDOW_DAYS);
    patterns::make_time_range(
        start,
        today,
        format!("Last {DEFAULT_WINDOW_DAYS} days (default)"),
        TimeRangeSource::Default,
        finops_core::PeriodType::Rolling,
        None,
        [("days".to_string(), DEFAULT_WINDOW_DAYS.to_string())].into(),
    )
}

/// Merge a previous conversation's time range with a new turn's text.
///
/// Precedence: an explicit time expression in `new_text` always wins;
/// otherwise the previous turn's range is inherited; otherwise the
/// default window applies. A separate regex pass then checks whether
/// `new_text` asks for a period-over-period comparison and, if so,
/// deterministically derives the comparison range from the primary one.
pub fn merge(
    prev_context: Option<&ConversationContext>,
    new_text: &str,
    tz: &FixedOffset,
) -> TimeRangeResult {
    let lowered = new_text.to_lowercase();
    let has_explicit = patterns::TIME_PATTERNS
        .iter()
        .any(|(regex, _)| regex.is_match(&lowered));

    let primary = if has_explicit {
        let mut range = parse(new_text, tz);
        range.source = TimeRangeSource::Explicit;
        tracing::info!(description = %range.description, "using explicit time range from user message");
        range
    } else if let Some(inherited) = prev_context.and_then(|c| c.time_range.clone()) {
        let mut range = inherited;
        range.source = TimeRangeSource::Inherited;
        tracing::info!(description = %range.description, "inheriting time range from context");
        range
    } else {
        tracing::info!("using default time range");
        default_time_range(today_in(tz))
    };

    let is_comparison = is_comparison_request(new_text);
    let comparison = if is_comparison {
        let derived = derive_comparison_period(&primary, today_in(tz));
        tracing::info!(description = %derived.description, "derived comparison period");
        Some(derived)
    } else {
        None
    };

    TimeRangeResult {
        primary,
        comparison,
        is_comparison_request: is_comparison,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn parse_falls_back_to_default_window() {
        let range = parse("how much did we spend", &utc());
        assert_eq!(range.source, TimeRangeSource::Default);
        assert_eq!(range.days(), DEFAULT_WINDOW_DAYS + 1);
    }

    #[test]
    fn parse_recognizes_explicit_date_range() {
        let range = parse("costs from 2025-01-01 to 2025-01-31", &utc());
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
    }

    #[test]
    fn parse_prefers_date_range_over_single_date() {
        // A bare single date pattern would also match the first date in
        // this string; the date-range handler must win because it is
        // ordered first in the pattern table.
        let range = parse("2025-03-01 to 2025-03-15", &utc());
        assert_eq!(range.end, NaiveDate::from_ymd_opt(2025, 3, 15).unwrap());
    }

    #[test]
    fn merge_explicit_overrides_inherited() {
        let prev = ConversationContext {
            time_range: Some(parse("last 7 days", &utc())),
            ..Default::default()
        };
        let result = merge(Some(&prev), "show me this quarter", &utc());
        assert_eq!(result.primary.source, TimeRangeSource::Explicit);
    }

    #[test]
    fn merge_inherits_when_no_explicit_time() {
        let inherited_range = parse("last 7 days", &utc());
        let prev = ConversationContext {
            time_range: Some(inherited_range.clone()),
            ..Default::default()
        };
        let result = merge(Some(&prev), "and what about EC2", &utc());
        assert_eq!(result.primary.source, TimeRangeSource::Inherited);
        assert_eq!(result.primary.start, inherited_range.start);
    }

    #[test]
    fn merge_defaults_with_no_context_and_no_explicit_time() {
        let result = merge(None, "what are we spending", &utc());
        assert_eq!(result.primary.source, TimeRangeSource::Default);
        assert!(!result.is_comparison_request);
    }

    #[test]
    fn merge_derives_comparison_when_requested() {
        let result = merge(None, "compare to the previous month", &utc());
        assert!(result.is_comparison_request);
        assert!(result.comparison.is_some());
    }
}
