//! Shared helpers for acquisition adapters: odds-text parsing, margin
//! computation and kickoff-date parsing.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parse an odds cell to a float. Handles "1.50", "1,50" and the usual
/// placeholder strings bookmakers render for suspended outcomes.
pub fn parse_odd(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == "-" || trimmed.eq_ignore_ascii_case("n/a") {
        return None;
    }
    trimmed.replace(',', ".").parse().ok()
}

/// Bookmaker margin (overround): `(Σ 1/odd − 1) × 100`, rounded to two
/// decimals. Outcomes at or below zero contribute nothing.
pub fn margin(home_odd: f64, draw_odd: Option<f64>, away_odd: f64) -> f64 {
    let mut total = 0.0;
    for odd in [Some(home_odd), draw_odd, Some(away_odd)].into_iter().flatten() {
        if odd > 0.0 {
            total += 1.0 / odd;
        }
    }
    ((total - 1.0) * 10000.0).round() / 100.0
}

/// Parse a kickoff timestamp in the formats bookmaker feeds actually use:
/// RFC 3339 first, then a couple of naive layouts interpreted as UTC.
pub fn parse_utc_datetime(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }

    None
}
