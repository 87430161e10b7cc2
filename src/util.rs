// Utility helpers for parsing and basic statistics.
//
// This module centralizes the "dirty" CSV/number/date handling so the rest of
// the code can assume clean, typed values. The statistics here follow the
// conventions analysts use in their spreadsheets: missing values are skipped,
// ranks are averaged on ties, quantiles interpolate linearly.
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};
use std::cmp::Ordering;

/// Parse a string-like value into `f64` while being forgiving about
/// formatting issues that are common in CSV exports.
///
/// - Trims whitespace and a leading `$`.
/// - Rejects values that contain alphabetic characters.
/// - Strips thousands separators like `","` before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    let s = s.strip_prefix('$').unwrap_or(s).trim();
    if s.is_empty() {
        return None;
    }
    // Allow exponent notation ("1e3") but nothing else alphabetic.
    if s.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Exports from different systems disagree on date layout; try the ones we
/// have seen, with or without a time component.
pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%b-%Y"];
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    // Drop a trailing time component ("2020-05-01 13:45:00", "5/1/2020 1:45 PM").
    let date_part = s.split(' ').next().unwrap_or(s);
    let date_part = date_part
        .split_once('T')
        .filter(|(d, _)| d.len() == 10)
        .map_or(date_part, |(d, _)| d);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

/// Season years in the data warehouse look like `"Meher 2019"` or
/// `"2018-2019"`; the harvest year is the last four characters.
pub fn season_year(s: &str) -> Option<i32> {
    let s = s.trim();
    if s.len() < 4 || !s.is_char_boundary(s.len() - 4) {
        return None;
    }
    s[s.len() - 4..].parse::<i32>().ok()
}

/// Arithmetic mean of the present values. `None` when nothing is present,
/// so an all-missing row stays missing instead of becoming zero.
pub fn mean_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

pub fn round_to(v: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (v * factor).round() / factor
}

/// Percent rank of `value` within `population` (which must contain `value`),
/// using the average rank for ties: `(less + (equal + 1) / 2) / n`.
pub fn percent_rank(value: f64, population: &[f64]) -> Option<f64> {
    if population.is_empty() {
        return None;
    }
    let less = population.iter().filter(|v| **v < value).count() as f64;
    let equal = population.iter().filter(|v| **v == value).count() as f64;
    if equal == 0.0 {
        return None;
    }
    let rank = less + (equal + 1.0) / 2.0;
    Some(rank / population.len() as f64)
}

/// Quantile `q` (0..=1) of `values` with linear interpolation between the
/// closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed number of decimal places with locale-aware thousands separators
    // (e.g., `1,234,567.89`).
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        res.push('.');
        res.push_str(frac);
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_percent(fraction: f64) -> String {
    format!("{:.2}%", fraction * 100.0)
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Thin wrapper around `num-format` for counts in console messages
    // (e.g., `9,855 rows loaded`).
    n.to_formatted_string(&Locale::en)
}
