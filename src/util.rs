// Parsing and small statistics helpers.
//
// CSV cells arrive as loose text; everything here turns them into typed
// values or `None` without failing, so callers only ever see clean numbers.
use chrono::NaiveDate;
use num_format::{Locale, ToFormattedString};

/// Parse a CSV cell into `f64`, tolerating padding and thousands separators.
///
/// - Trims whitespace.
/// - Rejects values that contain alphabetic characters (`"n/a"`, `"ICU"`).
/// - Strips `","` separators before parsing.
/// - Returns `None` for anything that cannot be safely parsed.
pub fn parse_f64_safe(s: Option<&str>) -> Option<f64> {
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    if s.chars().any(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let s = s.replace(',', "");
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_date_safe(s: Option<&str>) -> Option<NaiveDate> {
    // Date-like weeks are expected as `YYYY-MM-DD`.
    let s = s?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

/// `num / den`, with a zero denominator defined as 0.
pub fn safe_ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 {
        return 0.0;
    }
    let v = num / den;
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

pub fn average(v: &[f64]) -> f64 {
    // Arithmetic mean; 0 for an empty slice so no NaN leaks into scales.
    if v.is_empty() {
        return 0.0;
    }
    let sum: f64 = v.iter().copied().sum();
    sum / v.len() as f64
}

pub fn median(v: Vec<f64>) -> f64 {
    quantile(v, 0.5)
}

/// Quantile with linear interpolation between the closest order statistics.
///
/// Takes the values by value so it can sort in place. Returns 0 for an
/// empty input.
pub fn quantile(mut v: Vec<f64>, q: f64) -> f64 {
    if v.is_empty() {
        return 0.0;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let q = q.clamp(0.0, 1.0);
    let pos = q * (v.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    v[lo] + (v[hi] - v[lo]) * frac
}

pub fn format_number(n: f64, decimals: usize) -> String {
    // Fixed decimals plus locale-aware thousands separators, e.g. `1,234.50`.
    let neg = n.is_sign_negative() && n != 0.0;
    let s = format!("{:.*}", decimals, n.abs());
    let mut parts = s.split('.');
    let int_part = parts.next().unwrap_or("0");
    let frac_part = parts.next();
    let int_val: i64 = int_part.parse().unwrap_or(0);
    let mut res = int_val.to_formatted_string(&Locale::en);
    if let Some(frac) = frac_part {
        if decimals > 0 {
            res.push('.');
            res.push_str(frac);
        }
    }
    if neg {
        format!("-{}", res)
    } else {
        res
    }
}

pub fn format_pct(ratio: f64) -> String {
    format!("{}%", format_number(ratio * 100.0, 1))
}

pub fn format_int<T>(n: T) -> String
where
    T: ToFormattedString,
{
    // Counts in console messages, e.g. `1,092 rows loaded`.
    n.to_formatted_string(&Locale::en)
}
