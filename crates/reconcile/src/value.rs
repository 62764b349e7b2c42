//! Value coercion (C1) — lossless, idempotent conversion to canonical
//! [`Scalar`] forms.
//!
//! A cell value is one of: null, boolean, integer/real number, string, or
//! date (canonicalized as epoch milliseconds). See `to_number`, `to_string`,
//! `to_date` below.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The reserved row key carrying 1-based source line provenance.
pub const LINE_KEY: &str = "__line";

/// A cell value. Dates are canonically epoch milliseconds (UTC).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// Epoch milliseconds.
    Date(i64),
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Date(a), Self::Date(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_string(self))
    }
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn is_empty_string(&self) -> bool {
        matches!(self, Scalar::String(s) if s.is_empty())
    }

    pub fn is_missing(&self, treat_empty_as_null: bool) -> bool {
        self.is_null() || (treat_empty_as_null && self.is_empty_string())
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Scalar::Date(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Scalar::Number(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Scalar::String(_))
    }
}

/// Strip thousands separators, currency symbols, percent signs and
/// whitespace before a numeric parse.
fn strip_numeric_noise(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ',' | '$' | '€' | '£' | '¥' | '₹' | '%') && !c.is_whitespace())
        .collect()
}

/// Coerce a [`Scalar`] to a finite `f64`. Null/empty/unparseable → 0.
/// NaN/infinite inputs are folded to 0 — `to_number` itself never returns a
/// non-finite value; non-finite *results* of arithmetic are a separate error
/// kind raised by the expression evaluator (C2).
pub fn to_number(v: &Scalar) -> f64 {
    let n = match v {
        Scalar::Null => 0.0,
        Scalar::Number(n) => *n,
        Scalar::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Scalar::Date(ms) => *ms as f64,
        Scalar::String(s) => {
            let trimmed = strip_numeric_noise(s.trim());
            if trimmed.is_empty() {
                0.0
            } else {
                trimmed.parse::<f64>().unwrap_or(0.0)
            }
        }
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// Natural textual form. Dates format per `output_format`, defaulting to
/// ISO-8601 (`%Y-%m-%dT%H:%M:%S%.3fZ`) when `None`.
pub fn to_string(v: &Scalar) -> String {
    to_string_with_format(v, None)
}

pub fn to_string_with_format(v: &Scalar, output_format: Option<&str>) -> String {
    match v {
        Scalar::Null => String::new(),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Number(n) => format_number_natural(*n),
        Scalar::String(s) => s.clone(),
        Scalar::Date(ms) => crate::transform::format_date_ms(*ms, output_format),
    }
}

fn format_number_natural(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        let mut s = format!("{n}");
        if s.contains('e') || s.contains('E') {
            s = format!("{n:.10}");
            while s.ends_with('0') {
                s.pop();
            }
            if s.ends_with('.') {
                s.pop();
            }
        }
        s
    }
}

/// Parse a [`Scalar`] into canonical epoch-ms, or `None` if unparseable.
///
/// Accepts: an existing `Date`/`Number` (treated as epoch ms), and the
/// string patterns from the base spec §3: `YYYY-MM-DD`, `DD-MM-YYYY`,
/// `MM/DD/YYYY`, each optionally suffixed with `HH:mm[:ss]`; two-digit
/// years below 100 are offset by +2000. Ambiguous/unrecognized strings fall
/// back to a generic parse via `chrono`'s RFC3339/ISO parser.
pub fn to_date(v: &Scalar) -> Option<i64> {
    match v {
        Scalar::Null => None,
        Scalar::Date(ms) => Some(*ms),
        Scalar::Number(n) => Some(*n as i64),
        Scalar::Bool(_) => None,
        Scalar::String(s) => parse_date_string(s.trim()),
    }
}

/// Shared by C1 (`to_date`) and C8's sort-key projection (which needs the
/// same "D-M-Y or M/D/Y, optional time" recognizer).
pub fn parse_date_string(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }

    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive_to_ms(ndt));
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }

    let (date_part, time_part) = split_date_time(s);

    if let Some(date) = try_ymd(date_part)
        .or_else(|| try_dmy(date_part, '-'))
        .or_else(|| try_mdy(date_part, '/'))
        .or_else(|| try_dmy(date_part, '/'))
        .or_else(|| try_mdy(date_part, '-'))
    {
        let time = time_part.and_then(try_hms).unwrap_or_default();
        return Some(naive_to_ms(NaiveDateTime::new(date, time)));
    }

    // Generic fallback: let chrono's permissive parsers have a final try.
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y/%m/%d") {
        return Some(naive_to_ms(d.and_time(NaiveTime::MIN)));
    }

    None
}

fn split_date_time(s: &str) -> (&str, Option<&str>) {
    if let Some(idx) = s.find(' ') {
        (&s[..idx], Some(s[idx + 1..].trim()))
    } else {
        (s, None)
    }
}

fn naive_to_ms(ndt: NaiveDateTime) -> i64 {
    Utc.from_utc_datetime(&ndt).timestamp_millis()
}

fn offset_two_digit_year(y: i32) -> i32 {
    if y < 100 {
        y + 2000
    } else {
        y
    }
}

fn try_ymd(s: &str) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 || parts[0].len() < 3 {
        return None;
    }
    let y: i32 = parts[0].parse().ok()?;
    let m: u32 = parts[1].parse().ok()?;
    let d: u32 = parts[2].parse().ok()?;
    NaiveDate::from_ymd_opt(y, m, d)
}

fn try_dmy(s: &str, sep: char) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split(sep).collect();
    if parts.len() != 3 {
        return None;
    }
    let d: u32 = parts[0].parse().ok()?;
    let m: u32 = parts[1].parse().ok()?;
    let y: i32 = offset_two_digit_year(parts[2].parse().ok()?);
    NaiveDate::from_ymd_opt(y, m, d)
}

fn try_mdy(s: &str, sep: char) -> Option<NaiveDate> {
    let parts: Vec<&str> = s.split(sep).collect();
    if parts.len() != 3 {
        return None;
    }
    let m: u32 = parts[0].parse().ok()?;
    let d: u32 = parts[1].parse().ok()?;
    let y: i32 = offset_two_digit_year(parts[2].parse().ok()?);
    NaiveDate::from_ymd_opt(y, m, d)
}

fn try_hms(s: &str) -> Option<NaiveTime> {
    let parts: Vec<&str> = s.split(':').collect();
    match parts.len() {
        2 => NaiveTime::from_hms_opt(parts[0].parse().ok()?, parts[1].parse().ok()?, 0),
        3 => NaiveTime::from_hms_opt(
            parts[0].parse().ok()?,
            parts[1].parse().ok()?,
            parts[2].parse().ok()?,
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_number_idempotent_on_strings() {
        let v = Scalar::String("  $2,200.00 ".into());
        let once = to_number(&v);
        let twice = to_number(&Scalar::Number(once));
        assert_eq!(once, twice);
        assert_eq!(once, 2200.0);
    }

    #[test]
    fn to_number_handles_symbols() {
        assert_eq!(to_number(&Scalar::String("€1.234,00".into())), 1.234);
        assert_eq!(to_number(&Scalar::String("15%".into())), 15.0);
        assert_eq!(to_number(&Scalar::String("¥500".into())), 500.0);
        assert_eq!(to_number(&Scalar::String("₹-10".into())), -10.0);
    }

    #[test]
    fn to_number_null_and_bool() {
        assert_eq!(to_number(&Scalar::Null), 0.0);
        assert_eq!(to_number(&Scalar::Bool(true)), 1.0);
        assert_eq!(to_number(&Scalar::Bool(false)), 0.0);
    }

    #[test]
    fn to_number_never_non_finite() {
        assert_eq!(to_number(&Scalar::Number(f64::NAN)), 0.0);
        assert_eq!(to_number(&Scalar::Number(f64::INFINITY)), 0.0);
    }

    #[test]
    fn to_date_iso() {
        let ms = to_date(&Scalar::String("2024-01-15".into())).unwrap();
        assert_eq!(ms, to_date(&Scalar::String("2024-01-15 00:00:00".into())).unwrap());
    }

    #[test]
    fn to_date_dmy_and_mdy() {
        let dmy = to_date(&Scalar::String("15-01-2024".into())).unwrap();
        let iso = to_date(&Scalar::String("2024-01-15".into())).unwrap();
        assert_eq!(dmy, iso);

        let mdy = to_date(&Scalar::String("01/15/2024".into())).unwrap();
        assert_eq!(mdy, iso);
    }

    #[test]
    fn to_date_two_digit_year() {
        let ms = to_date(&Scalar::String("15-01-24".into())).unwrap();
        let expect = to_date(&Scalar::String("2024-01-15".into())).unwrap();
        assert_eq!(ms, expect);
    }

    #[test]
    fn to_date_with_time() {
        let ms = to_date(&Scalar::String("2024-01-15 09:07:30".into())).unwrap();
        let midnight = to_date(&Scalar::String("2024-01-15".into())).unwrap();
        assert_eq!(ms - midnight, (9 * 3600 + 7 * 60 + 30) * 1000);
    }

    #[test]
    fn to_date_idempotent() {
        let ms = to_date(&Scalar::String("15/01/2024".into())).unwrap();
        assert_eq!(to_date(&Scalar::Date(ms)), Some(ms));
    }

    #[test]
    fn to_date_invalid_returns_none() {
        assert_eq!(to_date(&Scalar::String("not a date".into())), None);
        assert_eq!(to_date(&Scalar::Null), None);
    }

    #[test]
    fn to_string_roundtrip_number() {
        assert_eq!(to_string(&Scalar::Number(1500.0)), "1500");
        assert_eq!(to_string(&Scalar::Number(12.5)), "12.5");
        assert_eq!(to_string(&Scalar::Null), "");
    }
}
