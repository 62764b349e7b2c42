//! Transformation engine (C4): a closed set of cell-level step kinds, each
//! executed via [`execute_step`], composed into validated pipelines.

use chrono::{TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::StepErrorKind;
use crate::value::{self, Scalar};

/// Collaborators a step may need: currency rates and the run clock.
pub trait CurrencyRateProvider {
    fn rate(&self, from: &str, to: &str) -> Option<f64>;
}

pub trait Clock {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.0
    }
}

pub struct ExecContext<'a> {
    pub rates: &'a dyn CurrencyRateProvider,
    pub clock: &'a dyn Clock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    Round,
    Ceil,
    Floor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagPosition {
    Prefix,
    Suffix,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandardizeFormatType {
    Phone,
    Email,
    Title,
    Sentence,
}

/// The closed set of cell-level transformation kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StepKind {
    CleanString {
        #[serde(default = "default_true")]
        trim: bool,
        #[serde(default = "default_true")]
        normalize_spaces: bool,
    },
    Trim,
    Lowercase,
    Uppercase,
    RemoveSpecialChars {
        #[serde(default)]
        keep_alphanumeric: bool,
        #[serde(default)]
        replacement: String,
    },
    CastToDate {
        #[serde(default)]
        input_format: Option<String>,
        #[serde(default)]
        strict_parsing: bool,
    },
    CastToNumber {
        #[serde(default = "default_true")]
        remove_commas: bool,
        #[serde(default = "default_true")]
        remove_currency: bool,
    },
    CastToString,
    ConvertTimezone {
        from_timezone: String,
        to_timezone: String,
    },
    FormatDate {
        output_format: Option<String>,
    },
    CurrencyConversion {
        from_currency: String,
        to_currency: String,
        #[serde(default)]
        exchange_rate: Option<f64>,
    },
    RoundNumber {
        decimal_places: u32,
        #[serde(default = "default_round_mode")]
        rounding_mode: RoundingMode,
    },
    ReplaceText {
        search_text: String,
        replace_with: String,
        #[serde(default)]
        use_regex: bool,
        #[serde(default = "default_true")]
        case_sensitive: bool,
    },
    ExtractSubstring {
        start_position: usize,
        #[serde(default)]
        length: Option<usize>,
    },
    StandardizeFormat {
        format_type: StandardizeFormatType,
    },
    Conditional {
        condition: String,
        true_value: String,
        false_value: String,
        #[serde(default = "default_data_type")]
        data_type: crate::model::DataType,
    },
    AbsoluteValue,
    NegateNumber,
    ScaleNumber {
        factor: f64,
    },
    FillNull {
        fill_value: String,
        #[serde(default = "default_true")]
        treat_empty_as_null: bool,
        #[serde(default)]
        treat_zero_as_null: bool,
    },
    FlagMissing {
        flag_value: String,
        flag_position: FlagPosition,
    },
    ExcludeIfNull {
        #[serde(default)]
        threshold: Option<f64>,
        #[serde(default = "default_true")]
        treat_empty_as_null: bool,
    },
}

fn default_true() -> bool {
    true
}
fn default_round_mode() -> RoundingMode {
    RoundingMode::Round
}
fn default_data_type() -> crate::model::DataType {
    crate::model::DataType::String
}

/// One pipeline step: a kind plus the column it reads from and (optionally)
/// writes to, ordered within the pipeline by `order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationStep {
    pub id: String,
    pub order: u32,
    pub side: crate::model::Side,
    pub column_id: String,
    #[serde(default)]
    pub output_column: Option<String>,
    #[serde(flatten)]
    pub kind: StepKind,
}

/// Outcome of a single step's execution, kept regardless of success so the
/// caller can build a `stepResults` report.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub step_id: String,
    pub ok: bool,
    pub error: Option<StepErrorKind>,
}

pub fn format_date_ms(ms: i64, output_format: Option<&str>) -> String {
    let dt = match Utc.timestamp_millis_opt(ms) {
        chrono::LocalResult::Single(dt) => dt,
        _ => return String::new(),
    };
    let pattern = match output_format {
        Some("YYYY-MM-DD") => "%Y-%m-%d",
        Some("MM/DD/YYYY") => "%m/%d/%Y",
        Some("DD/MM/YYYY") => "%d/%m/%Y",
        Some("YYYY-MM-DD HH:mm:ss") => "%Y-%m-%d %H:%M:%S",
        Some("DD-MM-YYYY HH:mm") => "%d-%m-%Y %H:%M",
        Some("MM-DD-YYYY HH:mm") => "%m-%d-%Y %H:%M",
        _ => "%Y-%m-%dT%H:%M:%S%.3fZ",
    };
    dt.format(pattern).to_string()
}

fn round_half_away_from_zero(x: f64, places: u32) -> f64 {
    let factor = 10f64.powi(places as i32);
    if x >= 0.0 {
        (x * factor + 0.5).floor() / factor
    } else {
        (x * factor - 0.5).ceil() / factor
    }
}

fn is_missing(v: &Scalar, treat_empty_as_null: bool, treat_zero_as_null: bool) -> bool {
    v.is_missing(treat_empty_as_null)
        || (treat_zero_as_null && matches!(v, Scalar::Number(n) if *n == 0.0))
}

fn resolve_fill_sentinel(raw: &str, clock: &dyn Clock) -> Scalar {
    match raw {
        "current_date" | "current_datetime" | "current_timestamp" => Scalar::Date(clock.now_ms()),
        _ => Scalar::String(raw.to_string()),
    }
}

/// Execute one step against `value`. Returns the new value, or the original
/// step-*input* error kind per §4.4 — the caller is responsible for passing
/// the original input through on error.
pub fn execute_step(value: &Scalar, kind: &StepKind, ctx: &ExecContext) -> Result<Scalar, StepErrorKind> {
    match kind {
        StepKind::CleanString { trim, normalize_spaces } => {
            let mut s = value::to_string(value);
            if *trim {
                s = s.trim().to_string();
            }
            if *normalize_spaces {
                s = s.split_whitespace().collect::<Vec<_>>().join(" ");
            }
            Ok(Scalar::String(s))
        }
        StepKind::Trim => Ok(Scalar::String(value::to_string(value).trim().to_string())),
        StepKind::Lowercase => Ok(Scalar::String(value::to_string(value).to_lowercase())),
        StepKind::Uppercase => Ok(Scalar::String(value::to_string(value).to_uppercase())),
        StepKind::RemoveSpecialChars { keep_alphanumeric: _, replacement } => {
            let s = value::to_string(value);
            let out: String = s
                .chars()
                .map(|c| {
                    if c.is_alphanumeric() || c.is_whitespace() {
                        c.to_string()
                    } else {
                        replacement.clone()
                    }
                })
                .collect();
            Ok(Scalar::String(out))
        }
        StepKind::CastToDate { input_format: _, strict_parsing } => {
            let s = value::to_string(value);
            match value::to_date(&Scalar::String(s.clone())) {
                Some(ms) => {
                    if *strict_parsing {
                        let reconstructed = format_date_ms(ms, None);
                        if reconstructed.is_empty() {
                            return Err(StepErrorKind::ParseFailed(s));
                        }
                    }
                    Ok(Scalar::Date(ms))
                }
                None => Err(StepErrorKind::ParseFailed(s)),
            }
        }
        StepKind::CastToNumber { .. } => {
            let s = value::to_string(value);
            Ok(Scalar::Number(value::to_number(&Scalar::String(s))))
        }
        StepKind::CastToString => Ok(Scalar::String(value::to_string(value))),
        StepKind::ConvertTimezone { from_timezone, to_timezone } => {
            let is_utc = |z: &str| matches!(z.to_uppercase().as_str(), "UTC" | "+00:00" | "Z" | "GMT");
            if is_utc(from_timezone) && is_utc(to_timezone) {
                match value.is_date() {
                    true => Ok(value.clone()),
                    false => Err(StepErrorKind::InvalidParam("convert_timezone requires a date value".into())),
                }
            } else {
                Err(StepErrorKind::Unsupported(format!(
                    "timezone conversion {from_timezone} -> {to_timezone} (no zone database injected)"
                )))
            }
        }
        StepKind::FormatDate { output_format } => {
            let ms = value::to_date(value).ok_or_else(|| StepErrorKind::ParseFailed(value::to_string(value)))?;
            Ok(Scalar::String(format_date_ms(ms, output_format.as_deref())))
        }
        StepKind::CurrencyConversion { from_currency, to_currency, exchange_rate } => {
            if from_currency.eq_ignore_ascii_case(to_currency) {
                return Ok(value.clone());
            }
            let rate = match exchange_rate {
                Some(r) => *r,
                None => ctx.rates.rate(from_currency, to_currency).ok_or_else(|| {
                    StepErrorKind::MissingRate { from: from_currency.clone(), to: to_currency.clone() }
                })?,
            };
            Ok(Scalar::Number(value::to_number(value) * rate))
        }
        StepKind::RoundNumber { decimal_places, rounding_mode } => {
            let n = value::to_number(value);
            let factor = 10f64.powi(*decimal_places as i32);
            let rounded = match rounding_mode {
                RoundingMode::Round => round_half_away_from_zero(n, *decimal_places),
                RoundingMode::Ceil => (n * factor).ceil() / factor,
                RoundingMode::Floor => (n * factor).floor() / factor,
            };
            Ok(Scalar::Number(rounded))
        }
        StepKind::ReplaceText { search_text, replace_with, use_regex, case_sensitive } => {
            let s = value::to_string(value);
            let replaced = if *use_regex {
                let pattern = if *case_sensitive {
                    search_text.clone()
                } else {
                    format!("(?i){search_text}")
                };
                let re = Regex::new(&pattern)
                    .map_err(|e| StepErrorKind::InvalidParam(format!("bad regex: {e}")))?;
                re.replace_all(&s, replace_with.as_str()).into_owned()
            } else if *case_sensitive {
                s.replace(search_text.as_str(), replace_with)
            } else {
                replace_case_insensitive(&s, search_text, replace_with)
            };
            Ok(Scalar::String(replaced))
        }
        StepKind::ExtractSubstring { start_position, length } => {
            let s = value::to_string(value);
            let chars: Vec<char> = s.chars().collect();
            if *start_position >= chars.len() {
                return Ok(Scalar::String(String::new()));
            }
            let end = match length {
                Some(len) => (*start_position + len).min(chars.len()),
                None => chars.len(),
            };
            Ok(Scalar::String(chars[*start_position..end].iter().collect()))
        }
        StepKind::StandardizeFormat { format_type } => Ok(Scalar::String(standardize(&value::to_string(value), *format_type))),
        StepKind::Conditional { condition, true_value, false_value, data_type } => {
            let outcome = crate::cond::evaluate(condition, value)
                .map_err(StepErrorKind::InvalidParam)?;
            let chosen = if outcome { true_value } else { false_value };
            Ok(cast_literal(chosen, *data_type))
        }
        StepKind::AbsoluteValue => Ok(Scalar::Number(value::to_number(value).abs())),
        StepKind::NegateNumber => Ok(Scalar::Number(-value::to_number(value))),
        StepKind::ScaleNumber { factor } => Ok(Scalar::Number(value::to_number(value) * factor)),
        StepKind::FillNull { fill_value, treat_empty_as_null, treat_zero_as_null } => {
            if is_missing(value, *treat_empty_as_null, *treat_zero_as_null) {
                Ok(resolve_fill_sentinel(fill_value, ctx.clock))
            } else {
                Ok(value.clone())
            }
        }
        StepKind::FlagMissing { flag_value, flag_position } => {
            if !value.is_missing(true) {
                return Ok(value.clone());
            }
            let s = value::to_string(value);
            let flagged = match flag_position {
                FlagPosition::Prefix => format!("{flag_value}{s}"),
                FlagPosition::Suffix => format!("{s}{flag_value}"),
                FlagPosition::Replace => flag_value.clone(),
            };
            Ok(Scalar::String(flagged))
        }
        StepKind::ExcludeIfNull { threshold, treat_empty_as_null } => {
            let missing = value.is_missing(*treat_empty_as_null);
            let below_threshold = match threshold {
                Some(t) => value.is_number() && value::to_number(value) < *t,
                None => false,
            };
            if missing || below_threshold {
                Err(StepErrorKind::ExcludeRow)
            } else {
                Ok(value.clone())
            }
        }
    }
}

fn replace_case_insensitive(s: &str, search: &str, replacement: &str) -> String {
    if search.is_empty() {
        return s.to_string();
    }
    let lower_s = s.to_lowercase();
    let lower_search = search.to_lowercase();
    let mut out = String::new();
    let mut rest = s;
    let mut rest_lower = lower_s.as_str();
    while let Some(idx) = rest_lower.find(&lower_search) {
        out.push_str(&rest[..idx]);
        out.push_str(replacement);
        rest = &rest[idx + search.len()..];
        rest_lower = &rest_lower[idx + search.len()..];
    }
    out.push_str(rest);
    out
}

fn standardize(s: &str, format_type: StandardizeFormatType) -> String {
    match format_type {
        StandardizeFormatType::Phone => {
            let digits: String = s.chars().filter(|c| c.is_ascii_digit()).collect();
            if digits.len() == 10 {
                format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..10])
            } else {
                s.to_string()
            }
        }
        StandardizeFormatType::Email => s.trim().to_lowercase(),
        StandardizeFormatType::Title => s
            .split_whitespace()
            .map(title_case_word)
            .collect::<Vec<_>>()
            .join(" "),
        StandardizeFormatType::Sentence => {
            let lower = s.to_lowercase();
            let mut chars = lower.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        }
    }
}

fn title_case_word(w: &str) -> String {
    let lower = w.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn cast_literal(literal: &str, data_type: crate::model::DataType) -> Scalar {
    match data_type {
        crate::model::DataType::String => Scalar::String(literal.to_string()),
        crate::model::DataType::Number => Scalar::Number(value::to_number(&Scalar::String(literal.to_string()))),
        crate::model::DataType::Date => match value::to_date(&Scalar::String(literal.to_string())) {
            Some(ms) => Scalar::Date(ms),
            None => Scalar::Null,
        },
        crate::model::DataType::Boolean => Scalar::Bool(literal.eq_ignore_ascii_case("true")),
    }
}

/// Validate a step's parameters and the pipeline-level cross-step rule
/// (`cast_to_date` must precede `convert_timezone`).
pub fn validate_pipeline(steps: &[TransformationStep]) -> Result<(), crate::error::ReconError> {
    let mut cast_to_date_order: Option<u32> = None;
    let mut convert_timezone_order: Option<u32> = None;

    for step in steps {
        match &step.kind {
            StepKind::RoundNumber { decimal_places, .. } if *decimal_places > 15 => {
                return Err(crate::error::ReconError::ConfigInvalid {
                    reason: format!("step '{}': decimal_places out of range", step.id),
                });
            }
            StepKind::ExtractSubstring { length: Some(len), .. } if *len == 0 => {
                return Err(crate::error::ReconError::ConfigInvalid {
                    reason: format!("step '{}': extract_substring length must be > 0", step.id),
                });
            }
            StepKind::ReplaceText { use_regex: true, search_text, .. } if Regex::new(search_text).is_err() => {
                return Err(crate::error::ReconError::ConfigInvalid {
                    reason: format!("step '{}': invalid regex pattern", step.id),
                });
            }
            StepKind::CastToDate { .. } => cast_to_date_order = Some(step.order),
            StepKind::ConvertTimezone { .. } => convert_timezone_order = Some(step.order),
            _ => {}
        }
    }

    if let (Some(date_order), Some(tz_order)) = (cast_to_date_order, convert_timezone_order) {
        if date_order > tz_order {
            return Err(crate::error::ReconError::ConfigInvalid {
                reason: "cast_to_date must precede convert_timezone in the pipeline".into(),
            });
        }
    }

    Ok(())
}

/// Apply `steps` in ascending `order` to `value`. On a step failure the
/// *original* input to that step flows to the next step; the failure is
/// recorded in the returned outcome list.
pub fn apply_pipeline(
    value: Scalar,
    steps: &[TransformationStep],
    ctx: &ExecContext,
) -> (Scalar, Vec<StepOutcome>) {
    let mut ordered: Vec<&TransformationStep> = steps.iter().collect();
    ordered.sort_by_key(|s| s.order);

    let mut current = value;
    let mut outcomes = Vec::with_capacity(ordered.len());

    for step in ordered {
        match execute_step(&current, &step.kind, ctx) {
            Ok(next) => {
                outcomes.push(StepOutcome { step_id: step.id.clone(), ok: true, error: None });
                current = next;
            }
            Err(err) => {
                log::warn!("step '{}' failed: {err}", step.id);
                outcomes.push(StepOutcome { step_id: step.id.clone(), ok: false, error: Some(err) });
                // current stays the pre-step input
            }
        }
    }

    (current, outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoRates;
    impl CurrencyRateProvider for NoRates {
        fn rate(&self, _from: &str, _to: &str) -> Option<f64> {
            None
        }
    }
    struct FixedRate(f64);
    impl CurrencyRateProvider for FixedRate {
        fn rate(&self, _from: &str, _to: &str) -> Option<f64> {
            Some(self.0)
        }
    }

    fn ctx<'a>(rates: &'a dyn CurrencyRateProvider, clock: &'a dyn Clock) -> ExecContext<'a> {
        ExecContext { rates, clock }
    }

    #[test]
    fn clean_string_collapses_whitespace() {
        let rates = NoRates;
        let clock = FixedClock(0);
        let out = execute_step(
            &Scalar::String("  a   b  ".into()),
            &StepKind::CleanString { trim: true, normalize_spaces: true },
            &ctx(&rates, &clock),
        )
        .unwrap();
        assert_eq!(out, Scalar::String("a b".into()));
    }

    #[test]
    fn round_half_away_from_zero_matches_spec() {
        let rates = NoRates;
        let clock = FixedClock(0);
        let out = execute_step(
            &Scalar::Number(2.345),
            &StepKind::RoundNumber { decimal_places: 2, rounding_mode: RoundingMode::Round },
            &ctx(&rates, &clock),
        )
        .unwrap();
        assert_eq!(out, Scalar::Number(2.35));

        let out_neg = execute_step(
            &Scalar::Number(-2.345),
            &StepKind::RoundNumber { decimal_places: 2, rounding_mode: RoundingMode::Round },
            &ctx(&rates, &clock),
        )
        .unwrap();
        assert_eq!(out_neg, Scalar::Number(-2.35));
    }

    #[test]
    fn round_idempotent() {
        let rates = NoRates;
        let clock = FixedClock(0);
        let step = StepKind::RoundNumber { decimal_places: 2, rounding_mode: RoundingMode::Round };
        let once = execute_step(&Scalar::Number(1.005), &step, &ctx(&rates, &clock)).unwrap();
        let twice = execute_step(&once, &step, &ctx(&rates, &clock)).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn currency_conversion_same_currency_noop() {
        let rates = NoRates;
        let clock = FixedClock(0);
        let out = execute_step(
            &Scalar::Number(10.0),
            &StepKind::CurrencyConversion { from_currency: "USD".into(), to_currency: "usd".into(), exchange_rate: None },
            &ctx(&rates, &clock),
        )
        .unwrap();
        assert_eq!(out, Scalar::Number(10.0));
    }

    #[test]
    fn currency_conversion_missing_rate_errors() {
        let rates = NoRates;
        let clock = FixedClock(0);
        let err = execute_step(
            &Scalar::Number(10.0),
            &StepKind::CurrencyConversion { from_currency: "USD".into(), to_currency: "EUR".into(), exchange_rate: None },
            &ctx(&rates, &clock),
        )
        .unwrap_err();
        assert!(matches!(err, StepErrorKind::MissingRate { .. }));
    }

    #[test]
    fn currency_conversion_applies_injected_rate() {
        let rates = FixedRate(0.9);
        let clock = FixedClock(0);
        let out = execute_step(
            &Scalar::Number(100.0),
            &StepKind::CurrencyConversion { from_currency: "USD".into(), to_currency: "EUR".into(), exchange_rate: None },
            &ctx(&rates, &clock),
        )
        .unwrap();
        assert_eq!(out, Scalar::Number(90.0));
    }

    #[test]
    fn replace_text_literal_case_insensitive() {
        let rates = NoRates;
        let clock = FixedClock(0);
        let out = execute_step(
            &Scalar::String("Hello World".into()),
            &StepKind::ReplaceText {
                search_text: "world".into(),
                replace_with: "Rust".into(),
                use_regex: false,
                case_sensitive: false,
            },
            &ctx(&rates, &clock),
        )
        .unwrap();
        assert_eq!(out, Scalar::String("Hello Rust".into()));
    }

    #[test]
    fn extract_substring_clamps() {
        let rates = NoRates;
        let clock = FixedClock(0);
        let out = execute_step(
            &Scalar::String("abcdef".into()),
            &StepKind::ExtractSubstring { start_position: 3, length: Some(10) },
            &ctx(&rates, &clock),
        )
        .unwrap();
        assert_eq!(out, Scalar::String("def".into()));
    }

    #[test]
    fn standardize_phone() {
        assert_eq!(standardize("1234567890", StandardizeFormatType::Phone), "(123) 456-7890");
    }

    #[test]
    fn standardize_title_and_sentence() {
        assert_eq!(standardize("the quick FOX", StandardizeFormatType::Title), "The Quick Fox");
        assert_eq!(standardize("the QUICK fox", StandardizeFormatType::Sentence), "The quick fox");
    }

    #[test]
    fn fill_null_sentinel_uses_clock() {
        let rates = NoRates;
        let clock = FixedClock(12345);
        let out = execute_step(
            &Scalar::Null,
            &StepKind::FillNull { fill_value: "current_timestamp".into(), treat_empty_as_null: true, treat_zero_as_null: false },
            &ctx(&rates, &clock),
        )
        .unwrap();
        assert_eq!(out, Scalar::Date(12345));
    }

    #[test]
    fn exclude_if_null_signals_exclude_row() {
        let rates = NoRates;
        let clock = FixedClock(0);
        let err = execute_step(
            &Scalar::Null,
            &StepKind::ExcludeIfNull { threshold: None, treat_empty_as_null: true },
            &ctx(&rates, &clock),
        )
        .unwrap_err();
        assert_eq!(err, StepErrorKind::ExcludeRow);
    }

    #[test]
    fn pipeline_failure_passes_through_original_input() {
        let rates = NoRates;
        let clock = FixedClock(0);
        let steps = vec![
            TransformationStep {
                id: "s1".into(),
                order: 0,
            side: crate::model::Side::Source,
                column_id: "amount".into(),
                output_column: None,
                kind: StepKind::CurrencyConversion { from_currency: "USD".into(), to_currency: "EUR".into(), exchange_rate: None },
            },
            TransformationStep {
                id: "s2".into(),
                order: 1,
            side: crate::model::Side::Source,
                column_id: "amount".into(),
                output_column: None,
                kind: StepKind::AbsoluteValue,
            },
        ];
        let (result, outcomes) = apply_pipeline(Scalar::Number(-5.0), &steps, &ctx(&rates, &clock));
        assert_eq!(result, Scalar::Number(5.0));
        assert!(!outcomes[0].ok);
        assert!(outcomes[1].ok);
    }

    #[test]
    fn validate_pipeline_rejects_wrong_order() {
        let steps = vec![
            TransformationStep {
                id: "tz".into(),
                order: 0,
            side: crate::model::Side::Source,
                column_id: "d".into(),
                output_column: None,
                kind: StepKind::ConvertTimezone { from_timezone: "UTC".into(), to_timezone: "UTC".into() },
            },
            TransformationStep {
                id: "cast".into(),
                order: 1,
            side: crate::model::Side::Source,
                column_id: "d".into(),
                output_column: None,
                kind: StepKind::CastToDate { input_format: None, strict_parsing: false },
            },
        ];
        assert!(validate_pipeline(&steps).is_err());
    }

    #[test]
    fn clean_string_idempotent() {
        let rates = NoRates;
        let clock = FixedClock(0);
        let kind = StepKind::CleanString { trim: true, normalize_spaces: true };
        let once = execute_step(&Scalar::String("  a   b  ".into()), &kind, &ctx(&rates, &clock)).unwrap();
        let twice = execute_step(&once, &kind, &ctx(&rates, &clock)).unwrap();
        assert_eq!(once, twice);
    }
}
