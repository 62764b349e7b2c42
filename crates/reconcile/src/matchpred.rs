//! Match predicates and confidence scoring (C6).

use serde::{Deserialize, Serialize};

use crate::model::ColumnMapping;
use crate::value::{self, Scalar};

/// Tolerance unit a comparison is evaluated under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToleranceUnit {
    Exact,
    Minutes,
    Hours,
    Days,
    Amount,
    Percentage,
}

/// A tolerance value plus its unit, either global (reconciliation config) or
/// overridden per mapping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceSpec {
    pub tolerance: f64,
    pub unit: ToleranceUnit,
}

impl ToleranceSpec {
    pub fn exact() -> Self {
        ToleranceSpec { tolerance: 0.0, unit: ToleranceUnit::Exact }
    }

    fn tolerance_ms(&self) -> i64 {
        match self.unit {
            ToleranceUnit::Minutes => (self.tolerance * 60_000.0) as i64,
            ToleranceUnit::Hours => (self.tolerance * 3_600_000.0) as i64,
            ToleranceUnit::Days => (self.tolerance * 86_400_000.0) as i64,
            _ => 0,
        }
    }
}

/// `values_match(a, b, cfg)`: unit-aware equivalence used by the matcher.
pub fn values_match(a: &Scalar, b: &Scalar, cfg: &ToleranceSpec) -> bool {
    if a == b {
        return true;
    }

    let time_based_unit = matches!(cfg.unit, ToleranceUnit::Minutes | ToleranceUnit::Hours | ToleranceUnit::Days);
    if (a.is_date() && b.is_date()) || (time_based_unit && !a.is_number() && !b.is_number()) {
        if let (Some(am), Some(bm)) = (value::to_date(a), value::to_date(b)) {
            return (am - bm).abs() <= cfg.tolerance_ms().max(0);
        }
        if a.is_date() || b.is_date() {
            return false;
        }
    }

    if a.is_number() && b.is_number() {
        let (an, bn) = (value::to_number(a), value::to_number(b));
        return match cfg.unit {
            ToleranceUnit::Percentage => {
                let bound = bn.abs() * (cfg.tolerance / 100.0);
                if bn == 0.0 {
                    an == 0.0
                } else {
                    (an - bn).abs() <= bound
                }
            }
            ToleranceUnit::Amount => (an - bn).abs() <= cfg.tolerance,
            _ => an == bn,
        };
    }

    if a.is_string() && b.is_string() {
        return trimmed_lower(a) == trimmed_lower(b);
    }

    trimmed_lower(a) == trimmed_lower(b)
}

fn trimmed_lower(v: &Scalar) -> String {
    value::to_string(v).trim().to_lowercase()
}

/// Field-weight heuristic for confidence scoring: matched by substring
/// against the mapping's target column name.
pub fn field_weight(column_name: &str) -> u32 {
    let lower = column_name.to_lowercase();
    if lower.contains("id") || lower.contains("reference") || lower.contains("amount") || lower.contains("value") {
        3
    } else if lower.contains("date") || lower.contains("description") || lower.contains("details") {
        2
    } else {
        1
    }
}

/// Weighted fraction of mapped fields that match between a source/target
/// pair, in `[0, 1]`.
pub fn confidence(
    source: &crate::model::Row,
    target: &crate::model::Row,
    mappings: &[ColumnMapping],
    default_tolerance: &ToleranceSpec,
) -> f64 {
    let mut matched_weight = 0u32;
    let mut total_weight = 0u32;

    for m in mappings {
        let weight = field_weight(&m.target);
        total_weight += weight;

        let (sv, tv) = crate::model::resolve_mapped_pair(m, source, target);
        let tol = m.tolerance_override.as_ref().unwrap_or(default_tolerance);
        if values_match(&sv, &tv, tol) {
            matched_weight += weight;
        }
    }

    if total_weight == 0 {
        0.0
    } else {
        matched_weight as f64 / total_weight as f64
    }
}

/// Discrepancy strings (`"<col>: <sv> != <tv>"`) for every mapping whose
/// values fail [`values_match`].
pub fn discrepancies(
    source: &crate::model::Row,
    target: &crate::model::Row,
    mappings: &[ColumnMapping],
    default_tolerance: &ToleranceSpec,
) -> Vec<String> {
    let mut out = Vec::new();
    for m in mappings {
        let (sv, tv) = crate::model::resolve_mapped_pair(m, source, target);
        let tol = m.tolerance_override.as_ref().unwrap_or(default_tolerance);
        if !values_match(&sv, &tv, tol) {
            out.push(format!(
                "{}: {} != {}",
                m.target,
                value::to_string(&sv),
                value::to_string(&tv)
            ));
        }
    }
    out
}
