//! Data model (C9): rows, mappings, virtual fields, and the verdict record.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value::Scalar;

/// An unordered mapping from column name to [`Scalar`]. May carry the
/// reserved `__line` key (see [`crate::value::LINE_KEY`]); that key survives
/// preprocessing but never participates in matching.
pub type Row = HashMap<String, Scalar>;

pub fn line_of(row: &Row) -> Option<i64> {
    match row.get(crate::value::LINE_KEY) {
        Some(Scalar::Number(n)) => Some(*n as i64),
        Some(Scalar::Date(ms)) => Some(*ms),
        _ => None,
    }
}

/// Which side of the reconciliation a virtual field or column belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Source,
    Target,
}

/// How a [`ColumnMapping`] is compared during matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Exact,
    Fuzzy,
    Formula,
}

/// Mapping-level formula for composite amount/debit-credit columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormulaDescriptor {
    DebitCreditToAmount { debit_column: String, credit_column: String },
    AmountToDebitCredit {
        amount_column: String,
        debit_column: String,
        credit_column: String,
    },
    Custom { name: String },
}

/// One column's selector: either a single column name, or an ordered list
/// concatenated with single spaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SourceSelector {
    Single(String),
    List(Vec<String>),
}

impl SourceSelector {
    pub fn is_empty(&self) -> bool {
        match self {
            SourceSelector::Single(s) => s.is_empty(),
            SourceSelector::List(v) => v.is_empty(),
        }
    }

    /// Resolve against a row, concatenating list members with single spaces.
    pub fn resolve(&self, row: &Row) -> Scalar {
        match self {
            SourceSelector::Single(name) => row.get(name).cloned().unwrap_or(Scalar::Null),
            SourceSelector::List(names) => {
                let joined = names
                    .iter()
                    .map(|n| crate::value::to_string(&row.get(n).cloned().unwrap_or(Scalar::Null)))
                    .collect::<Vec<_>>()
                    .join(" ");
                Scalar::String(joined)
            }
        }
    }
}

/// A declared correspondence between a source selector and a target column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnMapping {
    pub id: String,
    pub source: SourceSelector,
    pub target: String,
    pub match_kind: MatchKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance_override: Option<crate::matchpred::ToleranceSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<FormulaDescriptor>,
}

/// A reference to a column inside a virtual-field formula; `is_virtual`
/// marks references into the same side's other virtual fields (resolved by
/// the planner, C3) versus physical row columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    pub name: String,
    pub is_virtual: bool,
}

/// One operation in a virtual field's fold-left operation tape (C2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    Add,
    Subtract,
    Multiply,
    Divide,
    Abs,
    Negate,
    Concat,
    DateDiff,
}

impl Op {
    pub fn is_unary(self) -> bool {
        matches!(self, Op::Abs | Op::Negate)
    }
}

/// The declared result type of a virtual field, used to pick a default
/// `Scalar` shape when evaluation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Number,
    String,
    Date,
    Boolean,
}

/// Named computed column scoped to one side.
///
/// Invariant: `operations.len() == fields.len().saturating_sub(1)` — a
/// single field means no operations (identity passthrough).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualField {
    pub name: String,
    pub side: Side,
    pub data_type: DataType,
    pub fields: Vec<FieldRef>,
    pub operations: Vec<Op>,
}

impl VirtualField {
    pub fn is_well_formed(&self) -> bool {
        self.operations.len() == self.fields.len().saturating_sub(1)
    }
}

/// Disposition of a single reconciled pair or unmatched row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictStatus {
    Matched,
    Discrepancy,
    UnmatchedSource,
    UnmatchedTarget,
}

/// One reconciliation verdict (C9).
///
/// Invariants: `status = UnmatchedSource` implies `target_row.is_none()`;
/// `status = UnmatchedTarget` implies `source_row.is_none()`; `status` in
/// `{Matched, Discrepancy}` implies both rows are present.
#[derive(Debug, Clone, Serialize)]
pub struct ReconResult {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_row: Option<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_row: Option<Row>,
    pub status: VerdictStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discrepancies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

impl ReconResult {
    pub fn invariants_hold(&self) -> bool {
        match self.status {
            VerdictStatus::UnmatchedSource => self.target_row.is_none(),
            VerdictStatus::UnmatchedTarget => self.source_row.is_none(),
            VerdictStatus::Matched | VerdictStatus::Discrepancy => {
                self.source_row.is_some() && self.target_row.is_some()
            }
        }
    }
}

/// Summary counters alongside the ordered verdict list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconSummary {
    pub matched: usize,
    pub discrepancy: usize,
    pub unmatched_source: usize,
    pub unmatched_target: usize,
    pub dropped_rows: usize,
}

impl ReconSummary {
    pub fn from_results(results: &[ReconResult], dropped_rows: usize) -> Self {
        let mut s = ReconSummary { dropped_rows, ..Default::default() };
        for r in results {
            match r.status {
                VerdictStatus::Matched => s.matched += 1,
                VerdictStatus::Discrepancy => s.discrepancy += 1,
                VerdictStatus::UnmatchedSource => s.unmatched_source += 1,
                VerdictStatus::UnmatchedTarget => s.unmatched_target += 1,
            }
        }
        s
    }
}

/// Full batch output: ordered verdicts plus summary counters.
#[derive(Debug, Clone, Serialize)]
pub struct ReconBatch {
    pub results: Vec<ReconResult>,
    pub summary: ReconSummary,
}

/// Row-id used for target-side deduplication (C7): the first present of
/// `{id, transaction_id, reference, ref_number}` (case-insensitive key
/// lookup), else a stable hash of the row's sorted-key JSON projection.
pub fn row_identity(row: &Row) -> String {
    const ID_KEYS: [&str; 4] = ["id", "transaction_id", "reference", "ref_number"];
    for wanted in ID_KEYS {
        for (k, v) in row {
            if k.eq_ignore_ascii_case(wanted) && !v.is_null() {
                return crate::value::to_string(v);
            }
        }
    }

    use std::collections::BTreeMap;
    use std::hash::{Hash, Hasher};

    let sorted: BTreeMap<&str, String> = row
        .iter()
        .filter(|(k, _)| k.as_str() != crate::value::LINE_KEY)
        .map(|(k, v)| (k.as_str(), crate::value::to_string(v)))
        .collect();
    let canonical = serde_json::to_string(&sorted).unwrap_or_default();
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    canonical.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Resolve a mapping's comparable `(source, target)` value pair, applying
/// its [`FormulaDescriptor`] when present instead of the plain
/// `source`/`target` selectors. `debit_credit_to_amount` synthesizes
/// `amount := credit - debit` from the source row; `amount_to_debit_credit`
/// synthesizes the target-side column to compare against from the sign of
/// the source amount (positive -> credit, negative -> debit as absolute
/// value, zero -> credit).
pub fn resolve_mapped_pair(mapping: &ColumnMapping, source: &Row, target: &Row) -> (Scalar, Scalar) {
    match &mapping.formula {
        Some(FormulaDescriptor::DebitCreditToAmount { debit_column, credit_column }) => {
            let debit = crate::value::to_number(&source.get(debit_column).cloned().unwrap_or(Scalar::Null));
            let credit = crate::value::to_number(&source.get(credit_column).cloned().unwrap_or(Scalar::Null));
            let tv = target.get(&mapping.target).cloned().unwrap_or(Scalar::Null);
            (Scalar::Number(credit - debit), tv)
        }
        Some(FormulaDescriptor::AmountToDebitCredit { amount_column, debit_column, credit_column }) => {
            let amount = crate::value::to_number(&source.get(amount_column).cloned().unwrap_or(Scalar::Null));
            let (sv, target_column) = if amount < 0.0 {
                (Scalar::Number(amount.abs()), debit_column)
            } else {
                (Scalar::Number(amount), credit_column)
            };
            let tv = target.get(target_column).cloned().unwrap_or(Scalar::Null);
            (sv, tv)
        }
        Some(FormulaDescriptor::Custom { .. }) | None => {
            let sv = mapping.source.resolve(source);
            let tv = target.get(&mapping.target).cloned().unwrap_or(Scalar::Null);
            (sv, tv)
        }
    }
}

/// Best-effort amount extraction: the first mapping whose target column
/// name contains "amount" yields a numeric value from the given row.
pub fn extract_amount(row: &Row, mappings: &[ColumnMapping]) -> Option<f64> {
    mappings
        .iter()
        .find(|m| m.target.to_lowercase().contains("amount"))
        .and_then(|m| row.get(&m.target))
        .map(crate::value::to_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_field_well_formed_identity() {
        let f = VirtualField {
            name: "x".into(),
            side: Side::Source,
            data_type: DataType::Number,
            fields: vec![FieldRef { name: "amount".into(), is_virtual: false }],
            operations: vec![],
        };
        assert!(f.is_well_formed());
    }

    #[test]
    fn virtual_field_well_formed_with_ops() {
        let f = VirtualField {
            name: "x".into(),
            side: Side::Source,
            data_type: DataType::Number,
            fields: vec![
                FieldRef { name: "credit".into(), is_virtual: false },
                FieldRef { name: "debit".into(), is_virtual: false },
            ],
            operations: vec![Op::Subtract],
        };
        assert!(f.is_well_formed());
    }

    #[test]
    fn source_selector_concatenates_with_spaces() {
        let mut row = Row::new();
        row.insert("first".into(), Scalar::String("Jane".into()));
        row.insert("last".into(), Scalar::String("Doe".into()));
        let sel = SourceSelector::List(vec!["first".into(), "last".into()]);
        assert_eq!(sel.resolve(&row), Scalar::String("Jane Doe".into()));
    }

    #[test]
    fn result_invariants() {
        let unmatched_source = ReconResult {
            id: "1".into(),
            source_row: Some(Row::new()),
            target_row: None,
            status: VerdictStatus::UnmatchedSource,
            confidence: None,
            discrepancies: None,
            source_line: None,
            target_line: None,
            amount: None,
        };
        assert!(unmatched_source.invariants_hold());
    }

    #[test]
    fn line_of_reads_reserved_key() {
        let mut row = Row::new();
        row.insert(crate::value::LINE_KEY.into(), Scalar::Number(7.0));
        assert_eq!(line_of(&row), Some(7));
    }
}
