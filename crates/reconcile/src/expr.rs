//! Expression evaluator (C2): fold-left evaluation of a virtual field's
//! operation tape over a row (plus already-resolved virtual fields on the
//! same side, supplied by the planner).

use crate::error::EvalErrorKind;
use crate::model::{FieldRef, Op, VirtualField};
use crate::value::{self, Scalar};

/// Resolve one field reference: a physical row column, or an already-placed
/// virtual field's value looked up in `resolved`.
fn resolve_field(
    field: &FieldRef,
    row: &crate::model::Row,
    resolved: &crate::model::Row,
) -> Result<Scalar, EvalErrorKind> {
    let source = if field.is_virtual { resolved } else { row };
    source
        .get(&field.name)
        .cloned()
        .ok_or_else(|| EvalErrorKind::MissingField(field.name.clone()))
}

/// Apply one binary/unary operation to the running accumulator.
fn apply_op(op: Op, accum: Scalar, next: Option<&Scalar>) -> Result<Scalar, EvalErrorKind> {
    match op {
        Op::Abs => Ok(Scalar::Number(value::to_number(&accum).abs())),
        Op::Negate => Ok(Scalar::Number(-value::to_number(&accum))),
        Op::Concat => {
            let next = next.ok_or_else(|| EvalErrorKind::TypeError("concat needs an operand".into()))?;
            Ok(Scalar::String(format!(
                "{}{}",
                value::to_string(&accum),
                value::to_string(next)
            )))
        }
        Op::DateDiff => {
            let next = next.ok_or_else(|| EvalErrorKind::TypeError("date_diff needs an operand".into()))?;
            let left = value::to_date(&accum).ok_or_else(|| {
                EvalErrorKind::BadDate(value::to_string(&accum))
            })?;
            let right = value::to_date(next).ok_or_else(|| EvalErrorKind::BadDate(value::to_string(next)))?;
            Ok(Scalar::Number(((left - right) as f64 / 86_400_000.0).floor()))
        }
        Op::Add | Op::Subtract | Op::Multiply | Op::Divide => {
            let next = next.ok_or_else(|| EvalErrorKind::TypeError("arithmetic needs an operand".into()))?;
            let a = value::to_number(&accum);
            let b = value::to_number(next);
            let result = match op {
                Op::Add => a + b,
                Op::Subtract => a - b,
                Op::Multiply => a * b,
                Op::Divide => {
                    if b == 0.0 {
                        return Err(EvalErrorKind::DivisionByZero);
                    }
                    a / b
                }
                _ => unreachable!(),
            };
            if !result.is_finite() {
                return Err(EvalErrorKind::NonFinite);
            }
            Ok(Scalar::Number(result))
        }
    }
}

/// Evaluate a virtual field's formula: fold left over `operations`, pairing
/// `op[k]` with `fields[k+1]`. Unary ops consume only the accumulator and
/// still occupy one tape slot fewer than `fields`.
pub fn evaluate(
    field: &VirtualField,
    row: &crate::model::Row,
    resolved: &crate::model::Row,
) -> Result<Scalar, EvalErrorKind> {
    if field.fields.is_empty() {
        return Err(EvalErrorKind::MissingField(field.name.clone()));
    }

    let mut accum = resolve_field(&field.fields[0], row, resolved)?;

    for (i, op) in field.operations.iter().enumerate() {
        if op.is_unary() {
            accum = apply_op(*op, accum, None)?;
        } else {
            let next_ref = field
                .fields
                .get(i + 1)
                .ok_or_else(|| EvalErrorKind::TypeError("operation tape misaligned with fields".into()))?;
            let next = resolve_field(next_ref, row, resolved)?;
            accum = apply_op(*op, accum, Some(&next))?;
        }
    }

    Ok(accum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, Row, Side};

    fn field(name: &str, is_virtual: bool) -> FieldRef {
        FieldRef { name: name.into(), is_virtual }
    }

    #[test]
    fn identity_single_field() {
        let vf = VirtualField {
            name: "x".into(),
            side: Side::Source,
            data_type: DataType::Number,
            fields: vec![field("amount", false)],
            operations: vec![],
        };
        let mut row = Row::new();
        row.insert("amount".into(), Scalar::Number(42.0));
        let result = evaluate(&vf, &row, &Row::new()).unwrap();
        assert_eq!(result, Scalar::Number(42.0));
    }

    #[test]
    fn subtract_credit_debit() {
        let vf = VirtualField {
            name: "amount".into(),
            side: Side::Source,
            data_type: DataType::Number,
            fields: vec![field("credit", false), field("debit", false)],
            operations: vec![Op::Subtract],
        };
        let mut row = Row::new();
        row.insert("credit".into(), Scalar::Number(100.0));
        row.insert("debit".into(), Scalar::Number(30.0));
        let result = evaluate(&vf, &row, &Row::new()).unwrap();
        assert_eq!(result, Scalar::Number(70.0));
    }

    #[test]
    fn division_by_zero_is_error() {
        let vf = VirtualField {
            name: "x".into(),
            side: Side::Source,
            data_type: DataType::Number,
            fields: vec![field("a", false), field("b", false)],
            operations: vec![Op::Divide],
        };
        let mut row = Row::new();
        row.insert("a".into(), Scalar::Number(10.0));
        row.insert("b".into(), Scalar::Number(0.0));
        assert_eq!(evaluate(&vf, &row, &Row::new()), Err(EvalErrorKind::DivisionByZero));
    }

    #[test]
    fn date_diff_whole_days_floor() {
        let vf = VirtualField {
            name: "x".into(),
            side: Side::Source,
            data_type: DataType::Number,
            fields: vec![field("a", false), field("b", false)],
            operations: vec![Op::DateDiff],
        };
        let mut row = Row::new();
        row.insert("a".into(), Scalar::Date(0));
        row.insert("b".into(), Scalar::Date(3_600_000)); // 1 hour later
        let result = evaluate(&vf, &row, &Row::new()).unwrap();
        assert_eq!(result, Scalar::Number(-1.0)); // floor((0 - 3_600_000)/86_400_000)
    }

    #[test]
    fn missing_field_error() {
        let vf = VirtualField {
            name: "x".into(),
            side: Side::Source,
            data_type: DataType::Number,
            fields: vec![field("nope", false)],
            operations: vec![],
        };
        assert_eq!(
            evaluate(&vf, &Row::new(), &Row::new()),
            Err(EvalErrorKind::MissingField("nope".into()))
        );
    }

    #[test]
    fn resolves_virtual_reference() {
        let vf = VirtualField {
            name: "double".into(),
            side: Side::Source,
            data_type: DataType::Number,
            fields: vec![field("base", true), field("factor", false)],
            operations: vec![Op::Multiply],
        };
        let mut row = Row::new();
        row.insert("factor".into(), Scalar::Number(2.0));
        let mut resolved = Row::new();
        resolved.insert("base".into(), Scalar::Number(21.0));
        let result = evaluate(&vf, &row, &resolved).unwrap();
        assert_eq!(result, Scalar::Number(42.0));
    }

    #[test]
    fn unary_negate() {
        let vf = VirtualField {
            name: "x".into(),
            side: Side::Source,
            data_type: DataType::Number,
            fields: vec![field("amount", false)],
            operations: vec![Op::Negate],
        };
        let mut row = Row::new();
        row.insert("amount".into(), Scalar::Number(5.0));
        assert_eq!(evaluate(&vf, &row, &Row::new()).unwrap(), Scalar::Number(-5.0));
    }
}
