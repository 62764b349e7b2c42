//! Virtual-field planner (C3): orders a side's virtual fields into a safe
//! evaluation sequence and evaluates them per row.

use std::collections::{HashMap, HashSet};

use crate::error::EvalErrorKind;
use crate::expr;
use crate::model::{Row, VirtualField};
use crate::value::Scalar;

/// Topologically order `fields` by their virtual dependencies. Fields whose
/// dependencies never resolve (cycles, or a reference to an unknown virtual
/// field) are placed last, in original relative order, so they still get a
/// (failing) evaluation attempt rather than being silently dropped.
pub fn plan_order(fields: &[VirtualField]) -> Vec<usize> {
    let names: HashMap<&str, usize> = fields
        .iter()
        .enumerate()
        .map(|(i, f)| (f.name.as_str(), i))
        .collect();

    let deps: Vec<Vec<usize>> = fields
        .iter()
        .map(|f| {
            f.fields
                .iter()
                .filter(|r| r.is_virtual)
                .filter_map(|r| names.get(r.name.as_str()).copied())
                .collect()
        })
        .collect();

    let mut placed: HashSet<usize> = HashSet::new();
    let mut order = Vec::with_capacity(fields.len());

    loop {
        let mut progressed = false;
        for (i, dep) in deps.iter().enumerate() {
            if placed.contains(&i) {
                continue;
            }
            if dep.iter().all(|d| placed.contains(d)) {
                order.push(i);
                placed.insert(i);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    // Remaining fields are in an unresolvable cycle (including
    // self-reference); place them last in original order.
    for i in 0..fields.len() {
        if !placed.contains(&i) {
            order.push(i);
            placed.insert(i);
        }
    }

    order
}

/// Evaluate every virtual field for `row` in planner order, injecting each
/// successfully computed value into the returned map before evaluating the
/// next field. Failed fields get a null value; the row always survives.
pub fn evaluate_all(fields: &[VirtualField], row: &Row) -> Row {
    let order = plan_order(fields);
    let mut resolved: Row = Row::new();

    for idx in order {
        let field = &fields[idx];
        match expr::evaluate(field, row, &resolved) {
            Ok(value) => {
                resolved.insert(field.name.clone(), value);
            }
            Err(err) => {
                log::warn!("virtual field '{}' failed: {err}", field.name);
                resolved.insert(field.name.clone(), Scalar::Null);
            }
        }
    }

    resolved
}

/// Evaluate a single field against already-resolved siblings, surfacing the
/// error kind rather than swallowing it. Used by callers that want to report
/// per-field failures (e.g. the preprocessor's field outcome list).
pub fn evaluate_one(
    field: &VirtualField,
    row: &Row,
    resolved: &Row,
) -> Result<Scalar, EvalErrorKind> {
    expr::evaluate(field, row, resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataType, FieldRef, Op, Side};

    fn field(name: &str, is_virtual: bool) -> FieldRef {
        FieldRef { name: name.into(), is_virtual }
    }

    fn vfield(name: &str, fields: Vec<FieldRef>, ops: Vec<Op>) -> VirtualField {
        VirtualField {
            name: name.into(),
            side: Side::Source,
            data_type: DataType::Number,
            fields,
            operations: ops,
        }
    }

    #[test]
    fn orders_dependency_before_dependent() {
        let fields = vec![
            vfield("total", vec![field("base", true), field("tax", false)], vec![Op::Add]),
            vfield("base", vec![field("amount", false)], vec![]),
        ];
        let order = plan_order(&fields);
        assert_eq!(order, vec![1, 0]);
    }

    #[test]
    fn independent_fields_keep_relative_order() {
        let fields = vec![
            vfield("a", vec![field("x", false)], vec![]),
            vfield("b", vec![field("y", false)], vec![]),
        ];
        assert_eq!(plan_order(&fields), vec![0, 1]);
    }

    #[test]
    fn cycle_is_placed_but_does_not_hang() {
        let fields = vec![
            vfield("a", vec![field("b", true)], vec![]),
            vfield("b", vec![field("a", true)], vec![]),
        ];
        let order = plan_order(&fields);
        assert_eq!(order.len(), 2);
    }

    #[test]
    fn evaluate_all_resolves_chain() {
        let fields = vec![
            vfield("total", vec![field("base", true), field("tax", false)], vec![Op::Add]),
            vfield("base", vec![field("amount", false)], vec![]),
        ];
        let mut row = Row::new();
        row.insert("amount".into(), Scalar::Number(10.0));
        row.insert("tax".into(), Scalar::Number(2.0));
        let resolved = evaluate_all(&fields, &row);
        assert_eq!(resolved.get("base"), Some(&Scalar::Number(10.0)));
        assert_eq!(resolved.get("total"), Some(&Scalar::Number(12.0)));
    }

    #[test]
    fn evaluate_all_cycle_yields_null_not_panic() {
        let fields = vec![
            vfield("a", vec![field("b", true)], vec![]),
            vfield("b", vec![field("a", true)], vec![]),
        ];
        let resolved = evaluate_all(&fields, &Row::new());
        assert_eq!(resolved.get("a"), Some(&Scalar::Null));
        assert_eq!(resolved.get("b"), Some(&Scalar::Null));
    }
}
