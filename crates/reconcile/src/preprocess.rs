//! Preprocessor (C5): `enriched := apply_pipelines(plan_virtual(row))`.

use crate::error::StepErrorKind;
use crate::model::{Row, VirtualField};
use crate::planner;
use crate::transform::{self, ExecContext, TransformationStep};
use crate::value::Scalar;

/// Result of preprocessing one row: either an enriched row ready for
/// matching, or a signal that the row was excluded by `exclude_if_null`.
pub enum PreprocessOutcome {
    Kept(Row),
    Excluded,
}

/// Apply virtual-field evaluation then transformation pipelines to one row.
///
/// Virtual fields are evaluated first (via the planner, C3) so their outputs
/// are available to transformation steps. A pipeline's output overwrites
/// `column_id` unless `output_column` is set. `__line` always survives.
pub fn preprocess_row(
    row: &Row,
    virtual_fields: &[VirtualField],
    pipelines: &[TransformationStep],
    ctx: &ExecContext,
) -> PreprocessOutcome {
    let mut enriched = row.clone();
    let resolved = planner::evaluate_all(virtual_fields, row);
    for (name, value) in resolved {
        enriched.insert(name, value);
    }

    let mut ordered: Vec<&TransformationStep> = pipelines.iter().collect();
    ordered.sort_by_key(|s| s.order);

    for step in ordered {
        let input = enriched.get(&step.column_id).cloned().unwrap_or(Scalar::Null);
        match transform::execute_step(&input, &step.kind, ctx) {
            Ok(next) => {
                let target_column = step.output_column.clone().unwrap_or_else(|| step.column_id.clone());
                enriched.insert(target_column, next);
            }
            Err(StepErrorKind::ExcludeRow) => return PreprocessOutcome::Excluded,
            Err(err) => {
                log::warn!("preprocess: step '{}' on column '{}' failed: {}", step.id, step.column_id, err);
            }
        }
    }

    PreprocessOutcome::Kept(enriched)
}

/// Preprocess a whole side, dropping excluded rows and returning a tally of
/// how many were dropped.
pub fn preprocess_dataset(
    rows: &[Row],
    virtual_fields: &[VirtualField],
    pipelines: &[TransformationStep],
    ctx: &ExecContext,
) -> (Vec<Row>, usize) {
    let mut kept = Vec::with_capacity(rows.len());
    let mut dropped = 0;
    for row in rows {
        match preprocess_row(row, virtual_fields, pipelines, ctx) {
            PreprocessOutcome::Kept(enriched) => kept.push(enriched),
            PreprocessOutcome::Excluded => dropped += 1,
        }
    }
    (kept, dropped)
}
