//! Streaming reconciliation (C8): two algorithms over pre-sorted inputs — a
//! strict two-pointer walk for exact matching and a sliding-window
//! confidence-based walk for fuzzy/smart matching — plus auto mode
//! selection against the in-memory engine (C7).

use std::cmp::Ordering;

use crate::config::MatchStrategy;
use crate::engine;
use crate::error::ReconError;
use crate::matchpred::{confidence, discrepancies, ToleranceSpec, ToleranceUnit};
use crate::model::{extract_amount, line_of, row_identity, ColumnMapping, ReconResult, Row, VerdictStatus};
use crate::runtime::{CancellationToken, ProgressCadence, ProgressEvent, ProgressSink, Stage};
use crate::value::{self, Scalar};

/// A row beyond this combined count uses streaming; otherwise in-memory.
pub const STREAMING_THRESHOLD: usize = 50_000;

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Null,
    Number(f64),
    Date(i64),
    Str(String),
}

/// Project `row[key]` per §4.8's sort-key rules: recognized date strings
/// become epoch-ms, numeric-looking strings become numbers (after stripping
/// non `[0-9.-]` characters), everything else is compared as a raw string.
/// Null sort values sort lowest.
fn project_sort_value(row: &Row, key: &str) -> SortValue {
    match row.get(key) {
        None | Some(Scalar::Null) => SortValue::Null,
        Some(Scalar::Date(ms)) => SortValue::Date(*ms),
        Some(Scalar::Number(n)) => SortValue::Number(*n),
        Some(Scalar::Bool(b)) => SortValue::Str(b.to_string()),
        Some(Scalar::String(s)) => {
            if let Some(ms) = value::parse_date_string(s.trim()) {
                SortValue::Date(ms)
            } else {
                let stripped: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
                match stripped.parse::<f64>() {
                    Ok(n) if !stripped.is_empty() => SortValue::Number(n),
                    _ => SortValue::Str(s.clone()),
                }
            }
        }
    }
}

/// `compare(a, b)`: `0` iff within tolerance, else the sign of `a - b`. For
/// `toleranceUnit = exact`, reduces to total order.
fn compare_sort(a: &SortValue, b: &SortValue, tolerance: &ToleranceSpec) -> Ordering {
    match (a, b) {
        (SortValue::Null, SortValue::Null) => Ordering::Equal,
        (SortValue::Null, _) => Ordering::Less,
        (_, SortValue::Null) => Ordering::Greater,
        (SortValue::Number(x), SortValue::Number(y)) => compare_numeric(*x, *y, tolerance),
        (SortValue::Date(x), SortValue::Date(y)) => compare_dates(*x, *y, tolerance),
        (SortValue::Str(x), SortValue::Str(y)) => x.cmp(y),
        (SortValue::Number(x), SortValue::Str(y)) => format!("{x}").cmp(y),
        (SortValue::Str(x), SortValue::Number(y)) => x.cmp(&format!("{y}")),
        (SortValue::Date(x), SortValue::Str(y)) => x.to_string().cmp(y),
        (SortValue::Str(x), SortValue::Date(y)) => x.cmp(&y.to_string()),
        (SortValue::Number(x), SortValue::Date(y)) => format!("{x}").cmp(&y.to_string()),
        (SortValue::Date(x), SortValue::Number(y)) => x.to_string().cmp(&format!("{y}")),
    }
}

fn compare_numeric(x: f64, y: f64, tolerance: &ToleranceSpec) -> Ordering {
    let within = match tolerance.unit {
        ToleranceUnit::Amount => (x - y).abs() <= tolerance.tolerance,
        ToleranceUnit::Percentage => {
            let bound = y.abs() * (tolerance.tolerance / 100.0);
            if y == 0.0 {
                x == 0.0
            } else {
                (x - y).abs() <= bound
            }
        }
        _ => x == y,
    };
    if within {
        Ordering::Equal
    } else {
        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    }
}

fn compare_dates(x: i64, y: i64, tolerance: &ToleranceSpec) -> Ordering {
    let tol_ms = match tolerance.unit {
        ToleranceUnit::Minutes => (tolerance.tolerance * 60_000.0) as i64,
        ToleranceUnit::Hours => (tolerance.tolerance * 3_600_000.0) as i64,
        ToleranceUnit::Days => (tolerance.tolerance * 86_400_000.0) as i64,
        _ => 0,
    };
    if (x - y).abs() <= tol_ms {
        Ordering::Equal
    } else {
        x.cmp(&y)
    }
}

fn unmatched_source(row: Row, mappings: &[ColumnMapping]) -> ReconResult {
    let amount = extract_amount(&row, mappings);
    let source_line = line_of(&row);
    ReconResult {
        id: row_identity(&row),
        source_row: Some(row),
        target_row: None,
        status: VerdictStatus::UnmatchedSource,
        confidence: None,
        discrepancies: None,
        source_line,
        target_line: None,
        amount,
    }
}

fn unmatched_target(row: Row, mappings: &[ColumnMapping]) -> ReconResult {
    let amount = extract_amount(&row, mappings);
    let target_line = line_of(&row);
    ReconResult {
        id: row_identity(&row),
        source_row: None,
        target_row: Some(row),
        status: VerdictStatus::UnmatchedTarget,
        confidence: None,
        discrepancies: None,
        source_line: None,
        target_line,
        amount,
    }
}

fn matched_verdict(
    source: Row,
    target: Row,
    mappings: &[ColumnMapping],
    tolerance: &ToleranceSpec,
    confidence_value: f64,
) -> ReconResult {
    let discrepancy_list = discrepancies(&source, &target, mappings, tolerance);
    let status = if discrepancy_list.is_empty() { VerdictStatus::Matched } else { VerdictStatus::Discrepancy };
    let id = format!("{}::{}", row_identity(&source), row_identity(&target));
    let source_line = line_of(&source);
    let target_line = line_of(&target);
    let amount = extract_amount(&source, mappings).or_else(|| extract_amount(&target, mappings));
    ReconResult {
        id,
        source_row: Some(source),
        target_row: Some(target),
        status,
        confidence: Some(confidence_value),
        discrepancies: if discrepancy_list.is_empty() { None } else { Some(discrepancy_list) },
        source_line,
        target_line,
        amount,
    }
}

/// Strict O(1)-space two-pointer walk; used for `matchStrategy = exact`.
/// Equal-keyed runs on both sides are paired index-for-index; any excess on
/// either side becomes unmatched.
pub fn run_two_pointer(
    sources: Vec<Row>,
    targets: Vec<Row>,
    source_key: &str,
    target_key: &str,
    mappings: &[ColumnMapping],
    tolerance: &ToleranceSpec,
    cancel: &dyn CancellationToken,
) -> Result<Vec<ReconResult>, ReconError> {
    let n = sources.len();
    let m = targets.len();
    let mut results = Vec::with_capacity(n + m);
    let mut i = 0;
    let mut j = 0;

    while i < n && j < m {
        if cancel.is_cancelled() {
            return Err(ReconError::Cancelled);
        }
        let sk = project_sort_value(&sources[i], source_key);
        let tk = project_sort_value(&targets[j], target_key);
        match compare_sort(&sk, &tk, tolerance) {
            Ordering::Less => {
                results.push(unmatched_source(sources[i].clone(), mappings));
                i += 1;
            }
            Ordering::Greater => {
                results.push(unmatched_target(targets[j].clone(), mappings));
                j += 1;
            }
            Ordering::Equal => {
                let mut ei = i;
                while ei < n && compare_sort(&project_sort_value(&sources[ei], source_key), &sk, tolerance) == Ordering::Equal {
                    ei += 1;
                }
                let mut ej = j;
                while ej < m && compare_sort(&project_sort_value(&targets[ej], target_key), &tk, tolerance) == Ordering::Equal {
                    ej += 1;
                }
                let pair_count = (ei - i).min(ej - j);
                for k in 0..pair_count {
                    let c = confidence(&sources[i + k], &targets[j + k], mappings, tolerance);
                    results.push(matched_verdict(sources[i + k].clone(), targets[j + k].clone(), mappings, tolerance, c));
                }
                for s in &sources[(i + pair_count)..ei] {
                    results.push(unmatched_source(s.clone(), mappings));
                }
                for t in &targets[(j + pair_count)..ej] {
                    results.push(unmatched_target(t.clone(), mappings));
                }
                i = ei;
                j = ej;
            }
        }
    }

    for row in &sources[i..] {
        results.push(unmatched_source(row.clone(), mappings));
    }
    for row in &targets[j..] {
        results.push(unmatched_target(row.clone(), mappings));
    }

    Ok(results)
}

/// Sliding-window confidence-based walk; used for `matchStrategy` in
/// `{fuzzy, smart}`. Follows the canonical pseudocode of §4.8.
pub fn run_sliding_window(
    sources: Vec<Row>,
    targets: Vec<Row>,
    source_key: &str,
    target_key: &str,
    mappings: &[ColumnMapping],
    tolerance: &ToleranceSpec,
    progress: &dyn ProgressSink,
    cancel: &dyn CancellationToken,
) -> Result<Vec<ReconResult>, ReconError> {
    let n = sources.len();
    let m = targets.len();
    let total = n + m;
    let cadence = ProgressCadence::new(1000);
    let mut matched_t = vec![false; m];
    let mut j = 0usize;
    let mut results = Vec::with_capacity(total);

    let target_keys: Vec<SortValue> = targets.iter().map(|t| project_sort_value(t, target_key)).collect();

    for (i, source) in sources.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(ReconError::Cancelled);
        }
        let sk = project_sort_value(source, source_key);

        while j < m && !matched_t[j] && compare_sort(&sk, &target_keys[j], tolerance) == Ordering::Greater {
            j += 1;
        }

        let mut best: Option<(f64, usize)> = None;
        for k in j..m {
            if matched_t[k] {
                continue;
            }
            match compare_sort(&sk, &target_keys[k], tolerance) {
                Ordering::Less => break,
                Ordering::Equal => {
                    let c = confidence(source, &targets[k], mappings, tolerance);
                    if best.map(|(bc, _)| c > bc).unwrap_or(true) {
                        best = Some((c, k));
                    }
                }
                Ordering::Greater => {}
            }
        }

        match best {
            Some((c, k)) if c > 0.3 => {
                matched_t[k] = true;
                results.push(matched_verdict(source.clone(), targets[k].clone(), mappings, tolerance, c));
            }
            _ => results.push(unmatched_source(source.clone(), mappings)),
        }

        if cadence.should_emit(i + 1, total) {
            progress.on_progress(ProgressEvent {
                processed_percent: (i + 1) as f64 / total.max(1) as f64 * 100.0,
                total: 100.0,
                stage: Stage::StreamingReconciliation,
            });
        }
    }

    for (k, target) in targets.into_iter().enumerate() {
        if !matched_t[k] {
            results.push(unmatched_target(target, mappings));
        }
    }

    progress.on_progress(ProgressEvent { processed_percent: 100.0, total: 100.0, stage: Stage::Complete });

    Ok(results)
}

/// Run whichever streaming variant fits `strategy`: the strict two-pointer
/// walk for `exact`, the sliding window otherwise.
pub fn run_streaming(
    sources: Vec<Row>,
    targets: Vec<Row>,
    source_key: &str,
    target_key: &str,
    mappings: &[ColumnMapping],
    tolerance: &ToleranceSpec,
    strategy: MatchStrategy,
    progress: &dyn ProgressSink,
    cancel: &dyn CancellationToken,
) -> Result<Vec<ReconResult>, ReconError> {
    progress.on_progress(ProgressEvent { processed_percent: 0.0, total: 100.0, stage: Stage::StreamingReconciliation });
    match strategy {
        MatchStrategy::Exact => run_two_pointer(sources, targets, source_key, target_key, mappings, tolerance, cancel),
        MatchStrategy::Fuzzy | MatchStrategy::Smart => {
            run_sliding_window(sources, targets, source_key, target_key, mappings, tolerance, progress, cancel)
        }
    }
}

/// Dispatch between the in-memory engine (C7) and streaming (C8) per the
/// `50_000`-row threshold.
#[allow(clippy::too_many_arguments)]
pub fn reconcile(
    sources: Vec<Row>,
    targets: Vec<Row>,
    source_key: &str,
    target_key: &str,
    mappings: &[ColumnMapping],
    tolerance: &ToleranceSpec,
    strategy: MatchStrategy,
    progress: &dyn ProgressSink,
    cancel: &dyn CancellationToken,
) -> Result<Vec<ReconResult>, ReconError> {
    if sources.len() + targets.len() > STREAMING_THRESHOLD {
        run_streaming(sources, targets, source_key, target_key, mappings, tolerance, strategy, progress, cancel)
    } else {
        engine::run_in_memory(sources, targets, mappings, tolerance, strategy, progress, cancel)
    }
}
