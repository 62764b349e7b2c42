//! In-memory reconciliation engine (C7): full cross-scoring between two
//! already-enriched datasets with strategy-specific candidate admission and
//! greedy first-come target claiming.

use crate::config::MatchStrategy;
use crate::error::ReconError;
use crate::matchpred::{confidence, discrepancies, ToleranceSpec};
use crate::model::{extract_amount, line_of, row_identity, ColumnMapping, ReconResult, Row, VerdictStatus};
use crate::runtime::{CancellationToken, ProgressCadence, ProgressEvent, ProgressSink, Stage};

const ADMISSION_THRESHOLD: f64 = 0.3;
const HIGH_CONFIDENCE: f64 = 0.8;

struct Candidate {
    target_index: usize,
    confidence: f64,
}

/// Score `source` against every still-unclaimed target, keeping admissible
/// candidates (`confidence > 0.3`), sorted descending by confidence.
/// `targets` pairs each candidate with its index in the original target list.
fn score_candidates(
    source: &Row,
    targets: &[(usize, Row)],
    mappings: &[ColumnMapping],
    tolerance: &ToleranceSpec,
) -> Vec<Candidate> {
    let mut scored: Vec<Candidate> = targets
        .iter()
        .map(|(ti, t)| Candidate { target_index: *ti, confidence: confidence(source, t, mappings, tolerance) })
        .filter(|c| c.confidence > ADMISSION_THRESHOLD)
        .collect();
    scored.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Apply the strategy-specific admissible-candidate-subset rule.
fn apply_strategy(mut candidates: Vec<Candidate>, strategy: MatchStrategy) -> Vec<Candidate> {
    match strategy {
        MatchStrategy::Exact => {
            candidates.retain(|c| c.confidence > HIGH_CONFIDENCE);
            candidates
        }
        MatchStrategy::Fuzzy => {
            candidates.truncate(3);
            candidates
        }
        MatchStrategy::Smart => {
            if candidates.iter().any(|c| c.confidence > HIGH_CONFIDENCE) {
                candidates.retain(|c| c.confidence > HIGH_CONFIDENCE);
            } else {
                candidates.truncate(1);
            }
            candidates
        }
    }
}

fn build_matched_verdict(
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

fn unmatched_source(source: Row, mappings: &[ColumnMapping]) -> ReconResult {
    let id = row_identity(&source);
    let source_line = line_of(&source);
    let amount = extract_amount(&source, mappings);
    ReconResult {
        id,
        source_row: Some(source),
        target_row: None,
        status: VerdictStatus::UnmatchedSource,
        confidence: None,
        discrepancies: None,
        source_line,
        target_line: None,
        amount,
    }
}

fn unmatched_target(target: Row, mappings: &[ColumnMapping]) -> ReconResult {
    let id = row_identity(&target);
    let target_line = line_of(&target);
    let amount = extract_amount(&target, mappings);
    ReconResult {
        id,
        source_row: None,
        target_row: Some(target),
        status: VerdictStatus::UnmatchedTarget,
        confidence: None,
        discrepancies: None,
        source_line: None,
        target_line,
        amount,
    }
}

/// In-memory matching across two already-preprocessed datasets.
pub fn run_in_memory(
    sources: Vec<Row>,
    targets: Vec<Row>,
    mappings: &[ColumnMapping],
    tolerance: &ToleranceSpec,
    strategy: MatchStrategy,
    progress: &dyn ProgressSink,
    cancel: &dyn CancellationToken,
) -> Result<Vec<ReconResult>, ReconError> {
    let total = sources.len() + targets.len();
    let cadence = ProgressCadence::new(1000);
    let mut claimed = vec![false; targets.len()];
    let mut results = Vec::with_capacity(total);
    let mut targets_storage: Vec<Option<Row>> = targets.into_iter().map(Some).collect();

    for (i, source) in sources.into_iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(ReconError::Cancelled);
        }

        let still_present: Vec<(usize, Row)> = targets_storage
            .iter()
            .enumerate()
            .filter(|(ti, _)| !claimed[*ti])
            .filter_map(|(ti, t)| t.clone().map(|row| (ti, row)))
            .collect();

        let scored = score_candidates(&source, &still_present, mappings, tolerance);
        let admissible = apply_strategy(scored, strategy);

        let chosen = admissible.into_iter().next();

        match chosen {
            Some(candidate) => {
                claimed[candidate.target_index] = true;
                let target = targets_storage[candidate.target_index].take().unwrap_or_default();
                results.push(build_matched_verdict(source, target, mappings, tolerance, candidate.confidence));
            }
            None => results.push(unmatched_source(source, mappings)),
        }

        if cadence.should_emit(i + 1, total) {
            progress.on_progress(ProgressEvent {
                processed_percent: (i + 1) as f64 / total.max(1) as f64 * 100.0,
                total: 100.0,
                stage: Stage::MatchingRecords,
            });
        }
    }

    for (ti, slot) in targets_storage.into_iter().enumerate() {
        if !claimed[ti] {
            if let Some(target) = slot {
                results.push(unmatched_target(target, mappings));
            }
        }
    }

    progress.on_progress(ProgressEvent { processed_percent: 100.0, total: 100.0, stage: Stage::Complete });

    Ok(results)
}
