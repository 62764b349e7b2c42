//! Crate-level error taxonomy.
//!
//! Hand-written `enum` + `Display` + a no-op `std::error::Error` impl, no
//! `thiserror`/`anyhow` — the same shape this codebase already uses for its
//! reconciliation error type.

use std::fmt;

/// Top-level failure surface for an engine entrypoint (`run_in_memory`,
/// `run_streaming`, `reconcile`, config parsing).
#[derive(Debug, Clone, PartialEq)]
pub enum ReconError {
    /// Config failed validation before any row was processed.
    ConfigInvalid { reason: String },
    /// A row's preprocessing pipeline raised an error that aborted the batch.
    /// Per-cell data errors do not reach here — they are recorded in a
    /// `StepOutcome` and the pipeline continues.
    PreprocessFailed {
        row_index: usize,
        step_id: String,
        kind: String,
    },
    /// The caller's cancellation token tripped at a chunk boundary.
    Cancelled,
    /// A requested feature has no implementation (e.g. a named timezone
    /// beyond UTC/fixed-offset with no zone database injected).
    Unsupported { feature: String },
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigInvalid { reason } => write!(f, "invalid configuration: {reason}"),
            Self::PreprocessFailed { row_index, step_id, kind } => write!(
                f,
                "preprocessing failed at row {row_index}, step '{step_id}': {kind}"
            ),
            Self::Cancelled => write!(f, "reconciliation cancelled"),
            Self::Unsupported { feature } => write!(f, "unsupported feature: {feature}"),
        }
    }
}

impl std::error::Error for ReconError {}

/// Error kind produced by the expression evaluator (C2) when resolving a
/// virtual field. Attached as metadata to the planner's per-field outcome,
/// never propagated as a hard failure — the row survives with a null column.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalErrorKind {
    MissingField(String),
    TypeError(String),
    DivisionByZero,
    NonFinite,
    BadDate(String),
}

impl fmt::Display for EvalErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(name) => write!(f, "missing field '{name}'"),
            Self::TypeError(msg) => write!(f, "type error: {msg}"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::NonFinite => write!(f, "non-finite arithmetic result"),
            Self::BadDate(s) => write!(f, "cannot parse date '{s}'"),
        }
    }
}

/// Error kind produced by a single transformation step (C4). Recorded in the
/// pipeline's `StepOutcome` list; the step's *input* value is passed through
/// to the next step unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum StepErrorKind {
    InvalidParam(String),
    ParseFailed(String),
    MissingRate { from: String, to: String },
    Unsupported(String),
    /// `exclude_if_null` tripped — the whole row is dropped before matching.
    ExcludeRow,
}

impl fmt::Display for StepErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidParam(msg) => write!(f, "invalid parameter: {msg}"),
            Self::ParseFailed(msg) => write!(f, "parse failed: {msg}"),
            Self::MissingRate { from, to } => write!(f, "no exchange rate for {from} -> {to}"),
            Self::Unsupported(feature) => write!(f, "unsupported: {feature}"),
            Self::ExcludeRow => write!(f, "row excluded"),
        }
    }
}
