//! Caller-supplied collaborators for an engine run: progress reporting and
//! cooperative cancellation (§5.1). Both are plain trait objects — this
//! codebase has no async runtime, so the engine stays synchronous.

/// One stage of a reconciliation batch, reported via [`ProgressSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ProcessingSourceFile,
    ProcessingTargetFile,
    MatchingRecords,
    StreamingReconciliation,
    Complete,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::ProcessingSourceFile => "Processing source file",
            Stage::ProcessingTargetFile => "Processing target file",
            Stage::MatchingRecords => "Matching records",
            Stage::StreamingReconciliation => "Streaming reconciliation",
            Stage::Complete => "Complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    pub processed_percent: f64,
    pub total: f64,
    pub stage: Stage,
}

/// Invoked at least every 1000 records and at each stage transition.
pub trait ProgressSink {
    fn on_progress(&self, event: ProgressEvent);
}

/// A sink that discards every event — the default for callers that don't
/// need progress reporting.
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Checked at every chunk boundary; a `true` result aborts the batch with
/// `ReconError::Cancelled`.
pub trait CancellationToken {
    fn is_cancelled(&self) -> bool;
}

pub struct NeverCancelled;

impl CancellationToken for NeverCancelled {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Emits progress every `interval` processed records, plus once at the end.
pub struct ProgressCadence {
    interval: usize,
}

impl ProgressCadence {
    pub fn new(interval: usize) -> Self {
        ProgressCadence { interval: interval.max(1) }
    }

    pub fn should_emit(&self, processed: usize, total: usize) -> bool {
        processed == total || processed.is_multiple_of(self.interval)
    }
}
