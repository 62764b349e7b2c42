//! `reconcile-core` — generic multi-source reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded records and a parsed config,
//! returns classified verdicts. No CLI or file IO lives here — that's
//! `reconcile-cli`.

pub mod cond;
pub mod config;
pub mod engine;
pub mod error;
pub mod expr;
pub mod matchpred;
pub mod model;
pub mod planner;
pub mod preprocess;
pub mod runtime;
pub mod stream;
pub mod transform;
pub mod value;

pub use config::{MatchStrategy, ReconConfig, SortConfiguration};
pub use error::{EvalErrorKind, ReconError, StepErrorKind};
pub use matchpred::{ToleranceSpec, ToleranceUnit};
pub use model::{
    ColumnMapping, DataType, FieldRef, FormulaDescriptor, MatchKind, Op, ReconBatch, ReconResult,
    ReconSummary, Row, Side, SourceSelector, VerdictStatus, VirtualField,
};
pub use runtime::{CancellationToken, NeverCancelled, NoopProgress, ProgressEvent, ProgressSink, Stage};
pub use transform::{Clock, CurrencyRateProvider, ExecContext, FixedClock, SystemClock};
pub use value::Scalar;

/// Preprocess both datasets (virtual fields + transformation pipelines),
/// then dispatch to the in-memory engine or streaming reconciliation
/// depending on combined row count, and assemble the summarized batch.
#[allow(clippy::too_many_arguments)]
pub fn reconcile(
    source_rows: Vec<Row>,
    target_rows: Vec<Row>,
    config: &ReconConfig,
    ctx: &ExecContext<'_>,
    progress: &dyn ProgressSink,
    cancel: &dyn CancellationToken,
) -> Result<ReconBatch, ReconError> {
    let source_virtual = config.virtual_fields_for(Side::Source);
    let target_virtual = config.virtual_fields_for(Side::Target);
    let source_transformations = config.transformations_for(Side::Source);
    let target_transformations = config.transformations_for(Side::Target);

    let (sources, source_dropped) =
        preprocess::preprocess_dataset(&source_rows, &source_virtual, &source_transformations, ctx);
    let (targets, target_dropped) =
        preprocess::preprocess_dataset(&target_rows, &target_virtual, &target_transformations, ctx);
    let dropped_rows = source_dropped + target_dropped;

    let tolerance = config.sort_configuration.tolerance_spec();
    let strategy = config.sort_configuration.match_strategy;

    let results = stream::reconcile(
        sources,
        targets,
        &config.sort_configuration.source_sort_key,
        &config.sort_configuration.target_sort_key,
        &config.mappings,
        &tolerance,
        strategy,
        progress,
        cancel,
    )?;

    let summary = ReconSummary::from_results(&results, dropped_rows);
    Ok(ReconBatch { results, summary })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Scalar)]) -> Row {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn config() -> ReconConfig {
        let json = r#"{
            "version": 1,
            "mappings": [
                {"id": "m1", "source": "amount", "target": "amount", "matchKind": "exact"}
            ],
            "sortConfiguration": {
                "sourceSortKey": "amount",
                "targetSortKey": "amount",
                "matchStrategy": "exact"
            }
        }"#;
        ReconConfig::from_json(json).unwrap()
    }

    #[test]
    fn end_to_end_exact_match() {
        let sources = vec![row(&[("amount", Scalar::Number(10.0))])];
        let targets = vec![row(&[("amount", Scalar::Number(10.0))])];
        let ctx = ExecContext { rates: &NoRates, clock: &SystemClock };
        let batch = reconcile(sources, targets, &config(), &ctx, &NoopProgress, &NeverCancelled).unwrap();
        assert_eq!(batch.summary.matched, 1);
        assert_eq!(batch.results.len(), 1);
    }

    struct NoRates;
    impl CurrencyRateProvider for NoRates {
        fn rate(&self, _from: &str, _to: &str) -> Option<f64> {
            None
        }
    }

    #[test]
    fn dropped_rows_counted_in_summary() {
        let json = r#"{
            "version": 1,
            "mappings": [
                {"id": "m1", "source": "amount", "target": "amount", "matchKind": "exact"}
            ],
            "transformations": [
                {"id": "t1", "order": 0, "side": "source", "columnId": "ref", "kind": "exclude_if_null"}
            ],
            "sortConfiguration": {
                "sourceSortKey": "amount",
                "targetSortKey": "amount",
                "matchStrategy": "exact"
            }
        }"#;
        let cfg = ReconConfig::from_json(json).unwrap();

        let sources = vec![
            row(&[("amount", Scalar::Number(10.0)), ("ref", Scalar::String("x".into()))]),
            row(&[("amount", Scalar::Number(20.0)), ("ref", Scalar::Null)]),
        ];
        let targets = vec![row(&[("amount", Scalar::Number(10.0))])];
        let ctx = ExecContext { rates: &NoRates, clock: &SystemClock };
        let batch = reconcile(sources, targets, &cfg, &ctx, &NoopProgress, &NeverCancelled).unwrap();

        assert_eq!(batch.summary.dropped_rows, 1);
        assert_eq!(batch.summary.matched, 1);
    }
}
