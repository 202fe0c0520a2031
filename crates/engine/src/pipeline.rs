use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::PulseConfig;
use crate::error::{NormalizationError, PulseError};
use crate::evaluator::apply_rule_set;
use crate::model::{ProcessingType, RawRow};
use crate::normalize::Normalizer;
use crate::ranking::rank;
use crate::rules::RuleSet;
use crate::sink::{CommitReceipt, OutputSink};
use crate::summary::{compute_summary, RecordSummary};

/// Outcome of one automated run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub input_rows: usize,
    pub normalized_rows: usize,
    pub normalization_errors: Vec<NormalizationError>,
    pub excluded_count: usize,
    /// Active rules evaluated; 0 when no rule set was supplied.
    pub rules_applied: usize,
    pub processed_count: usize,
    pub summary: RecordSummary,
    /// `None` when nothing survived to be committed.
    pub receipt: Option<CommitReceipt>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Scheduled path: normalize, exclude by rule (when a rule set is given),
/// rank, and append the result as one `AUTOMATED` batch.
///
/// Passing `None` for `rules` is the override mode: ranking runs on every
/// normalized record.
pub fn run_batch(
    config: &PulseConfig,
    rows: &[RawRow],
    rules: Option<&RuleSet>,
    sink: &dyn OutputSink,
) -> Result<BatchReport, PulseError> {
    let started_at = Utc::now();
    let (records, norm) = Normalizer::new(config).normalize_batch(rows);
    let normalized_rows = records.len();

    let (kept, excluded_count, rules_applied) = match rules {
        Some(rules) => {
            let outcome = apply_rule_set(records, rules);
            (outcome.kept, outcome.excluded_count, outcome.rules_applied_count)
        }
        None => {
            log::info!("no rule set supplied; ranking all {normalized_rows} record(s)");
            (records, 0, 0)
        }
    };

    let ranked = rank(kept);
    let summary = compute_summary(&ranked);

    let receipt = if ranked.is_empty() {
        log::info!("nothing to commit");
        None
    } else {
        Some(sink.append(&ranked, ProcessingType::Automated)?)
    };

    let report = BatchReport {
        input_rows: norm.input_rows,
        normalized_rows,
        normalization_errors: norm.errors,
        excluded_count,
        rules_applied,
        processed_count: ranked.len(),
        summary,
        receipt,
        started_at,
        finished_at: Utc::now(),
    };

    log::info!(
        "{}: {} row(s) in, {} dropped, {} excluded, {} committed",
        config.name,
        report.input_rows,
        report.normalization_errors.len(),
        report.excluded_count,
        report.processed_count
    );
    Ok(report)
}
