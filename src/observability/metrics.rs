//! Metrics for the scoring pipeline.
//!
//! Every metric name lives in [`MetricName`]; each pipeline phase gets a small
//! recording module so call sites never spell a metric by hand. Recording
//! before [`init`] is a no-op.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::fmt;
use std::sync::OnceLock;
use tracing::info;

/// All metric names used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Parser metrics
    ParserDocumentsParsed,
    ParserDocumentsInvalid,
    ParserDuration,
    ParserRecordsExtracted,
    ParserInvalidSection,

    // Normalize metrics
    NormalizeTablesProcessed,
    NormalizeColumnsDropped,
    NormalizeEmptyInputs,

    // Filter metrics
    FilterRowsKept,
    FilterRowsDropped,

    // Enrich metrics
    EnrichPersonnelMatched,
    EnrichPersonnelMissed,
    EnrichRuleMisses,

    // Score metrics
    ScoreResearchersScored,
    ScoreCompositeScore,
    ScoreCappedGroups,

    // Batch metrics
    BatchDocumentsTotal,
    BatchProblemDocuments,
    BatchTimeouts,
    BatchDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::ParserDocumentsParsed => "lattes_parser_documents_parsed_total",
            MetricName::ParserDocumentsInvalid => "lattes_parser_documents_invalid_total",
            MetricName::ParserDuration => "lattes_parser_duration_seconds",
            MetricName::ParserRecordsExtracted => "lattes_parser_records_extracted_total",
            MetricName::ParserInvalidSection => "lattes_parser_invalid_section_total",

            MetricName::NormalizeTablesProcessed => "lattes_normalize_tables_processed_total",
            MetricName::NormalizeColumnsDropped => "lattes_normalize_columns_dropped_total",
            MetricName::NormalizeEmptyInputs => "lattes_normalize_empty_inputs_total",

            MetricName::FilterRowsKept => "lattes_filter_rows_kept_total",
            MetricName::FilterRowsDropped => "lattes_filter_rows_dropped_total",

            MetricName::EnrichPersonnelMatched => "lattes_enrich_personnel_matched_total",
            MetricName::EnrichPersonnelMissed => "lattes_enrich_personnel_missed_total",
            MetricName::EnrichRuleMisses => "lattes_enrich_rule_misses_total",

            MetricName::ScoreResearchersScored => "lattes_score_researchers_scored_total",
            MetricName::ScoreCompositeScore => "lattes_score_composite_score",
            MetricName::ScoreCappedGroups => "lattes_score_capped_groups_total",

            MetricName::BatchDocumentsTotal => "lattes_batch_documents_total",
            MetricName::BatchProblemDocuments => "lattes_batch_problem_documents_total",
            MetricName::BatchTimeouts => "lattes_batch_timeouts_total",
            MetricName::BatchDuration => "lattes_batch_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder. Safe to call more than once.
pub fn init() -> anyhow::Result<()> {
    if HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;
    HANDLE.set(handle).ok();
    info!("Metrics recorder installed");
    Ok(())
}

/// Prometheus exposition text of everything recorded so far.
pub fn render() -> Option<String> {
    HANDLE.get().map(|h| h.render())
}

pub mod parser {
    use super::MetricName;

    pub fn document_parsed() {
        ::metrics::counter!(MetricName::ParserDocumentsParsed.as_str()).increment(1);
    }

    pub fn document_invalid() {
        ::metrics::counter!(MetricName::ParserDocumentsInvalid.as_str()).increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::ParserDuration.as_str()).record(secs);
    }

    pub fn records_extracted(section: &str, count: u64) {
        ::metrics::counter!(MetricName::ParserRecordsExtracted.as_str(), "section" => section.to_string())
            .increment(count);
    }

    pub fn invalid_section() {
        ::metrics::counter!(MetricName::ParserInvalidSection.as_str()).increment(1);
    }
}

pub mod normalize {
    use super::MetricName;

    pub fn table_processed() {
        ::metrics::counter!(MetricName::NormalizeTablesProcessed.as_str()).increment(1);
    }

    pub fn columns_dropped(count: u64) {
        ::metrics::counter!(MetricName::NormalizeColumnsDropped.as_str()).increment(count);
    }

    pub fn empty_input() {
        ::metrics::counter!(MetricName::NormalizeEmptyInputs.as_str()).increment(1);
    }
}

pub mod filter {
    use super::MetricName;

    pub fn rows(kept: u64, dropped: u64) {
        ::metrics::counter!(MetricName::FilterRowsKept.as_str()).increment(kept);
        ::metrics::counter!(MetricName::FilterRowsDropped.as_str()).increment(dropped);
    }
}

pub mod enrich {
    use super::MetricName;

    pub fn personnel(matched: bool) {
        if matched {
            ::metrics::counter!(MetricName::EnrichPersonnelMatched.as_str()).increment(1);
        } else {
            ::metrics::counter!(MetricName::EnrichPersonnelMissed.as_str()).increment(1);
        }
    }

    pub fn rule_misses(count: u64) {
        ::metrics::counter!(MetricName::EnrichRuleMisses.as_str()).increment(count);
    }
}

pub mod score {
    use super::MetricName;

    pub fn researcher_scored(composite: f64) {
        ::metrics::counter!(MetricName::ScoreResearchersScored.as_str()).increment(1);
        ::metrics::histogram!(MetricName::ScoreCompositeScore.as_str()).record(composite);
    }

    pub fn capped_groups(count: u64) {
        ::metrics::counter!(MetricName::ScoreCappedGroups.as_str()).increment(count);
    }
}

pub mod batch {
    use super::MetricName;

    pub fn documents(count: u64) {
        ::metrics::counter!(MetricName::BatchDocumentsTotal.as_str()).increment(count);
    }

    pub fn problem_document(reason: &str) {
        ::metrics::counter!(MetricName::BatchProblemDocuments.as_str(), "reason" => reason.to_string())
            .increment(1);
    }

    pub fn timeout() {
        ::metrics::counter!(MetricName::BatchTimeouts.as_str()).increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::BatchDuration.as_str()).record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_are_prefixed() {
        for name in [
            MetricName::ParserDocumentsParsed,
            MetricName::NormalizeTablesProcessed,
            MetricName::FilterRowsKept,
            MetricName::EnrichRuleMisses,
            MetricName::ScoreCompositeScore,
            MetricName::BatchDuration,
        ] {
            assert!(name.as_str().starts_with("lattes_"));
            assert_eq!(name.to_string(), name.as_str());
        }
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        parser::document_parsed();
        batch::problem_document("parse");
        score::researcher_scored(10.0);
    }
}
