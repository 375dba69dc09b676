//! Run metrics for the audit pipeline.
//!
//! Metric names live in one enum so call sites never spell raw strings. A batch
//! run installs a Prometheus recorder up front and renders it to a textfile at
//! the end.

use std::fmt;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::pipeline::orchestrator::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    RunsTotal,
    RunFailures,
    ResolvedComparisons,
    MissingJoinTargets,
    NullScoreRows,
    Discrepancies,
    UnattributedDiscrepancies,
    Suspects,
    SuspectEvidence,
    ControlEvidence,
    RunDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::RunsTotal => "audit_runs_total",
            MetricName::RunFailures => "audit_run_failures_total",
            MetricName::ResolvedComparisons => "audit_resolved_comparisons_total",
            MetricName::MissingJoinTargets => "audit_missing_join_targets_total",
            MetricName::NullScoreRows => "audit_null_score_rows_total",
            MetricName::Discrepancies => "audit_discrepancies_total",
            MetricName::UnattributedDiscrepancies => "audit_unattributed_discrepancies_total",
            MetricName::Suspects => "audit_suspects_total",
            MetricName::SuspectEvidence => "audit_suspect_evidence_total",
            MetricName::ControlEvidence => "audit_control_evidence_total",
            MetricName::RunDuration => "audit_run_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static PROMETHEUS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once.
pub fn init() {
    if PROMETHEUS_HANDLE.get().is_some() {
        return;
    }
    match metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = PROMETHEUS_HANDLE.set(handle);
            info!("Metrics recorder installed");
        }
        Err(e) => warn!("Metrics recorder install failed (possibly already installed): {}", e),
    }
}

/// Render current metrics in Prometheus text format, if a recorder is installed
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

/// Write rendered metrics to `path` for a node-exporter textfile collector
pub fn write_textfile(path: &Path) -> std::io::Result<bool> {
    let Some(body) = render() else {
        return Ok(false);
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, body)?;
    Ok(true)
}

pub fn record_run(summary: &RunSummary, duration_secs: f64) {
    ::metrics::counter!(MetricName::RunsTotal.as_str()).increment(1);
    ::metrics::counter!(MetricName::ResolvedComparisons.as_str())
        .increment(summary.resolved_comparisons as u64);
    ::metrics::counter!(MetricName::MissingJoinTargets.as_str(), "target" => "first_visit")
        .increment(summary.missing_first_visit as u64);
    ::metrics::counter!(MetricName::MissingJoinTargets.as_str(), "target" => "observation")
        .increment(summary.missing_observation as u64);
    ::metrics::counter!(MetricName::MissingJoinTargets.as_str(), "target" => "ambiguous_first_visit")
        .increment(summary.ambiguous_first_visit as u64);
    ::metrics::counter!(MetricName::NullScoreRows.as_str()).increment(summary.null_score_rows as u64);
    ::metrics::counter!(MetricName::Discrepancies.as_str()).increment(summary.discrepancies as u64);
    ::metrics::counter!(MetricName::UnattributedDiscrepancies.as_str())
        .increment(summary.unattributed_discrepancies);
    ::metrics::counter!(MetricName::Suspects.as_str()).increment(summary.suspects as u64);
    ::metrics::counter!(MetricName::SuspectEvidence.as_str()).increment(summary.suspect_evidence as u64);
    ::metrics::counter!(MetricName::ControlEvidence.as_str()).increment(summary.control_evidence as u64);
    ::metrics::histogram!(MetricName::RunDuration.as_str()).record(duration_secs);
}

pub fn record_failure(stage: &'static str) {
    ::metrics::counter!(MetricName::RunFailures.as_str(), "stage" => stage).increment(1);
}
