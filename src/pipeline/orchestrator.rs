use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::AuditConfig;
use crate::domain::{DiscrepancyRecord, EmployeeErrorCount, EvidenceRow, SourceSnapshot};
use crate::error::Result;
use crate::pipeline::processing::aggregator::aggregate_error_counts;
use crate::pipeline::processing::classifier::{classify_outliers, OutlierMetric, SuspectSet};
use crate::pipeline::processing::correlator::{correlate_signal, KeywordMatcher, MatchStrategy};
use crate::pipeline::processing::directory_of;
use crate::pipeline::processing::discrepancy::extract_discrepancies;
use crate::pipeline::processing::match_resolver::resolve_first_visits;

/// Descriptive totals for one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub snapshot_fingerprint: String,
    pub keyword: String,
    pub match_strategy: MatchStrategy,
    pub outlier_metric: OutlierMetric,
    pub audited_locations: usize,
    pub resolved_comparisons: usize,
    pub missing_first_visit: usize,
    pub missing_observation: usize,
    pub ambiguous_first_visit: usize,
    pub null_score_rows: usize,
    pub discrepancies: usize,
    pub unattributed_discrepancies: u64,
    pub employees_with_errors: usize,
    pub mean: Option<f64>,
    pub suspects: usize,
    pub suspect_evidence: usize,
    pub control_evidence: usize,
}

impl RunSummary {
    /// Percentage of comparable first visits that disagree with the auditor
    pub fn discrepancy_rate(&self) -> f64 {
        let comparable = self.resolved_comparisons.saturating_sub(self.null_score_rows);
        if comparable == 0 {
            return 0.0;
        }
        self.discrepancies as f64 / comparable as f64 * 100.0
    }
}

/// Deterministic result of a run; identical input yields an identical report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub summary: RunSummary,
    /// Ordered by location_id
    pub discrepancies: Vec<DiscrepancyRecord>,
    /// Ordered by mistake_count desc, employee_name asc
    pub error_counts: Vec<EmployeeErrorCount>,
    pub suspect_set: SuspectSet,
    pub suspect_evidence: Vec<EvidenceRow>,
    pub control_evidence: Vec<EvidenceRow>,
}

/// A report stamped with run identity for persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEnvelope {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub report: AuditReport,
}

impl ReportEnvelope {
    pub fn new(report: AuditReport) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            report,
        }
    }
}

/// Stateless batch transform from a source snapshot to the audit report.
///
/// Stages hand their results to the next stage directly; nothing is
/// materialized between runs.
pub struct AuditPipeline {
    matcher: KeywordMatcher,
    metric: OutlierMetric,
}

impl AuditPipeline {
    pub fn new(matcher: KeywordMatcher, metric: OutlierMetric) -> Self {
        Self { matcher, metric }
    }

    pub fn from_config(config: &AuditConfig) -> Result<Self> {
        config.validate()?;
        let matcher = KeywordMatcher::new(&config.keyword, config.match_strategy)?;
        Ok(Self::new(matcher, config.outlier_metric))
    }

    pub fn matcher(&self) -> &KeywordMatcher {
        &self.matcher
    }

    #[instrument(skip_all, fields(keyword = %self.matcher.keyword(), metric = %self.metric))]
    pub fn run(&self, snapshot: &SourceSnapshot) -> Result<AuditReport> {
        let fingerprint = snapshot.fingerprint()?;
        info!(%fingerprint, "Starting audit run");

        let directory = directory_of(snapshot);
        let matched = resolve_first_visits(snapshot)?;
        let extracted = extract_discrepancies(&matched.resolved, &directory);
        let aggregation =
            aggregate_error_counts(&extracted.discrepancies, &matched.resolved, &directory);
        let suspect_set = classify_outliers(&aggregation.counts, self.metric);
        let correlation = correlate_signal(&extracted.discrepancies, &suspect_set, &self.matcher);

        let summary = RunSummary {
            snapshot_fingerprint: fingerprint,
            keyword: self.matcher.keyword().to_string(),
            match_strategy: self.matcher.strategy(),
            outlier_metric: self.metric,
            audited_locations: snapshot.audits.len(),
            resolved_comparisons: matched.resolved.len(),
            missing_first_visit: matched.missing_first_visit,
            missing_observation: matched.missing_observation,
            ambiguous_first_visit: matched.ambiguous_first_visit,
            null_score_rows: extracted.null_score_rows,
            discrepancies: extracted.discrepancies.len(),
            unattributed_discrepancies: aggregation.unattributed,
            employees_with_errors: aggregation.counts.len(),
            mean: suspect_set.mean,
            suspects: suspect_set.len(),
            suspect_evidence: correlation.suspect_evidence.len(),
            control_evidence: correlation.control_evidence.len(),
        };

        info!(
            discrepancies = summary.discrepancies,
            suspects = summary.suspects,
            unattributed = summary.unattributed_discrepancies,
            "Audit run finished"
        );

        Ok(AuditReport {
            summary,
            discrepancies: extracted.discrepancies,
            error_counts: aggregation.counts,
            suspect_set,
            suspect_evidence: correlation.suspect_evidence,
            control_evidence: correlation.control_evidence,
        })
    }
}
