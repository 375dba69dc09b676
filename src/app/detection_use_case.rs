use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{error, info, warn};

use crate::app::ports::{ReportSinkPort, SourceStorePort};
use crate::observability::metrics;
use crate::pipeline::orchestrator::{AuditPipeline, ReportEnvelope};

/// Use case for one audit-discrepancy detection run:
/// read a snapshot, run the pipeline, replace the stored reports.
pub struct DetectionUseCase {
    source: Box<dyn SourceStorePort>,
    pipeline: AuditPipeline,
    sinks: Vec<Box<dyn ReportSinkPort>>,
}

impl DetectionUseCase {
    pub fn new(source: Box<dyn SourceStorePort>, pipeline: AuditPipeline) -> Self {
        Self {
            source,
            pipeline,
            sinks: Vec::new(),
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn ReportSinkPort>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Execute the run. Source unavailability and invalid input fail the run;
    /// row-level data problems only show up in the summary counters.
    pub async fn execute(&self) -> Result<ReportEnvelope> {
        let started = Instant::now();

        // One read of all four relations; every stage works from this copy
        let snapshot = match self.source.load_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                metrics::record_failure("load");
                error!("Failed to load source snapshot: {}", e);
                return Err(e).context("loading source snapshot");
            }
        };
        if snapshot.is_empty() {
            warn!("Source snapshot is empty; reports will be empty");
        }

        let report = match self.pipeline.run(&snapshot) {
            Ok(report) => report,
            Err(e) => {
                metrics::record_failure("pipeline");
                return Err(e).context("running audit pipeline");
            }
        };

        metrics::record_run(&report.summary, started.elapsed().as_secs_f64());

        let envelope = ReportEnvelope::new(report);
        for sink in &self.sinks {
            if let Err(e) = sink.replace_reports(&envelope).await {
                metrics::record_failure("sink");
                return Err(e).with_context(|| format!("writing reports to {}", sink.describe()));
            }
        }

        info!(
            run_id = %envelope.run_id,
            sinks = self.sinks.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Detection run complete"
        );
        Ok(envelope)
    }
}
