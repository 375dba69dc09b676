use std::collections::HashMap;
use tracing::{debug, instrument, warn};

use crate::domain::{DiscrepancyRecord, Employee};
use crate::pipeline::processing::match_resolver::ResolvedComparison;

#[derive(Debug, Clone, Default)]
pub struct DiscrepancyOutcome {
    /// Ordered by location_id
    pub discrepancies: Vec<DiscrepancyRecord>,
    /// Resolved rows skipped because a score was unknown
    pub null_score_rows: usize,
}

/// Keep resolved comparisons whose auditor and surveyor scores differ.
///
/// An unknown score on either side is never a mismatch: the comparison is
/// undecided, so the row is skipped and counted in `null_score_rows`.
#[instrument(skip_all, fields(resolved = resolved.len()))]
pub fn extract_discrepancies(
    resolved: &[ResolvedComparison<'_>],
    directory: &HashMap<&str, &Employee>,
) -> DiscrepancyOutcome {
    let mut outcome = DiscrepancyOutcome::default();

    for row in resolved {
        let (Some(true_score), Some(observed_score)) = (row.audit.true_score, row.observed_score) else {
            debug!(location_id = %row.audit.location_id, "Unknown score; excluded from comparison");
            outcome.null_score_rows += 1;
            continue;
        };
        if true_score == observed_score {
            continue;
        }

        let employee_name = directory
            .get(row.visit.employee_id.as_str())
            .map(|e| e.name.clone());
        if employee_name.is_none() {
            warn!(
                location_id = %row.audit.location_id,
                employee_id = %row.visit.employee_id,
                "Discrepancy attributed to an employee missing from the directory"
            );
        }

        outcome.discrepancies.push(DiscrepancyRecord {
            location_id: row.audit.location_id.clone(),
            record_id: row.visit.record_id.clone(),
            employee_id: row.visit.employee_id.clone(),
            employee_name,
            true_score,
            observed_score,
            statement: row.audit.statement.clone(),
            declared_source_type: row.audit.declared_source_type.clone(),
        });
    }

    outcome
}
