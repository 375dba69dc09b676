use std::collections::{BTreeMap, HashMap};
use tracing::{instrument, warn};

use crate::domain::{DiscrepancyRecord, Employee, EmployeeErrorCount};
use crate::pipeline::processing::match_resolver::ResolvedComparison;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// Sorted by mistake_count desc, employee_name asc
    pub counts: Vec<EmployeeErrorCount>,
    /// Discrepancies whose employee is missing from the directory
    pub unattributed: u64,
}

impl Aggregation {
    pub fn total_attributed(&self) -> u64 {
        self.counts.iter().map(|c| c.mistake_count).sum()
    }
}

/// Count mismatches per employee in one pass over the discrepancies.
///
/// Only employees with at least one mismatch get a row. `first_visit_count`
/// is filled from the comparable (both scores known) resolved rows, so the
/// per-visit error rate shares its denominator with the mismatch test.
#[instrument(skip_all)]
pub fn aggregate_error_counts<'d>(
    discrepancies: impl IntoIterator<Item = &'d DiscrepancyRecord>,
    resolved: &[ResolvedComparison<'_>],
    directory: &HashMap<&str, &Employee>,
) -> Aggregation {
    let mut by_name: BTreeMap<String, EmployeeErrorCount> = BTreeMap::new();
    let mut unattributed = 0u64;

    for discrepancy in discrepancies {
        match &discrepancy.employee_name {
            Some(name) => {
                by_name
                    .entry(name.clone())
                    .or_insert_with(|| EmployeeErrorCount {
                        employee_name: name.clone(),
                        mistake_count: 0,
                        first_visit_count: 0,
                    })
                    .mistake_count += 1;
            }
            None => unattributed += 1,
        }
    }

    for row in resolved {
        if row.audit.true_score.is_none() || row.observed_score.is_none() {
            continue;
        }
        let Some(employee) = directory.get(row.visit.employee_id.as_str()) else {
            continue;
        };
        if let Some(entry) = by_name.get_mut(&employee.name) {
            entry.first_visit_count += 1;
        }
    }

    if unattributed > 0 {
        warn!(unattributed, "Discrepancies excluded from employee counts (employee not in directory)");
    }

    let mut counts: Vec<EmployeeErrorCount> = by_name.into_values().collect();
    counts.sort_by(|a, b| {
        b.mistake_count
            .cmp(&a.mistake_count)
            .then_with(|| a.employee_name.cmp(&b.employee_name))
    });

    Aggregation { counts, unattributed }
}
