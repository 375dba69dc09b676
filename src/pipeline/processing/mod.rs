// Pipeline stages, leaf to root
pub mod match_resolver;
pub mod discrepancy;
pub mod aggregator;
pub mod classifier;
pub mod correlator;

use std::collections::HashMap;

use crate::domain::{Employee, SourceSnapshot};

/// Employee lookup keyed by employee_id
pub fn directory_of(snapshot: &SourceSnapshot) -> HashMap<&str, &Employee> {
    snapshot
        .employees
        .iter()
        .map(|e| (e.employee_id.as_str(), e))
        .collect()
}
