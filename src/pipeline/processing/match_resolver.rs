use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument, warn};

use crate::domain::{AuditRecord, QualityObservation, Score, SourceSnapshot, VisitRecord};
use crate::error::Result;

/// An audited location joined to its first-visit observation
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedComparison<'a> {
    pub audit: &'a AuditRecord,
    pub visit: &'a VisitRecord,
    pub observed_score: Option<Score>,
}

#[derive(Debug, Clone, Default)]
pub struct MatchOutcome<'a> {
    /// Ordered by location_id
    pub resolved: Vec<ResolvedComparison<'a>>,
    /// Locations with no visit_sequence = 1 row ("not yet surveyed")
    pub missing_first_visit: usize,
    /// First visits with no quality observation
    pub missing_observation: usize,
    /// Audited locations with more than one visit_sequence = 1 row
    pub ambiguous_first_visit: usize,
}

/// Join audit ground truth to the first-visit observation of each location.
///
/// Locations lacking a first visit or an observation are dropped and counted,
/// never reported as errors. A location with several first visits has no
/// single comparison, so it is dropped and counted as ambiguous.
#[instrument(skip(snapshot), fields(audits = snapshot.audits.len(), visits = snapshot.visits.len()))]
pub fn resolve_first_visits(snapshot: &SourceSnapshot) -> Result<MatchOutcome<'_>> {
    let mut first_visits: HashMap<&str, &VisitRecord> = HashMap::new();
    let mut ambiguous: HashSet<&str> = HashSet::new();
    for visit in snapshot.visits.iter().filter(|v| v.is_first_visit()) {
        if first_visits.insert(visit.location_id.as_str(), visit).is_some() {
            ambiguous.insert(visit.location_id.as_str());
        }
    }

    let observations: HashMap<&str, &QualityObservation> = snapshot
        .observations
        .iter()
        .map(|o| (o.record_id.as_str(), o))
        .collect();

    let mut outcome = MatchOutcome::default();
    for audit in &snapshot.audits {
        if ambiguous.contains(audit.location_id.as_str()) {
            warn!(location_id = %audit.location_id, "Several first visits recorded; location excluded");
            outcome.ambiguous_first_visit += 1;
            continue;
        }
        let Some(visit) = first_visits.get(audit.location_id.as_str()).copied() else {
            debug!(location_id = %audit.location_id, "No first visit; location not yet surveyed");
            outcome.missing_first_visit += 1;
            continue;
        };
        let Some(observation) = observations.get(visit.record_id.as_str()).copied() else {
            debug!(location_id = %audit.location_id, record_id = %visit.record_id, "No quality observation for first visit");
            outcome.missing_observation += 1;
            continue;
        };
        outcome.resolved.push(ResolvedComparison {
            audit,
            visit,
            observed_score: observation.observed_score,
        });
    }
    outcome
        .resolved
        .sort_by(|a, b| a.audit.location_id.cmp(&b.audit.location_id));

    if outcome.missing_first_visit > 0 || outcome.missing_observation > 0 || outcome.ambiguous_first_visit > 0 {
        info!(
            missing_first_visit = outcome.missing_first_visit,
            missing_observation = outcome.missing_observation,
            ambiguous_first_visit = outcome.ambiguous_first_visit,
            "Audited locations skipped for lack of a join target"
        );
    }

    Ok(outcome)
}
