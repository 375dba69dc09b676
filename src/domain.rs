//! Source relations and derived report rows shared across pipeline stages.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{AuditError, Result};

/// Inclusive bounds accepted for a quality score at ingestion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRange {
    pub min: i64,
    pub max: i64,
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self {
            min: crate::constants::DEFAULT_SCORE_MIN,
            max: crate::constants::DEFAULT_SCORE_MAX,
        }
    }
}

impl ScoreRange {
    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A validated quality score. Only constructible through [`Score::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(i64);

impl Score {
    pub fn new(value: i64, range: &ScoreRange, field: &str, location: &str) -> Result<Self> {
        if !range.contains(value) {
            return Err(AuditError::InvalidScoreValue {
                field: field.to_string(),
                location: location.to_string(),
                detail: format!("{} outside {}..={}", value, range.min, range.max),
            });
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Auditor ground truth, one per location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub location_id: String,
    pub declared_source_type: String,
    /// `None` means the auditor score is unknown
    pub true_score: Option<Score>,
    pub statement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRecord {
    pub record_id: String,
    pub location_id: String,
    pub source_id: String,
    pub employee_id: String,
    pub visit_sequence: i64,
}

impl VisitRecord {
    pub fn is_first_visit(&self) -> bool {
        self.visit_sequence == crate::constants::FIRST_VISIT_SEQUENCE
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityObservation {
    pub record_id: String,
    pub observed_score: Option<Score>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Employee {
    pub employee_id: String,
    pub name: String,
    pub contact: String,
}

/// The four source relations, read together as one consistent unit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub audits: Vec<AuditRecord>,
    pub visits: Vec<VisitRecord>,
    pub observations: Vec<QualityObservation>,
    pub employees: Vec<Employee>,
}

impl SourceSnapshot {
    /// Hex SHA-256 over the canonical JSON form of the snapshot.
    ///
    /// Two runs that report the same fingerprint consumed identical input.
    pub fn fingerprint(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        Ok(hex::encode(hasher.finalize()))
    }

    pub fn is_empty(&self) -> bool {
        self.audits.is_empty()
            && self.visits.is_empty()
            && self.observations.is_empty()
            && self.employees.is_empty()
    }
}

/// A first-visit score mismatch. Recomputed every run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyRecord {
    pub location_id: String,
    pub record_id: String,
    pub employee_id: String,
    /// `None` when the employee is missing from the directory
    pub employee_name: Option<String>,
    pub true_score: Score,
    pub observed_score: Score,
    pub statement: String,
    /// Diagnostic only; never used for filtering
    pub declared_source_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeErrorCount {
    pub employee_name: String,
    pub mistake_count: u64,
    /// Resolved first-visit comparisons attributed to this employee
    pub first_visit_count: u64,
}

impl EmployeeErrorCount {
    /// Mistakes per resolved first visit
    pub fn error_rate(&self) -> f64 {
        if self.first_visit_count == 0 {
            return 0.0;
        }
        self.mistake_count as f64 / self.first_visit_count as f64
    }
}

/// A keyword hit in a discrepancy statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRow {
    pub employee_name: Option<String>,
    pub location_id: String,
    pub statement: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_range_is_inclusive() {
        let range = ScoreRange::default();
        assert!(Score::new(0, &range, "true_score", "loc").is_ok());
        assert!(Score::new(10, &range, "true_score", "loc").is_ok());
        assert!(Score::new(11, &range, "true_score", "loc").is_err());
        assert!(Score::new(-1, &range, "true_score", "loc").is_err());
    }

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let mut snapshot = SourceSnapshot::default();
        let first = snapshot.fingerprint().unwrap();
        assert_eq!(first, snapshot.fingerprint().unwrap());
        assert_eq!(first.len(), 64);

        snapshot.employees.push(Employee {
            employee_id: "1".to_string(),
            name: "Ana".to_string(),
            contact: "ana@example.org".to_string(),
        });
        assert_ne!(first, snapshot.fingerprint().unwrap());
    }

    #[test]
    fn test_error_rate_without_visits_is_zero() {
        let row = EmployeeErrorCount {
            employee_name: "Ana".to_string(),
            mistake_count: 0,
            first_visit_count: 0,
        };
        assert_eq!(row.error_rate(), 0.0);
    }
}
