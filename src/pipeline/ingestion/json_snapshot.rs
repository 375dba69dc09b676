use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::app::ports::SourceStorePort;
use crate::domain::{AuditRecord, Employee, QualityObservation, ScoreRange, SourceSnapshot, VisitRecord};
use crate::error::{AuditError, Result};
use crate::pipeline::ingestion::{string_or_integer, validate_score, validate_visit_sequence, RawCell};

/// Export file layout; numeric cells stay untyped until validated
#[derive(Debug, Deserialize)]
struct RawExport {
    audits: Vec<RawAudit>,
    visits: Vec<RawVisit>,
    observations: Vec<RawObservation>,
    employees: Vec<RawEmployee>,
}

#[derive(Debug, Deserialize)]
struct RawAudit {
    #[serde(deserialize_with = "string_or_integer")]
    location_id: String,
    #[serde(default)]
    declared_source_type: String,
    #[serde(default)]
    true_score: serde_json::Value,
    #[serde(default)]
    statement: String,
}

#[derive(Debug, Deserialize)]
struct RawVisit {
    #[serde(deserialize_with = "string_or_integer")]
    record_id: String,
    #[serde(deserialize_with = "string_or_integer")]
    location_id: String,
    #[serde(deserialize_with = "string_or_integer")]
    source_id: String,
    #[serde(deserialize_with = "string_or_integer")]
    employee_id: String,
    #[serde(default)]
    visit_sequence: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawObservation {
    #[serde(deserialize_with = "string_or_integer")]
    record_id: String,
    #[serde(default)]
    observed_score: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct RawEmployee {
    #[serde(deserialize_with = "string_or_integer")]
    employee_id: String,
    name: String,
    #[serde(default)]
    contact: String,
}

/// Reads a single JSON export holding all four relations
pub struct JsonSnapshotStore {
    path: PathBuf,
    score_range: ScoreRange,
}

impl JsonSnapshotStore {
    pub fn new<P: Into<PathBuf>>(path: P, score_range: ScoreRange) -> Self {
        Self {
            path: path.into(),
            score_range,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse(content: &str, score_range: &ScoreRange) -> Result<SourceSnapshot> {
        let raw: RawExport = serde_json::from_str(content)?;

        let audits = raw
            .audits
            .into_iter()
            .map(|a| {
                let true_score = validate_score(
                    RawCell::from_json(&a.true_score),
                    score_range,
                    "true_score",
                    &a.location_id,
                )?;
                Ok(AuditRecord {
                    location_id: a.location_id,
                    declared_source_type: a.declared_source_type,
                    true_score,
                    statement: a.statement,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let visits = raw
            .visits
            .into_iter()
            .map(|v| {
                let visit_sequence = validate_visit_sequence(&v.record_id, RawCell::from_json(&v.visit_sequence))?;
                Ok(VisitRecord {
                    record_id: v.record_id,
                    location_id: v.location_id,
                    source_id: v.source_id,
                    employee_id: v.employee_id,
                    visit_sequence,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let observations = raw
            .observations
            .into_iter()
            .map(|o| {
                let observed_score = validate_score(
                    RawCell::from_json(&o.observed_score),
                    score_range,
                    "observed_score",
                    &o.record_id,
                )?;
                Ok(QualityObservation {
                    record_id: o.record_id,
                    observed_score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let employees = raw
            .employees
            .into_iter()
            .map(|e| Employee {
                employee_id: e.employee_id,
                name: e.name,
                contact: e.contact,
            })
            .collect();

        Ok(SourceSnapshot {
            audits,
            visits,
            observations,
            employees,
        })
    }
}

#[async_trait]
impl SourceStorePort for JsonSnapshotStore {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn load_snapshot(&self) -> Result<SourceSnapshot> {
        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            AuditError::SourceUnavailable(format!("{}: {}", self.path.display(), e))
        })?;
        let snapshot = Self::parse(&content, &self.score_range)?;
        info!(
            audits = snapshot.audits.len(),
            visits = snapshot.visits.len(),
            observations = snapshot.observations.len(),
            employees = snapshot.employees.len(),
            "Loaded JSON snapshot"
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn export(true_score: serde_json::Value, observed: serde_json::Value) -> String {
        json!({
            "audits": [{"location_id": "loc-1", "declared_source_type": "well", "true_score": true_score, "statement": "cash"}],
            "visits": [{"record_id": "r-1", "location_id": "loc-1", "source_id": "s-1", "employee_id": "e1", "visit_sequence": 1}],
            "observations": [{"record_id": "r-1", "observed_score": observed}],
            "employees": [{"employee_id": "e1", "name": "Ana", "contact": "ana@example.org"}]
        })
        .to_string()
    }

    #[test]
    fn test_parses_nullable_scores() {
        let snapshot = JsonSnapshotStore::parse(&export(json!(3), json!(null)), &ScoreRange::default()).unwrap();
        assert_eq!(snapshot.audits[0].true_score.map(|s| s.value()), Some(3));
        assert_eq!(snapshot.observations[0].observed_score, None);
    }

    #[test]
    fn test_missing_score_field_is_unknown() {
        let content = json!({
            "audits": [{"location_id": "loc-1"}],
            "visits": [],
            "observations": [{"record_id": "r-1"}],
            "employees": []
        })
        .to_string();
        let snapshot = JsonSnapshotStore::parse(&content, &ScoreRange::default()).unwrap();
        assert_eq!(snapshot.audits[0].true_score, None);
        assert_eq!(snapshot.observations[0].observed_score, None);
    }

    #[test]
    fn test_fractional_score_is_rejected() {
        let err = JsonSnapshotStore::parse(&export(json!(3), json!(4.5)), &ScoreRange::default()).unwrap_err();
        assert!(matches!(err, AuditError::InvalidScoreValue { .. }));
    }

    #[test]
    fn test_out_of_range_score_is_rejected() {
        let err = JsonSnapshotStore::parse(&export(json!(11), json!(4)), &ScoreRange::default()).unwrap_err();
        assert!(matches!(err, AuditError::InvalidScoreValue { .. }));
    }

    #[test]
    fn test_integer_identifiers_are_accepted() {
        let content = json!({
            "audits": [{"location_id": 40, "true_score": 3, "statement": ""}],
            "visits": [{"record_id": 1, "location_id": 40, "source_id": 900, "employee_id": 7, "visit_sequence": 1}],
            "observations": [{"record_id": 1, "observed_score": 5}],
            "employees": [{"employee_id": 7, "name": "Ana"}]
        })
        .to_string();
        let snapshot = JsonSnapshotStore::parse(&content, &ScoreRange::default()).unwrap();
        assert_eq!(snapshot.audits[0].location_id, "40");
        assert_eq!(snapshot.visits[0].record_id, "1");
        assert_eq!(snapshot.visits[0].employee_id, "7");
        assert_eq!(snapshot.observations[0].record_id, "1");
        assert_eq!(snapshot.employees[0].employee_id, "7");
    }

    #[test]
    fn test_text_visit_sequence_is_a_validation_error() {
        let mut content: serde_json::Value = serde_json::from_str(&export(json!(3), json!(3))).unwrap();
        content["visits"][0]["visit_sequence"] = json!("first");
        let err = JsonSnapshotStore::parse(&content.to_string(), &ScoreRange::default()).unwrap_err();
        assert!(matches!(err, AuditError::InvalidVisitSequence { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_source_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonSnapshotStore::new(dir.path().join("absent.json"), ScoreRange::default());
        let err = store.load_snapshot().await.unwrap_err();
        assert!(matches!(err, AuditError::SourceUnavailable(_)));
    }
}
