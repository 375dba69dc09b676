use anyhow::Result;
use rusqlite::{params, Connection};
use serde_json::json;
use tempfile::tempdir;

use audit_anomaly::app::detection_use_case::DetectionUseCase;
use audit_anomaly::config::AuditConfig;
use audit_anomaly::domain::ScoreRange;
use audit_anomaly::infra::{JsonReportSink, SqliteReportSink};
use audit_anomaly::pipeline::ingestion::json_snapshot::JsonSnapshotStore;
use audit_anomaly::pipeline::ingestion::sqlite_store::SqliteSourceStore;
use audit_anomaly::pipeline::orchestrator::{AuditPipeline, ReportEnvelope};
use audit_anomaly::pipeline::processing::correlator::MatchStrategy;

/// Employees A=5, B=2, C=2 mismatches, plus one unattributed and one unresolved location
fn export() -> serde_json::Value {
    let mut audits = Vec::new();
    let mut visits = Vec::new();
    let mut observations = Vec::new();

    let mut add = |loc: &str, employee: &str, truth: serde_json::Value, observed: serde_json::Value, statement: &str| {
        let record = format!("r-{}", loc);
        audits.push(json!({"location_id": loc, "declared_source_type": "tap_in_home", "true_score": truth, "statement": statement}));
        visits.push(json!({"record_id": record, "location_id": loc, "source_id": format!("s-{}", loc), "employee_id": employee, "visit_sequence": 1}));
        observations.push(json!({"record_id": record, "observed_score": observed}));
    };

    add("loc-a1", "1", json!(2), json!(9), "Paid cash for repair");
    for i in 2..=5 {
        add(&format!("loc-a{}", i), "1", json!(2), json!(9), "Routine visit");
    }
    add("loc-b1", "2", json!(3), json!(8), "Cash register nearby");
    add("loc-b2", "2", json!(3), json!(8), "Queue was long");
    add("loc-c1", "3", json!(4), json!(7), "The cashier was helpful");
    add("loc-c2", "3", json!(4), json!(7), "");
    add("loc-c3", "3", json!(4), json!(4), "Cash, but scores agree");
    add("loc-c4", "3", json!(4), json!(null), "cash; reading lost");
    add("loc-x1", "99", json!(1), json!(6), "cash from a stranger");

    // audited, surveyed only on a revisit
    audits.push(json!({"location_id": "loc-z1", "declared_source_type": "well", "true_score": 5, "statement": "cash"}));
    visits.push(json!({"record_id": "r-z1-2", "location_id": "loc-z1", "source_id": "s-z1", "employee_id": "1", "visit_sequence": 2}));
    observations.push(json!({"record_id": "r-z1-2", "observed_score": 1}));

    json!({
        "audits": audits,
        "visits": visits,
        "observations": observations,
        "employees": [
            {"employee_id": "1", "name": "A", "contact": "a@example.org"},
            {"employee_id": "2", "name": "B", "contact": "b@example.org"},
            {"employee_id": "3", "name": "C", "contact": "c@example.org"}
        ]
    })
}

fn pipeline(strategy: MatchStrategy) -> AuditPipeline {
    let config = AuditConfig {
        match_strategy: strategy,
        ..AuditConfig::default()
    };
    AuditPipeline::from_config(&config).unwrap()
}

async fn run_json(strategy: MatchStrategy) -> Result<ReportEnvelope> {
    let dir = tempdir()?;
    let input = dir.path().join("snapshot.json");
    std::fs::write(&input, export().to_string())?;

    let use_case = DetectionUseCase::new(
        Box::new(JsonSnapshotStore::new(&input, ScoreRange::default())),
        pipeline(strategy),
    )
    .with_sink(Box::new(JsonReportSink::new(dir.path().join("out"))));
    use_case.execute().await
}

#[tokio::test]
async fn test_json_snapshot_end_to_end() -> Result<()> {
    let envelope = run_json(MatchStrategy::CaseInsensitive).await?;
    let report = &envelope.report;

    assert_eq!(report.summary.audited_locations, 13);
    assert_eq!(report.summary.missing_first_visit, 1);
    assert_eq!(report.summary.null_score_rows, 1);
    assert_eq!(report.summary.discrepancies, 10);
    assert_eq!(report.summary.unattributed_discrepancies, 1);

    // sum of counts equals attributable discrepancies
    let attributed = report.discrepancies.iter().filter(|d| d.employee_name.is_some()).count() as u64;
    assert_eq!(report.error_counts.iter().map(|c| c.mistake_count).sum::<u64>(), attributed);

    let suspects: Vec<&str> = report.suspect_set.suspects.iter().map(|s| s.employee_name.as_str()).collect();
    assert_eq!(suspects, vec!["A"]);

    let suspect_locations: Vec<&str> = report.suspect_evidence.iter().map(|e| e.location_id.as_str()).collect();
    assert_eq!(suspect_locations, vec!["loc-a1"]);
    let control_locations: Vec<&str> = report.control_evidence.iter().map(|e| e.location_id.as_str()).collect();
    assert_eq!(control_locations, vec!["loc-b1", "loc-c1", "loc-x1"]);

    // union covers every matching discrepancy
    let hits = report
        .discrepancies
        .iter()
        .filter(|d| d.statement.to_lowercase().contains("cash"))
        .count();
    assert_eq!(report.suspect_evidence.len() + report.control_evidence.len(), hits);
    Ok(())
}

#[tokio::test]
async fn test_word_boundary_drops_cashier_false_positive() -> Result<()> {
    let envelope = run_json(MatchStrategy::WordBoundary).await?;
    let control_locations: Vec<&str> = envelope
        .report
        .control_evidence
        .iter()
        .map(|e| e.location_id.as_str())
        .collect();
    assert_eq!(control_locations, vec!["loc-b1", "loc-x1"]);
    Ok(())
}

#[tokio::test]
async fn test_reruns_on_unchanged_input_are_identical() -> Result<()> {
    let first = run_json(MatchStrategy::CaseInsensitive).await?;
    let second = run_json(MatchStrategy::CaseInsensitive).await?;
    assert_eq!(
        serde_json::to_string(&first.report)?,
        serde_json::to_string(&second.report)?
    );
    Ok(())
}

#[tokio::test]
async fn test_invalid_score_aborts_the_run() -> Result<()> {
    let dir = tempdir()?;
    let input = dir.path().join("snapshot.json");
    let mut content = export();
    content["observations"][0]["observed_score"] = json!("nine");
    std::fs::write(&input, content.to_string())?;

    let use_case = DetectionUseCase::new(
        Box::new(JsonSnapshotStore::new(&input, ScoreRange::default())),
        pipeline(MatchStrategy::CaseInsensitive),
    );
    assert!(use_case.execute().await.is_err());
    Ok(())
}

#[tokio::test]
async fn test_sqlite_source_to_sqlite_reports() -> Result<()> {
    let dir = tempdir()?;
    let source_path = dir.path().join("source.db");
    {
        let conn = Connection::open(&source_path)?;
        SqliteSourceStore::init_schema(&conn)?;
        let rows = [
            ("loc-1", 1, 2, 9, "paid CASH"),
            ("loc-2", 1, 2, 9, ""),
            ("loc-3", 1, 2, 9, ""),
            ("loc-4", 2, 5, 6, "cash box"),
            ("loc-5", 2, 5, 5, "cash"),
        ];
        for (loc, employee, truth, observed, statement) in rows {
            let record = format!("r-{}", loc);
            conn.execute(
                "INSERT INTO auditor_report VALUES (?1, 'well', ?2, ?3)",
                params![loc, truth, statement],
            )?;
            conn.execute(
                "INSERT INTO visits VALUES (?1, ?2, 's', ?3, 1)",
                params![record, loc, employee],
            )?;
            conn.execute("INSERT INTO water_quality VALUES (?1, ?2)", params![record, observed])?;
        }
        conn.execute("INSERT INTO employee VALUES ('1', 'Ana', 'ana@example.org')", [])?;
        conn.execute("INSERT INTO employee VALUES ('2', 'Bo', 'bo@example.org')", [])?;
    }

    let report_db = dir.path().join("reports.db");
    let use_case = DetectionUseCase::new(
        Box::new(SqliteSourceStore::new(&source_path, ScoreRange::default())),
        pipeline(MatchStrategy::CaseInsensitive),
    )
    .with_sink(Box::new(SqliteReportSink::new(&report_db)));

    // run twice: report tables are replaced, not appended
    use_case.execute().await?;
    let envelope = use_case.execute().await?;
    assert_eq!(envelope.report.summary.discrepancies, 4);

    let conn = Connection::open(&report_db)?;
    let discrepancies: i64 = conn.query_row("SELECT COUNT(*) FROM discrepancy_report", [], |r| r.get(0))?;
    assert_eq!(discrepancies, 4);
    let suspect: String = conn.query_row("SELECT employee_name FROM suspect_evidence", [], |r| r.get(0))?;
    assert_eq!(suspect, "Ana");
    let control: i64 = conn.query_row("SELECT COUNT(*) FROM control_evidence", [], |r| r.get(0))?;
    assert_eq!(control, 1);
    Ok(())
}
