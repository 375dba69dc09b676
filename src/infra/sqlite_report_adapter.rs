use anyhow::Context;
use rusqlite::{params, Connection};
use std::path::PathBuf;
use tracing::info;

use crate::app::ports::ReportSinkPort;
use crate::constants::{
    CONTROL_EVIDENCE_TABLE, DISCREPANCY_REPORT_TABLE, ERROR_COUNT_TABLE, SUSPECT_EVIDENCE_TABLE,
};
use crate::domain::EvidenceRow;
use crate::pipeline::orchestrator::ReportEnvelope;

pub const REPORT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS discrepancy_report (
    location_id    TEXT PRIMARY KEY,
    record_id      TEXT NOT NULL,
    employee_id    TEXT NOT NULL,
    employee_name  TEXT,
    true_score     INTEGER NOT NULL,
    observed_score INTEGER NOT NULL,
    statement      TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS employee_error_count (
    employee_name     TEXT PRIMARY KEY,
    mistake_count     INTEGER NOT NULL,
    first_visit_count INTEGER NOT NULL,
    is_suspect        INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS suspect_evidence (
    location_id   TEXT PRIMARY KEY,
    employee_name TEXT,
    statement     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS control_evidence (
    location_id   TEXT PRIMARY KEY,
    employee_name TEXT,
    statement     TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS report_run (
    id                   INTEGER PRIMARY KEY CHECK (id = 1),
    run_id               TEXT NOT NULL,
    generated_at         TEXT NOT NULL,
    snapshot_fingerprint TEXT NOT NULL
);
"#;

/// Materializes the report relations in SQLite.
/// Each run deletes and re-inserts every relation inside one transaction.
pub struct SqliteReportSink {
    db_path: PathBuf,
}

impl SqliteReportSink {
    pub fn new<P: Into<PathBuf>>(db_path: P) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn write(conn: &mut Connection, envelope: &ReportEnvelope) -> anyhow::Result<()> {
        conn.execute_batch(REPORT_SCHEMA)?;
        let report = &envelope.report;
        let tx = conn.transaction()?;

        for table in [
            DISCREPANCY_REPORT_TABLE,
            ERROR_COUNT_TABLE,
            SUSPECT_EVIDENCE_TABLE,
            CONTROL_EVIDENCE_TABLE,
        ] {
            tx.execute(&format!("DELETE FROM {}", table), [])?;
        }

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (location_id, record_id, employee_id, employee_name, true_score, observed_score, statement)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                DISCREPANCY_REPORT_TABLE
            ))?;
            for d in &report.discrepancies {
                stmt.execute(params![
                    d.location_id,
                    d.record_id,
                    d.employee_id,
                    d.employee_name,
                    d.true_score.value(),
                    d.observed_score.value(),
                    d.statement,
                ])?;
            }
        }

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {} (employee_name, mistake_count, first_visit_count, is_suspect) VALUES (?1, ?2, ?3, ?4)",
                ERROR_COUNT_TABLE
            ))?;
            for c in &report.error_counts {
                stmt.execute(params![
                    c.employee_name,
                    c.mistake_count as i64,
                    c.first_visit_count as i64,
                    report.suspect_set.contains(&c.employee_name),
                ])?;
            }
        }

        insert_evidence(&tx, SUSPECT_EVIDENCE_TABLE, &report.suspect_evidence)?;
        insert_evidence(&tx, CONTROL_EVIDENCE_TABLE, &report.control_evidence)?;

        tx.execute(
            "INSERT INTO report_run (id, run_id, generated_at, snapshot_fingerprint) VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET run_id=excluded.run_id, generated_at=excluded.generated_at,
             snapshot_fingerprint=excluded.snapshot_fingerprint",
            params![
                envelope.run_id.to_string(),
                envelope.generated_at.to_rfc3339(),
                report.summary.snapshot_fingerprint,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }
}

fn insert_evidence(conn: &Connection, table: &str, rows: &[EvidenceRow]) -> anyhow::Result<()> {
    let mut stmt = conn.prepare(&format!(
        "INSERT INTO {} (location_id, employee_name, statement) VALUES (?1, ?2, ?3)",
        table
    ))?;
    for row in rows {
        stmt.execute(params![row.location_id, row.employee_name, row.statement])?;
    }
    Ok(())
}

#[async_trait::async_trait]
impl ReportSinkPort for SqliteReportSink {
    async fn replace_reports(&self, envelope: &ReportEnvelope) -> anyhow::Result<()> {
        let db_path = self.db_path.clone();
        let envelope = envelope.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            if let Some(parent) = db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut conn = Connection::open(&db_path)
                .with_context(|| format!("opening report database {}", db_path.display()))?;
            Self::write(&mut conn, &envelope)
        })
        .await
        .context("report writer task failed")??;

        info!(db = %self.db_path.display(), "Replaced report tables");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.db_path.display())
    }
}
