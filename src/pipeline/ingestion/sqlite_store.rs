use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row, TransactionBehavior};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

use crate::app::ports::SourceStorePort;
use crate::constants::{AUDIT_TABLE, EMPLOYEE_TABLE, QUALITY_TABLE, VISITS_TABLE};
use crate::domain::{AuditRecord, Employee, QualityObservation, ScoreRange, SourceSnapshot, VisitRecord};
use crate::error::{AuditError, Result};
use crate::pipeline::ingestion::{validate_score, validate_visit_sequence, RawCell};

/// DDL for the four source relations
pub const SOURCE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS auditor_report (
    location_id          TEXT PRIMARY KEY,
    declared_source_type TEXT NOT NULL DEFAULT '',
    true_score           INTEGER,
    statement            TEXT NOT NULL DEFAULT ''
);
CREATE TABLE IF NOT EXISTS visits (
    record_id      TEXT PRIMARY KEY,
    location_id    TEXT NOT NULL,
    source_id      TEXT NOT NULL,
    employee_id    TEXT NOT NULL,
    visit_sequence INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS water_quality (
    record_id      TEXT PRIMARY KEY,
    observed_score INTEGER
);
CREATE TABLE IF NOT EXISTS employee (
    employee_id TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    contact     TEXT NOT NULL DEFAULT ''
);
"#;

/// Reads the source relations from a SQLite database inside one read transaction
pub struct SqliteSourceStore {
    db_path: PathBuf,
    score_range: ScoreRange,
}

impl SqliteSourceStore {
    pub fn new<P: Into<PathBuf>>(db_path: P, score_range: ScoreRange) -> Self {
        Self {
            db_path: db_path.into(),
            score_range,
        }
    }

    pub fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(SOURCE_SCHEMA)?;
        Ok(())
    }

    /// Read all four relations from one consistent view of the database.
    ///
    /// The first SELECT of a deferred transaction pins the read snapshot, so
    /// writers committing mid-read cannot skew the later relations.
    pub fn read_snapshot(conn: &mut Connection, score_range: &ScoreRange) -> Result<SourceSnapshot> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;

        let audits = {
            let mut stmt = tx.prepare(&format!(
                "SELECT location_id, declared_source_type, true_score, statement FROM {} ORDER BY location_id",
                AUDIT_TABLE
            ))?;
            let mut rows = stmt.query([])?;
            let mut audits = Vec::new();
            while let Some(row) = rows.next()? {
                let location_id = id_column(row, 0)?;
                let true_score = validate_score(numeric_cell(row, 2)?, score_range, "true_score", &location_id)?;
                audits.push(AuditRecord {
                    location_id,
                    declared_source_type: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    true_score,
                    statement: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                });
            }
            audits
        };

        let visits = {
            let mut stmt = tx.prepare(&format!(
                "SELECT record_id, location_id, source_id, employee_id, visit_sequence FROM {} ORDER BY record_id",
                VISITS_TABLE
            ))?;
            let mut rows = stmt.query([])?;
            let mut visits = Vec::new();
            while let Some(row) = rows.next()? {
                let record_id = id_column(row, 0)?;
                let visit_sequence = validate_visit_sequence(&record_id, numeric_cell(row, 4)?)?;
                visits.push(VisitRecord {
                    location_id: id_column(row, 1)?,
                    source_id: id_column(row, 2)?,
                    employee_id: id_column(row, 3)?,
                    record_id,
                    visit_sequence,
                });
            }
            visits
        };

        let observations = {
            let mut stmt = tx.prepare(&format!(
                "SELECT record_id, observed_score FROM {} ORDER BY record_id",
                QUALITY_TABLE
            ))?;
            let mut rows = stmt.query([])?;
            let mut observations = Vec::new();
            while let Some(row) = rows.next()? {
                let record_id = id_column(row, 0)?;
                let observed_score = validate_score(numeric_cell(row, 1)?, score_range, "observed_score", &record_id)?;
                observations.push(QualityObservation {
                    record_id,
                    observed_score,
                });
            }
            observations
        };

        let employees = {
            let mut stmt = tx.prepare(&format!(
                "SELECT employee_id, name, contact FROM {} ORDER BY employee_id",
                EMPLOYEE_TABLE
            ))?;
            let mut rows = stmt.query([])?;
            let mut employees = Vec::new();
            while let Some(row) = rows.next()? {
                employees.push(Employee {
                    employee_id: id_column(row, 0)?,
                    name: row.get(1)?,
                    contact: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                });
            }
            employees
        };

        tx.commit()?;

        Ok(SourceSnapshot {
            audits,
            visits,
            observations,
            employees,
        })
    }
}

/// Identifier columns may be stored as TEXT or INTEGER
fn id_column(row: &Row<'_>, idx: usize) -> Result<String> {
    match row.get_ref(idx)? {
        ValueRef::Text(bytes) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Integer(i) => Ok(i.to_string()),
        other => Err(AuditError::SourceUnavailable(format!(
            "unexpected identifier type {:?} in column {}",
            other.data_type(),
            idx
        ))),
    }
}

/// Score and sequence columns are read untyped so bad cells become validation errors
fn numeric_cell(row: &Row<'_>, idx: usize) -> Result<RawCell> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => RawCell::Null,
        ValueRef::Integer(i) => RawCell::Integer(i),
        ValueRef::Real(f) => RawCell::Other(f.to_string()),
        ValueRef::Text(bytes) => RawCell::Other(format!("'{}'", String::from_utf8_lossy(bytes))),
        ValueRef::Blob(_) => RawCell::Other("<blob>".to_string()),
    })
}

#[async_trait]
impl SourceStorePort for SqliteSourceStore {
    #[instrument(skip(self), fields(db = %self.db_path.display()))]
    async fn load_snapshot(&self) -> Result<SourceSnapshot> {
        let db_path = self.db_path.clone();
        let score_range = self.score_range;
        let snapshot = tokio::task::spawn_blocking(move || -> Result<SourceSnapshot> {
            if !Path::new(&db_path).exists() {
                return Err(AuditError::SourceUnavailable(format!("{} does not exist", db_path.display())));
            }
            let mut conn = Connection::open_with_flags(&db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
            debug!("Opened source database read-only");
            Self::read_snapshot(&mut conn, &score_range)
        })
        .await
        .map_err(|e| AuditError::SourceUnavailable(format!("snapshot reader task failed: {}", e)))??;

        info!(
            audits = snapshot.audits.len(),
            visits = snapshot.visits.len(),
            observations = snapshot.observations.len(),
            employees = snapshot.employees.len(),
            "Loaded SQLite snapshot"
        );
        Ok(snapshot)
    }
}
