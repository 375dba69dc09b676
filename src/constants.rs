/// Keyword used by the signal correlator when none is configured
pub const DEFAULT_KEYWORD: &str = "cash";

/// Water-quality scores are recorded on a 0..=10 scale
pub const DEFAULT_SCORE_MIN: i64 = 0;
pub const DEFAULT_SCORE_MAX: i64 = 10;

/// Sequence number of the canonical comparison visit
pub const FIRST_VISIT_SEQUENCE: i64 = 1;

pub const DEFAULT_CONFIG_PATH: &str = "audit.toml";
pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const REPORT_FILE_NAME: &str = "audit_report.json";
pub const METRICS_FILE_NAME: &str = "metrics.prom";

pub const LOG_DIR: &str = "logs";
pub const LOG_FILE_NAME: &str = "audit.log";
/// Used when RUST_LOG is unset
pub const DEFAULT_LOG_FILTER: &str = "audit_anomaly=info";

/// Environment variable that overrides the configured keyword
pub const KEYWORD_ENV_VAR: &str = "AUDIT_KEYWORD";

// Source relations (SQLite store)
pub const AUDIT_TABLE: &str = "auditor_report";
pub const VISITS_TABLE: &str = "visits";
pub const QUALITY_TABLE: &str = "water_quality";
pub const EMPLOYEE_TABLE: &str = "employee";

// Report relations (SQLite sink)
pub const DISCREPANCY_REPORT_TABLE: &str = "discrepancy_report";
pub const ERROR_COUNT_TABLE: &str = "employee_error_count";
pub const SUSPECT_EVIDENCE_TABLE: &str = "suspect_evidence";
pub const CONTROL_EVIDENCE_TABLE: &str = "control_evidence";
