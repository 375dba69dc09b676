pub mod ingestion;
pub mod orchestrator;
pub mod processing;
pub mod storage;

pub use orchestrator::{AuditPipeline, AuditReport, ReportEnvelope, RunSummary};
