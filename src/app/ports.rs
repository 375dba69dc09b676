use async_trait::async_trait;

use crate::domain::SourceSnapshot;
use crate::pipeline::orchestrator::ReportEnvelope;

/// Supplies the four source relations as one consistent snapshot
#[async_trait]
pub trait SourceStorePort: Send + Sync {
    async fn load_snapshot(&self) -> crate::error::Result<SourceSnapshot>;
}

/// Persists a run's reports, replacing whatever the previous run wrote
#[async_trait]
pub trait ReportSinkPort: Send + Sync {
    async fn replace_reports(&self, envelope: &ReportEnvelope) -> anyhow::Result<()>;

    /// Short label used in logs
    fn describe(&self) -> String;
}
