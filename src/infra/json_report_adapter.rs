use anyhow::Context;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::app::ports::ReportSinkPort;
use crate::constants::REPORT_FILE_NAME;
use crate::pipeline::orchestrator::ReportEnvelope;

/// File-based implementation of ReportSinkPort.
/// Writes the whole report as one JSON document, replacing the previous run's file.
pub struct JsonReportSink {
    output_dir: PathBuf,
}

impl JsonReportSink {
    pub fn new<P: Into<PathBuf>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join(REPORT_FILE_NAME)
    }

    fn write_atomically(&self, path: &Path, envelope: &ReportEnvelope) -> anyhow::Result<()> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("creating output dir {}", self.output_dir.display()))?;

        // Write beside the target and rename, so readers never see a half-written report
        let tmp_path = path.with_extension("json.tmp");
        {
            let file = std::fs::File::create(&tmp_path)
                .with_context(|| format!("creating {}", tmp_path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, envelope)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ReportSinkPort for JsonReportSink {
    async fn replace_reports(&self, envelope: &ReportEnvelope) -> anyhow::Result<()> {
        let path = self.report_path();
        self.write_atomically(&path, envelope)?;
        info!(path = %path.display(), run_id = %envelope.run_id, "Wrote audit report");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("json:{}", self.report_path().display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::orchestrator::AuditReport;

    #[tokio::test]
    async fn test_second_run_replaces_first() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonReportSink::new(dir.path().join("out"));

        let first = ReportEnvelope::new(AuditReport::default());
        sink.replace_reports(&first).await.unwrap();
        let second = ReportEnvelope::new(AuditReport::default());
        sink.replace_reports(&second).await.unwrap();

        let content = std::fs::read_to_string(sink.report_path()).unwrap();
        let parsed: ReportEnvelope = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.run_id, second.run_id);
        assert!(!sink.report_path().with_extension("json.tmp").exists());
    }
}
