use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{error, info};

use audit_anomaly::app::detection_use_case::DetectionUseCase;
use audit_anomaly::app::ports::SourceStorePort;
use audit_anomaly::config::AuditConfig;
use audit_anomaly::constants;
use audit_anomaly::infra::{JsonReportSink, SqliteReportSink};
use audit_anomaly::observability::{self, metrics};
use audit_anomaly::pipeline::ingestion::json_snapshot::JsonSnapshotStore;
use audit_anomaly::pipeline::ingestion::sqlite_store::SqliteSourceStore;
use audit_anomaly::pipeline::orchestrator::{AuditPipeline, ReportEnvelope};
use audit_anomaly::pipeline::processing::classifier::OutlierMetric;
use audit_anomaly::pipeline::processing::correlator::MatchStrategy;

#[derive(Parser)]
#[command(name = "audit-anomaly")]
#[command(about = "Reconcile auditor and surveyor water-quality scores and flag outlier employees")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true, default_value = constants::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    /// A single JSON export of all four relations
    Json,
    /// A SQLite database holding the source tables
    Sqlite,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the discrepancy detection batch
    Run {
        #[arg(long, value_enum, default_value_t = SourceKind::Json)]
        source: SourceKind,
        /// Path to the JSON export or SQLite database
        #[arg(long)]
        input: PathBuf,
        /// Keyword searched for in discrepancy statements (overrides config and AUDIT_KEYWORD)
        #[arg(long)]
        keyword: Option<String>,
        /// exact, case-insensitive or word-boundary
        #[arg(long)]
        match_strategy: Option<MatchStrategy>,
        /// absolute-count or per-visit-rate
        #[arg(long)]
        metric: Option<OutlierMetric>,
        /// Directory for the JSON report and metrics textfile
        #[arg(long)]
        output_dir: Option<String>,
        /// Also materialize report tables in this SQLite database
        #[arg(long)]
        sqlite_output: Option<PathBuf>,
    },
    /// Print the default configuration as TOML
    InitConfig,
}

fn print_summary(envelope: &ReportEnvelope) {
    let report = &envelope.report;
    let summary = &report.summary;

    println!("\n📊 Audit Results (run {}):", envelope.run_id);
    println!("   Keyword: \"{}\" ({}), metric: {}", summary.keyword, summary.match_strategy, summary.outlier_metric);
    println!("   Audited locations: {}", summary.audited_locations);
    println!("   Resolved first visits: {}", summary.resolved_comparisons);
    println!(
        "   Skipped (no first visit / no observation / ambiguous): {} / {} / {}",
        summary.missing_first_visit, summary.missing_observation, summary.ambiguous_first_visit
    );
    println!("   Unknown scores: {}", summary.null_score_rows);
    println!(
        "   Discrepancies: {} ({:.1}%)",
        summary.discrepancies,
        summary.discrepancy_rate()
    );
    match summary.mean {
        Some(mean) => println!("   Mean per employee: {:.2}", mean),
        None => println!("   Mean per employee: n/a"),
    }

    if summary.unattributed_discrepancies > 0 {
        println!(
            "\n⚠️  {} discrepancies belong to employees missing from the directory",
            summary.unattributed_discrepancies
        );
    }

    println!("\n🔎 Suspects ({}):", report.suspect_set.len());
    for suspect in &report.suspect_set.suspects {
        println!(
            "   - {}: {} mistakes / {} visits ({:.1}%)",
            suspect.employee_name,
            suspect.mistake_count,
            suspect.first_visit_count,
            suspect.error_rate() * 100.0
        );
    }

    println!("\n🧾 Suspect evidence ({}):", report.suspect_evidence.len());
    for row in &report.suspect_evidence {
        println!(
            "   - [{}] {}: {}",
            row.location_id,
            row.employee_name.as_deref().unwrap_or("<unknown>"),
            row.statement
        );
    }
    println!("\n🧪 Control evidence: {}", report.control_evidence.len());
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let _log_guard = observability::init_logging(Path::new(constants::LOG_DIR));

    let cli = Cli::parse();

    match cli.command {
        Commands::InitConfig => {
            print!("{}", AuditConfig::default().to_toml()?);
        }
        Commands::Run {
            source,
            input,
            keyword,
            match_strategy,
            metric,
            output_dir,
            sqlite_output,
        } => {
            let mut config = AuditConfig::load_from(&cli.config)
                .with_context(|| format!("loading {}", cli.config.display()))?
                .apply_env_overrides();
            if let Some(keyword) = keyword {
                config.keyword = keyword;
            }
            if let Some(strategy) = match_strategy {
                config.match_strategy = strategy;
            }
            if let Some(metric) = metric {
                config.outlier_metric = metric;
            }
            if let Some(dir) = output_dir {
                config.output_dir = dir;
            }

            metrics::init();
            let pipeline = AuditPipeline::from_config(&config)?;

            let store: Box<dyn SourceStorePort> = match source {
                SourceKind::Json => Box::new(JsonSnapshotStore::new(&input, config.score_range)),
                SourceKind::Sqlite => Box::new(SqliteSourceStore::new(&input, config.score_range)),
            };

            let mut use_case = DetectionUseCase::new(store, pipeline)
                .with_sink(Box::new(JsonReportSink::new(&config.output_dir)));
            if let Some(db_path) = sqlite_output {
                use_case = use_case.with_sink(Box::new(SqliteReportSink::new(db_path)));
            }

            println!("🚀 Running audit discrepancy detection on {}...", input.display());
            match use_case.execute().await {
                Ok(envelope) => {
                    print_summary(&envelope);
                    let metrics_path = PathBuf::from(&config.output_dir).join(constants::METRICS_FILE_NAME);
                    if metrics::write_textfile(&metrics_path)? {
                        info!(path = %metrics_path.display(), "Wrote metrics textfile");
                    }
                    println!("\n✅ Reports written to {}", config.output_dir);
                }
                Err(e) => {
                    error!("Audit run failed: {:#}", e);
                    println!("❌ Audit run failed: {:#}", e);
                    return Err(e);
                }
            }
        }
    }
    Ok(())
}
