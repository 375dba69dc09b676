use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::constants;
use crate::domain::ScoreRange;
use crate::error::{AuditError, Result};
use crate::pipeline::processing::classifier::OutlierMetric;
use crate::pipeline::processing::correlator::MatchStrategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Fraud-indicator keyword searched for in discrepancy statements
    pub keyword: String,
    pub match_strategy: MatchStrategy,
    pub outlier_metric: OutlierMetric,
    pub score_range: ScoreRange,
    pub output_dir: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            keyword: constants::DEFAULT_KEYWORD.to_string(),
            match_strategy: MatchStrategy::default(),
            outlier_metric: OutlierMetric::default(),
            score_range: ScoreRange::default(),
            output_dir: constants::DEFAULT_OUTPUT_DIR.to_string(),
        }
    }
}

impl AuditConfig {
    /// Load `audit.toml` from the working directory, falling back to defaults
    pub fn load() -> Result<Self> {
        Self::load_from(constants::DEFAULT_CONFIG_PATH)
    }

    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            AuditError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        let config: AuditConfig = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    /// Apply `AUDIT_KEYWORD` when set and non-blank
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(keyword) = std::env::var(constants::KEYWORD_ENV_VAR) {
            if !keyword.trim().is_empty() {
                self.keyword = keyword;
            }
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.keyword.trim().is_empty() {
            return Err(AuditError::Config("keyword must not be empty".to_string()));
        }
        if self.score_range.min > self.score_range.max {
            return Err(AuditError::Config(format!(
                "score_range.min ({}) exceeds score_range.max ({})",
                self.score_range.min, self.score_range.max
            )));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| AuditError::Config(format!("Failed to render config: {}", e)))
    }
}
