use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, instrument};

use crate::domain::{DiscrepancyRecord, EvidenceRow};
use crate::error::{AuditError, Result};
use crate::pipeline::processing::classifier::SuspectSet;

/// How the keyword is looked for inside a statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// Case-sensitive substring
    Exact,
    /// Case-insensitive substring; "cashier" matches "cash"
    #[default]
    CaseInsensitive,
    /// Case-insensitive, whole words only
    WordBoundary,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchStrategy::Exact => write!(f, "exact"),
            MatchStrategy::CaseInsensitive => write!(f, "case_insensitive"),
            MatchStrategy::WordBoundary => write!(f, "word_boundary"),
        }
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "exact" => Ok(MatchStrategy::Exact),
            "case_insensitive" | "insensitive" => Ok(MatchStrategy::CaseInsensitive),
            "word_boundary" | "word" => Ok(MatchStrategy::WordBoundary),
            other => Err(format!("unknown match strategy '{}'", other)),
        }
    }
}

/// A compiled keyword signal
#[derive(Debug, Clone)]
pub struct KeywordMatcher {
    keyword: String,
    strategy: MatchStrategy,
    lowered: String,
    word_pattern: Option<Regex>,
}

impl KeywordMatcher {
    pub fn new(keyword: &str, strategy: MatchStrategy) -> Result<Self> {
        if keyword.trim().is_empty() {
            return Err(AuditError::Config("keyword must not be empty".to_string()));
        }

        let word_pattern = match strategy {
            MatchStrategy::WordBoundary => Some(
                RegexBuilder::new(&format!(r"\b{}\b", regex::escape(keyword)))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| AuditError::Config(format!("invalid keyword pattern: {}", e)))?,
            ),
            _ => None,
        };

        Ok(Self {
            keyword: keyword.to_string(),
            strategy,
            lowered: keyword.to_lowercase(),
            word_pattern,
        })
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    pub fn is_match(&self, statement: &str) -> bool {
        match (&self.strategy, &self.word_pattern) {
            (MatchStrategy::Exact, _) => statement.contains(&self.keyword),
            (MatchStrategy::WordBoundary, Some(pattern)) => pattern.is_match(statement),
            _ => statement.to_lowercase().contains(&self.lowered),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    /// Keyword hits by suspect employees
    pub suspect_evidence: Vec<EvidenceRow>,
    /// Keyword hits by everyone else (negative control)
    pub control_evidence: Vec<EvidenceRow>,
}

/// Split keyword-bearing discrepancy statements by suspect membership.
///
/// The two lists are disjoint and together hold every discrepancy whose
/// statement matches. Unattributed discrepancies are never suspects.
#[instrument(skip_all, fields(keyword = %matcher.keyword(), strategy = %matcher.strategy()))]
pub fn correlate_signal(
    discrepancies: &[DiscrepancyRecord],
    suspects: &SuspectSet,
    matcher: &KeywordMatcher,
) -> Correlation {
    let mut correlation = Correlation::default();

    for discrepancy in discrepancies.iter().filter(|d| matcher.is_match(&d.statement)) {
        let row = EvidenceRow {
            employee_name: discrepancy.employee_name.clone(),
            location_id: discrepancy.location_id.clone(),
            statement: discrepancy.statement.clone(),
        };
        let is_suspect = discrepancy
            .employee_name
            .as_deref()
            .is_some_and(|name| suspects.contains(name));
        debug!(location_id = %row.location_id, is_suspect, "Keyword hit");
        if is_suspect {
            correlation.suspect_evidence.push(row);
        } else {
            correlation.control_evidence.push(row);
        }
    }

    info!(
        suspect_evidence = correlation.suspect_evidence.len(),
        control_evidence = correlation.control_evidence.len(),
        "Correlated keyword signal"
    );
    correlation
}
