//! Source readers. Every reader returns the four relations as one snapshot and
//! validates scores on the way in: a malformed score aborts the read instead of
//! being coerced.

pub mod json_snapshot;
pub mod sqlite_store;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};

use crate::domain::{Score, ScoreRange};
use crate::error::{AuditError, Result};

/// A numeric cell as it arrives from a source, before validation
#[derive(Debug, Clone, PartialEq)]
pub enum RawCell {
    Null,
    Integer(i64),
    /// Anything else (fractional number, text, blob), rendered for the error message
    Other(String),
}

impl RawCell {
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawCell::Null,
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => RawCell::Integer(i),
                None => RawCell::Other(n.to_string()),
            },
            other => RawCell::Other(other.to_string()),
        }
    }

    fn render(&self) -> String {
        match self {
            RawCell::Null => "null".to_string(),
            RawCell::Integer(i) => i.to_string(),
            RawCell::Other(rendered) => rendered.clone(),
        }
    }
}

/// Turn a raw cell into a known or unknown score, failing fast on anything else
pub fn validate_score(raw: RawCell, range: &ScoreRange, field: &str, location: &str) -> Result<Option<Score>> {
    match raw {
        RawCell::Null => Ok(None),
        RawCell::Integer(value) => Score::new(value, range, field, location).map(Some),
        RawCell::Other(rendered) => Err(AuditError::InvalidScoreValue {
            field: field.to_string(),
            location: location.to_string(),
            detail: format!("non-integer value {}", rendered),
        }),
    }
}

/// Visit sequences are integers starting at 1; null or non-integer cells are rejected
pub fn validate_visit_sequence(record_id: &str, raw: RawCell) -> Result<i64> {
    match raw {
        RawCell::Integer(sequence) if sequence >= crate::constants::FIRST_VISIT_SEQUENCE => Ok(sequence),
        other => Err(AuditError::InvalidVisitSequence {
            record_id: record_id.to_string(),
            value: other.render(),
        }),
    }
}

/// Identifiers may be exported as JSON strings or integers
pub(crate) fn string_or_integer<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected a string or integer identifier, found {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Row {
        #[serde(deserialize_with = "string_or_integer")]
        id: String,
    }

    #[test]
    fn test_json_cells_classify() {
        assert_eq!(RawCell::from_json(&json!(null)), RawCell::Null);
        assert_eq!(RawCell::from_json(&json!(7)), RawCell::Integer(7));
        assert!(matches!(RawCell::from_json(&json!(7.5)), RawCell::Other(_)));
        assert!(matches!(RawCell::from_json(&json!("7")), RawCell::Other(_)));
    }

    #[test]
    fn test_invalid_scores_fail_fast() {
        let range = ScoreRange::default();
        assert_eq!(validate_score(RawCell::Null, &range, "true_score", "loc").unwrap(), None);
        assert!(validate_score(RawCell::Integer(42), &range, "true_score", "loc").is_err());
        let err = validate_score(RawCell::Other("\"7\"".to_string()), &range, "true_score", "loc").unwrap_err();
        assert!(matches!(err, AuditError::InvalidScoreValue { .. }));
    }

    #[test]
    fn test_visit_sequence_must_be_positive_integer() {
        assert_eq!(validate_visit_sequence("r-1", RawCell::Integer(1)).unwrap(), 1);
        for bad in [
            RawCell::Integer(0),
            RawCell::Null,
            RawCell::Other("'first'".to_string()),
        ] {
            let err = validate_visit_sequence("r-1", bad).unwrap_err();
            assert!(matches!(err, AuditError::InvalidVisitSequence { .. }));
        }
    }

    #[test]
    fn test_identifiers_accept_strings_and_integers() {
        let text: Row = serde_json::from_value(json!({"id": "loc-1"})).unwrap();
        assert_eq!(text.id, "loc-1");
        let number: Row = serde_json::from_value(json!({"id": 7})).unwrap();
        assert_eq!(number.id, "7");
        assert!(serde_json::from_value::<Row>(json!({"id": 1.5})).is_err());
        assert!(serde_json::from_value::<Row>(json!({"id": null})).is_err());
    }
}
