use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::coerce;

pub mod file_source;
pub mod reconciler;
pub mod structured;

/// Suggestion text rendered when a reviewer did not propose replacement code.
pub const SUGGESTION_PLACEHOLDER: &str =
    "No specific suggestion provided; please adjust accordingly.";

/// Provider attributed to structured-block findings that do not name one.
pub const SYNTHESIS_PROVIDER: &str = "synthesis";

/// Reviewer-assigned severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl Severity {
    /// Parse a severity label case-insensitively. Unknown labels are unranked.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Some(Self::Critical),
            "major" => Some(Self::Major),
            "minor" => Some(Self::Minor),
            _ => None,
        }
    }

    /// Threshold form of [`Severity::parse`]: unknown labels mean `minor`.
    pub fn floor(raw: &str) -> Self {
        Self::parse(raw).unwrap_or(Self::Minor)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Major => "major",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finding record as reported by a provider.
///
/// Every field is optional and loosely typed: non-string text fields read as
/// absent, and `line` accepts anything integer-like. Whether the record is
/// usable is decided by [`RawFinding::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFinding {
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "lenient_line", skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        _ => None,
    })
}

fn lenient_line<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(coerce::integer(&Value::deserialize(deserializer)?))
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

impl RawFinding {
    pub fn new(file: impl Into<String>, line: i64) -> Self {
        Self {
            file: Some(file.into()),
            line: Some(line),
            ..Self::default()
        }
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = Some(severity.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attribute the record to `provider` unless it already names a non-blank one.
    pub fn with_default_provider(mut self, provider: &str) -> Self {
        if non_blank(self.provider.as_deref()).is_none() {
            self.provider = Some(provider.to_string());
        }
        self
    }

    /// Decode a record from an arbitrary JSON value.
    pub fn from_value(value: Value) -> Result<Self, DropReason> {
        if !value.is_object() {
            return Err(DropReason::NotAnObject);
        }
        serde_json::from_value(value).map_err(|err| DropReason::Malformed {
            detail: err.to_string(),
        })
    }

    /// Dedup identity of this record, or the reason it has none.
    pub fn key(&self) -> Result<FindingKey, DropReason> {
        let file = non_blank(self.file.as_deref()).ok_or(DropReason::MissingFile)?;
        let line = self.line.unwrap_or(0);
        if line <= 0 {
            return Err(DropReason::InvalidLine { line });
        }
        let text = non_blank(self.title.as_deref())
            .or_else(|| non_blank(self.message.as_deref()))
            .ok_or(DropReason::MissingText)?;
        Ok(FindingKey {
            file: file.to_string(),
            line: line as u64,
            message: text.to_lowercase(),
        })
    }

    /// Check the record against the identity, scope and severity rules, in that
    /// order, producing a normalized [`Finding`] or the first rule it breaks.
    pub fn validate(&self, config: &ConsensusConfig) -> Result<Finding, DropReason> {
        let key = self.key()?;
        if !config.in_scope(&key.file) {
            return Err(DropReason::OutOfScope { file: key.file });
        }
        let severity = match self.severity.as_deref().and_then(Severity::parse) {
            Some(severity) if severity >= config.min_severity => severity,
            _ => {
                return Err(DropReason::BelowSeverity {
                    severity: self.severity.clone().unwrap_or_default(),
                    minimum: config.min_severity,
                })
            }
        };
        let suggestion = match self.suggestion.as_deref() {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => SUGGESTION_PLACEHOLDER.to_string(),
        };
        Ok(Finding {
            key,
            severity,
            title: self.title.clone().filter(|t| !t.trim().is_empty()),
            message: self.message.clone().filter(|m| !m.trim().is_empty()),
            suggestion,
            provider: self.provider.clone().filter(|p| !p.is_empty()),
        })
    }
}

/// Identity of "the same issue": file, line and lower-cased title (or message).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FindingKey {
    pub file: String,
    pub line: u64,
    pub message: String,
}

/// A validated finding. Title and message keep their reported text; the
/// suggestion is never blank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub key: FindingKey,
    pub severity: Severity,
    pub title: Option<String>,
    pub message: Option<String>,
    pub suggestion: String,
    pub provider: Option<String>,
}

/// Why a record was excluded from reconciliation.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DropReason {
    #[error("finding is not a JSON object")]
    NotAnObject,
    #[error("finding could not be decoded: {detail}")]
    Malformed { detail: String },
    #[error("finding has no file path")]
    MissingFile,
    #[error("finding line must be a positive integer (got {line})")]
    InvalidLine { line: i64 },
    #[error("finding has neither a title nor a message")]
    MissingText,
    #[error("file `{file}` is not part of the change set")]
    OutOfScope { file: String },
    #[error("severity `{severity}` is below the `{minimum}` threshold")]
    BelowSeverity { severity: String, minimum: Severity },
}

/// Which input list a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingOrigin {
    Provider,
    Structured,
}

/// A record excluded from reconciliation, identified by its position in its input list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedFinding {
    pub origin: FindingOrigin,
    pub position: usize,
    pub reason: DropReason,
}

/// Diff side an inline comment is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffSide {
    Right,
}

/// Review comment payload handed to the posting step verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineComment {
    pub path: String,
    pub line: u64,
    pub side: DiffSide,
    pub body: String,
}

/// An emitted comment together with the consensus that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsensusComment {
    pub key: FindingKey,
    pub severity: Severity,
    /// Distinct providers that reported the key, sorted.
    pub providers: Vec<String>,
    pub comment: InlineComment,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub comments: Vec<ConsensusComment>,
    pub dropped: Vec<DroppedFinding>,
    /// Keys discarded because too few distinct providers reported them.
    pub insufficient_agreement: Vec<FindingKey>,
    /// Comments cut by the `max_comments` cap.
    pub truncated: usize,
}

impl Reconciliation {
    pub fn inline_comments(&self) -> Vec<InlineComment> {
        self.comments.iter().map(|c| c.comment.clone()).collect()
    }
}

/// Thresholds and scope applied while reconciling findings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusConfig {
    pub max_comments: usize,
    pub min_severity: Severity,
    /// Always at least 1.
    pub min_agreement: usize,
    /// Paths in the pull request's diff; empty disables the scope filter.
    pub changed_files: HashSet<String>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            max_comments: 5,
            min_severity: Severity::Major,
            min_agreement: 1,
            changed_files: HashSet::new(),
        }
    }
}

impl ConsensusConfig {
    pub fn new(max_comments: usize, min_severity: Severity, min_agreement: i64) -> Self {
        Self {
            max_comments,
            min_severity,
            min_agreement: min_agreement.max(1) as usize,
            changed_files: HashSet::new(),
        }
    }

    /// Build a config from textual settings, e.g. environment values.
    ///
    /// Integer fields must parse; a non-positive `min_agreement` is raised to 1
    /// and an unknown `min_severity` means `minor`.
    pub fn from_raw(
        max_comments: &str,
        min_severity: &str,
        min_agreement: &str,
    ) -> Result<Self, ConsensusConfigError> {
        let max = max_comments.trim().parse::<i64>().map_err(|_| {
            ConsensusConfigError::InvalidMaxComments {
                value: max_comments.to_string(),
            }
        })?;
        if max < 0 {
            return Err(ConsensusConfigError::NegativeMaxComments { value: max });
        }
        let agreement = min_agreement.trim().parse::<i64>().map_err(|_| {
            ConsensusConfigError::InvalidMinAgreement {
                value: min_agreement.to_string(),
            }
        })?;
        Ok(Self::new(max as usize, Severity::floor(min_severity), agreement))
    }

    /// Restrict findings to these paths. Blank entries are ignored.
    pub fn with_changed_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.changed_files.extend(
            files
                .into_iter()
                .map(|f| f.as_ref().trim().to_string())
                .filter(|f| !f.is_empty()),
        );
        self
    }

    pub fn in_scope(&self, file: &str) -> bool {
        self.changed_files.is_empty() || self.changed_files.contains(file)
    }
}

/// Errors raised while coercing consensus settings.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusConfigError {
    #[error("max_comments must be an integer (got `{value}`)")]
    InvalidMaxComments { value: String },
    #[error("max_comments must not be negative (got {value})")]
    NegativeMaxComments { value: i64 },
    #[error("min_agreement must be an integer (got `{value}`)")]
    InvalidMinAgreement { value: String },
}
