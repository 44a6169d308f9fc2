use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::{debug, warn};

use super::RawFinding;

/// Abstraction over where harvested provider findings come from.
pub trait FindingSource {
    /// Every finding record available from this source, in source order.
    fn load_findings(&self) -> Result<Vec<RawFinding>>;
}

/// Reads finding records from a file.
///
/// Accepted layouts: a JSON array of records, a `{"findings": [...]}` document,
/// a single record object, or JSON Lines with one record per line.
pub struct FileFindingSource {
    path: PathBuf,
    default_provider: Option<String>,
    cache: OnceCell<Vec<RawFinding>>,
}

impl FileFindingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_provider: None,
            cache: OnceCell::new(),
        }
    }

    /// Attribute records that carry no provider to `provider`.
    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = Some(provider.into());
        self
    }

    fn read(&self) -> Result<Vec<RawFinding>> {
        let raw = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read findings file at {}", self.path.display()))?;
        let values = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(Value::Object(mut map)) if map.contains_key("findings") => {
                match map.remove("findings") {
                    Some(Value::Array(items)) => items,
                    _ => Vec::new(),
                }
            }
            Ok(other) => vec![other],
            Err(_) => self.parse_lines(&raw)?,
        };

        let mut findings = Vec::with_capacity(values.len());
        for (idx, value) in values.into_iter().enumerate() {
            match RawFinding::from_value(value) {
                Ok(raw) => findings.push(match &self.default_provider {
                    Some(provider) => raw.with_default_provider(provider),
                    None => raw,
                }),
                Err(reason) => warn!(
                    path = %self.path.display(),
                    record = idx + 1,
                    %reason,
                    "skipping finding record"
                ),
            }
        }
        debug!(path = %self.path.display(), count = findings.len(), "loaded findings");
        Ok(findings)
    }

    fn parse_lines(&self, raw: &str) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        for (idx, line) in raw.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let value = serde_json::from_str(trimmed).with_context(|| {
                format!("invalid JSON finding at {}:{}", self.path.display(), idx + 1)
            })?;
            values.push(value);
        }
        Ok(values)
    }
}

impl FindingSource for FileFindingSource {
    fn load_findings(&self) -> Result<Vec<RawFinding>> {
        let findings = self.cache.get_or_try_init(|| self.read())?;
        Ok(findings.clone())
    }
}
