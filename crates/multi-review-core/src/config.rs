use std::{fs, path::Path};

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::coerce;

/// Exported setting names, in the order [`merge_with_defaults`] expects defaults.
pub const MERGE_FIELDS: [&str; 12] = [
    "REVIEW_PROVIDERS",
    "SYNTHESIS_MODEL",
    "INLINE_MAX_COMMENTS",
    "INLINE_MIN_SEVERITY",
    "INLINE_MIN_AGREEMENT",
    "DIFF_MAX_BYTES",
    "RUN_TIMEOUT_SECONDS",
    "MIN_CHANGED_LINES",
    "MAX_CHANGED_FILES",
    "PROVIDER_ALLOWLIST",
    "PROVIDER_BLOCKLIST",
    "SKIP_LABELS",
];

/// Errors produced while loading or merging review configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} is neither valid YAML nor JSON")]
    Parse { path: String },
    #[error("config file {path} must contain a mapping at the top level")]
    NotAMapping { path: String },
    #[error("expected {expected} default values, got {actual}")]
    InsufficientDefaults { expected: usize, actual: usize },
}

/// Normalized review settings, serialized under their exported names.
///
/// Only keys present in the source file are emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ReviewConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_providers: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthesis_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_max_comments: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_min_severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_min_agreement: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_max_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_timeout_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_changed_lines: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_changed_files: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_allowlist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_blocklist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_labels: Option<String>,
}

impl ReviewConfig {
    /// Load a YAML or JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let document = serde_yaml::from_str::<Value>(&raw)
            .or_else(|_| serde_json::from_str::<Value>(&raw))
            .map_err(|_| ConfigError::Parse {
                path: path.display().to_string(),
            })?;
        match document {
            Value::Object(map) => {
                debug!(path = %path.display(), keys = map.len(), "loaded review config");
                Ok(Self::from_map(&map))
            }
            _ => Err(ConfigError::NotAMapping {
                path: path.display().to_string(),
            }),
        }
    }

    /// Normalize an already-parsed mapping. Values that cannot be cast are
    /// skipped with a warning.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let text = |key: &str| cast(map, key, "str", coerce::scalar_text);
        let int = |key: &str| cast(map, key, "int", coerce::integer);
        Self {
            review_providers: providers(map.get("providers")),
            synthesis_model: text("synthesis_model"),
            inline_max_comments: int("inline_max_comments"),
            inline_min_severity: text("inline_min_severity"),
            inline_min_agreement: int("inline_min_agreement"),
            diff_max_bytes: int("diff_max_bytes"),
            run_timeout_seconds: int("run_timeout_seconds"),
            min_changed_lines: int("min_changed_lines"),
            max_changed_files: int("max_changed_files"),
            provider_allowlist: name_list(map.get("provider_allowlist")),
            provider_blocklist: name_list(map.get("provider_blocklist")),
            skip_labels: name_list(map.get("skip_labels")),
        }
    }

    /// Exported key/value pairs as a compact JSON object, in field order.
    pub fn exports_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn cast<T>(
    map: &Map<String, Value>,
    key: &str,
    kind: &str,
    convert: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    let value = map.get(key).filter(|v| !v.is_null())?;
    let converted = convert(value);
    if converted.is_none() {
        warn!("failed to cast {key} value '{value}' to {kind}");
    }
    converted
}

fn providers(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Array(items) => Some(
            items
                .iter()
                .filter(|item| coerce::is_truthy(item))
                .filter_map(coerce::scalar_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        _ => None,
    }
}

fn name_list(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::Array(items) => Some(
            items
                .iter()
                .map(plain_text)
                .collect::<Vec<_>>()
                .join(","),
        ),
        Value::String(text) => Some(text.clone()),
        _ => None,
    }
}

/// Text form used when handing values to the shell: scalars as plain text,
/// null as empty, composite values as compact JSON.
fn plain_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => coerce::scalar_text(other).unwrap_or_else(|| other.to_string()),
    }
}

/// Overlay exported config values on positional defaults.
///
/// `defaults` holds one value per entry of [`MERGE_FIELDS`]. An empty or
/// unparseable `config_json` counts as no overrides.
pub fn merge_with_defaults(
    config_json: &str,
    defaults: &[String],
) -> Result<Vec<String>, ConfigError> {
    if defaults.len() < MERGE_FIELDS.len() {
        return Err(ConfigError::InsufficientDefaults {
            expected: MERGE_FIELDS.len(),
            actual: defaults.len(),
        });
    }
    let overrides = match serde_json::from_str::<Value>(config_json) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            if !config_json.trim().is_empty() {
                debug!("config overrides are not a JSON object; using defaults");
            }
            Map::new()
        }
    };
    Ok(MERGE_FIELDS
        .iter()
        .zip(defaults)
        .map(|(key, default)| match overrides.get(*key) {
            Some(value) => plain_text(value),
            None => default.clone(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_config(name: &str, contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join(name);
        fs::write(&path, contents).unwrap();
        (temp, path)
    }

    #[test]
    fn loads_yaml_config() {
        let (_temp, path) = write_config(
            "config.yml",
            r#"
providers:
  - openrouter/mistralai/devstral-2512:free
  - ""
  - opencode/big-pickle
synthesis_model: openrouter/google/gemini-2.0-flash-exp:free
inline_max_comments: "7"
inline_min_severity: major
inline_min_agreement: 2
run_timeout_seconds: not-a-number
skip_labels: [wip, draft]
provider_blocklist: ""
"#,
        );
        let config = ReviewConfig::load(&path).unwrap();
        assert_eq!(
            config.review_providers.as_deref(),
            Some("openrouter/mistralai/devstral-2512:free,opencode/big-pickle")
        );
        assert_eq!(config.inline_max_comments, Some(7));
        assert_eq!(config.inline_min_agreement, Some(2));
        assert_eq!(config.run_timeout_seconds, None);
        assert_eq!(config.skip_labels.as_deref(), Some("wip,draft"));
        assert_eq!(config.provider_blocklist.as_deref(), Some(""));
        assert!(config.provider_allowlist.is_none());
    }

    #[test]
    fn loads_json_config_and_exports_in_order() {
        let (_temp, path) = write_config(
            "config.json",
            r#"{"inline_min_severity": "critical", "providers": "opencode/a", "diff_max_bytes": 1024.0}"#,
        );
        let exports = ReviewConfig::load(&path).unwrap().exports_json().unwrap();
        assert_eq!(
            exports,
            r#"{"REVIEW_PROVIDERS":"opencode/a","INLINE_MIN_SEVERITY":"critical","DIFF_MAX_BYTES":1024}"#
        );
    }

    #[test]
    fn rejects_non_mapping_documents() {
        let (_temp, path) = write_config("config.yml", "- just\n- a list\n");
        assert!(matches!(
            ReviewConfig::load(&path),
            Err(ConfigError::NotAMapping { .. })
        ));
    }

    #[test]
    fn blank_provider_string_is_ignored() {
        let map = json!({"providers": "   ", "synthesis_model": null})
            .as_object()
            .cloned()
            .unwrap();
        let config = ReviewConfig::from_map(&map);
        assert_eq!(config, ReviewConfig::default());
    }

    #[test]
    fn merge_prefers_config_values() {
        let defaults: Vec<String> = MERGE_FIELDS.iter().map(|f| format!("d_{f}")).collect();
        let merged = merge_with_defaults(
            r#"{"INLINE_MAX_COMMENTS": 9, "SYNTHESIS_MODEL": null, "SKIP_LABELS": "wip"}"#,
            &defaults,
        )
        .unwrap();
        assert_eq!(merged[0], "d_REVIEW_PROVIDERS");
        assert_eq!(merged[1], "");
        assert_eq!(merged[2], "9");
        assert_eq!(merged[11], "wip");
    }

    #[test]
    fn merge_tolerates_bad_json() {
        let defaults: Vec<String> = MERGE_FIELDS.iter().map(|_| "x".to_string()).collect();
        let merged = merge_with_defaults("{nope", &defaults).unwrap();
        assert!(merged.iter().all(|v| v == "x"));
    }

    #[test]
    fn merge_requires_every_default() {
        let err = merge_with_defaults("{}", &["only".to_string()]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InsufficientDefaults { expected: 12, actual: 1 }
        ));
    }
}
