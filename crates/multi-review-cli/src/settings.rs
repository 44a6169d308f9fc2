use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use multi_review_core::{ConsensusConfig, ReviewConfig};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Inline thresholds as raw text; validation happens in [`ConsensusConfig::from_raw`].
#[derive(Debug, Deserialize)]
struct InlineSettings {
    max_comments: String,
    min_severity: String,
    min_agreement: String,
}

/// Values given on the command line; they take precedence over every other layer.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub max_comments: Option<String>,
    pub min_severity: Option<String>,
    pub min_agreement: Option<String>,
}

/// Resolve reconciliation thresholds from built-in defaults, the review config
/// file, `INLINE_*` environment variables and command-line flags, in that order.
pub fn resolve(config_file: Option<&Path>, overrides: &Overrides) -> Result<ConsensusConfig> {
    let mut builder = Config::builder()
        .set_default("max_comments", "5")?
        .set_default("min_severity", "major")?
        .set_default("min_agreement", "1")?;

    if let Some(path) = config_file {
        let review = ReviewConfig::load(path)?;
        let layer = file_layer(&review);
        debug!(path = %path.display(), keys = layer.len(), "review config thresholds loaded");
        builder = builder.add_source(File::from_str(
            &Value::Object(layer).to_string(),
            FileFormat::Json,
        ));
    }

    builder = builder.add_source(Environment::with_prefix("INLINE"));

    for (key, value) in [
        ("max_comments", &overrides.max_comments),
        ("min_severity", &overrides.min_severity),
        ("min_agreement", &overrides.min_agreement),
    ] {
        if let Some(value) = value {
            builder = builder.set_override(key, value.as_str())?;
        }
    }

    let settings: InlineSettings = builder
        .build()
        .and_then(Config::try_deserialize)
        .context("failed to resolve inline comment settings")?;
    debug!(?settings, "inline settings resolved");

    ConsensusConfig::from_raw(
        &settings.max_comments,
        &settings.min_severity,
        &settings.min_agreement,
    )
    .context("invalid inline comment settings")
}

fn file_layer(review: &ReviewConfig) -> Map<String, Value> {
    let mut layer = Map::new();
    if let Some(value) = review.inline_max_comments {
        layer.insert("max_comments".into(), Value::String(value.to_string()));
    }
    if let Some(value) = &review.inline_min_severity {
        layer.insert("min_severity".into(), Value::String(value.clone()));
    }
    if let Some(value) = review.inline_min_agreement {
        layer.insert("min_agreement".into(), Value::String(value.to_string()));
    }
    layer
}
