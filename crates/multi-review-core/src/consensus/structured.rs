use serde_json::Value;
use tracing::debug;

use super::{DropReason, RawFinding, SYNTHESIS_PROVIDER};

/// Pull the `findings` array out of a synthesis block.
///
/// Empty text, invalid JSON, a non-object document, and a missing or non-array
/// `findings` member all yield an empty list.
pub fn parse_block(block: &str) -> Vec<Value> {
    if block.trim().is_empty() {
        return Vec::new();
    }
    let document = match serde_json::from_str::<Value>(block) {
        Ok(document) => document,
        Err(err) => {
            debug!(error = %err, "structured block is not valid JSON");
            return Vec::new();
        }
    };
    let Value::Object(mut map) = document else {
        debug!("structured block is not a JSON object");
        return Vec::new();
    };
    match map.remove("findings") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(_) => {
            debug!("structured block `findings` is not an array");
            Vec::new()
        }
    }
}

/// Decode the synthesis block into records attributed to [`SYNTHESIS_PROVIDER`]
/// unless they name their own provider. Entries that are not objects come back
/// as drop reasons so callers can keep their positions.
pub fn structured_findings(block: &str) -> Vec<Result<RawFinding, DropReason>> {
    parse_block(block)
        .into_iter()
        .map(|value| {
            RawFinding::from_value(value).map(|raw| raw.with_default_provider(SYNTHESIS_PROVIDER))
        })
        .collect()
}
