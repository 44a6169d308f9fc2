use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static PROVIDER_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(opencode|openrouter)/[A-Za-z0-9._-]+(/[A-Za-z0-9._-]+)*(:free)?$")
        .expect("provider name pattern is valid")
});

/// Whether `name` is a routable provider identifier such as
/// `openrouter/mistralai/devstral-2512:free`. Path traversal segments are rejected.
pub fn validate_provider_name(name: &str) -> bool {
    if !PROVIDER_NAME.is_match(name) {
        return false;
    }
    let model = name.trim_end_matches(":free");
    !model.split('/').any(|segment| segment == "." || segment == "..")
}

fn name_set<S: AsRef<str>>(names: &[S]) -> HashSet<&str> {
    names
        .iter()
        .map(|n| AsRef::<str>::as_ref(n).trim())
        .filter(|n| !n.is_empty())
        .collect()
}

/// Keep valid providers that pass the allowlist (when non-empty) and are not
/// blocklisted, de-duplicated in first-seen order.
pub fn filter_providers<R, A, B>(raw: &[R], allowlist: &[A], blocklist: &[B]) -> Vec<String>
where
    R: AsRef<str>,
    A: AsRef<str>,
    B: AsRef<str>,
{
    let allow = name_set(allowlist);
    let block = name_set(blocklist);
    let mut selected: Vec<String> = Vec::new();
    for name in raw.iter().map(AsRef::<str>::as_ref) {
        if !validate_provider_name(name) {
            debug!(provider = name, "rejecting invalid provider name");
            continue;
        }
        if !allow.is_empty() && !allow.contains(name) {
            debug!(provider = name, "provider not in allowlist");
            continue;
        }
        if block.contains(name) {
            debug!(provider = name, "provider blocklisted");
            continue;
        }
        if !selected.iter().any(|s| s == name) {
            selected.push(name.to_string());
        }
    }
    selected
}

/// Split a comma-separated provider list, dropping blank entries.
pub fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}
