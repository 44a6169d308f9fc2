use std::fmt::Write;

use crate::consensus::Reconciliation;

/// Format styles supported by [`render_comments`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Human,
    Json,
}

/// Produce a report string from a `Reconciliation` using the desired format.
///
/// The JSON form is exactly the inline comment payload expected by the
/// posting step.
pub fn render_comments(result: &Reconciliation, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Human => render_human(result),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(&result.inline_comments())?),
    }
}

fn render_human(result: &Reconciliation) -> anyhow::Result<String> {
    let mut out = String::new();
    if result.comments.is_empty() {
        writeln!(out, "No inline comments reached consensus.")?;
    } else {
        writeln!(out, "Inline comments ({}):", result.comments.len())?;
        for entry in &result.comments {
            writeln!(
                out,
                "  - {path}:{line} [{severity}] {title} (providers: {providers})",
                path = entry.comment.path,
                line = entry.comment.line,
                severity = entry.severity,
                title = headline(&entry.comment.body),
                providers = entry.providers.join(", "),
            )?;
        }
    }

    writeln!(out)?;
    writeln!(out, "Dropped records: {}", result.dropped.len())?;
    for dropped in &result.dropped {
        writeln!(
            out,
            "  - {origin:?} #{position}: {reason}",
            origin = dropped.origin,
            position = dropped.position,
            reason = dropped.reason
        )?;
    }
    writeln!(
        out,
        "Below agreement: {} • Cut by cap: {}",
        result.insufficient_agreement.len(),
        result.truncated
    )?;
    Ok(out)
}

/// First body line without the severity prefix.
fn headline(body: &str) -> &str {
    let first = body.lines().next().unwrap_or_default();
    first
        .split_once("**: ")
        .map(|(_, rest)| rest)
        .unwrap_or(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{
        reconciler::ConsensusReconciler, ConsensusConfig, RawFinding, Severity,
    };

    fn sample_result() -> Reconciliation {
        let findings = vec![
            RawFinding::new("src/cache.rs", 12)
                .with_title("Stale entry returned")
                .with_severity("major")
                .with_provider("p1"),
            RawFinding::new("src/cache.rs", 12)
                .with_title("Stale entry returned")
                .with_severity("critical")
                .with_provider("p2"),
            RawFinding::new("", 3).with_title("no file"),
        ];
        ConsensusReconciler::new(ConsensusConfig::new(5, Severity::Minor, 1)).reconcile(&findings, "")
    }

    #[test]
    fn human_report_lists_comments_and_drops() {
        let output = render_comments(&sample_result(), OutputFormat::Human).unwrap();
        assert!(output.contains("src/cache.rs:12 [critical] Stale entry returned"));
        assert!(output.contains("providers: p1, p2"));
        assert!(output.contains("Dropped records: 1"));
        assert!(output.contains("finding has no file path"));
    }

    #[test]
    fn json_report_is_posting_payload() {
        let output = render_comments(&sample_result(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["side"], serde_json::json!("RIGHT"));
        assert_eq!(value[0]["line"], serde_json::json!(12));
    }

    #[test]
    fn empty_result_renders_placeholder_line() {
        let output = render_comments(&Reconciliation::default(), OutputFormat::Human).unwrap();
        assert!(output.starts_with("No inline comments reached consensus."));
        let json = render_comments(&Reconciliation::default(), OutputFormat::Json).unwrap();
        assert_eq!(json, "[]");
    }
}
