use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, instrument};

use super::{
    structured, ConsensusComment, ConsensusConfig, DiffSide, DropReason, DroppedFinding, Finding,
    FindingKey, FindingOrigin, InlineComment, RawFinding, Reconciliation,
};

/// Merges findings from several reviewers into a bounded, deduplicated set of
/// inline comments.
#[derive(Debug, Clone, Default)]
pub struct ConsensusReconciler {
    config: ConsensusConfig,
}

/// Aggregation state for one finding key.
struct ConsensusEntry {
    providers: BTreeSet<String>,
    representative: Finding,
}

impl ConsensusEntry {
    fn new(finding: Finding) -> Self {
        let mut entry = Self {
            providers: BTreeSet::new(),
            representative: finding,
        };
        if let Some(provider) = entry.representative.provider.clone() {
            entry.providers.insert(provider);
        }
        entry
    }

    fn absorb(&mut self, finding: Finding) {
        if let Some(provider) = &finding.provider {
            self.providers.insert(provider.clone());
        }
        // strictly greater: the first finding at the highest severity stays
        if finding.severity > self.representative.severity {
            self.representative = finding;
        }
    }

    fn into_comment(self) -> ConsensusComment {
        let body = render_body(&self.representative);
        let Finding { key, severity, .. } = self.representative;
        ConsensusComment {
            comment: InlineComment {
                path: key.file.clone(),
                line: key.line,
                side: DiffSide::Right,
                body,
            },
            key,
            severity,
            providers: self.providers.into_iter().collect(),
        }
    }
}

impl ConsensusReconciler {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Reconcile per-provider findings with an optional synthesis block.
    ///
    /// Provider findings are processed first, then the structured block's
    /// findings, each in input order. Malformed records are dropped and
    /// reported in [`Reconciliation::dropped`]; this never fails.
    #[instrument(
        name = "reconcile_findings",
        skip_all,
        fields(provider_findings = provider_findings.len(), structured_len = struct_line.len())
    )]
    pub fn reconcile(&self, provider_findings: &[RawFinding], struct_line: &str) -> Reconciliation {
        let working = provider_findings
            .iter()
            .cloned()
            .map(Ok::<RawFinding, DropReason>)
            .enumerate()
            .map(|(position, raw)| (FindingOrigin::Provider, position, raw))
            .chain(
                structured::structured_findings(struct_line)
                    .into_iter()
                    .enumerate()
                    .map(|(position, raw)| (FindingOrigin::Structured, position, raw)),
            );

        let mut dropped = Vec::new();
        let mut entries: Vec<ConsensusEntry> = Vec::new();
        let mut slots: HashMap<FindingKey, usize> = HashMap::new();

        for (origin, position, raw) in working {
            let finding = match raw.and_then(|raw| raw.validate(&self.config)) {
                Ok(finding) => finding,
                Err(reason) => {
                    debug!(?origin, position, %reason, "dropping finding");
                    dropped.push(DroppedFinding {
                        origin,
                        position,
                        reason,
                    });
                    continue;
                }
            };
            match slots.get(&finding.key) {
                Some(&slot) => entries[slot].absorb(finding),
                None => {
                    slots.insert(finding.key.clone(), entries.len());
                    entries.push(ConsensusEntry::new(finding));
                }
            }
        }

        let mut insufficient_agreement = Vec::new();
        let mut comments = Vec::new();
        for entry in entries {
            if entry.providers.len() < self.config.min_agreement {
                debug!(
                    file = %entry.representative.key.file,
                    line = entry.representative.key.line,
                    providers = entry.providers.len(),
                    "insufficient agreement"
                );
                insufficient_agreement.push(entry.representative.key);
                continue;
            }
            comments.push(entry.into_comment());
        }

        let truncated = comments.len().saturating_sub(self.config.max_comments);
        comments.truncate(self.config.max_comments);

        info!(
            comments = comments.len(),
            dropped = dropped.len(),
            insufficient_agreement = insufficient_agreement.len(),
            truncated,
            "reconciliation completed"
        );

        Reconciliation {
            comments,
            dropped,
            insufficient_agreement,
            truncated,
        }
    }
}

/// Convenience wrapper returning only the posting payload.
pub fn build_inline_comments(
    provider_findings: &[RawFinding],
    struct_line: &str,
    config: &ConsensusConfig,
) -> Vec<InlineComment> {
    ConsensusReconciler::new(config.clone())
        .reconcile(provider_findings, struct_line)
        .inline_comments()
}

fn render_body(finding: &Finding) -> String {
    let headline = finding
        .title
        .as_deref()
        .or(finding.message.as_deref())
        .unwrap_or(&finding.key.message);
    let mut lines = vec![format!("**{}**: {}", finding.severity, headline)];
    if let Some(detail) = finding.message.as_deref() {
        if detail != finding.key.message {
            lines.push(detail.to_string());
        }
    }
    lines.push("```suggestion".to_string());
    lines.push(finding.suggestion.clone());
    lines.push("```".to_string());
    lines.join("\n")
}
