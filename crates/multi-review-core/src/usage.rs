use std::{collections::HashMap, fs, path::Path, str::FromStr};

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::coerce;

const OPENROUTER_PREFIX: &str = "openrouter/";

/// Token counts reported by one provider run. Missing counts read as 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenUsage {
    #[serde(default, deserialize_with = "coerce::deserialize_count")]
    pub prompt_tokens: i64,
    #[serde(default, deserialize_with = "coerce::deserialize_count")]
    pub completion_tokens: i64,
    #[serde(default, deserialize_with = "coerce::deserialize_count")]
    pub total_tokens: i64,
}

impl TokenUsage {
    /// Reported total, or prompt + completion when the provider left it out.
    pub fn effective_total(&self) -> i64 {
        if self.total_tokens != 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        }
    }
}

/// One line of the provider report log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderReport {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// Read provider reports from a JSON Lines file.
pub fn load_reports(path: &Path) -> Result<Vec<ProviderReport>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read provider reports at {}", path.display()))?;
    let mut reports = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let report = serde_json::from_str(trimmed).with_context(|| {
            format!("invalid provider report at {}:{}", path.display(), idx + 1)
        })?;
        reports.push(report);
    }
    Ok(reports)
}

/// Per-token prices for one model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelRate {
    pub prompt: Decimal,
    pub completion: Decimal,
}

/// Model price list keyed by model id.
#[derive(Debug, Clone, Default)]
pub struct Pricing {
    rates: HashMap<String, ModelRate>,
}

#[derive(Deserialize)]
struct PricingDocument {
    #[serde(default)]
    data: Vec<Value>,
}

/// Exact decimal price from a string or number; anything else is free.
fn price(value: Option<&Value>) -> Decimal {
    let text = match value {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(text)) => text.trim().to_string(),
        _ => return Decimal::ZERO,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .unwrap_or_else(|_| {
            debug!(price = %text, "unparseable price treated as zero");
            Decimal::ZERO
        })
}

impl Pricing {
    /// Parse a `{"data": [{"id": ..., "pricing": {"prompt": ..., "completion": ...}}]}` document.
    pub fn from_json(raw: &str) -> Result<Self> {
        let document: PricingDocument =
            serde_json::from_str(raw).context("invalid pricing document")?;
        let mut rates = HashMap::new();
        for model in document.data {
            let Some(id) = model.get("id").and_then(Value::as_str) else {
                debug!("skipping pricing entry without id");
                continue;
            };
            let pricing = model.get("pricing");
            rates.insert(
                id.to_string(),
                ModelRate {
                    prompt: price(pricing.and_then(|p| p.get("prompt"))),
                    completion: price(pricing.and_then(|p| p.get("completion"))),
                },
            );
        }
        Ok(Self { rates })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read pricing at {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("in {}", path.display()))
    }

    pub fn rate(&self, model_id: &str) -> Option<&ModelRate> {
        self.rates.get(model_id)
    }
}

/// Summed usage and estimated cost across provider runs.
///
/// `cost` is exact decimal arithmetic over the listed prices and serializes
/// as a string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub cost: Decimal,
}

impl UsageTotals {
    pub fn from_reports(reports: &[ProviderReport], pricing: &Pricing) -> Self {
        let mut totals = Self::default();
        for report in reports {
            totals.accumulate(report, pricing);
        }
        totals
    }

    /// Add one report. Only `openrouter/<model>` runs with a known rate accrue cost.
    pub fn accumulate(&mut self, report: &ProviderReport, pricing: &Pricing) {
        let usage = report.usage.clone().unwrap_or_default();
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.effective_total();
        if let Some(model_id) = report.name.strip_prefix(OPENROUTER_PREFIX) {
            if let Some(rate) = pricing.rate(model_id) {
                self.cost += rate.prompt * Decimal::from(usage.prompt_tokens)
                    + rate.completion * Decimal::from(usage.completion_tokens);
            }
        }
    }
}

/// Whether an estimated spend exceeds the budget.
pub fn over_budget(estimate: Decimal, budget: Decimal) -> bool {
    estimate > budget
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRICING: &str = r#"{"data": [
        {"id": "mistralai/devstral-2512", "pricing": {"prompt": "0.00002", "completion": "0.00008"}},
        {"id": "free/model", "pricing": {"prompt": 0, "completion": 0}},
        {"pricing": {"prompt": "1"}}
    ]}"#;

    fn dec(text: &str) -> Decimal {
        Decimal::from_str(text).unwrap()
    }

    fn report(name: &str, prompt: i64, completion: i64) -> ProviderReport {
        ProviderReport {
            name: name.to_string(),
            usage: Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: 0,
            }),
        }
    }

    #[test]
    fn totals_tokens_and_cost() {
        let pricing = Pricing::from_json(PRICING).unwrap();
        let reports = vec![
            report("openrouter/mistralai/devstral-2512", 10_000, 1_000),
            report("opencode/big-pickle", 5_000, 500),
            ProviderReport {
                name: "openrouter/unknown".into(),
                usage: None,
            },
        ];
        let totals = UsageTotals::from_reports(&reports, &pricing);
        assert_eq!(totals.prompt_tokens, 15_000);
        assert_eq!(totals.completion_tokens, 1_500);
        assert_eq!(totals.total_tokens, 16_500);
        assert_eq!(totals.cost, dec("0.28"));
    }

    #[test]
    fn reported_total_wins_over_sum() {
        let usage: TokenUsage =
            serde_json::from_str(r#"{"prompt_tokens": "10", "completion_tokens": 5, "total_tokens": 20}"#)
                .unwrap();
        assert_eq!(usage.effective_total(), 20);
    }

    #[test]
    fn loads_report_lines() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("reports.jsonl");
        fs::write(
            &path,
            "{\"name\": \"opencode/a\", \"usage\": {\"prompt_tokens\": 3}}\n\n{\"name\": \"opencode/b\"}\n",
        )
        .unwrap();
        let reports = load_reports(&path).unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[1].usage.is_none());
    }

    #[test]
    fn budget_guard_compares_strictly() {
        assert!(over_budget(dec("0.42"), dec("0.10")));
        assert!(!over_budget(dec("0.42"), dec("0.50")));
        assert!(!over_budget(dec("0.42"), dec("0.42")));
    }

    #[test]
    fn cost_equal_to_budget_is_within_it() {
        let pricing = Pricing::from_json(
            r#"{"data": [{"id": "acme/coder", "pricing": {"prompt": "0.1", "completion": 0.2}}]}"#,
        )
        .unwrap();
        let totals = UsageTotals::from_reports(&[report("openrouter/acme/coder", 1, 1)], &pricing);
        assert_eq!(totals.cost, dec("0.3"));
        assert!(!over_budget(totals.cost, dec("0.3")));
    }

    #[test]
    fn numeric_prices_in_exponent_form_are_exact() {
        assert_eq!(price(Some(&serde_json::json!(0.00002))), dec("0.00002"));
        assert_eq!(price(Some(&serde_json::json!("n/a"))), Decimal::ZERO);
    }
}
