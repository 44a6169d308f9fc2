mod settings;

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use multi_review_core::{
    build_prompt, filter_providers, load_changed_files, merge_with_defaults, over_budget,
    providers::split_names, render_comments, usage, ConsensusReconciler, FileFindingSource,
    FindingSource, OutputFormat, Pricing, PromptInputs, ReviewConfig, UsageTotals,
};
use rust_decimal::Decimal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "multi-review",
    author,
    version,
    about = "Prompt assembly and finding consensus for multi-provider code review"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge provider findings into deduplicated inline review comments
    Reconcile(ReconcileArgs),
    /// Normalize a YAML or JSON review config and print its exports as JSON
    LoadConfig {
        /// Config file to read
        path: PathBuf,
    },
    /// Overlay exported config values on positional defaults
    MergeConfig {
        /// Exports JSON produced by `load-config` (may be empty)
        config_json: String,
        /// One default per exported setting, in export order
        #[arg(allow_hyphen_values = true)]
        defaults: Vec<String>,
    },
    /// Build the review prompt sent to every provider
    Prompt(PromptArgs),
    /// Validate provider names and apply allow/block lists
    Providers {
        /// Provider names; comma-separated lists are accepted
        names: Vec<String>,
        /// Comma-separated allowlist (empty allows every valid name)
        #[arg(long, default_value = "")]
        allow: String,
        /// Comma-separated blocklist
        #[arg(long, default_value = "")]
        block: String,
    },
    /// Total token usage and estimated cost across provider runs
    Usage {
        /// Provider report log (JSON Lines)
        #[arg(long)]
        reports: PathBuf,
        /// Model pricing document
        #[arg(long)]
        pricing: Option<PathBuf>,
        /// Fail when the estimated cost exceeds this amount
        #[arg(long)]
        budget: Option<Decimal>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Human,
}

impl From<Format> for OutputFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Json => OutputFormat::Json,
            Format::Human => OutputFormat::Human,
        }
    }
}

#[derive(clap::Args, Debug)]
struct ReconcileArgs {
    /// Findings file (JSON array, `{"findings": [...]}` or JSON Lines).
    /// Prefix with `PROVIDER=` to attribute untagged records to PROVIDER.
    #[arg(long = "findings", value_name = "[PROVIDER=]PATH")]
    findings: Vec<String>,

    /// File holding the synthesis provider's structured findings block
    #[arg(long, value_name = "PATH")]
    structured: Option<PathBuf>,

    /// Pull request file list (JSON); its filenames limit comment scope
    #[arg(long, value_name = "PATH")]
    pr_files: Option<PathBuf>,

    /// Path in the change set (repeatable)
    #[arg(long = "changed-file", value_name = "PATH")]
    changed_files: Vec<String>,

    /// Review config file providing inline_* thresholds
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Maximum number of inline comments
    #[arg(long)]
    max_comments: Option<String>,

    /// Minimum severity: critical, major or minor
    #[arg(long)]
    min_severity: Option<String>,

    /// Minimum number of distinct providers reporting a finding
    #[arg(long)]
    min_agreement: Option<String>,

    #[arg(long, value_enum, default_value_t = Format::Json)]
    format: Format,
}

#[derive(clap::Args, Debug)]
struct PromptArgs {
    /// Where to write the prompt
    #[arg(long, value_name = "PATH")]
    out: PathBuf,
    #[arg(long, default_value = "")]
    repo: String,
    #[arg(long, default_value = "")]
    pr_number: String,
    #[arg(long, default_value = "")]
    pr_title: String,
    #[arg(long, default_value = "")]
    pr_body: String,
    /// Extra project guidance appended to the review checklist
    #[arg(long, default_value = "")]
    agents_section: String,
    #[arg(long, value_name = "PATH")]
    pr_files: Option<PathBuf>,
    #[arg(long, value_name = "PATH")]
    diff: Option<PathBuf>,
    #[arg(long, default_value = "")]
    test_hint: String,
    /// File listing source files that may lack tests, one per line
    #[arg(long, value_name = "PATH")]
    missing_tests: Option<PathBuf>,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Reconcile(args) => reconcile(&args)?,
        Commands::LoadConfig { path } => load_config(&path)?,
        Commands::MergeConfig {
            config_json,
            defaults,
        } => {
            let merged = merge_with_defaults(&config_json, &defaults)?;
            println!("{}", merged.join(" "));
        }
        Commands::Prompt(args) => prompt(args)?,
        Commands::Providers { names, allow, block } => {
            let raw: Vec<String> = names.iter().flat_map(|n| split_names(n)).collect();
            let selected = filter_providers(&raw, &split_names(&allow), &split_names(&block));
            println!("{}", selected.join(","));
        }
        Commands::Usage {
            reports,
            pricing,
            budget,
        } => report_usage(&reports, pricing.as_deref(), budget)?,
    }
    Ok(())
}

fn reconcile(args: &ReconcileArgs) -> Result<()> {
    let mut findings = Vec::new();
    for entry in &args.findings {
        let source = match entry.split_once('=') {
            Some((provider, path)) if !provider.trim().is_empty() => {
                FileFindingSource::new(path).with_default_provider(provider.trim())
            }
            _ => FileFindingSource::new(entry),
        };
        findings.extend(source.load_findings()?);
    }

    let struct_line = match &args.structured {
        Some(path) => fs::read_to_string(path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "structured block unavailable");
            String::new()
        }),
        None => String::new(),
    };

    let mut changed_files = args.changed_files.clone();
    if let Some(path) = &args.pr_files {
        changed_files.extend(
            load_changed_files(path)
                .into_iter()
                .filter_map(|file| file.filename),
        );
    }

    let config = settings::resolve(
        args.config.as_deref(),
        &settings::Overrides {
            max_comments: args.max_comments.clone(),
            min_severity: args.min_severity.clone(),
            min_agreement: args.min_agreement.clone(),
        },
    )?
    .with_changed_files(changed_files);
    info!(
        max_comments = config.max_comments,
        min_severity = %config.min_severity,
        min_agreement = config.min_agreement,
        changed_files = config.changed_files.len(),
        "reconciling {} provider findings",
        findings.len()
    );

    let result = ConsensusReconciler::new(config).reconcile(&findings, &struct_line);
    println!("{}", render_comments(&result, args.format.into())?);
    Ok(())
}

fn load_config(path: &Path) -> Result<()> {
    match ReviewConfig::load(path) {
        Ok(config) => println!("{}", config.exports_json()?),
        Err(err) => {
            warn!("{err}; emitting empty config");
            println!("{{}}");
        }
    }
    Ok(())
}

fn prompt(args: PromptArgs) -> Result<()> {
    let inputs = PromptInputs {
        repo: args.repo,
        pr_number: args.pr_number,
        pr_title: args.pr_title,
        pr_body: args.pr_body,
        agents_section: args.agents_section,
        pr_files_path: args.pr_files,
        diff_path: args.diff,
        test_hint: args.test_hint,
        missing_tests_path: args.missing_tests,
    };
    let prompt = build_prompt(&inputs);
    fs::write(&args.out, &prompt)
        .with_context(|| format!("failed to write prompt to {}", args.out.display()))?;
    info!(bytes = prompt.len(), "prompt written to {}", args.out.display());
    Ok(())
}

fn report_usage(reports: &Path, pricing: Option<&Path>, budget: Option<Decimal>) -> Result<()> {
    let reports = usage::load_reports(reports)?;
    let pricing = match pricing {
        Some(path) => Pricing::load(path)?,
        None => Pricing::default(),
    };
    let totals = UsageTotals::from_reports(&reports, &pricing);
    println!("{}", serde_json::to_string_pretty(&totals)?);
    if let Some(budget) = budget {
        if over_budget(totals.cost, budget) {
            bail!("estimated cost {} exceeds budget {}", totals.cost, budget);
        }
    }
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}
