mod coerce;
pub mod config;
pub mod consensus;
pub mod prompt;
pub mod providers;
pub mod report;
pub mod usage;

pub use config::{merge_with_defaults, ConfigError, ReviewConfig, MERGE_FIELDS};
pub use consensus::{
    file_source::{FileFindingSource, FindingSource},
    reconciler::{build_inline_comments, ConsensusReconciler},
    ConsensusComment, ConsensusConfig, ConsensusConfigError, DiffSide, DropReason, DroppedFinding,
    Finding, FindingKey, FindingOrigin, InlineComment, RawFinding, Reconciliation, Severity,
    SUGGESTION_PLACEHOLDER, SYNTHESIS_PROVIDER,
};
pub use prompt::{build_prompt, load_changed_files, ChangedFile, PromptInputs};
pub use providers::{filter_providers, validate_provider_name};
pub use report::{render_comments, OutputFormat};
pub use usage::{over_budget, Pricing, ProviderReport, UsageTotals};
