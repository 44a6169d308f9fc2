use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::coerce;

const REVIEW_FOCUS: &[&str] = &[
    "## Code Quality & Best Practices",
    "- Clean code principles and readability",
    "- Proper error handling and edge cases",
    "- TypeScript/JavaScript best practices",
    "- Consistent naming conventions",
    "",
    "## Bug Detection",
    "- Logic errors and edge cases",
    "- Unhandled error scenarios",
    "- Race conditions and concurrency issues",
    "- Input validation and sanitization",
    "",
    "## Performance",
    "- Inefficient algorithms or operations",
    "- Memory leaks and unnecessary allocations",
    "- Large file handling",
    "",
    "## Security",
    "- SQL injection, XSS, CSRF vulnerabilities",
    "- Authentication/authorization issues",
    "- Sensitive data exposure",
    "",
    "## Testing",
    "- Test coverage gaps",
    "- Missing edge case handling",
];

const OUTPUT_INSTRUCTIONS: &[&str] = &[
    "",
    "## AI-Generated Code Likelihood",
    "- Estimate the likelihood (0-100%) that the changed code was AI-generated. Give a brief rationale.",
    "",
    "## Output Format",
    "- Provide specific file and line numbers when possible",
    "- Include code suggestions in fenced code blocks using the GitHub suggestion format when appropriate:",
    "  ```suggestion",
    "  // code change",
    "  ```",
    "- Return a structured JSON block at the end, on its own line, containing findings. Use this shape exactly:",
    "  ```json",
    "  {",
    "    \"findings\": [",
    "      {",
    "        \"file\": \"path/to/file.ext\",",
    "        \"line\": 123,",
    "        \"severity\": \"critical|major|minor\",",
    "        \"title\": \"short title\",",
    "        \"message\": \"concise description\",",
    "        \"suggestion\": \"optional code snippet or empty string\"",
    "      }",
    "    ]",
    "  }",
    "  ```",
    "- Summarize key findings and risks at the end",
    "",
    "IMPORTANT: Only flag actual issues. If everything looks good, respond with 'lgtm'.",
];

/// One entry of the pull request's file list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, deserialize_with = "coerce::deserialize_count")]
    pub additions: i64,
    #[serde(default, deserialize_with = "coerce::deserialize_count")]
    pub deletions: i64,
}

/// Load the pull request file list. A missing or malformed file yields no
/// entries, and entries that are not objects are skipped.
pub fn load_changed_files(path: &Path) -> Vec<ChangedFile> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            debug!(path = %path.display(), error = %err, "changed files list unavailable");
            return Vec::new();
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(items)) => items
            .into_iter()
            .filter(Value::is_object)
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => {
            debug!(path = %path.display(), "changed files list is not a JSON array");
            Vec::new()
        }
    }
}

/// Everything the review prompt is assembled from.
#[derive(Debug, Clone, Default)]
pub struct PromptInputs {
    pub repo: String,
    pub pr_number: String,
    pub pr_title: String,
    pub pr_body: String,
    pub agents_section: String,
    pub pr_files_path: Option<PathBuf>,
    pub diff_path: Option<PathBuf>,
    pub test_hint: String,
    pub missing_tests_path: Option<PathBuf>,
}

/// Assemble the prompt sent to every review provider.
pub fn build_prompt(inputs: &PromptInputs) -> String {
    let mut lines = vec![
        format!("REPO: {}", inputs.repo),
        format!("PR NUMBER: {}", inputs.pr_number),
        format!("PR TITLE: {}", inputs.pr_title),
        "PR DESCRIPTION:".to_string(),
        inputs.pr_body.clone(),
        String::new(),
        "Please review this pull request and provide a comprehensive code review focusing on:"
            .to_string(),
        String::new(),
    ];
    lines.extend(REVIEW_FOCUS.iter().map(|l| l.to_string()));
    if !inputs.agents_section.is_empty() {
        lines.push(inputs.agents_section.clone());
    }
    lines.extend(OUTPUT_INSTRUCTIONS.iter().map(|l| l.to_string()));

    if let Some(path) = &inputs.pr_files_path {
        append_changed_files(&mut lines, path);
    }
    if let Some(path) = &inputs.diff_path {
        append_diff(&mut lines, path);
    }
    append_test_hint(&mut lines, &inputs.test_hint);
    if let Some(path) = &inputs.missing_tests_path {
        append_missing_tests(&mut lines, path);
    }
    lines.join("\n")
}

pub fn append_changed_files(lines: &mut Vec<String>, pr_files_path: &Path) {
    let files = load_changed_files(pr_files_path);
    if files.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push("## Changed Files".to_string());
    for file in files {
        let name = file
            .filename
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or("unknown");
        lines.push(format!("- {name} (+{}/-{})", file.additions, file.deletions));
    }
}

pub fn append_diff(lines: &mut Vec<String>, diff_path: &Path) {
    if !diff_path.is_file() {
        return;
    }
    match fs::read_to_string(diff_path) {
        Ok(diff) => {
            lines.push(String::new());
            lines.push("## Diff".to_string());
            lines.push(diff);
        }
        Err(err) => debug!(path = %diff_path.display(), error = %err, "diff unreadable"),
    }
}

pub fn append_test_hint(lines: &mut Vec<String>, test_hint: &str) {
    if !test_hint.is_empty() {
        lines.push(test_hint.to_string());
    }
}

pub fn append_missing_tests(lines: &mut Vec<String>, missing_tests_path: &Path) {
    let entries: Vec<String> = fs::read_to_string(missing_tests_path)
        .map(|raw| {
            raw.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if entries.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.push("## Possible missing tests".to_string());
    lines.extend(entries.into_iter().map(|e| format!("- {e}")));
}
