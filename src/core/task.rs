//! Task model shared by every backlog backend.

use serde::{Deserialize, Serialize};

/// Which backlog backend a task came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Markdown,
    Yaml,
    Github,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Markdown => "markdown",
            SourceKind::Yaml => "yaml",
            SourceKind::Github => "github",
        }
    }
}

/// A single backlog entry.
///
/// Identity is the trimmed title: completion requests match by exact
/// trimmed-string equality, there is no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub source: SourceKind,
    pub text: String,
    /// 1-indexed line of the entry in its source file (file-backed sources).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number: Option<u64>,
    /// Parallel group tag. Markdown tasks have none and all share the
    /// `"default"` group; issue-tracker tasks are ungroupable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<u64>,
    pub completed: bool,
}

impl Task {
    /// The string used for completion matching and group partitioning.
    pub fn title(&self) -> &str {
        self.text.trim()
    }
}

/// Result of marking a task complete in its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompleteOutcome {
    Updated,
    AlreadyComplete,
    NotFound,
}

impl CompleteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompleteOutcome::Updated => "updated",
            CompleteOutcome::AlreadyComplete => "already-complete",
            CompleteOutcome::NotFound => "not-found",
        }
    }
}

/// Branch-name slug: lowercase ASCII alphanumerics separated by `-`, trimmed
/// of leading/trailing `-`, clamped to 48 chars, `"task"` when empty.
pub fn slug(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('-') {
            out.push('-');
        }
    }
    let mut out: String = out.trim_matches('-').chars().take(48).collect();
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() { "task".to_string() } else { out }
}

/// Disambiguate `name` against `taken` by appending `-2`, `-3`, ….
pub fn unique_name(name: &str, taken: &[String]) -> String {
    if !taken.iter().any(|t| t == name) {
        return name.to_string();
    }
    let mut n = 2usize;
    loop {
        let candidate = format!("{name}-{n}");
        if !taken.iter().any(|t| *t == candidate) {
            return candidate;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_lowercases_and_dashes() {
        assert_eq!(slug("Add user auth!"), "add-user-auth");
        assert_eq!(slug("  Fix:  the/bug  "), "fix-the-bug");
    }

    #[test]
    fn slug_defaults_to_task_when_empty() {
        assert_eq!(slug("!!!"), "task");
        assert_eq!(slug(""), "task");
    }

    #[test]
    fn slug_clamps_to_48_chars_without_trailing_dash() {
        let long = "a".repeat(40) + " tail that goes on and on";
        let s = slug(&long);
        assert!(s.len() <= 48);
        assert!(!s.ends_with('-'));
    }

    #[test]
    fn unique_name_appends_counter() {
        let taken = vec!["ralphy/fix".to_string(), "ralphy/fix-2".to_string()];
        assert_eq!(unique_name("ralphy/fix", &taken), "ralphy/fix-3");
        assert_eq!(unique_name("ralphy/new", &taken), "ralphy/new");
    }
}
