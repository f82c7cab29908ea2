//! Supported agent engines and their fixed invocation templates.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// A CLI coding agent the driver can delegate to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Claude,
    Opencode,
    Cursor,
    Qwen,
    Droid,
    Codex,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Claude => "claude",
            Engine::Opencode => "opencode",
            Engine::Cursor => "cursor",
            Engine::Qwen => "qwen",
            Engine::Droid => "droid",
            Engine::Codex => "codex",
        }
    }

    /// Parse an engine name as it appears in requests (`"agent"` is accepted
    /// as an alias for cursor, matching its binary name).
    pub fn from_name(name: &str) -> Option<Engine> {
        match name {
            "claude" => Some(Engine::Claude),
            "opencode" => Some(Engine::Opencode),
            "cursor" | "agent" => Some(Engine::Cursor),
            "qwen" => Some(Engine::Qwen),
            "droid" => Some(Engine::Droid),
            "codex" => Some(Engine::Codex),
            _ => None,
        }
    }

    /// The binary to spawn.
    pub fn binary(&self) -> &'static str {
        match self {
            Engine::Cursor => "agent",
            other => other.as_str(),
        }
    }

    /// Build the fixed argument vector for one invocation.
    ///
    /// `last_message` is only meaningful for codex, which writes its final
    /// answer to that file instead of a result event.
    pub fn args(&self, prompt: &str, last_message: Option<&Path>) -> Vec<String> {
        let mut args: Vec<String> = match self {
            Engine::Claude => vec![
                "--dangerously-skip-permissions".into(),
                "--verbose".into(),
                "--output-format".into(),
                "stream-json".into(),
                "-p".into(),
            ],
            Engine::Opencode => vec!["run".into(), "--format".into(), "json".into()],
            Engine::Cursor => vec![
                "--print".into(),
                "--force".into(),
                "--output-format".into(),
                "stream-json".into(),
            ],
            Engine::Qwen => vec![
                "--output-format".into(),
                "stream-json".into(),
                "--approval-mode".into(),
                "yolo".into(),
                "-p".into(),
            ],
            Engine::Droid => vec![
                "exec".into(),
                "--output-format".into(),
                "stream-json".into(),
                "--auto".into(),
                "medium".into(),
            ],
            Engine::Codex => {
                let mut args: Vec<String> =
                    vec!["exec".into(), "--full-auto".into(), "--json".into()];
                if let Some(path) = last_message {
                    args.push("--output-last-message".into());
                    args.push(path.display().to_string());
                }
                args
            }
        };
        args.push(prompt.to_string());
        args
    }

    /// Engine-specific environment, merged over the inherited environment and
    /// under any caller overrides.
    pub fn env(&self) -> Vec<(String, String)> {
        match self {
            Engine::Opencode => vec![(
                "OPENCODE_PERMISSION".to_string(),
                "{\"*\":\"allow\"}".to_string(),
            )],
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn claude_args_end_with_prompt() {
        let args = Engine::Claude.args("do it", None);
        assert_eq!(
            args,
            vec![
                "--dangerously-skip-permissions",
                "--verbose",
                "--output-format",
                "stream-json",
                "-p",
                "do it"
            ]
        );
    }

    #[test]
    fn codex_args_include_last_message_path_when_given() {
        let path = PathBuf::from("/tmp/scratch/last-message.txt");
        let args = Engine::Codex.args("fix", Some(&path));
        assert_eq!(
            args,
            vec![
                "exec",
                "--full-auto",
                "--json",
                "--output-last-message",
                "/tmp/scratch/last-message.txt",
                "fix"
            ]
        );
        assert_eq!(Engine::Codex.args("fix", None).len(), 4);
    }

    #[test]
    fn cursor_binary_is_agent() {
        assert_eq!(Engine::Cursor.binary(), "agent");
        assert_eq!(Engine::from_name("agent"), Some(Engine::Cursor));
    }

    #[test]
    fn opencode_sets_permission_env() {
        let env = Engine::Opencode.env();
        assert_eq!(env[0].0, "OPENCODE_PERMISSION");
        assert!(Engine::Claude.env().is_empty());
    }
}
