//! Project configuration stored under `.ralphy/config.yaml`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Project configuration (YAML).
///
/// This file is edited by humans; missing fields default to empty values so a
/// partial config stays valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RalphyConfig {
    pub project: ProjectConfig,
    pub commands: CommandsConfig,
    pub rules: Vec<String>,
    pub boundaries: BoundariesConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub language: String,
    pub framework: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub test: Option<String>,
    pub lint: Option<String>,
    pub build: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoundariesConfig {
    pub never_touch: Vec<String>,
}

pub fn ralphy_dir(root: &Path) -> PathBuf {
    root.join(".ralphy")
}

pub fn config_path(root: &Path) -> PathBuf {
    ralphy_dir(root).join("config.yaml")
}

/// Load the project config; a missing file yields the default.
pub fn load_config(root: &Path) -> Result<RalphyConfig> {
    let path = config_path(root);
    if !path.exists() {
        return Ok(RalphyConfig::default());
    }
    let contents = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Scaffold `.ralphy/config.yaml`.
///
/// Fails if the file already exists unless `force` is set.
pub fn init_config(root: &Path, force: bool) -> Result<PathBuf> {
    let path = config_path(root);
    if path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use force to overwrite)",
            path.display()
        ));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(&path, CONFIG_TEMPLATE).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Append a rule to the config, creating the file if needed.
pub fn add_rule(root: &Path, rule: &str) -> Result<()> {
    let rule = rule.trim();
    if rule.is_empty() {
        return Err(anyhow!("rule must not be empty"));
    }
    let mut config = load_config(root)?;
    config.rules.push(rule.to_string());
    write_config(root, &config)
}

/// Atomically write the config (temp file + rename).
pub fn write_config(root: &Path, config: &RalphyConfig) -> Result<()> {
    let path = config_path(root);
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let buf = serde_yaml::to_string(config).context("serialize config yaml")?;
    let tmp_path = path.with_extension("yaml.tmp");
    fs::write(&tmp_path, buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

const CONFIG_TEMPLATE: &str = "\
project:
  name: \"\"
  language: \"\"
  framework: \"\"
  description: \"\"
commands:
  test: null
  lint: null
  build: null
rules: []
boundaries:
  never_touch: []
";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = load_config(temp.path()).expect("load");
        assert_eq!(config, RalphyConfig::default());
    }

    #[test]
    fn init_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_config(temp.path(), false).expect("init");
        let config = load_config(temp.path()).expect("load");
        assert_eq!(config, RalphyConfig::default());
    }

    #[test]
    fn init_refuses_to_overwrite_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_config(temp.path(), false).expect("init");
        let err = init_config(temp.path(), false).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        init_config(temp.path(), true).expect("force init");
    }

    #[test]
    fn add_rule_appends_and_persists() {
        let temp = tempfile::tempdir().expect("tempdir");
        add_rule(temp.path(), "never commit secrets").expect("add");
        add_rule(temp.path(), "prefer small diffs").expect("add");
        let config = load_config(temp.path()).expect("load");
        assert_eq!(
            config.rules,
            vec!["never commit secrets", "prefer small diffs"]
        );
    }

    #[test]
    fn add_rule_rejects_empty_text() {
        let temp = tempfile::tempdir().expect("tempdir");
        assert!(add_rule(temp.path(), "   ").is_err());
    }

    #[test]
    fn parses_full_schema() {
        let temp = tempfile::tempdir().expect("tempdir");
        let dir = ralphy_dir(temp.path());
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(
            dir.join("config.yaml"),
            "project:\n  name: demo\n  language: rust\ncommands:\n  test: cargo test\nrules:\n  - keep it small\nboundaries:\n  never_touch:\n    - migrations/\n",
        )
        .expect("write");

        let config = load_config(temp.path()).expect("load");
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.commands.test.as_deref(), Some("cargo test"));
        assert_eq!(config.rules, vec!["keep it small"]);
        assert_eq!(config.boundaries.never_touch, vec!["migrations/"]);
    }
}
