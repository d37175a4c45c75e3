//! Import run configuration.
//!
//! Loaded from YAML or built in code. The window (`to_skip`, `max_entries`) must stay
//! the same for all passes of one run, so the orchestrator takes its own copy.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::entity::ResourceKind;

/// What the commit pass does with each converted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportAction {
    #[default]
    Create,
    Update,
    Delete,
    /// Convert and validate, never persist.
    Skip,
}

/// How per-row errors escalate to the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop after the checking pass, whatever its outcome.
    DryRun,
    /// Stop after the checking pass if any row has an error.
    #[default]
    StopOnError,
    /// Commit every valid row, skipping rows with errors.
    ContinueOnError,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::DryRun => "dry_run",
            FailurePolicy::StopOnError => "stop_on_error",
            FailurePolicy::ContinueOnError => "continue_on_error",
        }
    }
}

fn default_identifier_names() -> Vec<String> {
    vec!["o:id".to_string(), "dcterms:identifier".to_string()]
}

fn default_batch_size() -> usize {
    20
}

fn default_progress_every() -> usize {
    100
}

/// Configuration of one import run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportConfig {
    #[serde(default)]
    pub action: ImportAction,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Rows skipped at the start of the source.
    #[serde(default)]
    pub to_skip: usize,

    /// Rows processed after the skipped ones; 0 means no limit.
    #[serde(default)]
    pub max_entries: usize,

    /// Fields whose values identify the resource itself.
    #[serde(default = "default_identifier_names")]
    pub identifier_names: Vec<String>,

    /// Namespace of the imported resources.
    #[serde(default)]
    pub resource_kind: ResourceKind,

    #[serde(default)]
    pub allow_duplicate_identifiers: bool,

    /// Fields every converted row must carry.
    #[serde(default)]
    pub required_fields: Vec<String>,

    /// Check that files named in `file_fields` exist.
    #[serde(default)]
    pub check_files: bool,

    /// With `check_files`, a missing file skips the row instead of failing it.
    #[serde(default)]
    pub skip_missing_files: bool,

    #[serde(default)]
    pub file_fields: Vec<String>,

    /// Base directory for relative file paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files_base_dir: Option<PathBuf>,

    /// Rows committed between two flushes of the persistence layer.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Rows between two progress log lines.
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            action: ImportAction::default(),
            failure_policy: FailurePolicy::default(),
            to_skip: 0,
            max_entries: 0,
            identifier_names: default_identifier_names(),
            resource_kind: ResourceKind::default(),
            allow_duplicate_identifiers: false,
            required_fields: Vec::new(),
            check_files: false,
            skip_missing_files: false,
            file_fields: Vec::new(),
            files_base_dir: None,
            batch_size: default_batch_size(),
            progress_every: default_progress_every(),
        }
    }
}

impl ImportConfig {
    /// Load an import configuration from a YAML file.
    ///
    /// # Example
    /// ```ignore
    /// use bulkmap::import::ImportConfig;
    ///
    /// let config = ImportConfig::load_from_file("import.yaml")?;
    /// println!("Policy: {}", config.failure_policy.as_str());
    /// ```
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read import config {}: {}", path.display(), e))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, String> {
        let config: ImportConfig =
            serde_yaml::from_str(contents).map_err(|e| format!("Failed to parse YAML: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.identifier_names.iter().any(|name| name.trim().is_empty()) {
            return Err("identifier_names must not contain empty names".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.progress_every == 0 {
            return Err("progress_every must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn with_window(mut self, to_skip: usize, max_entries: usize) -> Self {
        self.to_skip = to_skip;
        self.max_entries = max_entries;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn with_action(mut self, action: ImportAction) -> Self {
        self.action = action;
        self
    }

    pub fn is_identifier_field(&self, field: &str) -> bool {
        self.identifier_names.iter().any(|name| name == field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = ImportConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, ImportConfig::default());
        assert_eq!(config.identifier_names, vec!["o:id", "dcterms:identifier"]);
        assert_eq!(config.batch_size, 20);
    }

    #[test]
    fn test_load_from_yaml() {
        let config = ImportConfig::from_yaml_str(
            "action: update\nfailure_policy: continue_on_error\nto_skip: 2\nmax_entries: 3\nresource_kind: assets\n",
        )
        .unwrap();

        assert_eq!(config.action, ImportAction::Update);
        assert_eq!(config.failure_policy, FailurePolicy::ContinueOnError);
        assert_eq!((config.to_skip, config.max_entries), (2, 3));
        assert_eq!(config.resource_kind, ResourceKind::Assets);

        let config = ImportConfig::from_yaml_str("required_fields:\n  - dcterms:title\n").unwrap();
        assert_eq!(config.required_fields, vec!["dcterms:title"]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(ImportConfig::from_yaml_str("batch_size: 0\n").is_err());
        assert!(ImportConfig::from_yaml_str("failure_policy: sometimes\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("import.yaml");
        std::fs::write(&path, "failure_policy: dry_run\n").unwrap();

        let config = ImportConfig::load_from_file(&path).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::DryRun);
        assert!(ImportConfig::load_from_file(dir.path().join("missing.yaml")).is_err());
    }
}
