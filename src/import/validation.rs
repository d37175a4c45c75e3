//! Per-row validation messages and checks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::entity::TargetResource;
use crate::import::config::{ImportAction, ImportConfig};
use crate::import::identifiers::IdentifierResolver;

/// Severity of a validation message. Only `Error` blocks the commit of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Notice,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Notice => "notice",
            Severity::Info => "info",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub text: String,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "[{}] {}: {}", self.severity, field, self.text),
            None => write!(f, "[{}] {}", self.severity, self.text),
        }
    }
}

/// Messages collected while validating one row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageStore {
    messages: Vec<Message>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, severity: Severity, field: Option<&str>, text: impl Into<String>) {
        self.messages.push(Message {
            severity,
            field: field.map(String::from),
            text: text.into(),
        });
    }

    pub fn error(&mut self, field: Option<&str>, text: impl Into<String>) {
        self.add(Severity::Error, field, text);
    }

    pub fn warning(&mut self, field: Option<&str>, text: impl Into<String>) {
        self.add(Severity::Warning, field, text);
    }

    pub fn notice(&mut self, field: Option<&str>, text: impl Into<String>) {
        self.add(Severity::Notice, field, text);
    }

    pub fn info(&mut self, field: Option<&str>, text: impl Into<String>) {
        self.add(Severity::Info, field, text);
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.severity == severity)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn extend(&mut self, other: MessageStore) {
        self.messages.extend(other.messages);
    }
}

/// Result of validating one row.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub messages: MessageStore,
    /// A referenced file is missing and missing files are skipped.
    pub skip_row: bool,
}

/// Checks one converted row against the identifier tables and the run configuration.
pub struct ResourceValidator<'a> {
    config: &'a ImportConfig,
    resolver: &'a IdentifierResolver,
}

impl<'a> ResourceValidator<'a> {
    pub fn new(config: &'a ImportConfig, resolver: &'a IdentifierResolver) -> Self {
        Self { config, resolver }
    }

    pub fn validate(&self, index: usize, resource: &TargetResource) -> Validation {
        let mut validation = Validation::default();
        self.check_required(resource, &mut validation.messages);
        self.check_own_entity(index, resource, &mut validation.messages);
        self.check_links(index, resource, &mut validation.messages);
        if self.config.check_files {
            self.check_files(resource, &mut validation);
        }
        validation
    }

    fn check_required(&self, resource: &TargetResource, messages: &mut MessageStore) {
        for field in &self.config.required_fields {
            if !resource.contains_field(field) {
                messages.error(Some(field.as_str()), "Required field is missing");
            }
        }
    }

    fn check_own_entity(&self, index: usize, resource: &TargetResource, messages: &mut MessageStore) {
        let (own, _) = IdentifierResolver::own_identifiers(resource, self.config);
        for key in &own {
            if let Some(duplicate) = self.resolver.duplicate(key) {
                messages.error(None, duplicate.to_string());
            }
        }

        let existing = self.resolver.resolved_row(index);
        match (self.config.action, existing) {
            (ImportAction::Update | ImportAction::Delete, None) => {
                let label = own
                    .first()
                    .map(|key| key.to_string())
                    .unwrap_or_else(|| "(no identifier)".to_string());
                messages.error(None, format!("No existing resource matches {}", label));
            }
            (ImportAction::Create, Some(id)) => {
                messages.notice(None, format!("A resource with this identifier already exists ({})", id));
            }
            _ => {}
        }
    }

    fn check_links(&self, index: usize, resource: &TargetResource, messages: &mut MessageStore) {
        for (field, values) in resource.iter() {
            for value in values {
                let Some(key) = &value.source_identifier else {
                    continue;
                };
                let field = Some(field.as_str());
                if let Some(duplicate) = self.resolver.duplicate(key) {
                    messages.error(field, duplicate.to_string());
                } else if self.resolver.resolved(key).is_some() {
                    continue;
                } else if let Some(owner) = self.resolver.owner_of(key) {
                    if owner > index {
                        messages.notice(
                            field,
                            format!("{} is imported by row {}, a placeholder will be created", key, owner),
                        );
                    }
                } else if let Some(datatype) = value.literal_fallback() {
                    messages.warning(field, format!("{} not found, kept as {}", key, datatype));
                } else {
                    messages.error(field, format!("Referenced resource {} not found", key));
                }
            }
        }
    }

    fn check_files(&self, resource: &TargetResource, validation: &mut Validation) {
        for field in &self.config.file_fields {
            for value in resource.values(field) {
                if value.contains("://") {
                    continue;
                }
                let path = match &self.config.files_base_dir {
                    Some(base) => base.join(value),
                    None => Path::new(value).to_path_buf(),
                };
                if path.is_file() {
                    continue;
                }
                let text = format!("File not found: {}", path.display());
                if self.config.skip_missing_files {
                    validation.messages.warning(Some(field.as_str()), text);
                    validation.skip_row = true;
                } else {
                    validation.messages.error(Some(field.as_str()), text);
                }
            }
        }
    }
}
