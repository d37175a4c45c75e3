//! In-memory mapping model shared by every mapping format.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::extraction::Querier;
use crate::template::Tables;

/// Where a value comes from. `path` is `None` for entries of the default section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapFrom {
    #[serde(default)]
    pub querier: Querier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Where a value goes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapTo {
    #[serde(default)]
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datatype: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
}

impl MapTo {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ..Self::default()
        }
    }
}

/// How a value is transformed.
///
/// At most one of `raw`, `val` and `pattern` is set on a valid entry. `replace` and
/// `filters` list the token sources found in `pattern`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MapMod {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub val: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub append: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replace: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,
}

impl MapMod {
    /// Whether the entry produces a value without querying the record.
    pub fn is_static(&self) -> bool {
        self.raw.is_some() || self.val.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_none()
            && self.val.is_none()
            && self.pattern.is_none()
            && self.prepend.is_none()
            && self.append.is_none()
    }
}

/// One `{from, to, mod}` line of a mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingEntry {
    #[serde(default)]
    pub from: MapFrom,
    #[serde(default)]
    pub to: MapTo,
    #[serde(default, rename = "mod")]
    pub modifier: MapMod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_error: Option<String>,
}

impl MappingEntry {
    /// Entry copying a dot-path source into a field.
    pub fn map(path: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            from: MapFrom {
                querier: Querier::DotPath,
                path: Some(path.into()),
            },
            to: MapTo::new(field),
            ..Self::default()
        }
    }

    /// Default-section entry emitting a literal.
    pub fn constant(field: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            to: MapTo::new(field),
            modifier: MapMod {
                raw: Some(raw.into()),
                ..MapMod::default()
            },
            ..Self::default()
        }
    }

    pub fn with_querier(mut self, querier: Querier) -> Self {
        self.from.querier = querier;
        self
    }

    pub fn with_datatype(mut self, datatype: impl Into<String>) -> Self {
        self.to.datatype.push(datatype.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.to.language = Some(language.into());
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.modifier.pattern = Some(pattern.into());
        self
    }

    pub fn with_val(mut self, val: impl Into<String>) -> Self {
        self.modifier.val = Some(val.into());
        self
    }

    pub fn with_error(mut self, error: &MappingError) -> Self {
        self.has_error = Some(error.to_string());
        self
    }

    pub fn has_source(&self) -> bool {
        self.from.path.is_some()
    }

    pub fn is_valid(&self) -> bool {
        self.has_error.is_none()
    }
}

/// `[info]` section.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MappingInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Dialect used by entries that do not name one.
    #[serde(default)]
    pub querier: Querier,
    /// Source format the mapping is written for (`json`, `xml`, `csv`, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Target resource name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, String>,
}

/// A complete, normalized mapping.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mapping {
    pub name: String,
    #[serde(default)]
    pub info: MappingInfo,
    #[serde(default)]
    pub params: IndexMap<String, String>,
    #[serde(default)]
    pub default: Vec<MappingEntry>,
    #[serde(default)]
    pub maps: Vec<MappingEntry>,
    #[serde(default)]
    pub tables: Tables,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_error: Option<String>,
}

impl Mapping {
    /// Empty mapping flagged as invalid, keeping only its name and label.
    pub fn invalid(name: impl Into<String>, label: Option<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            info: MappingInfo {
                label,
                ..MappingInfo::default()
            },
            has_error: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.has_error.is_none()
    }

    pub fn label(&self) -> &str {
        self.info.label.as_deref().unwrap_or(&self.name)
    }

    /// Default entries first, then map entries.
    pub fn entries(&self) -> impl Iterator<Item = &MappingEntry> {
        self.default.iter().chain(self.maps.iter())
    }
}

/// Error type for mapping parsing and normalization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingError {
    MissingDestination(String),
    AmbiguousSyntax(String),
    MalformedXml(String),
    UnknownSection(String),
    UnknownElement(String),
    InvalidLine { line: usize, reason: String },
    InvalidPattern { pattern: String, reason: String },
    InvalidQuerier(String),
    UnknownProperty(String),
    NothingToMap(String),
    IncludeNotFound { name: String, reason: String },
    IncludeDepthExceeded { name: String, depth: usize },
    InvalidStructure(String),
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingError::MissingDestination(context) => {
                write!(f, "Missing destination field in '{}'", context)
            }
            MappingError::AmbiguousSyntax(msg) => write!(f, "Ambiguous syntax: {}", msg),
            MappingError::MalformedXml(msg) => write!(f, "Malformed XML: {}", msg),
            MappingError::UnknownSection(name) => write!(f, "Unknown section: [{}]", name),
            MappingError::UnknownElement(name) => write!(f, "Unknown element: <{}>", name),
            MappingError::InvalidLine { line, reason } => {
                write!(f, "Invalid line {}: {}", line, reason)
            }
            MappingError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid pattern '{}': {}", pattern, reason)
            }
            MappingError::InvalidQuerier(name) => write!(f, "Unknown querier: {}", name),
            MappingError::UnknownProperty(term) => write!(f, "Unknown property: {}", term),
            MappingError::NothingToMap(field) => {
                write!(f, "Entry for '{}' has neither a source nor a value", field)
            }
            MappingError::IncludeNotFound { name, reason } => {
                write!(f, "Included mapping '{}' not found: {}", name, reason)
            }
            MappingError::IncludeDepthExceeded { name, depth } => {
                write!(f, "Include depth {} exceeded while including '{}'", depth, name)
            }
            MappingError::InvalidStructure(msg) => write!(f, "Invalid mapping structure: {}", msg),
        }
    }
}

impl std::error::Error for MappingError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_serializes_mod_key() {
        let entry = MappingEntry::map("title", "dcterms:title").with_language("fr");
        let json = serde_json::to_value(&entry).unwrap();

        assert_eq!(
            json,
            json!({
                "from": {"querier": "path", "path": "title"},
                "to": {"field": "dcterms:title", "language": "fr"},
                "mod": {}
            })
        );
        let back: MappingEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_invalid_mapping_is_empty() {
        let mapping = Mapping::invalid("broken", Some("Broken".to_string()), "bad");

        assert!(!mapping.is_valid());
        assert_eq!(mapping.label(), "Broken");
        assert_eq!(mapping.entries().count(), 0);
    }
}
