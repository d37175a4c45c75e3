//! Mapping configuration: parsing, normalization and validation.
//!
//! A mapping can be written as ini lines, as an XML document, or given directly as a
//! structured list (JSON or YAML). All three forms go through the same normalization.
//! Building never fails: a mapping with any problem degrades to an empty mapping whose
//! `has_error` explains what went wrong, and callers must check it.

pub mod cache;
pub mod ini;
pub mod normalize;
pub mod registry;
pub mod types;
pub mod xml;

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde_json::Value;

use crate::extraction::flatten::scalar_to_string;
use crate::template::Tables;

pub use cache::MappingCache;
pub use normalize::{normalize_entry, normalize_map, normalize_value, parse_target};
pub use registry::{PropertyRegistry, StaticPropertyRegistry};
pub use types::{MapFrom, MapMod, MapTo, Mapping, MappingEntry, MappingError, MappingInfo};

/// Maximum nesting of `include` directives.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 10;

/// Mapping text or structure, tagged with its format.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingSource {
    Ini(String),
    Xml(String),
    Structured(Value),
}

impl MappingSource {
    /// Guess the format of a mapping text.
    pub fn detect(text: impl Into<String>) -> Self {
        let text = text.into();
        let trimmed = text.trim_start();
        if trimmed.starts_with('<') {
            return MappingSource::Xml(text);
        }
        if trimmed.starts_with('{') || trimmed.starts_with('[') && !looks_like_ini_header(trimmed) {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                return MappingSource::Structured(value);
            }
        }
        MappingSource::Ini(text)
    }

    /// Load a mapping file, choosing the format from its extension.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read mapping file {}: {}", path.display(), e))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ini") => Ok(MappingSource::Ini(text)),
            Some("xml") => Ok(MappingSource::Xml(text)),
            Some("json") => serde_json::from_str(&text)
                .map(MappingSource::Structured)
                .map_err(|e| format!("Failed to parse {}: {}", path.display(), e)),
            Some("yaml") | Some("yml") => serde_yaml::from_str(&text)
                .map(MappingSource::Structured)
                .map_err(|e| format!("Failed to parse {}: {}", path.display(), e)),
            _ => Ok(MappingSource::detect(text)),
        }
    }

    /// Stable hash of the content, used as the cache identity.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        match self {
            MappingSource::Ini(text) => ("ini", text).hash(&mut hasher),
            MappingSource::Xml(text) => ("xml", text).hash(&mut hasher),
            MappingSource::Structured(value) => ("structured", value.to_string()).hash(&mut hasher),
        }
        hasher.finish()
    }
}

fn looks_like_ini_header(text: &str) -> bool {
    let first_line = text.lines().next().unwrap_or_default().trim();
    first_line.ends_with(']')
        && first_line[1..first_line.len() - 1]
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '_')
}

/// Resolves included mapping names.
pub trait MappingLoader {
    fn load(&self, name: &str) -> Result<MappingSource, String>;
}

impl MappingLoader for HashMap<String, String> {
    fn load(&self, name: &str) -> Result<MappingSource, String> {
        self.get(name)
            .map(|text| MappingSource::detect(text.clone()))
            .ok_or_else(|| "no such mapping".to_string())
    }
}

/// Loads mappings from files in a directory: `name`, `name.ini`, `name.xml`,
/// `name.json`, `name.yaml`.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    base: PathBuf,
}

impl DirectoryLoader {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }
}

impl MappingLoader for DirectoryLoader {
    fn load(&self, name: &str) -> Result<MappingSource, String> {
        if name.split(['/', '\\']).any(|part| part == "..") {
            return Err(format!("refusing to load '{}' outside {}", name, self.base.display()));
        }
        for suffix in ["", ".ini", ".xml", ".json", ".yaml", ".yml"] {
            let path = self.base.join(format!("{}{}", name, suffix));
            if path.is_file() {
                return MappingSource::from_file(&path);
            }
        }
        Err(format!("no mapping file in {}", self.base.display()))
    }
}

/// A parsed mapping before includes are merged and entries normalized.
#[derive(Debug, Clone, Default)]
pub struct MappingDraft {
    pub info: MappingInfo,
    pub params: IndexMap<String, String>,
    pub default: Vec<MappingEntry>,
    pub maps: Vec<MappingEntry>,
    pub tables: Tables,
    pub includes: Vec<String>,
    pub errors: Vec<MappingError>,
}

impl MappingDraft {
    /// Put an included mapping underneath this one: its entries come first, and this
    /// mapping's params and tables win on conflicts.
    fn absorb_included(&mut self, included: MappingDraft) {
        let mut default = included.default;
        default.append(&mut self.default);
        self.default = default;

        let mut maps = included.maps;
        maps.append(&mut self.maps);
        self.maps = maps;

        for (key, value) in included.params {
            self.params.entry(key).or_insert(value);
        }
        for (name, table) in included.tables {
            self.tables.entry(name).or_insert(table);
        }
        self.errors.extend(included.errors);
    }
}

fn parse_structured(value: &Value) -> MappingDraft {
    let mut draft = MappingDraft::default();

    match value {
        Value::Array(entries) => push_entries(&mut draft, entries, None),
        Value::Object(sections) => {
            if let Some(info) = sections.get("info") {
                match serde_json::from_value::<MappingInfo>(info.clone()) {
                    Ok(info) => draft.info = info,
                    Err(e) => draft.errors.push(MappingError::InvalidStructure(format!("info: {}", e))),
                }
            }
            for (name, section) in sections {
                match (name.as_str(), section) {
                    ("info", _) => {}
                    ("params", Value::Object(params)) => {
                        for (key, value) in params {
                            let value = scalar_to_string(value).unwrap_or_default();
                            draft.params.insert(key.clone(), value);
                        }
                    }
                    ("include", Value::String(name)) => draft.includes.push(name.clone()),
                    ("include", Value::Array(names)) => draft
                        .includes
                        .extend(names.iter().filter_map(|n| n.as_str().map(String::from))),
                    ("default", Value::Array(entries)) => push_entries(&mut draft, entries, Some(false)),
                    ("maps", Value::Array(entries)) | ("mapping", Value::Array(entries)) => {
                        push_entries(&mut draft, entries, Some(true))
                    }
                    ("tables", tables) => match serde_json::from_value::<Tables>(tables.clone()) {
                        Ok(tables) => draft.tables = tables,
                        Err(e) => draft
                            .errors
                            .push(MappingError::InvalidStructure(format!("tables: {}", e))),
                    },
                    ("params" | "include" | "default" | "maps" | "mapping", _) => draft
                        .errors
                        .push(MappingError::InvalidStructure(format!("unexpected shape for '{}'", name))),
                    (other, _) => draft.errors.push(MappingError::UnknownSection(other.to_string())),
                }
            }
        }
        _ => draft.errors.push(MappingError::InvalidStructure(
            "expected a list of entries or an object of sections".to_string(),
        )),
    }
    draft
}

/// `in_maps`: `None` sorts entries by whether they have a source.
fn push_entries(draft: &mut MappingDraft, entries: &[Value], in_maps: Option<bool>) {
    let querier = draft.info.querier;
    for value in entries {
        let entry = normalize_value(value, querier, None);
        if in_maps.unwrap_or_else(|| entry.has_source()) {
            draft.maps.push(entry);
        } else {
            draft.default.push(entry);
        }
    }
}

/// Builds normalized mappings from any source format.
pub struct MappingBuilder<'a> {
    registry: Option<&'a dyn PropertyRegistry>,
    loader: Option<&'a dyn MappingLoader>,
    max_include_depth: usize,
}

impl<'a> MappingBuilder<'a> {
    pub fn new() -> Self {
        Self {
            registry: None,
            loader: None,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }

    /// Resolve property terms to ids, rejecting unknown terms.
    pub fn with_registry(mut self, registry: &'a dyn PropertyRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_loader(mut self, loader: &'a dyn MappingLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    /// Build a mapping
    ///
    /// # Example
    ///
    /// ```
    /// use bulkmap::mapping::{MappingBuilder, MappingSource};
    ///
    /// let source = MappingSource::detect("[maps]\ntitle = dcterms:title @en\n");
    /// let mapping = MappingBuilder::new().build("books", source);
    ///
    /// assert!(mapping.is_valid());
    /// assert_eq!(mapping.maps[0].to.language.as_deref(), Some("en"));
    /// ```
    pub fn build(&self, name: &str, source: MappingSource) -> Mapping {
        let draft = self.assemble(name, source, 0);
        let MappingDraft {
            info,
            params,
            default,
            maps,
            tables,
            errors,
            ..
        } = draft;

        let default = normalize_map(&default, self.registry);
        let maps = normalize_map(&maps, self.registry);

        let mut problems: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        for entry in default.iter().chain(maps.iter()) {
            if let Some(error) = &entry.has_error {
                let field = if entry.to.field.is_empty() { "?" } else { entry.to.field.as_str() };
                problems.push(format!("{}: {}", field, error));
            }
        }

        if !problems.is_empty() {
            for problem in &problems {
                tracing::warn!(mapping = name, problem = %problem, "Mapping rejected");
            }
            return Mapping::invalid(name, info.label, problems.join("; "));
        }

        tracing::debug!(
            mapping = name,
            default = default.len(),
            maps = maps.len(),
            tables = tables.len(),
            "Mapping built"
        );
        Mapping {
            name: name.to_string(),
            info,
            params,
            default,
            maps,
            tables,
            has_error: None,
        }
    }

    fn assemble(&self, name: &str, source: MappingSource, depth: usize) -> MappingDraft {
        let mut draft = match &source {
            MappingSource::Ini(text) => ini::parse(text),
            MappingSource::Xml(text) => xml::parse(text),
            MappingSource::Structured(value) => parse_structured(value),
        };

        for include in std::mem::take(&mut draft.includes) {
            if depth >= self.max_include_depth {
                draft.errors.push(MappingError::IncludeDepthExceeded {
                    name: include,
                    depth: self.max_include_depth,
                });
                continue;
            }
            let loaded = match self.loader {
                Some(loader) => loader.load(&include),
                None => Err("no mapping loader configured".to_string()),
            };
            match loaded {
                Ok(included) => {
                    tracing::debug!(mapping = name, include = %include, depth, "Including mapping");
                    let included = self.assemble(&include, included, depth + 1);
                    draft.absorb_included(included);
                }
                Err(reason) => draft.errors.push(MappingError::IncludeNotFound { name: include, reason }),
            }
        }
        draft
    }
}

impl Default for MappingBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}
