//! Core record and resource types.
//!
//! Source records are the raw inputs (JSON-like maps or XML elements) and are never
//! mutated. Target resources are the normalized output of the mapping engine: an
//! ordered map of field names to values, where a value may carry a forward reference
//! to another record's identifier.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One unit of source data before conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceRecord {
    /// Associative record (JSON object) or positional row (JSON array).
    Map(serde_json::Value),
    /// A single XML element, kept as markup.
    Xml(XmlRecord),
}

impl SourceRecord {
    pub fn from_json(value: serde_json::Value) -> Self {
        SourceRecord::Map(value)
    }

    pub fn from_xml(xml: impl Into<String>) -> Self {
        SourceRecord::Xml(XmlRecord::new(xml))
    }

    /// A record with no data at all.
    pub fn empty() -> Self {
        SourceRecord::Map(serde_json::Value::Object(serde_json::Map::new()))
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            SourceRecord::Map(value) => Some(value),
            SourceRecord::Xml(_) => None,
        }
    }

    pub fn as_xml(&self) -> Option<&XmlRecord> {
        match self {
            SourceRecord::Xml(xml) => Some(xml),
            SourceRecord::Map(_) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            SourceRecord::Map(serde_json::Value::Object(map)) => map.is_empty(),
            SourceRecord::Map(serde_json::Value::Array(list)) => list.is_empty(),
            SourceRecord::Map(serde_json::Value::Null) => true,
            SourceRecord::Map(_) => false,
            SourceRecord::Xml(xml) => xml.as_str().trim().is_empty(),
        }
    }
}

impl From<serde_json::Value> for SourceRecord {
    fn from(value: serde_json::Value) -> Self {
        SourceRecord::Map(value)
    }
}

/// Serialized XML element used as a source record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlRecord {
    xml: String,
}

impl XmlRecord {
    pub fn new(xml: impl Into<String>) -> Self {
        Self { xml: xml.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.xml
    }
}

/// Coarse namespace an identifier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    #[default]
    Resources,
    Assets,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Resources => "resources",
            ResourceKind::Assets => "assets",
        }
    }

    /// Map a resource name (`items`, `item_sets`, `media`, `assets`, ...) to its namespace.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "resources" | "resource" | "items" | "item" | "item_sets" | "item_set" | "itemsets"
            | "media" | "o:item" | "o:itemset" | "o:media" => Some(ResourceKind::Resources),
            "assets" | "asset" | "o:asset" => Some(ResourceKind::Assets),
            _ => None,
        }
    }

    /// Namespace implied by a value datatype, if the datatype denotes a link.
    pub fn from_datatype(datatype: &str) -> Option<Self> {
        if datatype == "resource" || datatype.starts_with("resource:") {
            Some(ResourceKind::Resources)
        } else if datatype == "asset" {
            Some(ResourceKind::Assets)
        } else {
            None
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier qualified by its namespace, displayed as `identifier§kind`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentifierKey {
    pub identifier: String,
    pub kind: ResourceKind,
}

impl IdentifierKey {
    pub fn new(identifier: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            identifier: identifier.into(),
            kind,
        }
    }

    /// Parse the `identifier§kind` notation.
    pub fn parse(text: &str) -> Option<Self> {
        let (identifier, kind) = text.rsplit_once('§')?;
        let kind = ResourceKind::from_name(kind)?;
        Some(Self::new(identifier, kind))
    }
}

impl fmt::Display for IdentifierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}§{}", self.identifier, self.kind)
    }
}

/// Internal id an identifier or a source row resolved to, displayed as `id§kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResolvedId {
    pub id: i64,
    pub kind: ResourceKind,
}

impl fmt::Display for ResolvedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}§{}", self.id, self.kind)
    }
}

/// Reference to an entity returned by the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: i64,
    pub kind: ResourceKind,
}

impl From<EntityRef> for ResolvedId {
    fn from(entity: EntityRef) -> Self {
        ResolvedId {
            id: entity.id,
            kind: entity.kind,
        }
    }
}

/// One value of a target field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetValue {
    pub value: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datatypes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property_id: Option<i64>,
    /// Identifier of another record this value links to, resolved at commit time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_identifier: Option<IdentifierKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_id: Option<i64>,
}

impl TargetValue {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            datatypes: Vec::new(),
            language: None,
            is_public: None,
            property_id: None,
            source_identifier: None,
            resolved_id: None,
        }
    }

    /// Primary datatype of the value.
    pub fn datatype(&self) -> Option<&str> {
        self.datatypes.first().map(|s| s.as_str())
    }

    pub fn is_forward_reference(&self) -> bool {
        self.source_identifier.is_some() && self.resolved_id.is_none()
    }

    /// First datatype that does not denote a link, used when a link cannot be resolved.
    pub fn literal_fallback(&self) -> Option<&str> {
        self.datatypes
            .iter()
            .map(|s| s.as_str())
            .find(|dt| ResourceKind::from_datatype(dt).is_none())
    }
}

/// Converted resource: field name to ordered values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetResource {
    fields: IndexMap<String, Vec<TargetValue>>,
}

impl TargetResource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_literal(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(field, TargetValue::literal(value));
        self
    }

    pub fn push(&mut self, field: impl Into<String>, value: TargetValue) {
        self.fields.entry(field.into()).or_default().push(value);
    }

    pub fn get(&self, field: &str) -> &[TargetValue] {
        self.fields.get(field).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn values(&self, field: &str) -> Vec<&str> {
        self.get(field).iter().map(|v| v.value.as_str()).collect()
    }

    pub fn first_value(&self, field: &str) -> Option<&str> {
        self.get(field).first().map(|v| v.value.as_str())
    }

    pub fn contains_field(&self, field: &str) -> bool {
        !self.get(field).is_empty()
    }

    pub fn remove(&mut self, field: &str) -> Option<Vec<TargetValue>> {
        self.fields.shift_remove(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.values().all(|values| values.is_empty())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<TargetValue>)> {
        self.fields.iter()
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut TargetValue> {
        self.fields.values_mut().flat_map(|values| values.iter_mut())
    }

    /// All values carrying a link to another record's identifier.
    pub fn links(&self) -> impl Iterator<Item = &TargetValue> {
        self.fields
            .values()
            .flat_map(|values| values.iter())
            .filter(|value| value.source_identifier.is_some())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_ndjson_line(&self) -> Result<String, serde_json::Error> {
        let json = self.to_json()?;
        Ok(format!("{}\n", json))
    }
}
