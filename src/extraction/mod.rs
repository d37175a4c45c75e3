//! Path queriers: pull scalar values out of a source record.
//!
//! A querier is chosen per mapping entry, once, when the entry is normalized. Every
//! dialect answers the same question through [`Querier::extract`]: given a record and
//! a path, which scalar values does it select? A missing path, an empty path or an
//! empty result all yield an empty list; a malformed expression is logged and also
//! yields an empty list.

pub mod flatten;
pub mod xml;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::OnceCell;
use std::fmt;
use sxd_document::Package;

use crate::entity::SourceRecord;

pub use flatten::{FieldPath, Flattened};

/// Path-expression dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Querier {
    /// Dot path over the flattened record.
    #[default]
    #[serde(rename = "path", alias = "dotpath")]
    DotPath,
    #[serde(rename = "jmespath")]
    JmesPath,
    #[serde(rename = "jsonpath")]
    JsonPath,
    #[serde(rename = "xpath")]
    XPath,
    /// Zero-based position, for header-less tabular sources.
    #[serde(rename = "index")]
    Index,
}

impl Querier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Querier::DotPath => "path",
            Querier::JmesPath => "jmespath",
            Querier::JsonPath => "jsonpath",
            Querier::XPath => "xpath",
            Querier::Index => "index",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "" | "path" | "dotpath" | "dot" => Some(Querier::DotPath),
            "jmespath" => Some(Querier::JmesPath),
            "jsonpath" => Some(Querier::JsonPath),
            "xpath" => Some(Querier::XPath),
            "index" => Some(Querier::Index),
            _ => None,
        }
    }

    /// Split an optional `dialect:` prefix off a source expression.
    ///
    /// Only the known dialect names count as prefixes, so `dcterms:title` is left alone.
    pub fn split_prefix(source: &str) -> (Option<Self>, &str) {
        if let Some((prefix, rest)) = source.split_once(':') {
            let querier = match prefix.trim() {
                "path" => Some(Querier::DotPath),
                "jmespath" => Some(Querier::JmesPath),
                "jsonpath" => Some(Querier::JsonPath),
                "xpath" => Some(Querier::XPath),
                "index" => Some(Querier::Index),
                _ => None,
            };
            if querier.is_some() {
                return (querier, rest.trim());
            }
        }
        (None, source)
    }

    /// Extract values, logging and swallowing query errors.
    pub fn extract(&self, record: &RecordView<'_>, path: &str) -> Vec<String> {
        match self.try_extract(record, path) {
            Ok(values) => values,
            Err(err) => {
                tracing::warn!(querier = %self, path, error = %err, "Path query failed");
                Vec::new()
            }
        }
    }

    /// Extract values, reporting malformed expressions.
    pub fn try_extract(&self, record: &RecordView<'_>, path: &str) -> Result<Vec<String>, QueryError> {
        let path = path.trim();
        if path.is_empty() {
            return Ok(Vec::new());
        }

        match (self, record.record()) {
            (Querier::DotPath, SourceRecord::Map(_)) => {
                let key = FieldPath::parse(path).flat_key();
                Ok(record
                    .flattened()
                    .and_then(|flat| flat.get(&key))
                    .cloned()
                    .unwrap_or_default())
            }
            (Querier::JmesPath, SourceRecord::Map(value)) => query_jmespath(value, path),
            (Querier::JsonPath, SourceRecord::Map(value)) => query_jsonpath(value, path),
            (Querier::Index, SourceRecord::Map(value)) => {
                let index = parse_index(path)?;
                let item = match value {
                    Value::Array(items) => items.get(index),
                    Value::Object(map) => map.values().nth(index),
                    _ => None,
                };
                let mut values = Vec::new();
                if let Some(item) = item {
                    flatten::collect_scalars(item, &mut values);
                }
                Ok(values)
            }
            (Querier::XPath, SourceRecord::Xml(_)) => {
                let package = record.xml_package()?;
                let document = package.as_document();
                xml::evaluate(&document, path).map_err(|reason| QueryError::InvalidExpression {
                    querier: *self,
                    path: path.to_string(),
                    reason,
                })
            }
            (Querier::Index, SourceRecord::Xml(_)) => {
                let index = parse_index(path)?;
                let package = record.xml_package()?;
                let document = package.as_document();
                Ok(xml::root_element(&document)
                    .and_then(|root| xml::child_elements(root).into_iter().nth(index))
                    .map(xml::element_text)
                    .filter(|text| !text.is_empty())
                    .into_iter()
                    .collect())
            }
            (querier, _) => {
                tracing::debug!(querier = %querier, path, "Dialect does not apply to this record type");
                Ok(Vec::new())
            }
        }
    }
}

impl fmt::Display for Querier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse_index(path: &str) -> Result<usize, QueryError> {
    path.parse::<usize>().map_err(|_| QueryError::InvalidExpression {
        querier: Querier::Index,
        path: path.to_string(),
        reason: "not a non-negative integer".to_string(),
    })
}

fn query_jmespath(value: &Value, path: &str) -> Result<Vec<String>, QueryError> {
    let invalid = |reason: String| QueryError::InvalidExpression {
        querier: Querier::JmesPath,
        path: path.to_string(),
        reason,
    };

    let expression = jmespath::compile(path).map_err(|e| invalid(e.to_string()))?;
    let result = expression
        .search(value.clone())
        .map_err(|e| invalid(e.to_string()))?;
    let json = serde_json::to_value(&*result).map_err(|e| invalid(e.to_string()))?;

    let mut values = Vec::new();
    flatten::collect_scalars(&json, &mut values);
    Ok(values)
}

fn query_jsonpath(value: &Value, path: &str) -> Result<Vec<String>, QueryError> {
    let json_path = serde_json_path::JsonPath::parse(path).map_err(|e| QueryError::InvalidExpression {
        querier: Querier::JsonPath,
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    let mut values = Vec::new();
    for node in json_path.query(value).all() {
        flatten::collect_scalars(node, &mut values);
    }
    Ok(values)
}

/// Error type for path queries
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    InvalidExpression {
        querier: Querier,
        path: String,
        reason: String,
    },
    InvalidRecord(String),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::InvalidExpression { querier, path, reason } => {
                write!(f, "Invalid {} expression '{}': {}", querier, path, reason)
            }
            QueryError::InvalidRecord(msg) => write!(f, "Invalid record: {}", msg),
        }
    }
}

impl std::error::Error for QueryError {}

/// Read-only view over one source record with lazily computed derived forms.
///
/// The flattened map and the parsed XML document are built at most once per record,
/// however many entries query it.
pub struct RecordView<'a> {
    record: &'a SourceRecord,
    flat: OnceCell<Option<Flattened>>,
    package: OnceCell<Result<Package, String>>,
}

impl<'a> RecordView<'a> {
    pub fn new(record: &'a SourceRecord) -> Self {
        Self {
            record,
            flat: OnceCell::new(),
            package: OnceCell::new(),
        }
    }

    pub fn record(&self) -> &'a SourceRecord {
        self.record
    }

    /// Flattened form of a map record; `None` for XML records.
    pub fn flattened(&self) -> Option<&Flattened> {
        self.flat
            .get_or_init(|| self.record.as_json().map(flatten::flatten))
            .as_ref()
    }

    fn xml_package(&self) -> Result<&Package, QueryError> {
        let parsed = self.package.get_or_init(|| match self.record.as_xml() {
            Some(xml) => xml::parse(xml.as_str()),
            None => Err("record is not XML".to_string()),
        });
        parsed
            .as_ref()
            .map_err(|reason| QueryError::InvalidRecord(reason.clone()))
    }
}
