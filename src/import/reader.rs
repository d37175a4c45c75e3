//! Source readers consumed by the import passes.

use indexmap::IndexMap;
use std::fs;
use std::path::Path;

use crate::entity::SourceRecord;

/// Forward-only, countable sequence of source records.
///
/// Every pass iterates the reader again from the start and must see the same records
/// in the same order. The human-facing index of a record is its 1-based position.
pub trait SourceReader {
    fn count(&self) -> usize;

    fn records(&self) -> Box<dyn Iterator<Item = SourceRecord> + '_>;

    /// Parameter capability, for readers that expose values to mapping patterns.
    fn as_parametrizable(&self) -> Option<&dyn Parametrizable> {
        None
    }
}

/// Readers that carry parameters of their own (a file name, a base URL, ...).
pub trait Parametrizable {
    fn params(&self) -> IndexMap<String, String>;
}

/// Records held in memory.
#[derive(Debug, Clone, Default)]
pub struct VecReader {
    records: Vec<SourceRecord>,
    params: Option<IndexMap<String, String>>,
}

impl VecReader {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        Self {
            records,
            params: None,
        }
    }

    /// One record per JSON value.
    pub fn from_json(values: Vec<serde_json::Value>) -> Self {
        Self::new(values.into_iter().map(SourceRecord::from_json).collect())
    }

    /// Load a `.json` array or an NDJSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let text = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read records {}: {}", path.display(), e))?;

        if text.trim_start().starts_with('[') {
            let values: Vec<serde_json::Value> = serde_json::from_str(&text)
                .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
            return Ok(Self::from_json(values));
        }

        let values = crate::serialization::read_ndjson(text.as_bytes())
            .map_err(|e| format!("Failed to parse {}: {}", path.display(), e))?;
        Ok(Self::from_json(values))
    }

    pub fn with_params(mut self, params: IndexMap<String, String>) -> Self {
        self.params = Some(params);
        self
    }
}

impl SourceReader for VecReader {
    fn count(&self) -> usize {
        self.records.len()
    }

    fn records(&self) -> Box<dyn Iterator<Item = SourceRecord> + '_> {
        Box::new(self.records.iter().cloned())
    }

    fn as_parametrizable(&self) -> Option<&dyn Parametrizable> {
        self.params.as_ref().map(|_| self as &dyn Parametrizable)
    }
}

impl Parametrizable for VecReader {
    fn params(&self) -> IndexMap<String, String> {
        self.params.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_vec_reader_restarts() {
        let reader = VecReader::from_json(vec![json!({"a": 1}), json!({"a": 2})]);

        assert_eq!(reader.count(), 2);
        assert_eq!(reader.records().count(), 2);
        assert_eq!(reader.records().next(), Some(SourceRecord::from_json(json!({"a": 1}))));
        assert!(reader.as_parametrizable().is_none());
    }

    #[test]
    fn test_parametrizable_capability() {
        let mut params = IndexMap::new();
        params.insert("filename".to_string(), "books.csv".to_string());
        let reader = VecReader::new(Vec::new()).with_params(params);

        let exposed = reader.as_parametrizable().map(|p| p.params()).unwrap();
        assert_eq!(exposed["filename"], "books.csv");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let array = dir.path().join("records.json");
        let lines = dir.path().join("records.ndjson");
        std::fs::write(&array, r#"[{"id": "A1"}, {"id": "A2"}]"#).unwrap();
        std::fs::write(&lines, "{\"id\": \"A1\"}\n\n{\"id\": \"A2\"}\n").unwrap();

        assert_eq!(VecReader::from_file(&array).unwrap().count(), 2);
        assert_eq!(VecReader::from_file(&lines).unwrap().count(), 2);
    }
}
