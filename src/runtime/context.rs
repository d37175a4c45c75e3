//! Conversion context for one source record.
//!
//! Holds the record view, the mapping parameters and the values queried for the entry
//! being rendered. It is the scope patterns resolve their names against.

use indexmap::IndexMap;

use crate::entity::SourceRecord;
use crate::extraction::{Querier, RecordView};
use crate::template::Scope;
use crate::transform_registry::FilterValue;

/// Context for converting a single source record.
///
/// Name lookup order for patterns:
/// 1. the aliases `value` and `label` (current queried value) and `list` (every value
///    queried for the entry),
/// 2. `params.NAME`, or a bare `NAME` present in the parameters,
/// 3. a query of the record with the entry's querier.
pub struct ConversionContext<'a> {
    view: RecordView<'a>,
    params: &'a IndexMap<String, String>,
    querier: Querier,
    values: Vec<String>,
    current: Option<String>,
}

impl<'a> ConversionContext<'a> {
    /// Create a context over a record.
    ///
    /// # Example
    /// ```
    /// use indexmap::IndexMap;
    /// use bulkmap::entity::SourceRecord;
    /// use bulkmap::runtime::ConversionContext;
    /// use bulkmap::template::Scope;
    /// use serde_json::json;
    ///
    /// let record = SourceRecord::from_json(json!({"title": "Foo"}));
    /// let params = IndexMap::new();
    /// let ctx = ConversionContext::new(&record, &params);
    ///
    /// assert_eq!(ctx.lookup("title").unwrap().to_text(), "Foo");
    /// ```
    pub fn new(record: &'a SourceRecord, params: &'a IndexMap<String, String>) -> Self {
        Self {
            view: RecordView::new(record),
            params,
            querier: Querier::default(),
            values: Vec::new(),
            current: None,
        }
    }

    pub fn record(&self) -> &RecordView<'a> {
        &self.view
    }

    /// Query the record with the given dialect.
    pub fn query(&self, querier: Querier, path: &str) -> Vec<String> {
        querier.extract(&self.view, path)
    }

    /// Start rendering an entry: its querier and the values it extracted.
    pub fn set_entry(&mut self, querier: Querier, values: Vec<String>) {
        self.querier = querier;
        self.values = values;
        self.current = None;
    }

    pub fn set_current(&mut self, value: Option<String>) {
        self.current = value;
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(|s| s.as_str())
    }
}

impl Scope for ConversionContext<'_> {
    fn lookup(&self, name: &str) -> Option<FilterValue> {
        match name {
            "value" | "label" => return self.current.clone().map(FilterValue::Str),
            "list" => return Some(FilterValue::List(self.values.clone())),
            _ => {}
        }

        let param = name.strip_prefix("params.").unwrap_or(name);
        if let Some(value) = self.param(param) {
            return Some(FilterValue::str(value));
        }
        if name.starts_with("params.") {
            return None;
        }

        let found = self.query(self.querier, name);
        if found.is_empty() {
            None
        } else {
            Some(FilterValue::from_values(found))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> IndexMap<String, String> {
        let mut params = IndexMap::new();
        params.insert("base".to_string(), "https://example.org".to_string());
        params
    }

    #[test]
    fn test_aliases() {
        let record = SourceRecord::empty();
        let params = IndexMap::new();
        let mut ctx = ConversionContext::new(&record, &params);

        assert_eq!(ctx.lookup("value"), None);

        ctx.set_entry(Querier::DotPath, vec!["a".to_string(), "b".to_string()]);
        ctx.set_current(Some("a".to_string()));

        assert_eq!(ctx.lookup("value"), Some(FilterValue::str("a")));
        assert_eq!(ctx.lookup("label"), Some(FilterValue::str("a")));
        assert_eq!(
            ctx.lookup("list"),
            Some(FilterValue::List(vec!["a".to_string(), "b".to_string()]))
        );
    }

    #[test]
    fn test_params() {
        let record = SourceRecord::from_json(json!({"base": "from record"}));
        let params = params();
        let ctx = ConversionContext::new(&record, &params);

        assert_eq!(ctx.lookup("params.base"), Some(FilterValue::str("https://example.org")));
        assert_eq!(ctx.lookup("base"), Some(FilterValue::str("https://example.org")));
        assert_eq!(ctx.lookup("params.missing"), None);
    }

    #[test]
    fn test_record_query_uses_entry_querier() {
        let record = SourceRecord::from_json(json!({
            "creators": [{"name": "Ann"}, {"name": "Bob"}],
            "title": "Foo"
        }));
        let params = IndexMap::new();
        let mut ctx = ConversionContext::new(&record, &params);

        assert_eq!(ctx.lookup("title"), Some(FilterValue::str("Foo")));
        assert_eq!(ctx.lookup("creators.name").unwrap().into_list(), vec!["Ann", "Bob"]);

        ctx.set_entry(Querier::JmesPath, Vec::new());
        assert_eq!(ctx.lookup("creators[0].name"), Some(FilterValue::str("Ann")));
        assert_eq!(ctx.lookup("nothing"), None);
    }
}
