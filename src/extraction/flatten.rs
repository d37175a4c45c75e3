//! Dot-path addressing over flattened records.
//!
//! Nested containers are flattened into `"a.b.c"` keys. Literal `.` and `\` in the
//! original key names are escaped as `\.` and `\\`, so a flattened key always splits
//! back into the original segments. Arrays nested under a key are transparent: every
//! scalar they hold is appended, in order, to the values of that key.

use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// Flattened view of a record: escaped dot key to ordered scalar values.
pub type Flattened = IndexMap<String, Vec<String>>;

/// Represents a dot path to a field in a flattened record
///
/// # Examples
///
/// - `dcterms:title` - top-level key
/// - `creator.name` - nested key
/// - `file\.name` - top-level key containing a literal dot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    /// The raw path string
    pub raw: String,
    /// Unescaped path segments
    pub segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path, honoring `\.` and `\\` escapes
    ///
    /// # Example
    ///
    /// ```
    /// use bulkmap::extraction::FieldPath;
    ///
    /// let path = FieldPath::parse("user.address\\.city");
    /// assert_eq!(path.segments, vec!["user", "address.city"]);
    /// ```
    pub fn parse(path: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = path.chars();

        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(next) => current.push(next),
                    None => current.push('\\'),
                },
                '.' => {
                    if !current.is_empty() {
                        segments.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            }
        }
        if !current.is_empty() {
            segments.push(current);
        }

        Self {
            raw: path.to_string(),
            segments,
        }
    }

    /// Canonical flattened key for this path.
    pub fn flat_key(&self) -> String {
        join_segments(self.segments.iter().map(|s| s.as_str()))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Escape one key segment for use in a flattened key.
pub fn escape_segment(segment: &str) -> String {
    let mut escaped = String::with_capacity(segment.len());
    for c in segment.chars() {
        if c == '\\' || c == '.' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn join_segments<'a>(segments: impl Iterator<Item = &'a str>) -> String {
    segments.map(escape_segment).collect::<Vec<_>>().join(".")
}

/// Flatten a JSON record into escaped dot keys.
///
/// A top-level array is treated as a positional row: its items are keyed by index.
pub fn flatten(record: &Value) -> Flattened {
    let mut out = Flattened::new();
    match record {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(item, &index.to_string(), &mut out);
            }
        }
        _ => flatten_into(record, "", &mut out),
    }
    out
}

fn flatten_into(value: &Value, prefix: &str, out: &mut Flattened) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = escape_segment(key);
                let path = if prefix.is_empty() {
                    key
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(child, &path, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_into(item, prefix, out);
            }
        }
        Value::Null => {}
        scalar => {
            if prefix.is_empty() {
                return;
            }
            if let Some(text) = scalar_to_string(scalar) {
                out.entry(prefix.to_string()).or_default().push(text);
            }
        }
    }
}

/// String form of a JSON scalar; empty strings and nulls yield nothing.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

/// Collect every scalar of a JSON value, descending into arrays.
pub fn collect_scalars(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_scalars(item, out);
            }
        }
        other => {
            if let Some(text) = scalar_to_string(other) {
                out.push(text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_path_parse() {
        let path = FieldPath::parse("user.address.city");

        assert_eq!(path.segments, vec!["user", "address", "city"]);
        assert_eq!(path.flat_key(), "user.address.city");
    }

    #[test]
    fn test_field_path_with_escapes() {
        let path = FieldPath::parse("file\\.name.a\\\\b");

        assert_eq!(path.segments, vec!["file.name", "a\\b"]);
        assert_eq!(path.flat_key(), "file\\.name.a\\\\b");
    }

    #[test]
    fn test_flatten_nested() {
        let record = json!({
            "title": "Foo",
            "creator": {"name": "Alice", "born": 1900},
            "file.name": "a.jpg"
        });

        let flat = flatten(&record);

        assert_eq!(flat.get("title"), Some(&vec!["Foo".to_string()]));
        assert_eq!(flat.get("creator.name"), Some(&vec!["Alice".to_string()]));
        assert_eq!(flat.get("creator.born"), Some(&vec!["1900".to_string()]));
        assert_eq!(flat.get("file\\.name"), Some(&vec!["a.jpg".to_string()]));
    }

    #[test]
    fn test_flatten_repeated_values_keep_order() {
        let record = json!({
            "subject": ["b", "a", "c"],
            "part": [{"title": "One"}, {"title": "Two"}]
        });

        let flat = flatten(&record);

        assert_eq!(flat["subject"], vec!["b", "a", "c"]);
        assert_eq!(flat["part.title"], vec!["One", "Two"]);
    }

    #[test]
    fn test_flatten_positional_row() {
        let flat = flatten(&json!(["A1", "", "Foo"]));

        assert_eq!(flat.get("0"), Some(&vec!["A1".to_string()]));
        assert_eq!(flat.get("1"), None);
        assert_eq!(flat.get("2"), Some(&vec!["Foo".to_string()]));
    }

    #[test]
    fn test_collect_scalars_skips_nulls() {
        let mut out = Vec::new();
        collect_scalars(&json!(["a", null, ["b", 2]]), &mut out);
        assert_eq!(out, vec!["a", "b", "2"]);
    }
}
