//! Property registry: resolves vocabulary terms to typed property ids.

use std::collections::HashMap;

/// Resolves a term such as `dcterms:title` to its property id.
pub trait PropertyRegistry {
    fn property_id(&self, term: &str) -> Option<i64>;
}

impl PropertyRegistry for HashMap<String, i64> {
    fn property_id(&self, term: &str) -> Option<i64> {
        self.get(term).copied()
    }
}

/// Whether a target field names a vocabulary property rather than a system field.
///
/// System fields use the `o:` prefix (`o:id`, `o:item_set`); properties are any other
/// `prefix:local` term.
pub fn is_property_term(field: &str) -> bool {
    match field.split_once(':') {
        Some((prefix, local)) => prefix != "o" && !prefix.is_empty() && !local.is_empty(),
        None => false,
    }
}

/// In-memory registry.
#[derive(Debug, Clone, Default)]
pub struct StaticPropertyRegistry {
    terms: HashMap<String, i64>,
}

impl StaticPropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dublin Core elements with the ids of a default repository install.
    pub fn dublin_core() -> Self {
        let terms = [
            "title",
            "creator",
            "subject",
            "description",
            "publisher",
            "contributor",
            "date",
            "type",
            "format",
            "identifier",
            "source",
            "language",
            "relation",
            "coverage",
            "rights",
        ];
        let mut registry = Self::new();
        for (index, local) in terms.iter().enumerate() {
            registry.insert(format!("dcterms:{}", local), index as i64 + 1);
        }
        registry
    }

    pub fn insert(&mut self, term: impl Into<String>, id: i64) {
        self.terms.insert(term.into(), id);
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl PropertyRegistry for StaticPropertyRegistry {
    fn property_id(&self, term: &str) -> Option<i64> {
        self.terms.get(term).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_property_term() {
        assert!(is_property_term("dcterms:title"));
        assert!(is_property_term("bibo:issue"));
        assert!(!is_property_term("o:id"));
        assert!(!is_property_term("title"));
        assert!(!is_property_term("dcterms:"));
    }

    #[test]
    fn test_dublin_core_ids() {
        let registry = StaticPropertyRegistry::dublin_core();

        assert_eq!(registry.property_id("dcterms:title"), Some(1));
        assert_eq!(registry.property_id("dcterms:identifier"), Some(10));
        assert_eq!(registry.property_id("dcterms:rights"), Some(15));
        assert_eq!(registry.property_id("bibo:issue"), None);
        assert_eq!(registry.len(), 15);
    }
}
