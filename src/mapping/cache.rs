//! Built mappings, keyed by name and content hash.
//!
//! A mapping is built once per distinct content; asking again for the same name and
//! content returns the shared instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::mapping::types::Mapping;
use crate::mapping::{MappingBuilder, MappingSource};

type CacheKey = (String, u64);

#[derive(Default)]
pub struct MappingCache {
    entries: Mutex<HashMap<CacheKey, Arc<Mapping>>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, Arc<Mapping>>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached mapping for this name and content, if any.
    pub fn get(&self, name: &str, source: &MappingSource) -> Option<Arc<Mapping>> {
        let key = (name.to_string(), source.content_hash());
        self.lock().get(&key).cloned()
    }

    /// Return the cached mapping or build and cache it.
    pub fn get_or_build(
        &self,
        builder: &MappingBuilder<'_>,
        name: &str,
        source: MappingSource,
    ) -> Arc<Mapping> {
        let hash = source.content_hash();
        let key = (name.to_string(), hash);

        {
            let entries = self.lock();
            if let Some(mapping) = entries.get(&key) {
                tracing::trace!(mapping = name, "Mapping cache hit");
                return Arc::clone(mapping);
            }
            if entries.keys().any(|(cached, _)| cached == name) {
                tracing::warn!(mapping = name, "Mapping content changed, building a new version");
            }
        }

        let mapping = Arc::new(builder.build(name, source));
        let mut entries = self.lock();
        Arc::clone(entries.entry(key).or_insert(mapping))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_content_is_built_once() {
        let cache = MappingCache::new();
        let builder = MappingBuilder::new();
        let source = MappingSource::Ini("title = dcterms:title\n".to_string());

        let first = cache.get_or_build(&builder, "books", source.clone());
        let second = cache.get_or_build(&builder, "books", source.clone());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        assert!(cache.get("books", &source).is_some());
    }

    #[test]
    fn test_changed_content_is_a_new_entry() {
        let cache = MappingCache::new();
        let builder = MappingBuilder::new();

        let first = cache.get_or_build(&builder, "books", MappingSource::Ini("a = dcterms:title\n".to_string()));
        let second = cache.get_or_build(&builder, "books", MappingSource::Ini("b = dcterms:title\n".to_string()));

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.maps[0].from.path.as_deref(), Some("a"));
        assert_eq!(second.maps[0].from.path.as_deref(), Some("b"));
        assert_eq!(cache.len(), 2);
    }
}
