//! Apply one mapping to source records.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::entity::{IdentifierKey, ResourceKind, SourceRecord, TargetResource, TargetValue};
use crate::mapping::{Mapping, MappingEntry};
use crate::runtime::context::ConversionContext;
use crate::template::{RenderEnv, Template};
use crate::transform_registry::FilterRegistry;

/// A mapping entry with its pattern parsed once.
#[derive(Debug, Clone)]
struct CompiledEntry {
    entry: MappingEntry,
    template: Option<Template>,
    link: Option<ResourceKind>,
}

impl CompiledEntry {
    fn compile(entry: &MappingEntry) -> Option<Self> {
        let template = match entry.modifier.pattern.as_deref() {
            Some(pattern) => match Template::parse(pattern) {
                Ok(template) => Some(template),
                Err(err) => {
                    tracing::warn!(field = %entry.to.field, error = %err, "Skipping entry with a bad pattern");
                    return None;
                }
            },
            None => None,
        };
        let link = entry
            .to
            .datatype
            .iter()
            .find_map(|dt| ResourceKind::from_datatype(dt));

        Some(Self {
            entry: entry.clone(),
            template,
            link,
        })
    }

    fn wrap(&self, value: &str) -> String {
        let m = &self.entry.modifier;
        format!(
            "{}{}{}",
            m.prepend.as_deref().unwrap_or_default(),
            value,
            m.append.as_deref().unwrap_or_default()
        )
    }

    fn target_value(&self, value: String) -> TargetValue {
        let to = &self.entry.to;
        let source_identifier = self.link.map(|kind| IdentifierKey::new(value.clone(), kind));
        TargetValue {
            value,
            datatypes: to.datatype.clone(),
            language: to.language.clone(),
            is_public: to.is_public,
            property_id: to.property_id,
            source_identifier,
            resolved_id: None,
        }
    }
}

/// Converts source records into target resources with one mapping.
///
/// The mapping is immutable; converting never touches anything but the returned
/// resource.
#[derive(Clone)]
pub struct MetaMapper {
    mapping: Arc<Mapping>,
    filters: Arc<FilterRegistry>,
    params: IndexMap<String, String>,
    entries: Vec<CompiledEntry>,
}

impl MetaMapper {
    /// Create a mapper. An invalid mapping converts every record to an empty resource.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use bulkmap::entity::SourceRecord;
    /// use bulkmap::mapping::{MappingBuilder, MappingSource};
    /// use bulkmap::runtime::MetaMapper;
    /// use bulkmap::FilterRegistry;
    /// use serde_json::json;
    ///
    /// let mapping = MappingBuilder::new()
    ///     .build("books", MappingSource::Ini("title = dcterms:title ~ {{ value|upper }}\n".to_string()));
    /// let mapper = MetaMapper::new(Arc::new(mapping), Arc::new(FilterRegistry::with_builtins()));
    ///
    /// let resource = mapper.convert(&SourceRecord::from_json(json!({"title": "Foo"})));
    /// assert_eq!(resource.values("dcterms:title"), vec!["FOO"]);
    /// ```
    pub fn new(mapping: Arc<Mapping>, filters: Arc<FilterRegistry>) -> Self {
        let entries = if mapping.is_valid() {
            mapping.entries().filter_map(CompiledEntry::compile).collect()
        } else {
            tracing::warn!(
                mapping = %mapping.name,
                error = mapping.has_error.as_deref().unwrap_or_default(),
                "Mapping is invalid, records will convert to empty resources"
            );
            Vec::new()
        };

        Self {
            params: mapping.params.clone(),
            mapping,
            filters,
            entries,
        }
    }

    /// Add parameters visible to patterns. They override mapping parameters of the
    /// same name.
    pub fn with_params(mut self, params: IndexMap<String, String>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn mapping(&self) -> &Mapping {
        &self.mapping
    }

    pub fn params(&self) -> &IndexMap<String, String> {
        &self.params
    }

    /// Convert one record: default entries first, then map entries.
    pub fn convert(&self, record: &SourceRecord) -> TargetResource {
        let mut resource = TargetResource::new();
        let mut context = ConversionContext::new(record, &self.params);
        let env = RenderEnv {
            filters: &self.filters,
            tables: &self.mapping.tables,
        };

        for compiled in &self.entries {
            let field = &compiled.entry.to.field;
            for value in self.entry_values(compiled, &mut context, &env) {
                resource.push(field.clone(), compiled.target_value(value));
            }
        }
        resource
    }

    fn entry_values(
        &self,
        compiled: &CompiledEntry,
        context: &mut ConversionContext<'_>,
        env: &RenderEnv<'_>,
    ) -> Vec<String> {
        let entry = &compiled.entry;
        let m = &entry.modifier;

        if let Some(raw) = &m.raw {
            return vec![raw.clone()];
        }
        if let Some(val) = &m.val {
            return vec![compiled.wrap(val)];
        }

        let rendered: Vec<String> = match &entry.from.path {
            Some(path) => {
                let extracted = context.query(entry.from.querier, path);
                if extracted.is_empty() {
                    return Vec::new();
                }
                context.set_entry(entry.from.querier, extracted.clone());
                match &compiled.template {
                    Some(template) => extracted
                        .into_iter()
                        .filter_map(|value| {
                            context.set_current(Some(value));
                            template.render(&*context, env)
                        })
                        .collect(),
                    None => extracted,
                }
            }
            None => {
                context.set_entry(entry.from.querier, Vec::new());
                compiled
                    .template
                    .as_ref()
                    .and_then(|template| template.render(&*context, env))
                    .into_iter()
                    .collect()
            }
        };

        let mut values: Vec<String> = Vec::with_capacity(rendered.len());
        for value in rendered {
            if value.is_empty() {
                continue;
            }
            let value = compiled.wrap(&value);
            if !values.contains(&value) {
                values.push(value);
            }
        }
        values
    }
}
