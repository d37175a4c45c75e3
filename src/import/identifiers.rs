//! Cross-record identifier tables.
//!
//! Four tables are kept for one run:
//! - `source`: row index to every identifier the row owns or references,
//! - `revert`: identifier to the rows that own or reference it,
//! - `by_index`: row index to the entity the row itself resolves to,
//! - `by_identifier`: identifier to the entity it resolves to.
//!
//! Every identifier put into `source`/`revert` gets an entry (possibly `None`) in
//! `by_identifier`, and every recorded row an entry in `by_index`.

use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeSet;
use std::fmt;

use crate::entity::{IdentifierKey, ResolvedId, ResourceKind, TargetResource};
use crate::import::config::ImportConfig;
use crate::import::gateway::{GatewayError, IdentifierMatch, PersistenceGateway};

/// Field whose numeric value is the internal id of an existing entity.
pub const INTERNAL_ID_FIELD: &str = "o:id";

/// One identifier matched several distinct stored entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateIdentifierError {
    pub key: IdentifierKey,
    pub ids: Vec<i64>,
}

impl fmt::Display for DuplicateIdentifierError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.ids.iter().map(|id| id.to_string()).collect();
        write!(f, "Identifier {} matches several resources: {}", self.key, ids.join(", "))
    }
}

impl std::error::Error for DuplicateIdentifierError {}

/// Maintains the identifier tables of one run.
#[derive(Debug, Clone, Default)]
pub struct IdentifierResolver {
    source: IndexMap<usize, Vec<IdentifierKey>>,
    revert: IndexMap<IdentifierKey, BTreeSet<usize>>,
    by_index: IndexMap<usize, Option<ResolvedId>>,
    by_identifier: IndexMap<IdentifierKey, Option<ResolvedId>>,
    owners: IndexMap<IdentifierKey, BTreeSet<usize>>,
    duplicates: IndexMap<IdentifierKey, DuplicateIdentifierError>,
    allow_duplicates: bool,
}

impl IdentifierResolver {
    pub fn new(allow_duplicates: bool) -> Self {
        Self {
            allow_duplicates,
            ..Self::default()
        }
    }

    /// Identifiers a resource declares for itself, and an internal id if it names one.
    pub fn own_identifiers(
        resource: &TargetResource,
        config: &ImportConfig,
    ) -> (Vec<IdentifierKey>, Option<ResolvedId>) {
        let mut keys = Vec::new();
        let mut known = None;
        for field in &config.identifier_names {
            for value in resource.values(field) {
                let value = value.trim();
                if value.is_empty() {
                    continue;
                }
                if field == INTERNAL_ID_FIELD {
                    if let Ok(id) = value.parse::<i64>() {
                        if known.is_none() {
                            known = Some(ResolvedId {
                                id,
                                kind: config.resource_kind,
                            });
                        }
                        continue;
                    }
                }
                let key = IdentifierKey::new(value, config.resource_kind);
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        (keys, known)
    }

    /// Record the identifiers of one converted row.
    pub fn record(&mut self, index: usize, resource: &TargetResource, config: &ImportConfig) {
        let (own, known) = Self::own_identifiers(resource, config);
        let links: Vec<IdentifierKey> = resource
            .links()
            .filter_map(|value| value.source_identifier.clone())
            .filter(|key| !key.identifier.trim().is_empty())
            .collect();

        let entry = self.source.entry(index).or_default();
        for key in own.iter().chain(links.iter()) {
            if !entry.contains(key) {
                entry.push(key.clone());
            }
        }
        for key in own.iter().chain(links.iter()) {
            self.revert.entry(key.clone()).or_default().insert(index);
            self.by_identifier.entry(key.clone()).or_insert(None);
        }
        for key in &own {
            self.owners.entry(key.clone()).or_default().insert(index);
            if let Some(id) = known {
                let slot = self.by_identifier.entry(key.clone()).or_insert(None);
                if slot.is_none() {
                    *slot = Some(id);
                }
            }
        }

        let slot = self.by_index.entry(index).or_insert(None);
        if slot.is_none() {
            *slot = known;
        }
    }

    /// Namespaces that still have unresolved identifiers.
    pub fn pending_kinds(&self) -> Vec<ResourceKind> {
        let kinds: BTreeSet<ResourceKind> = self
            .by_identifier
            .iter()
            .filter(|(key, id)| id.is_none() && !self.duplicates.contains_key(*key))
            .map(|(key, _)| key.kind)
            .collect();
        kinds.into_iter().collect()
    }

    /// Look every unresolved identifier of one namespace up in a single batch.
    ///
    /// Returns how many identifiers were resolved. With several stored matches the first
    /// exact match wins, then the first case-insensitive one. When duplicates are not
    /// allowed the identifier stays unresolved and a [`DuplicateIdentifierError`] is kept.
    pub fn resolve_batch(
        &mut self,
        kind: ResourceKind,
        gateway: &mut dyn PersistenceGateway,
    ) -> Result<usize, GatewayError> {
        let pending: IndexSet<String> = self
            .by_identifier
            .iter()
            .filter(|(key, id)| key.kind == kind && id.is_none() && !self.duplicates.contains_key(*key))
            .map(|(key, _)| key.identifier.clone())
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let requested: Vec<String> = pending.into_iter().collect();
        let matches = gateway.batch_resolve_identifiers(kind, &requested)?;

        let mut resolved = 0;
        for identifier in &requested {
            let key = IdentifierKey::new(identifier.clone(), kind);
            match self.choose(&key, &matches) {
                Ok(Some(id)) => {
                    self.set_resolved(&key, id);
                    resolved += 1;
                }
                Ok(None) => {}
                Err(duplicate) => {
                    tracing::warn!(identifier = %key, error = %duplicate, "Duplicate identifier left unresolved");
                    self.duplicates.insert(key, duplicate);
                }
            }
        }

        tracing::debug!(kind = %kind, requested = requested.len(), resolved, "Identifier batch resolved");
        Ok(resolved)
    }

    fn choose(
        &self,
        key: &IdentifierKey,
        matches: &[IdentifierMatch],
    ) -> Result<Option<ResolvedId>, DuplicateIdentifierError> {
        let candidates: Vec<&IdentifierMatch> = matches
            .iter()
            .filter(|m| m.requested == key.identifier || m.stored.eq_ignore_ascii_case(&key.identifier))
            .collect();

        let chosen = candidates
            .iter()
            .find(|m| m.stored == key.identifier)
            .or_else(|| candidates.first())
            .map(|m| m.id);
        let Some(chosen) = chosen else {
            return Ok(None);
        };

        let mut ids: Vec<i64> = Vec::new();
        for candidate in &candidates {
            if !ids.contains(&candidate.id) {
                ids.push(candidate.id);
            }
        }
        if ids.len() > 1 {
            if !self.allow_duplicates {
                return Err(DuplicateIdentifierError { key: key.clone(), ids });
            }
            for other in ids.iter().filter(|id| **id != chosen) {
                tracing::warn!(identifier = %key, chosen, ignored = *other, "Duplicate identifier, keeping the first match");
            }
        }
        Ok(Some(ResolvedId { id: chosen, kind: key.kind }))
    }

    fn set_resolved(&mut self, key: &IdentifierKey, id: ResolvedId) {
        self.by_identifier.insert(key.clone(), Some(id));
        if let Some(owners) = self.owners.get(key) {
            for index in owners {
                let slot = self.by_index.entry(*index).or_insert(None);
                if slot.is_none() {
                    *slot = Some(id);
                }
            }
        }
    }

    /// Record the entity a row was committed as, so later rows can link to it.
    pub fn register_created(&mut self, index: usize, id: ResolvedId) {
        self.by_index.insert(index, Some(id));
        let owned: Vec<IdentifierKey> = self
            .source
            .get(&index)
            .map(|keys| {
                keys.iter()
                    .filter(|key| self.is_owned_by(key, index))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        for key in owned {
            if self.duplicates.contains_key(&key) {
                continue;
            }
            let slot = self.by_identifier.entry(key).or_insert(None);
            if slot.is_none() {
                *slot = Some(id);
            }
        }
    }

    /// Fill `resolved_id` on every link of a resource that can be resolved.
    ///
    /// Returns the links left unresolved.
    pub fn resolve_links(&self, resource: &mut TargetResource) -> Vec<IdentifierKey> {
        let mut unresolved = Vec::new();
        for value in resource.values_mut() {
            let Some(key) = value.source_identifier.clone() else {
                continue;
            };
            match self.resolved(&key) {
                Some(id) => value.resolved_id = Some(id.id),
                None => unresolved.push(key),
            }
        }
        unresolved
    }

    /// Identifiers referenced before the row that owns them, and still unresolved,
    /// paired with that owning row.
    pub fn forward_references(&self) -> Vec<(IdentifierKey, usize)> {
        let mut forward = Vec::new();
        for (key, rows) in &self.revert {
            if self.resolved(key).is_some() || self.duplicates.contains_key(key) {
                continue;
            }
            let Some(owner) = self.owners.get(key).and_then(|owners| owners.first().copied()) else {
                continue;
            };
            let first_reference = rows.iter().find(|row| !self.is_owned_by(key, **row));
            if matches!(first_reference, Some(row) if *row < owner) {
                forward.push((key.clone(), owner));
            }
        }
        forward
    }

    pub fn resolved(&self, key: &IdentifierKey) -> Option<ResolvedId> {
        self.by_identifier.get(key).copied().flatten()
    }

    pub fn resolved_row(&self, index: usize) -> Option<ResolvedId> {
        self.by_index.get(&index).copied().flatten()
    }

    pub fn is_owned_by(&self, key: &IdentifierKey, index: usize) -> bool {
        self.owners.get(key).is_some_and(|owners| owners.contains(&index))
    }

    /// Whether some row of the run declares this identifier as its own.
    pub fn is_owned(&self, key: &IdentifierKey) -> bool {
        self.owners.get(key).is_some_and(|owners| !owners.is_empty())
    }

    pub fn owner_of(&self, key: &IdentifierKey) -> Option<usize> {
        self.owners.get(key).and_then(|owners| owners.first().copied())
    }

    pub fn duplicate(&self, key: &IdentifierKey) -> Option<&DuplicateIdentifierError> {
        self.duplicates.get(key)
    }

    pub fn duplicates(&self) -> impl Iterator<Item = &DuplicateIdentifierError> {
        self.duplicates.values()
    }

    pub fn identifiers_of(&self, index: usize) -> &[IdentifierKey] {
        self.source.get(&index).map(|keys| keys.as_slice()).unwrap_or(&[])
    }

    pub fn rows_of(&self, key: &IdentifierKey) -> Vec<usize> {
        self.revert
            .get(key)
            .map(|rows| rows.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn by_identifier(&self) -> &IndexMap<IdentifierKey, Option<ResolvedId>> {
        &self.by_identifier
    }

    pub fn by_index(&self) -> &IndexMap<usize, Option<ResolvedId>> {
        &self.by_index
    }

    /// `by_identifier` keyed by the `identifier§kind` notation, resolved ids only.
    pub fn resolved_notation(&self) -> IndexMap<String, String> {
        self.by_identifier
            .iter()
            .filter_map(|(key, id)| id.map(|id| (key.to_string(), id.to_string())))
            .collect()
    }

    pub fn clear(&mut self) {
        let allow_duplicates = self.allow_duplicates;
        *self = Self::new(allow_duplicates);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntityRef, TargetValue};

    struct Lookup {
        stored: Vec<(&'static str, i64)>,
        calls: usize,
    }

    impl PersistenceGateway for Lookup {
        fn batch_resolve_identifiers(
            &mut self,
            _kind: ResourceKind,
            identifiers: &[String],
        ) -> Result<Vec<IdentifierMatch>, GatewayError> {
            self.calls += 1;
            let mut matches = Vec::new();
            for requested in identifiers {
                for (stored, id) in &self.stored {
                    if stored.eq_ignore_ascii_case(requested) {
                        matches.push(IdentifierMatch {
                            requested: requested.clone(),
                            stored: stored.to_string(),
                            id: *id,
                        });
                    }
                }
            }
            Ok(matches)
        }

        fn create(&mut self, kind: ResourceKind, _: &TargetResource) -> Result<EntityRef, GatewayError> {
            Ok(EntityRef { id: 0, kind })
        }

        fn update(&mut self, entity: ResolvedId, _: &TargetResource) -> Result<EntityRef, GatewayError> {
            Ok(EntityRef { id: entity.id, kind: entity.kind })
        }

        fn delete(&mut self, entity: ResolvedId) -> Result<EntityRef, GatewayError> {
            Ok(EntityRef { id: entity.id, kind: entity.kind })
        }

        fn flush(&mut self) -> Result<(), GatewayError> {
            Ok(())
        }

        fn clear(&mut self) {}
    }

    fn row(id: &str, link: Option<&str>) -> TargetResource {
        let mut resource = TargetResource::new().with_literal("dcterms:identifier", id);
        if let Some(link) = link {
            let mut value = TargetValue::literal(link);
            value.datatypes = vec!["resource".to_string()];
            value.source_identifier = Some(IdentifierKey::new(link, ResourceKind::Resources));
            resource.push("dcterms:relation", value);
        }
        resource
    }

    fn key(id: &str) -> IdentifierKey {
        IdentifierKey::new(id, ResourceKind::Resources)
    }

    #[test]
    fn test_record_fills_every_table() {
        let config = ImportConfig::default();
        let mut resolver = IdentifierResolver::new(false);

        resolver.record(1, &row("A1", None), &config);
        resolver.record(2, &row("A2", Some("A1")), &config);

        assert_eq!(resolver.identifiers_of(2), &[key("A2"), key("A1")]);
        assert_eq!(resolver.rows_of(&key("A1")), vec![1, 2]);
        assert_eq!(resolver.by_identifier().len(), 2);
        assert_eq!(resolver.by_index().len(), 2);
        assert!(resolver.by_identifier().values().all(|id| id.is_none()));
        assert_eq!(resolver.owner_of(&key("A1")), Some(1));
        assert!(!resolver.is_owned_by(&key("A1"), 2));
    }

    #[test]
    fn test_numeric_internal_id_is_known() {
        let config = ImportConfig::default();
        let mut resolver = IdentifierResolver::new(false);
        let resource = TargetResource::new()
            .with_literal("o:id", "42")
            .with_literal("dcterms:identifier", "B7");

        resolver.record(1, &resource, &config);

        let id = ResolvedId { id: 42, kind: ResourceKind::Resources };
        assert_eq!(resolver.resolved_row(1), Some(id));
        assert_eq!(resolver.resolved(&key("B7")), Some(id));
    }

    #[test]
    fn test_resolve_batch_propagates_to_rows() {
        let config = ImportConfig::default();
        let mut resolver = IdentifierResolver::new(false);
        let mut gateway = Lookup { stored: vec![("X1", 10)], calls: 0 };

        resolver.record(1, &row("X1", None), &config);
        resolver.record(2, &row("B", Some("X1")), &config);

        assert_eq!(resolver.pending_kinds(), vec![ResourceKind::Resources]);
        assert_eq!(resolver.resolve_batch(ResourceKind::Resources, &mut gateway).unwrap(), 1);
        assert_eq!(gateway.calls, 1);
        assert_eq!(resolver.resolved_notation()["X1§resources"], "10§resources");
        assert_eq!(resolver.resolved_row(1).map(|id| id.id), Some(10));
        assert_eq!(resolver.resolved_row(2), None);

        let mut linking = row("B", Some("X1"));
        assert!(resolver.resolve_links(&mut linking).is_empty());
        assert_eq!(linking.get("dcterms:relation")[0].resolved_id, Some(10));
    }

    #[test]
    fn test_duplicate_tie_break() {
        let config = ImportConfig::default();
        let stored = vec![("x1", 5), ("X1", 6), ("x1", 7)];

        let mut lenient = IdentifierResolver::new(true);
        lenient.record(1, &row("X1", None), &config);
        lenient
            .resolve_batch(ResourceKind::Resources, &mut Lookup { stored: stored.clone(), calls: 0 })
            .unwrap();
        assert_eq!(lenient.resolved(&key("X1")).map(|id| id.id), Some(6));

        let mut lenient_ci = IdentifierResolver::new(true);
        lenient_ci.record(1, &row("X2", None), &config);
        lenient_ci
            .resolve_batch(
                ResourceKind::Resources,
                &mut Lookup { stored: vec![("x2", 8), ("X2 ", 9)], calls: 0 },
            )
            .unwrap();
        assert_eq!(lenient_ci.resolved(&key("X2")).map(|id| id.id), Some(8));

        let mut strict = IdentifierResolver::new(false);
        strict.record(1, &row("X1", None), &config);
        strict
            .resolve_batch(ResourceKind::Resources, &mut Lookup { stored, calls: 0 })
            .unwrap();
        assert_eq!(strict.resolved(&key("X1")), None);
        assert_eq!(strict.duplicate(&key("X1")).unwrap().ids, vec![5, 6, 7]);
        assert!(strict.pending_kinds().is_empty());
    }

    #[test]
    fn test_forward_references_and_register_created() {
        let config = ImportConfig::default();
        let mut resolver = IdentifierResolver::new(false);

        resolver.record(1, &row("B", Some("A")), &config);
        resolver.record(2, &row("A", None), &config);
        resolver.record(3, &row("C", Some("B")), &config);

        assert_eq!(resolver.forward_references(), vec![(key("A"), 2)]);

        let created = ResolvedId { id: 3, kind: ResourceKind::Resources };
        resolver.register_created(2, created);
        assert_eq!(resolver.resolved(&key("A")), Some(created));
        assert!(resolver.forward_references().is_empty());
    }
}
