//! In-memory persistence gateway.

use indexmap::IndexMap;

use crate::entity::{EntityRef, ResolvedId, ResourceKind, TargetResource};
use crate::import::gateway::{GatewayError, IdentifierMatch, PersistenceGateway};

/// Stores entities in memory, indexing them by the values of identifier fields.
#[derive(Debug, Clone)]
pub struct MemoryGateway {
    identifier_names: Vec<String>,
    entities: IndexMap<(ResourceKind, i64), TargetResource>,
    next_id: i64,
    /// Entities written since the last flush.
    pending: usize,
    pub lookups: usize,
    pub flushes: usize,
    pub clears: usize,
}

impl MemoryGateway {
    pub fn new(identifier_names: Vec<String>) -> Self {
        Self {
            identifier_names,
            entities: IndexMap::new(),
            next_id: 1,
            pending: 0,
            lookups: 0,
            flushes: 0,
            clears: 0,
        }
    }

    /// Store an entity as if it existed before the run.
    pub fn with_entity(mut self, kind: ResourceKind, resource: TargetResource) -> Self {
        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert((kind, id), resource);
        self
    }

    pub fn get(&self, kind: ResourceKind, id: i64) -> Option<&TargetResource> {
        self.entities.get(&(kind, id))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn entities(&self) -> impl Iterator<Item = (ResolvedId, &TargetResource)> {
        self.entities
            .iter()
            .map(|((kind, id), resource)| (ResolvedId { id: *id, kind: *kind }, resource))
    }

    /// First entity of a kind carrying this identifier exactly.
    pub fn find(&self, kind: ResourceKind, identifier: &str) -> Option<(i64, &TargetResource)> {
        self.entities.iter().find_map(|((k, id), resource)| {
            let matches = *k == kind
                && self
                    .identifier_names
                    .iter()
                    .any(|name| resource.values(name).contains(&identifier));
            matches.then_some((*id, resource))
        })
    }
}

impl PersistenceGateway for MemoryGateway {
    fn batch_resolve_identifiers(
        &mut self,
        kind: ResourceKind,
        identifiers: &[String],
    ) -> Result<Vec<IdentifierMatch>, GatewayError> {
        self.lookups += 1;
        let mut matches = Vec::new();
        for requested in identifiers {
            for ((k, id), resource) in &self.entities {
                if *k != kind {
                    continue;
                }
                for name in &self.identifier_names {
                    for stored in resource.values(name) {
                        if stored.eq_ignore_ascii_case(requested) {
                            matches.push(IdentifierMatch {
                                requested: requested.clone(),
                                stored: stored.to_string(),
                                id: *id,
                            });
                        }
                    }
                }
            }
        }
        Ok(matches)
    }

    fn create(&mut self, kind: ResourceKind, resource: &TargetResource) -> Result<EntityRef, GatewayError> {
        if resource.is_empty() {
            return Err(GatewayError::Rejected("empty resource".to_string()));
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entities.insert((kind, id), resource.clone());
        self.pending += 1;
        Ok(EntityRef { id, kind })
    }

    fn update(&mut self, entity: ResolvedId, resource: &TargetResource) -> Result<EntityRef, GatewayError> {
        let stored = self
            .entities
            .get_mut(&(entity.kind, entity.id))
            .ok_or(GatewayError::NotFound(entity))?;
        for (field, values) in resource.iter() {
            stored.remove(field);
            for value in values {
                stored.push(field.clone(), value.clone());
            }
        }
        self.pending += 1;
        Ok(EntityRef {
            id: entity.id,
            kind: entity.kind,
        })
    }

    fn delete(&mut self, entity: ResolvedId) -> Result<EntityRef, GatewayError> {
        self.entities
            .shift_remove(&(entity.kind, entity.id))
            .ok_or(GatewayError::NotFound(entity))?;
        self.pending += 1;
        Ok(EntityRef {
            id: entity.id,
            kind: entity.kind,
        })
    }

    fn flush(&mut self) -> Result<(), GatewayError> {
        if self.pending > 0 {
            self.flushes += 1;
            self.pending = 0;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.clears += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gateway() -> MemoryGateway {
        MemoryGateway::new(vec!["dcterms:identifier".to_string()])
    }

    #[test]
    fn test_create_update_delete() {
        let mut gateway = gateway();
        let kind = ResourceKind::Resources;

        let created = gateway
            .create(kind, &TargetResource::new().with_literal("dcterms:title", "Foo"))
            .unwrap();
        let id = ResolvedId::from(created);
        gateway
            .update(id, &TargetResource::new().with_literal("dcterms:title", "Bar"))
            .unwrap();
        assert_eq!(gateway.get(kind, created.id).unwrap().values("dcterms:title"), vec!["Bar"]);

        gateway.delete(id).unwrap();
        assert!(gateway.is_empty());
        assert!(matches!(gateway.delete(id), Err(GatewayError::NotFound(_))));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut gateway = gateway()
            .with_entity(
                ResourceKind::Resources,
                TargetResource::new().with_literal("dcterms:identifier", "x1"),
            )
            .with_entity(
                ResourceKind::Assets,
                TargetResource::new().with_literal("dcterms:identifier", "X1"),
            );

        let matches = gateway
            .batch_resolve_identifiers(ResourceKind::Resources, &["X1".to_string()])
            .unwrap();

        assert_eq!(
            matches,
            vec![IdentifierMatch {
                requested: "X1".to_string(),
                stored: "x1".to_string(),
                id: 1
            }]
        );
        assert_eq!(gateway.lookups, 1);
    }

    #[test]
    fn test_flush_counts_batches() {
        let mut gateway = gateway();
        gateway.flush().unwrap();
        assert_eq!(gateway.flushes, 0);

        gateway
            .create(ResourceKind::Resources, &TargetResource::new().with_literal("a", "b"))
            .unwrap();
        gateway.flush().unwrap();
        assert_eq!(gateway.flushes, 1);
    }
}
