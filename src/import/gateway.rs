//! Persistence collaborator used by the import passes.

use std::fmt;

use crate::entity::{EntityRef, ResolvedId, ResourceKind, TargetResource};

/// A persisted entity whose identifier matched a looked-up identifier, possibly only
/// case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierMatch {
    /// The identifier as requested.
    pub requested: String,
    /// The identifier as stored.
    pub stored: String,
    pub id: i64,
}

/// Creates, updates and deletes entities and looks identifiers up in storage.
///
/// Used with at most one batch in flight: the orchestrator calls `flush` then `clear`
/// every `batch_size` committed rows.
pub trait PersistenceGateway {
    /// Look identifiers up, returning every stored entity whose identifier matches one
    /// of them case-insensitively.
    fn batch_resolve_identifiers(
        &mut self,
        kind: ResourceKind,
        identifiers: &[String],
    ) -> Result<Vec<IdentifierMatch>, GatewayError>;

    fn create(&mut self, kind: ResourceKind, resource: &TargetResource) -> Result<EntityRef, GatewayError>;

    fn update(&mut self, entity: ResolvedId, resource: &TargetResource) -> Result<EntityRef, GatewayError>;

    fn delete(&mut self, entity: ResolvedId) -> Result<EntityRef, GatewayError>;

    fn flush(&mut self) -> Result<(), GatewayError>;

    fn clear(&mut self);
}

/// Error type for persistence calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    Lookup(String),
    NotFound(ResolvedId),
    Rejected(String),
    Flush(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Lookup(msg) => write!(f, "Identifier lookup failed: {}", msg),
            GatewayError::NotFound(id) => write!(f, "Entity {} not found", id),
            GatewayError::Rejected(msg) => write!(f, "Entity rejected: {}", msg),
            GatewayError::Flush(msg) => write!(f, "Flush failed: {}", msg),
        }
    }
}

impl std::error::Error for GatewayError {}
