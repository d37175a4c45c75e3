//! # bulkmap: declarative record mapping and bulk import
//!
//! bulkmap converts heterogeneous source records (JSON-like maps or XML documents)
//! into target resources, following a mapping written as ini lines, XML or a
//! structured list, and imports them in three resumable passes.
//!
//! ## Features
//!
//! - **Path queries**: dot paths, JMESPath, JSONPath, XPath and flat index lookups
//! - **Templates**: `{{ value|trim|upper }}` patterns with a registry of filters
//! - **Mappings**: ini, XML and structured forms normalized to one entry model,
//!   with includes, parameters and lookup tables
//! - **Bulk import**: listing, checking and committing passes with identifier
//!   resolution, forward references and checkpoints
//!
//! ## Example: mapping a record
//!
//! ```ini
//! [params]
//! site = Archive
//!
//! [maps]
//! title = dcterms:title @fr
//! creator.name = dcterms:creator ~ {{ value|title }}
//! item = o:item ^^resource
//!
//! [default]
//! dcterms:publisher = ~ {{ params.site }}
//! ```

// Core modules
pub mod entity;
pub mod extraction;
pub mod serialization;
pub mod transform_registry;

// Mapping language and templates
pub mod mapping;
pub mod template;

// Conversion runtime
pub mod runtime;

// Three-pass import
pub mod import;

// Re-export key types
pub use entity::{IdentifierKey, ResolvedId, ResourceKind, SourceRecord, TargetResource, TargetValue};
pub use extraction::{FieldPath, Querier, QueryError, RecordView};
pub use transform_registry::{FilterEnv, FilterError, FilterRegistry, FilterValue};

pub use mapping::{Mapping, MappingBuilder, MappingCache, MappingEntry, MappingSource};
pub use template::{RenderEnv, Scope, Template, TemplateError};

pub use runtime::{ConversionContext, MetaMapper};

pub use import::{
    FailurePolicy, ImportAction, ImportConfig, ImportError, ImportOrchestrator, ImportReport,
    PersistenceGateway, RunPhase, SourceReader,
};
