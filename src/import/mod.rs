//! Three-pass import of converted records.
//!
//! 1. **Listing**: convert every record of the window and record its identifiers, then
//!    look unresolved identifiers up in storage, one batch per namespace.
//! 2. **Checking**: convert again, validate, and store one checkpoint per row.
//! 3. **Committing**: persist the rows whose checkpoint is valid, resolving links to
//!    rows created earlier in the same pass.
//!
//! Persistence, checkpoints and sources are collaborators behind traits; in-memory
//! implementations are provided for tests and the CLI.

pub mod cancel;
pub mod checklog;
pub mod config;
pub mod gateway;
pub mod identifiers;
pub mod memory;
pub mod orchestrator;
pub mod reader;
pub mod state;
pub mod validation;

use std::fmt;

pub use cancel::{Cancellation, CancellationToken, NeverCancel};
pub use checklog::{CheckLog, CheckLogError, CheckStatus, Checkpoint, JsonlCheckLog, MemoryCheckLog};
pub use config::{FailurePolicy, ImportAction, ImportConfig};
pub use gateway::{GatewayError, IdentifierMatch, PersistenceGateway};
pub use identifiers::{DuplicateIdentifierError, IdentifierResolver};
pub use memory::MemoryGateway;
pub use orchestrator::{ImportOrchestrator, ImportReport};
pub use reader::{Parametrizable, SourceReader, VecReader};
pub use state::{PassSummary, RunPhase, RunState, Window};
pub use validation::{Message, MessageStore, ResourceValidator, Severity};

/// Error type for import runs
///
/// Per-row problems never show up here: they are counted and stored in checkpoints.
#[derive(Debug)]
pub enum ImportError {
    IllegalTransition { from: RunPhase, to: RunPhase },
    InvalidMapping { name: String, reason: String },
    Gateway(GatewayError),
    CheckLog(CheckLogError),
}

impl fmt::Display for ImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportError::IllegalTransition { from, to } => {
                write!(f, "Cannot go from phase {} to {}", from, to)
            }
            ImportError::InvalidMapping { name, reason } => {
                write!(f, "Mapping '{}' is invalid: {}", name, reason)
            }
            ImportError::Gateway(err) => write!(f, "{}", err),
            ImportError::CheckLog(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ImportError {}

impl From<GatewayError> for ImportError {
    fn from(err: GatewayError) -> Self {
        ImportError::Gateway(err)
    }
}

impl From<CheckLogError> for ImportError {
    fn from(err: CheckLogError) -> Self {
        ImportError::CheckLog(err)
    }
}
