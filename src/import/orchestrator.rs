//! Drives the listing, checking and committing passes of one import run.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::entity::{ResolvedId, SourceRecord, TargetResource};
use crate::import::cancel::{Cancellation, NeverCancel};
use crate::import::checklog::{CheckLog, CheckStatus, Checkpoint};
use crate::import::config::{FailurePolicy, ImportAction, ImportConfig};
use crate::import::gateway::PersistenceGateway;
use crate::import::identifiers::{IdentifierResolver, INTERNAL_ID_FIELD};
use crate::import::reader::SourceReader;
use crate::import::state::{PassSummary, RunPhase, RunState, WindowPosition};
use crate::import::validation::{MessageStore, ResourceValidator, Severity};
use crate::import::ImportError;
use crate::runtime::MetaMapper;

/// Shown when a run stops after finding errors during the checking pass.
pub const NO_SOURCE_IMPORTED: &str = "Errors were found while checking, so no source was imported";

static NEVER: NeverCancel = NeverCancel;

/// How one row ended in a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Done,
    Empty,
    Error,
    Skipped,
}

impl From<CheckStatus> for RowOutcome {
    fn from(status: CheckStatus) -> Self {
        match status {
            CheckStatus::Ok => RowOutcome::Done,
            CheckStatus::Error => RowOutcome::Error,
            CheckStatus::Empty => RowOutcome::Empty,
            CheckStatus::Skipped => RowOutcome::Skipped,
        }
    }
}

/// Outcome of a run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub run_id: Uuid,
    pub phase: RunPhase,
    pub policy: FailurePolicy,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub passes: Vec<PassSummary>,
    /// Rows created, updated or deleted.
    pub committed: usize,
    pub placeholders: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl ImportReport {
    fn new(run_id: Uuid, policy: FailurePolicy) -> Self {
        Self {
            run_id,
            phase: RunPhase::Init,
            policy,
            started_at: Utc::now(),
            finished_at: None,
            passes: Vec::new(),
            committed: 0,
            placeholders: 0,
            notice: None,
        }
    }

    pub fn pass(&self, phase: RunPhase) -> Option<&PassSummary> {
        self.passes.iter().find(|summary| summary.phase == phase)
    }
}

/// Runs one import: one mapper, one reader, one gateway and one check log.
pub struct ImportOrchestrator<'a> {
    config: ImportConfig,
    mapper: MetaMapper,
    reader: &'a dyn SourceReader,
    gateway: &'a mut dyn PersistenceGateway,
    check_log: &'a mut dyn CheckLog,
    cancellation: &'a dyn Cancellation,
    resolver: IdentifierResolver,
    state: RunState,
    run_id: Uuid,
    placeholders: HashMap<usize, ResolvedId>,
    committed: usize,
    unflushed: usize,
}

impl<'a> ImportOrchestrator<'a> {
    /// Create an orchestrator. Parameters of a [`Parametrizable`](crate::import::Parametrizable)
    /// reader are made visible to the mapping patterns.
    pub fn new(
        config: ImportConfig,
        mapper: MetaMapper,
        reader: &'a dyn SourceReader,
        gateway: &'a mut dyn PersistenceGateway,
        check_log: &'a mut dyn CheckLog,
    ) -> Self {
        let mapper = match reader.as_parametrizable() {
            Some(parametrizable) => mapper.with_params(parametrizable.params()),
            None => mapper,
        };

        Self {
            resolver: IdentifierResolver::new(config.allow_duplicate_identifiers),
            state: RunState::new(&config),
            config,
            mapper,
            reader,
            gateway,
            check_log,
            cancellation: &NEVER,
            run_id: Uuid::new_v4(),
            placeholders: HashMap::new(),
            committed: 0,
            unflushed: 0,
        }
    }

    pub fn with_cancellation(mut self, cancellation: &'a dyn Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn resolver(&self) -> &IdentifierResolver {
        &self.resolver
    }

    /// Run all passes the failure policy allows.
    pub fn run(&mut self) -> Result<ImportReport, ImportError> {
        self.ensure_mapping()?;
        let mut report = ImportReport::new(self.run_id, self.config.failure_policy);
        tracing::info!(
            run_id = %self.run_id,
            mapping = %self.mapper.mapping().label(),
            records = self.reader.count(),
            policy = self.config.failure_policy.as_str(),
            "Import started"
        );

        self.check_log.purge()?;

        let listing = self.listing_pass()?;
        report.passes.push(listing);
        if listing.cancelled {
            return self.finish(report, RunPhase::Aborted);
        }

        let checking = self.checking_pass()?;
        report.passes.push(checking);
        if checking.cancelled {
            return self.finish(report, RunPhase::Aborted);
        }

        match self.config.failure_policy {
            FailurePolicy::DryRun => return self.finish(report, RunPhase::DryRunDone),
            FailurePolicy::StopOnError if checking.errors > 0 => {
                report.notice = Some(NO_SOURCE_IMPORTED.to_string());
                return self.finish(report, RunPhase::StoppedOnError);
            }
            _ => {}
        }

        let committing = self.committing_pass()?;
        report.passes.push(committing);
        let phase = if committing.cancelled {
            RunPhase::Aborted
        } else {
            RunPhase::Done
        };
        self.finish(report, phase)
    }

    /// Commit from the checkpoints of an earlier run, in a new process.
    ///
    /// The identifier tables are rebuilt with a listing pass first; the checking pass is
    /// not repeated.
    pub fn resume_commit(&mut self) -> Result<ImportReport, ImportError> {
        self.ensure_mapping()?;
        let mut report = ImportReport::new(self.run_id, self.config.failure_policy);
        tracing::info!(
            run_id = %self.run_id,
            checkpoints = self.check_log.len(),
            "Resuming import at the commit pass"
        );

        let listing = self.listing_pass()?;
        report.passes.push(listing);
        if listing.cancelled {
            return self.finish(report, RunPhase::Aborted);
        }

        let committing = self.committing_pass()?;
        report.passes.push(committing);
        let phase = if committing.cancelled {
            RunPhase::Aborted
        } else {
            RunPhase::Done
        };
        self.finish(report, phase)
    }

    fn ensure_mapping(&self) -> Result<(), ImportError> {
        let mapping = self.mapper.mapping();
        match &mapping.has_error {
            Some(reason) => Err(ImportError::InvalidMapping {
                name: mapping.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn finish(&mut self, mut report: ImportReport, phase: RunPhase) -> Result<ImportReport, ImportError> {
        if phase == RunPhase::Aborted && report.notice.is_none() {
            report.notice = Some(format!(
                "Import cancelled during the {} pass after {} of {} rows",
                self.state.phase(),
                self.state.total_processed,
                self.state.total_to_process
            ));
        }
        self.state.transition(phase)?;
        report.phase = phase;
        report.committed = self.committed;
        report.placeholders = self.placeholders.len();
        report.finished_at = Some(Utc::now());

        for pass in &report.passes {
            tracing::info!(
                run_id = %self.run_id,
                pass = %pass.phase,
                processed = pass.processed,
                skipped = pass.skipped,
                empty = pass.empty,
                errors = pass.errors,
                "Pass totals"
            );
        }
        match phase {
            RunPhase::StoppedOnError => tracing::warn!(run_id = %self.run_id, "{}", NO_SOURCE_IMPORTED),
            RunPhase::Aborted => {
                let notice = report.notice.as_deref().unwrap_or_default();
                tracing::warn!(run_id = %self.run_id, "{}", notice)
            }
            _ => {}
        }
        tracing::info!(
            run_id = %self.run_id,
            phase = %phase,
            committed = report.committed,
            placeholders = report.placeholders,
            "Import finished"
        );
        Ok(report)
    }

    fn begin_pass(&mut self, phase: RunPhase) -> Result<(), ImportError> {
        self.state.start_pass(phase, self.reader.count())?;
        tracing::info!(
            run_id = %self.run_id,
            pass = %phase,
            to_process = self.state.total_to_process,
            "Pass started"
        );
        Ok(())
    }

    /// Visit the records of the window in source order, polling for cancellation
    /// before each one.
    fn visit_records<F>(&mut self, mut visit: F) -> Result<PassSummary, ImportError>
    where
        F: FnMut(&mut Self, usize, SourceRecord) -> Result<RowOutcome, ImportError>,
    {
        let reader = self.reader;
        let window = self.state.window();
        let mut cancelled = false;
        let end = window.end().unwrap_or(usize::MAX);

        for (position, record) in reader.records().take(end).enumerate() {
            let index = position + 1;
            self.state.current_entry_index = index;

            if self.cancellation.is_cancelled() {
                cancelled = true;
                tracing::warn!(
                    run_id = %self.run_id,
                    pass = %self.state.phase(),
                    index,
                    processed = self.state.total_processed,
                    to_process = self.state.total_to_process,
                    "Cancellation requested, stopping the pass"
                );
                break;
            }

            match window.position(index) {
                WindowPosition::Before => {
                    self.state.total_skipped += 1;
                    continue;
                }
                WindowPosition::After => break,
                WindowPosition::Inside => {}
            }

            self.state.index_resource += 1;
            let outcome = visit(self, index, record)?;
            self.state.total_processed += 1;
            match outcome {
                RowOutcome::Done => {}
                RowOutcome::Empty => self.state.total_empty += 1,
                RowOutcome::Error => self.state.total_errors += 1,
                RowOutcome::Skipped => self.state.total_skipped += 1,
            }

            if self.state.total_processed % self.config.progress_every.max(1) == 0 {
                tracing::info!(
                    run_id = %self.run_id,
                    pass = %self.state.phase(),
                    processed = self.state.total_processed,
                    to_process = self.state.total_to_process,
                    skipped = self.state.total_skipped,
                    empty = self.state.total_empty,
                    errors = self.state.total_errors,
                    "Progress"
                );
            }
        }

        Ok(self.state.summary(cancelled))
    }

    fn listing_pass(&mut self) -> Result<PassSummary, ImportError> {
        self.begin_pass(RunPhase::Listing)?;
        let summary = self.visit_records(Self::list_row)?;
        if summary.cancelled {
            return Ok(summary);
        }

        for kind in self.resolver.pending_kinds() {
            let resolved = self.resolver.resolve_batch(kind, &mut *self.gateway)?;
            tracing::info!(run_id = %self.run_id, kind = %kind, resolved, "Identifiers resolved from storage");
        }
        Ok(summary)
    }

    fn list_row(&mut self, index: usize, record: SourceRecord) -> Result<RowOutcome, ImportError> {
        let resource = self.mapper.convert(&record);
        if resource.is_empty() {
            tracing::debug!(run_id = %self.run_id, index, "Row converted to an empty resource");
            return Ok(RowOutcome::Empty);
        }
        self.resolver.record(index, &resource, &self.config);
        Ok(RowOutcome::Done)
    }

    fn checking_pass(&mut self) -> Result<PassSummary, ImportError> {
        self.begin_pass(RunPhase::Checking)?;
        self.visit_records(Self::check_row)
    }

    fn check_row(&mut self, index: usize, record: SourceRecord) -> Result<RowOutcome, ImportError> {
        let resource = self.mapper.convert(&record);

        let (status, messages) = if resource.is_empty() {
            (CheckStatus::Empty, MessageStore::new())
        } else {
            let validation = ResourceValidator::new(&self.config, &self.resolver).validate(index, &resource);
            for message in validation.messages.iter() {
                match message.severity {
                    Severity::Error => {
                        tracing::warn!(run_id = %self.run_id, index, message = %message, "Row is invalid")
                    }
                    _ => tracing::debug!(run_id = %self.run_id, index, message = %message, "Row check"),
                }
            }
            let status = if validation.messages.has_errors() {
                CheckStatus::Error
            } else if validation.skip_row {
                CheckStatus::Skipped
            } else {
                CheckStatus::Ok
            };
            (status, validation.messages)
        };

        self.check_log.store_checkpoint(Checkpoint {
            index,
            status,
            resource,
            messages,
        })?;
        Ok(status.into())
    }

    fn committing_pass(&mut self) -> Result<PassSummary, ImportError> {
        self.begin_pass(RunPhase::Committing)?;
        if self.config.action == ImportAction::Create && !self.create_placeholders()? {
            self.flush()?;
            return Ok(self.state.summary(true));
        }

        let summary = self.visit_records(Self::commit_row)?;
        if self.unflushed > 0 {
            self.flush()?;
        }
        Ok(summary)
    }

    /// Create minimal resources for identifiers referenced before the row owning them,
    /// so the referencing rows can link to them. The owning row then updates its
    /// placeholder.
    ///
    /// Returns false when cancelled before every placeholder was created.
    fn create_placeholders(&mut self) -> Result<bool, ImportError> {
        let field = self
            .config
            .identifier_names
            .iter()
            .find(|name| name.as_str() != INTERNAL_ID_FIELD)
            .cloned()
            .unwrap_or_else(|| "dcterms:identifier".to_string());

        for (key, owner) in self.resolver.forward_references() {
            if self.cancellation.is_cancelled() {
                tracing::warn!(
                    run_id = %self.run_id,
                    placeholders = self.placeholders.len(),
                    "Cancellation requested while creating placeholders"
                );
                return Ok(false);
            }

            let owner_ok = self
                .check_log
                .load_checkpoint(owner)?
                .is_some_and(|checkpoint| checkpoint.status == CheckStatus::Ok);
            if !owner_ok {
                continue;
            }

            let placeholder = TargetResource::new().with_literal(field.clone(), key.identifier.clone());
            match self.gateway.create(key.kind, &placeholder) {
                Ok(entity) => {
                    let id = ResolvedId::from(entity);
                    self.resolver.register_created(owner, id);
                    self.placeholders.insert(owner, id);
                    tracing::debug!(run_id = %self.run_id, identifier = %key, id = %id, owner, "Placeholder created");
                }
                Err(err) => {
                    tracing::warn!(run_id = %self.run_id, identifier = %key, error = %err, "Placeholder not created")
                }
            }
        }
        Ok(true)
    }

    fn commit_row(&mut self, index: usize, _record: SourceRecord) -> Result<RowOutcome, ImportError> {
        let Some(checkpoint) = self.check_log.load_checkpoint(index)? else {
            tracing::warn!(run_id = %self.run_id, index, "No checkpoint for row, not committed");
            return Ok(RowOutcome::Error);
        };
        if checkpoint.status != CheckStatus::Ok {
            return Ok(checkpoint.status.into());
        }

        let mut resource = checkpoint.resource;
        let unresolved = self.resolver.resolve_links(&mut resource);
        if !unresolved.is_empty() && !demote_unresolved_links(&mut resource) {
            let identifiers: Vec<String> = unresolved.iter().map(|key| key.to_string()).collect();
            tracing::error!(
                run_id = %self.run_id,
                index,
                identifiers = %identifiers.join(", "),
                "Row links to unresolved resources"
            );
            return Ok(RowOutcome::Error);
        }

        let kind = self.config.resource_kind;
        let result = match self.config.action {
            ImportAction::Skip => return Ok(RowOutcome::Done),
            ImportAction::Create => match self.placeholders.get(&index) {
                Some(id) => self.gateway.update(*id, &resource),
                None => self.gateway.create(kind, &resource),
            },
            ImportAction::Update | ImportAction::Delete => {
                let Some(id) = self.resolver.resolved_row(index) else {
                    tracing::error!(run_id = %self.run_id, index, "No existing resource to change");
                    return Ok(RowOutcome::Error);
                };
                if self.config.action == ImportAction::Update {
                    self.gateway.update(id, &resource)
                } else {
                    self.gateway.delete(id)
                }
            }
        };

        match result {
            Ok(entity) => {
                if self.config.action == ImportAction::Create {
                    self.resolver.register_created(index, ResolvedId::from(entity));
                }
                tracing::debug!(run_id = %self.run_id, index, id = entity.id, "Row committed");
                self.committed += 1;
                self.unflushed += 1;
                if self.unflushed >= self.config.batch_size.max(1) {
                    self.flush()?;
                }
                Ok(RowOutcome::Done)
            }
            Err(err) => {
                tracing::error!(run_id = %self.run_id, index, error = %err, "Row could not be saved");
                Ok(RowOutcome::Error)
            }
        }
    }

    fn flush(&mut self) -> Result<(), ImportError> {
        self.gateway.flush()?;
        self.gateway.clear();
        self.unflushed = 0;
        Ok(())
    }
}

/// Turn unresolved links into literals when their datatypes allow it.
///
/// Returns false when some link has no literal datatype to fall back to.
fn demote_unresolved_links(resource: &mut TargetResource) -> bool {
    let mut all_demoted = true;
    for value in resource.values_mut() {
        if !value.is_forward_reference() {
            continue;
        }
        match value.literal_fallback().map(String::from) {
            Some(datatype) => {
                value.datatypes = vec![datatype];
                value.source_identifier = None;
            }
            None => all_demoted = false,
        }
    }
    all_demoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::checklog::MemoryCheckLog;
    use crate::import::memory::MemoryGateway;
    use crate::import::reader::VecReader;
    use crate::mapping::{MappingBuilder, MappingSource};
    use crate::transform_registry::FilterRegistry;
    use serde_json::json;
    use std::sync::Arc;

    fn mapper(ini: &str) -> MetaMapper {
        let mapping = MappingBuilder::new().build("test", MappingSource::Ini(ini.to_string()));
        MetaMapper::new(Arc::new(mapping), Arc::new(FilterRegistry::with_builtins()))
    }

    const MAPPING: &str = "id = dcterms:identifier\ntitle = dcterms:title\nitem = dcterms:relation ^^resource\n";

    #[test]
    fn test_stop_on_error_imports_nothing() {
        let reader = VecReader::from_json(vec![
            json!({"id": "A1", "title": "Foo"}),
            json!({"id": "A2", "title": "Bar", "item": "missing"}),
        ]);
        let mut gateway = MemoryGateway::new(vec!["dcterms:identifier".to_string()]);
        let mut log = MemoryCheckLog::new();

        let report = ImportOrchestrator::new(ImportConfig::default(), mapper(MAPPING), &reader, &mut gateway, &mut log)
            .run()
            .unwrap();

        assert_eq!(report.phase, RunPhase::StoppedOnError);
        assert_eq!(report.notice.as_deref(), Some(NO_SOURCE_IMPORTED));
        assert_eq!(report.pass(RunPhase::Checking).unwrap().errors, 1);
        assert!(report.pass(RunPhase::Committing).is_none());
        assert!(gateway.is_empty());
    }

    #[test]
    fn test_continue_on_error_commits_valid_rows() {
        let reader = VecReader::from_json(vec![
            json!({"id": "A1", "title": "Foo"}),
            json!({"id": "A2", "title": "Bar", "item": "missing"}),
            json!({}),
        ]);
        let mut gateway = MemoryGateway::new(vec!["dcterms:identifier".to_string()]);
        let mut log = MemoryCheckLog::new();
        let config = ImportConfig::default().with_policy(FailurePolicy::ContinueOnError);

        let report = ImportOrchestrator::new(config, mapper(MAPPING), &reader, &mut gateway, &mut log)
            .run()
            .unwrap();

        let commit = report.pass(RunPhase::Committing).unwrap();
        assert_eq!(report.phase, RunPhase::Done);
        assert_eq!((commit.processed, commit.errors, commit.empty), (3, 1, 1));
        assert_eq!(report.committed, 1);
        assert_eq!(gateway.len(), 1);
    }

    #[test]
    fn test_dry_run_stops_after_checking() {
        let reader = VecReader::from_json(vec![json!({"id": "A1", "title": "Foo"})]);
        let mut gateway = MemoryGateway::new(vec!["dcterms:identifier".to_string()]);
        let mut log = MemoryCheckLog::new();
        let config = ImportConfig::default().with_policy(FailurePolicy::DryRun);

        let report = ImportOrchestrator::new(config, mapper(MAPPING), &reader, &mut gateway, &mut log)
            .run()
            .unwrap();

        assert_eq!(report.phase, RunPhase::DryRunDone);
        assert_eq!(log.len(), 1);
        assert!(gateway.is_empty());
    }

    #[test]
    fn test_invalid_mapping_is_refused() {
        let reader = VecReader::default();
        let mut gateway = MemoryGateway::new(Vec::new());
        let mut log = MemoryCheckLog::new();

        let result = ImportOrchestrator::new(
            ImportConfig::default(),
            mapper("[broken]\n"),
            &reader,
            &mut gateway,
            &mut log,
        )
        .run();

        assert!(matches!(result, Err(ImportError::InvalidMapping { .. })));
    }

    #[test]
    fn test_batches_are_flushed() {
        let records = (1..=5).map(|i| json!({"id": format!("R{}", i), "title": "T"})).collect();
        let reader = VecReader::from_json(records);
        let mut gateway = MemoryGateway::new(vec!["dcterms:identifier".to_string()]);
        let mut log = MemoryCheckLog::new();
        let config = ImportConfig {
            batch_size: 2,
            ..ImportConfig::default()
        };

        let report = ImportOrchestrator::new(config, mapper(MAPPING), &reader, &mut gateway, &mut log)
            .run()
            .unwrap();

        assert_eq!(report.committed, 5);
        assert_eq!(gateway.flushes, 3);
        assert_eq!(gateway.clears, 3);
    }

    #[test]
    fn test_missing_required_field_stops_the_run() {
        let reader = VecReader::from_json(vec![
            json!({"id": "A1", "title": "Foo"}),
            json!({"id": "A2"}),
        ]);
        let mut gateway = MemoryGateway::new(vec!["dcterms:identifier".to_string()]);
        let mut log = MemoryCheckLog::new();
        let config = ImportConfig {
            required_fields: vec!["dcterms:title".to_string()],
            ..ImportConfig::default()
        };

        let report = ImportOrchestrator::new(config, mapper(MAPPING), &reader, &mut gateway, &mut log)
            .run()
            .unwrap();

        assert_eq!(report.phase, RunPhase::StoppedOnError);
        assert_eq!(report.pass(RunPhase::Checking).unwrap().errors, 1);
        assert_eq!(log.load_checkpoint(2).unwrap().unwrap().status, CheckStatus::Error);
        assert!(gateway.is_empty());
    }

    #[test]
    fn test_cancel_while_creating_placeholders() {
        let reader = VecReader::from_json(vec![
            json!({"id": "A1", "title": "Foo", "item": "A2"}),
            json!({"id": "A2", "title": "Bar"}),
        ]);
        let mut gateway = MemoryGateway::new(vec!["dcterms:identifier".to_string()]);
        let mut log = MemoryCheckLog::new();
        let calls = std::cell::Cell::new(0);
        // two polls per pass for listing and checking, then the first placeholder
        let cancel = || {
            calls.set(calls.get() + 1);
            calls.get() > 4
        };

        let report = ImportOrchestrator::new(ImportConfig::default(), mapper(MAPPING), &reader, &mut gateway, &mut log)
            .with_cancellation(&cancel)
            .run()
            .unwrap();

        assert_eq!(report.phase, RunPhase::Aborted);
        let commit = report.pass(RunPhase::Committing).unwrap();
        assert!(commit.cancelled);
        assert_eq!(commit.processed, 0);
        assert_eq!(report.placeholders, 0);
        assert!(report.notice.unwrap().contains("committing"));
        assert!(gateway.is_empty());
    }

    #[test]
    fn test_unresolved_link_falls_back_to_literal() {
        let mut resource = TargetResource::new();
        let mut value = crate::entity::TargetValue::literal("X");
        value.datatypes = vec!["resource".to_string(), "literal".to_string()];
        value.source_identifier = Some(crate::entity::IdentifierKey::new(
            "X",
            crate::entity::ResourceKind::Resources,
        ));
        resource.push("dcterms:relation", value);

        assert!(demote_unresolved_links(&mut resource));
        let demoted = &resource.get("dcterms:relation")[0];
        assert_eq!(demoted.datatypes, vec!["literal"]);
        assert!(demoted.source_identifier.is_none());
    }
}
