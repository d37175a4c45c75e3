//! Run phases and per-pass counters.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::import::config::{FailurePolicy, ImportConfig};
use crate::import::ImportError;

/// Phase of an import run.
///
/// `Init -> Listing -> Checking -> {StoppedOnError | DryRunDone | Committing} -> Done`,
/// with `Aborted` reachable from every pass. A resumed run goes from `Listing`
/// straight to `Committing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Init,
    Listing,
    Checking,
    StoppedOnError,
    DryRunDone,
    Committing,
    Done,
    Aborted,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Init => "init",
            RunPhase::Listing => "listing",
            RunPhase::Checking => "checking",
            RunPhase::StoppedOnError => "stopped_on_error",
            RunPhase::DryRunDone => "dry_run_done",
            RunPhase::Committing => "committing",
            RunPhase::Done => "done",
            RunPhase::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::StoppedOnError | RunPhase::DryRunDone | RunPhase::Done | RunPhase::Aborted
        )
    }

    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        use RunPhase::*;
        matches!(
            (self, next),
            (Init, Listing)
                | (Listing, Checking)
                | (Listing, Committing)
                | (Listing, Aborted)
                | (Checking, StoppedOnError)
                | (Checking, DryRunDone)
                | (Checking, Committing)
                | (Checking, Aborted)
                | (Committing, Done)
                | (Committing, Aborted)
        )
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a 1-based source index falls relative to the skip/max window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    Before,
    Inside,
    After,
}

/// Skip/max window, fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Window {
    pub to_skip: usize,
    /// 0 means no limit.
    pub max_entries: usize,
}

impl Window {
    pub fn position(&self, index: usize) -> WindowPosition {
        if index <= self.to_skip {
            WindowPosition::Before
        } else if self.max_entries > 0 && index > self.to_skip + self.max_entries {
            WindowPosition::After
        } else {
            WindowPosition::Inside
        }
    }

    /// Index of the last row inside the window, if it is bounded.
    pub fn end(&self) -> Option<usize> {
        (self.max_entries > 0).then(|| self.to_skip.saturating_add(self.max_entries))
    }

    /// Rows a pass over `count` records will process.
    pub fn rows_in(&self, count: usize) -> usize {
        let available = count.saturating_sub(self.to_skip);
        if self.max_entries > 0 {
            available.min(self.max_entries)
        } else {
            available
        }
    }
}

/// Totals of one finished pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassSummary {
    pub phase: RunPhase,
    pub to_process: usize,
    pub processed: usize,
    pub skipped: usize,
    pub empty: usize,
    pub errors: usize,
    pub cancelled: bool,
}

/// Counters and phase of one run, owned by the orchestrator.
#[derive(Debug, Clone)]
pub struct RunState {
    phase: RunPhase,
    policy: FailurePolicy,
    window: Window,
    /// 1-based index of the record being visited.
    pub current_entry_index: usize,
    /// Rows of the window visited so far in this pass.
    pub index_resource: usize,
    pub total_to_process: usize,
    pub total_processed: usize,
    pub total_skipped: usize,
    pub total_empty: usize,
    pub total_errors: usize,
}

impl RunState {
    pub fn new(config: &ImportConfig) -> Self {
        Self {
            phase: RunPhase::Init,
            policy: config.failure_policy,
            window: Window {
                to_skip: config.to_skip,
                max_entries: config.max_entries,
            },
            current_entry_index: 0,
            index_resource: 0,
            total_to_process: 0,
            total_processed: 0,
            total_skipped: 0,
            total_empty: 0,
            total_errors: 0,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Move to another phase; illegal moves are rejected.
    pub fn transition(&mut self, next: RunPhase) -> Result<(), ImportError> {
        if !self.phase.can_transition_to(next) {
            return Err(ImportError::IllegalTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::debug!(from = %self.phase, to = %next, "Run phase change");
        self.phase = next;
        Ok(())
    }

    /// Enter a pass phase with every counter reset.
    pub fn start_pass(&mut self, phase: RunPhase, record_count: usize) -> Result<(), ImportError> {
        self.transition(phase)?;
        self.current_entry_index = 0;
        self.index_resource = 0;
        self.total_to_process = self.window.rows_in(record_count);
        self.total_processed = 0;
        self.total_skipped = 0;
        self.total_empty = 0;
        self.total_errors = 0;
        Ok(())
    }

    pub fn summary(&self, cancelled: bool) -> PassSummary {
        PassSummary {
            phase: self.phase,
            to_process: self.total_to_process,
            processed: self.total_processed,
            skipped: self.total_skipped,
            empty: self.total_empty,
            errors: self.total_errors,
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_positions() {
        let window = Window {
            to_skip: 2,
            max_entries: 3,
        };
        let positions: Vec<WindowPosition> = (1..=7).map(|i| window.position(i)).collect();

        assert_eq!(
            positions,
            vec![
                WindowPosition::Before,
                WindowPosition::Before,
                WindowPosition::Inside,
                WindowPosition::Inside,
                WindowPosition::Inside,
                WindowPosition::After,
                WindowPosition::After,
            ]
        );
        assert_eq!(window.rows_in(10), 3);
        assert_eq!(window.rows_in(4), 2);
        assert_eq!(Window::default().rows_in(10), 10);
        assert_eq!(window.end(), Some(5));
        assert_eq!(Window::default().end(), None);
    }

    #[test]
    fn test_transitions() {
        let mut state = RunState::new(&ImportConfig::default());

        assert!(state.transition(RunPhase::Committing).is_err());
        state.start_pass(RunPhase::Listing, 5).unwrap();
        state.start_pass(RunPhase::Checking, 5).unwrap();
        state.transition(RunPhase::DryRunDone).unwrap();

        assert!(state.phase().is_terminal());
        assert!(matches!(
            state.transition(RunPhase::Committing),
            Err(ImportError::IllegalTransition {
                from: RunPhase::DryRunDone,
                to: RunPhase::Committing
            })
        ));
    }

    #[test]
    fn test_start_pass_resets_counters() {
        let mut state = RunState::new(&ImportConfig::default().with_window(1, 0));
        state.start_pass(RunPhase::Listing, 4).unwrap();
        state.total_processed = 3;
        state.total_errors = 1;

        state.start_pass(RunPhase::Checking, 4).unwrap();

        let summary = state.summary(false);
        assert_eq!(summary.phase, RunPhase::Checking);
        assert_eq!(summary.to_process, 3);
        assert_eq!((summary.processed, summary.errors), (0, 0));
    }
}
