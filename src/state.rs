//! Run state machine.
//!
//! ```text
//! Received ─▶ Resolved ─▶ Enhanced ─▶ Recognized ─▶ Aggregated ─▶ Persisted ─▶ Done
//!     │           │           │            │             │             │
//!     └───────────┴───────────┴────────────┴─────────────┴─────────────┴──▶ Failed(stage, reason)
//! ```
//!
//! The orchestrator drives one [`RunState`] per document. Transitions are
//! checked: skipping a stage or leaving a terminal state is an internal
//! error, never silently accepted.

use crate::error::{Scan2TxtError, Stage};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Where a run currently is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Received,
    Resolved,
    Enhanced,
    Recognized,
    Aggregated,
    Persisted,
    Done,
    Failed { stage: Stage, reason: String },
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Failed { .. })
    }

    /// The only legal successor on the success path.
    fn next(&self) -> Option<RunState> {
        Some(match self {
            RunState::Received => RunState::Resolved,
            RunState::Resolved => RunState::Enhanced,
            RunState::Enhanced => RunState::Recognized,
            RunState::Recognized => RunState::Aggregated,
            RunState::Aggregated => RunState::Persisted,
            RunState::Persisted => RunState::Done,
            RunState::Done | RunState::Failed { .. } => return None,
        })
    }

    /// The stage whose completion enters this state.
    fn entered_by(&self) -> Stage {
        match self {
            RunState::Received => Stage::Intake,
            RunState::Resolved => Stage::Resolve,
            RunState::Enhanced => Stage::Enhance,
            RunState::Recognized => Stage::Recognize,
            RunState::Aggregated => Stage::Aggregate,
            RunState::Persisted | RunState::Done => Stage::Persist,
            RunState::Failed { stage, .. } => *stage,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            RunState::Received => "received",
            RunState::Resolved => "resolved",
            RunState::Enhanced => "enhanced",
            RunState::Recognized => "recognized",
            RunState::Aggregated => "aggregated",
            RunState::Persisted => "persisted",
            RunState::Done => "done",
            RunState::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Failed { stage, reason } => write!(f, "failed({stage}: {reason})"),
            other => f.write_str(other.name()),
        }
    }
}

/// A run's state plus the id used in its trace events.
#[derive(Debug)]
pub struct RunTracker {
    run_id: Uuid,
    state: RunState,
}

impl RunTracker {
    pub fn new(run_id: Uuid) -> Self {
        debug!(run = %run_id, "state → received");
        Self {
            run_id,
            state: RunState::Received,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// Move to `to`, which must be the direct successor of the current state.
    pub fn advance(&mut self, to: RunState) -> Result<(), Scan2TxtError> {
        match self.state.next() {
            Some(expected) if expected == to => {
                debug!(run = %self.run_id, "state {} → {}", self.state, to);
                self.state = to;
                Ok(())
            }
            _ => Err(Scan2TxtError::Internal {
                stage: to.entered_by(),
                detail: format!("illegal run transition {} → {}", self.state, to),
            }),
        }
    }

    /// Enter `Failed` from any non-terminal state and hand the error back.
    pub fn fail(&mut self, error: Scan2TxtError) -> Scan2TxtError {
        if !self.state.is_terminal() {
            let stage = error.stage();
            warn!(run = %self.run_id, "state {} → failed at {}: {}", self.state, stage, error);
            self.state = RunState::Failed {
                stage,
                reason: error.to_string(),
            };
        }
        error
    }
}
