//! Per-problem phase machine: stages, transitions, and run tracking.
//!
//! Each problem moves through the fixed pipeline
//! `Pending → Generated → Reviewed → Refined → Judged → Scored`, with
//! `Failed` reachable from any non-terminal phase. Transitions are validated
//! against an explicit table and recorded with timestamps so stage ordering
//! is auditable after the fact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Phase of a problem's debate run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Not yet started.
    Pending,
    /// Independent solutions collected from all solver roles.
    Generated,
    /// All peer reviews collected.
    Reviewed,
    /// Refined solutions collected.
    Refined,
    /// Judge has selected a winner.
    Judged,
    /// Correctness verdict recorded. Terminal.
    Scored,
    /// Quorum lost or an unrecoverable stage error. Terminal.
    Failed,
}

impl DebatePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Scored | Self::Failed)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Pending => &[Self::Generated, Self::Failed],
            Self::Generated => &[Self::Reviewed, Self::Failed],
            Self::Reviewed => &[Self::Refined, Self::Failed],
            Self::Refined => &[Self::Judged, Self::Failed],
            Self::Judged => &[Self::Scored, Self::Failed],
            Self::Scored | Self::Failed => &[],
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Generated => write!(f, "generated"),
            Self::Reviewed => write!(f, "reviewed"),
            Self::Refined => write!(f, "refined"),
            Self::Judged => write!(f, "judged"),
            Self::Scored => write!(f, "scored"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A recorded phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    /// Why the transition happened (quorum counts, failure reasons, ...).
    pub reason: String,
}

/// Error for invalid phase transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition {from} → {to} for problem {problem_id}")]
pub struct TransitionError {
    pub problem_id: u32,
    pub from: DebatePhase,
    pub to: DebatePhase,
}

/// Tracks one problem's progress through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateRun {
    pub problem_id: u32,
    pub phase: DebatePhase,
    pub transitions: Vec<StageTransition>,
    pub started_at: DateTime<Utc>,
}

impl DebateRun {
    pub fn new(problem_id: u32) -> Self {
        Self {
            problem_id,
            phase: DebatePhase::Pending,
            transitions: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Transition to a new phase, recording timestamp and reason.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                problem_id: self.problem_id,
                from: self.phase,
                to,
            });
        }
        self.transitions.push(StageTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Mark the run failed from whatever non-terminal phase it is in.
    pub fn fail(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.transition(DebatePhase::Failed, reason)
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }
}
