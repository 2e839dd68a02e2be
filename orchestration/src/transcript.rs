//! Transcript data model: everything one problem's debate produces.
//!
//! A `Transcript` is the unit of persistence: the problem, every solution
//! (initial and refined), every peer review, the judgment, and the
//! correctness verdict. Refined solutions supersede the originals for
//! judgment purposes but never replace them here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{DebatePhase, StageTransition};

/// A problem to be debated. Immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    /// Stable identifier, unique within one problem set.
    pub id: u32,
    /// Category tag (math, physics, logic, game theory, ...).
    #[serde(default)]
    pub category: String,
    /// The prompt text presented to solvers.
    pub question: String,
    /// Known-correct answer, possibly with alternate accepted forms.
    #[serde(alias = "correct_answer")]
    pub answer: CanonicalAnswer,
}

/// Canonical answer representation with alternate accepted surface forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CanonicalAnswer {
    /// Single accepted form (the common case in problem files).
    Single(String),
    /// Primary form plus alternates that are also accepted verbatim.
    WithAlternates {
        primary: String,
        #[serde(default)]
        alternates: Vec<String>,
    },
}

impl CanonicalAnswer {
    /// All accepted forms, primary first.
    pub fn forms(&self) -> Vec<&str> {
        match self {
            Self::Single(s) => vec![s.as_str()],
            Self::WithAlternates { primary, alternates } => {
                let mut forms = vec![primary.as_str()];
                forms.extend(alternates.iter().map(String::as_str));
                forms
            }
        }
    }

    /// The primary accepted form.
    pub fn primary(&self) -> &str {
        match self {
            Self::Single(s) => s,
            Self::WithAlternates { primary, .. } => primary,
        }
    }
}

impl From<&str> for CanonicalAnswer {
    fn from(s: &str) -> Self {
        Self::Single(s.to_string())
    }
}

/// How completely an agent response parsed into structured fields.
///
/// Parsing never aborts a run: an `Incomplete` result carries best-effort
/// fields plus the list of sections the response was missing, and a
/// `Failed` result marks a role whose call never produced text at all.
/// Downstream stages pattern-match on this and treat missing data as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseStatus {
    /// All expected sections were present.
    Complete,
    /// Some expected sections were missing; fields are best-effort.
    Incomplete { missing: Vec<String> },
    /// The underlying call failed; no response text exists.
    Failed { reason: String },
}

impl ParseStatus {
    /// Whether this result carries usable content (complete or degraded).
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Whether any degradation occurred.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }
}

/// A candidate solution produced by one solver role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Solution {
    /// Name of the role that produced this solution.
    pub role: String,
    /// Problem this solution answers.
    pub problem_id: u32,
    /// Step-by-step reasoning section.
    pub reasoning: String,
    /// Extracted final answer.
    pub final_answer: String,
    /// Self-reported confidence in [0, 1], when the response included one.
    pub confidence: Option<f64>,
    /// Full raw response text.
    pub raw: String,
    /// Parse completeness.
    pub parse: ParseStatus,
    /// Whether this is a refined (post-review) solution.
    pub refined: bool,
}

impl Solution {
    /// Placeholder for a role whose generation call failed outright.
    pub fn failed(role: &str, problem_id: u32, reason: &str) -> Self {
        Self {
            role: role.to_string(),
            problem_id,
            reasoning: String::new(),
            final_answer: String::new(),
            confidence: None,
            raw: String::new(),
            parse: ParseStatus::Failed {
                reason: reason.to_string(),
            },
            refined: false,
        }
    }

    /// Whether this solution can feed later stages.
    pub fn is_usable(&self) -> bool {
        self.parse.is_usable()
    }
}

/// Overall verdict vocabulary a reviewer chooses from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    SoundSolution,
    PromisingButFlawed,
    FundamentallyFlawed,
    /// The response did not state a recognizable verdict.
    Unspecified,
}

impl std::fmt::Display for Assessment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SoundSolution => write!(f, "sound_solution"),
            Self::PromisingButFlawed => write!(f, "promising_but_flawed"),
            Self::FundamentallyFlawed => write!(f, "fundamentally_flawed"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// One solver's structured critique of a peer's solution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    /// Role that wrote the critique.
    pub reviewer: String,
    /// Role whose solution was critiqued.
    pub reviewed: String,
    /// Problem under debate.
    pub problem_id: u32,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    /// Specific logical errors, calculation mistakes, bad assumptions.
    pub errors: Vec<String>,
    pub suggestions: Vec<String>,
    pub assessment: Assessment,
    /// Full raw response text.
    pub raw: String,
    pub parse: ParseStatus,
}

impl Review {
    /// Placeholder for a review whose generation call failed.
    pub fn failed(reviewer: &str, reviewed: &str, problem_id: u32, reason: &str) -> Self {
        Self {
            reviewer: reviewer.to_string(),
            reviewed: reviewed.to_string(),
            problem_id,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            errors: Vec::new(),
            suggestions: Vec::new(),
            assessment: Assessment::Unspecified,
            raw: String::new(),
            parse: ParseStatus::Failed {
                reason: reason.to_string(),
            },
        }
    }

    pub fn is_usable(&self) -> bool {
        self.parse.is_usable()
    }
}

/// The judge's arbitration among refined solutions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Judgment {
    /// Name of the winning solver role.
    pub winner: String,
    /// Judge confidence in [0, 1], when stated.
    pub confidence: Option<f64>,
    /// Comparative analysis section.
    pub analysis: String,
    /// Why the winner was selected.
    pub reasoning: String,
    /// The winning answer as restated by the judge.
    pub final_answer: String,
    /// Full raw response text.
    pub raw: String,
    pub parse: ParseStatus,
}

/// Full recorded history of one problem's run across all stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Schema version for forward compatibility of persisted records.
    pub version: u32,
    pub problem: Problem,
    /// Stage-1 solutions, one per solver role (failed roles included).
    pub initial_solutions: Vec<Solution>,
    /// Stage-2 peer reviews over ordered (reviewer, reviewed) pairs.
    pub reviews: Vec<Review>,
    /// Stage-3 refined solutions; supersede the originals for judgment.
    pub refined_solutions: Vec<Solution>,
    /// Stage-4 judgment; absent when the problem failed before judging.
    pub judgment: Option<Judgment>,
    /// Whether the selected answer matched the canonical answer.
    pub correct: Option<bool>,
    /// Terminal phase this problem reached (`Scored` or `Failed`).
    pub phase: DebatePhase,
    /// Phase transition history with timestamps.
    pub transitions: Vec<StageTransition>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl Transcript {
    /// Current persisted schema version.
    pub const CURRENT_VERSION: u32 = 1;

    /// Compact status line for logs and reports.
    pub fn summary_line(&self) -> String {
        let verdict = match self.correct {
            Some(true) => "correct",
            Some(false) => "incorrect",
            None => "unscored",
        };
        let winner = self
            .judgment
            .as_ref()
            .map(|j| j.winner.as_str())
            .unwrap_or("-");
        format!(
            "[{}] problem {} | winner={} | {}",
            self.phase, self.problem.id, winner, verdict
        )
    }
}
