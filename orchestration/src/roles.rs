//! Agent roles and roster: who debates, and who reviews whom.
//!
//! A roster is fixed for the lifetime of a run: N solver roles plus one
//! judge, each bound to a temperature and a behavioral instruction. Review
//! pairing is enumerated explicitly from the roster so it is reproducible
//! and independent of any map iteration order.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A named role bound to a fixed temperature and behavioral instruction.
/// Stateless between invocations except for this binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRole {
    /// Stable name used in transcripts and prompts (e.g. "Solver_1").
    pub name: String,
    /// Human-readable specialty label.
    pub specialty: String,
    /// Behavioral instruction prepended to every prompt for this role.
    pub instruction: String,
    /// Sampling temperature, in [0.0, 2.0].
    pub temperature: f64,
}

/// Roster validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RosterError {
    #[error("roster needs at least two solver roles, got {0}")]
    TooFewSolvers(usize),
    #[error("duplicate role name: {0}")]
    DuplicateName(String),
    #[error("temperature out of range for role {role}: {temperature}")]
    BadTemperature { role: String, temperature: String },
}

/// The fixed set of roles for a run: N solvers plus one judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Roster {
    pub solvers: Vec<AgentRole>,
    pub judge: AgentRole,
}

impl Roster {
    /// Validate and build a roster.
    pub fn new(solvers: Vec<AgentRole>, judge: AgentRole) -> Result<Self, RosterError> {
        if solvers.len() < 2 {
            return Err(RosterError::TooFewSolvers(solvers.len()));
        }
        let mut seen = std::collections::HashSet::new();
        for role in solvers.iter().chain(std::iter::once(&judge)) {
            if !seen.insert(role.name.as_str()) {
                return Err(RosterError::DuplicateName(role.name.clone()));
            }
            if !(0.0..=2.0).contains(&role.temperature) {
                return Err(RosterError::BadTemperature {
                    role: role.name.clone(),
                    temperature: role.temperature.to_string(),
                });
            }
        }
        Ok(Self { solvers, judge })
    }

    /// The default three-solver panel plus judge.
    pub fn default_panel() -> Self {
        let solvers = vec![
            AgentRole {
                name: "Solver_1".to_string(),
                specialty: "Mathematical Rigor Specialist".to_string(),
                instruction: "You are a solver who prioritizes mathematical rigor and formal \
                              proofs. Break down problems systematically with clear logical steps."
                    .to_string(),
                temperature: 0.7,
            },
            AgentRole {
                name: "Solver_2".to_string(),
                specialty: "Intuitive Problem Solver".to_string(),
                instruction: "You are a solver who uses intuition and creative approaches. \
                              Look for patterns and elegant solutions."
                    .to_string(),
                temperature: 0.8,
            },
            AgentRole {
                name: "Solver_3".to_string(),
                specialty: "Edge Case Hunter".to_string(),
                instruction: "You are a solver who focuses on edge cases and boundary \
                              conditions. Question assumptions and test limits."
                    .to_string(),
                temperature: 0.6,
            },
        ];
        let judge = AgentRole {
            name: "Judge".to_string(),
            specialty: "Impartial Judge".to_string(),
            instruction: "You are an impartial judge evaluating solutions. Focus on \
                          correctness, completeness, and logical soundness."
                .to_string(),
            temperature: 0.3,
        };
        Self::new(solvers, judge).expect("default panel is valid")
    }

    /// Look up a solver role by name.
    pub fn solver(&self, name: &str) -> Option<&AgentRole> {
        self.solvers.iter().find(|r| r.name == name)
    }
}

/// Enumerate every ordered (reviewer, reviewed) pair among the given roles.
///
/// Pairs are never reflexive and never duplicated; order follows the input
/// roster order, so pairing is deterministic and testable. For 3 roles this
/// yields 6 pairs.
pub fn review_pairs(names: &[String]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(names.len() * names.len().saturating_sub(1));
    for reviewer in names {
        for reviewed in names {
            if reviewer != reviewed {
                pairs.push((reviewer.clone(), reviewed.clone()));
            }
        }
    }
    pairs
}
