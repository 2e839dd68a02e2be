//! Multi-agent debate orchestration engine.
//!
//! Drives a fixed four-stage collaborative pipeline (independent solve,
//! peer review, refinement, judgment) over a set of problems, with:
//!
//! - a single rate-limited [`gateway::Gateway`] every generation call
//!   passes through (rolling-window ceiling, minimum spacing, quota
//!   cooldown);
//! - a layered [`validator::AnswerValidator`] that matches free-text
//!   answers against canonical ones (exact, containment, numeric,
//!   symbolic);
//! - a [`checkpoint::CheckpointStore`] so restarts skip already-finished
//!   problems;
//! - per-problem quorum semantics: one role's failure degrades, only
//!   losing every role fails the problem, and nothing crashes the run.
//!
//! The external text-generation service is abstracted behind
//! [`gateway::TextGenerator`]; binaries supply an implementation and feed
//! problems to [`pipeline::DebatePipeline`].

pub mod agent;
pub mod checkpoint;
pub mod gateway;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod roles;
pub mod state;
pub mod transcript;
pub mod validator;

pub use agent::Agent;
pub use checkpoint::{CheckpointError, CheckpointStore, FsCheckpointStore, MemoryCheckpointStore};
pub use gateway::{Gateway, GatewayConfig, GatewayError, GenerateError, TextGenerator};
pub use pipeline::{DebatePipeline, PipelineError, RunOutcome};
pub use roles::{AgentRole, Roster};
pub use state::{DebatePhase, DebateRun, StageTransition};
pub use transcript::{
    Assessment, CanonicalAnswer, Judgment, ParseStatus, Problem, Review, Solution, Transcript,
};
pub use validator::{AnswerValidator, ValidatorConfig};
