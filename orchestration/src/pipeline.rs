//! Debate pipeline: drives one problem through the four ordered stages.
//!
//! Stage fan-out (Solve ×N, Review ×(N·(N−1))) runs as concurrent tasks
//! that all funnel through the single shared gateway; fan-in waits for
//! every task before the next stage issues any call. A single role's
//! failure downgrades to a failed solution rather than aborting the
//! problem; losing quorum (zero usable solutions) marks the problem
//! `Failed` with no downstream calls issued.

use std::sync::Arc;

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::agent::Agent;
use crate::checkpoint::{CheckpointError, CheckpointStore};
use crate::gateway::Gateway;
use crate::roles::{review_pairs, Roster};
use crate::state::{DebatePhase, DebateRun, TransitionError};
use crate::transcript::{Judgment, Problem, Review, Solution, Transcript};
use crate::validator::AnswerValidator;

/// Error from running one problem through the pipeline.
///
/// Per-role generation failures never surface here; they degrade into
/// failed solutions or a terminal `Failed` transcript. What does surface
/// is orchestration-level breakage: invalid transitions, task panics, and
/// persistence failures (the problem is re-attempted on the next resume).
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Persistence(#[from] CheckpointError),
    #[error("stage task panicked: {0}")]
    TaskPanicked(String),
}

/// Result of asking the pipeline to run one problem.
#[derive(Debug)]
pub enum RunOutcome {
    /// The checkpoint store already had a complete transcript; no calls issued.
    Skipped,
    /// The problem ran to a terminal phase (`Scored` or `Failed`).
    Completed(Box<Transcript>),
}

/// Orchestrates the debate stages for a fixed roster.
pub struct DebatePipeline {
    gateway: Arc<Gateway>,
    roster: Roster,
    validator: AnswerValidator,
    checkpoint: Arc<dyn CheckpointStore>,
}

impl DebatePipeline {
    pub fn new(
        gateway: Arc<Gateway>,
        roster: Roster,
        validator: AnswerValidator,
        checkpoint: Arc<dyn CheckpointStore>,
    ) -> Self {
        Self {
            gateway,
            roster,
            validator,
            checkpoint,
        }
    }

    /// Run one problem to a terminal phase and persist its transcript.
    pub async fn run_problem(&self, problem: &Problem) -> Result<RunOutcome, PipelineError> {
        if self.checkpoint.is_complete(problem.id) {
            info!(problem = problem.id, "already complete, skipping");
            return Ok(RunOutcome::Skipped);
        }

        let mut run = DebateRun::new(problem.id);
        info!(problem = problem.id, category = %problem.category, "debate starting");

        // Stage 1: independent solutions, one concurrent task per solver.
        let initial = self.generate_solutions(problem).await?;
        let usable_count = initial.iter().filter(|s| s.is_usable()).count();
        if usable_count == 0 {
            run.fail("no solver produced a usable solution")?;
            warn!(problem = problem.id, "all solvers failed, marking problem failed");
            return self.finalize(problem, run, initial, Vec::new(), Vec::new(), None, None);
        }
        run.transition(
            DebatePhase::Generated,
            &format!("{usable_count}/{} solvers succeeded", self.roster.solvers.len()),
        )?;

        // Stage 2: peer reviews over ordered pairs of usable solvers.
        let reviews = self.generate_reviews(problem, &initial).await?;
        run.transition(
            DebatePhase::Reviewed,
            &format!("{} reviews collected", reviews.len()),
        )?;

        // Stage 3: refinement; a failed refine falls back to the original.
        let refined = self.generate_refinements(problem, &initial, &reviews).await?;
        run.transition(
            DebatePhase::Refined,
            &format!("{} refined solutions", refined.len()),
        )?;

        // Stage 4: single judgment call.
        let solver_names: Vec<String> = refined.iter().map(|s| s.role.clone()).collect();
        let judge = Agent::new(self.roster.judge.clone(), self.gateway.clone());
        let judgment = match judge.judge(problem, &refined, &reviews, &solver_names).await {
            Ok(judgment) => judgment,
            Err(e) => {
                warn!(problem = problem.id, error = %e, "judge call failed");
                run.fail(&format!("judge call failed: {e}"))?;
                return self.finalize(problem, run, initial, reviews, refined, None, None);
            }
        };
        run.transition(
            DebatePhase::Judged,
            &format!("winner: {}", display_winner(&judgment)),
        )?;

        // Scoring: validate the selected answer against the canonical one.
        let answer = selected_answer(&judgment, &refined);
        let correct = self.validator.is_correct(&answer, &problem.answer);
        run.transition(
            DebatePhase::Scored,
            if correct { "answer correct" } else { "answer incorrect" },
        )?;
        info!(
            problem = problem.id,
            winner = %display_winner(&judgment),
            correct,
            "debate scored"
        );

        self.finalize(problem, run, initial, reviews, refined, Some(judgment), Some(correct))
    }

    async fn generate_solutions(&self, problem: &Problem) -> Result<Vec<Solution>, PipelineError> {
        let mut tasks = JoinSet::new();
        for role in &self.roster.solvers {
            let agent = Agent::new(role.clone(), self.gateway.clone());
            let problem = problem.clone();
            tasks.spawn(async move {
                let name = agent.name().to_string();
                let result = agent.solve(&problem).await;
                (name, result)
            });
        }

        let mut solutions = Vec::with_capacity(self.roster.solvers.len());
        while let Some(joined) = tasks.join_next().await {
            let (name, result) = joined.map_err(|e| PipelineError::TaskPanicked(e.to_string()))?;
            match result {
                Ok(solution) => solutions.push(solution),
                Err(e) => {
                    warn!(problem = problem.id, role = %name, error = %e, "solve call failed");
                    solutions.push(Solution::failed(&name, problem.id, &e.to_string()));
                }
            }
        }
        // Fan-in order is nondeterministic; restore roster order.
        solutions.sort_by_key(|s| self.roster.solvers.iter().position(|r| r.name == s.role));
        Ok(solutions)
    }

    async fn generate_reviews(
        &self,
        problem: &Problem,
        initial: &[Solution],
    ) -> Result<Vec<Review>, PipelineError> {
        let usable_names: Vec<String> = initial
            .iter()
            .filter(|s| s.is_usable())
            .map(|s| s.role.clone())
            .collect();
        let pairs = review_pairs(&usable_names);

        let mut tasks = JoinSet::new();
        for (reviewer, reviewed) in pairs {
            // Pair names are drawn from usable solutions, which carry roster roles.
            let (Some(role), Some(peer)) = (
                self.roster.solver(&reviewer).cloned(),
                initial.iter().find(|s| s.role == reviewed).cloned(),
            ) else {
                continue;
            };
            let agent = Agent::new(role, self.gateway.clone());
            let problem = problem.clone();
            tasks.spawn(async move {
                let result = agent.review(&problem, &peer).await;
                (agent.name().to_string(), peer.role.clone(), result)
            });
        }

        let mut reviews = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (reviewer, reviewed, result) =
                joined.map_err(|e| PipelineError::TaskPanicked(e.to_string()))?;
            match result {
                Ok(review) => reviews.push(review),
                Err(e) => {
                    warn!(
                        problem = problem.id,
                        reviewer = %reviewer,
                        reviewed = %reviewed,
                        error = %e,
                        "review call failed"
                    );
                    reviews.push(Review::failed(&reviewer, &reviewed, problem.id, &e.to_string()));
                }
            }
        }
        reviews.sort_by(|a, b| (&a.reviewer, &a.reviewed).cmp(&(&b.reviewer, &b.reviewed)));
        Ok(reviews)
    }

    async fn generate_refinements(
        &self,
        problem: &Problem,
        initial: &[Solution],
        reviews: &[Review],
    ) -> Result<Vec<Solution>, PipelineError> {
        let mut tasks = JoinSet::new();
        for own in initial.iter().filter(|s| s.is_usable()) {
            let Some(role) = self.roster.solver(&own.role).cloned() else {
                continue;
            };
            let agent = Agent::new(role, self.gateway.clone());
            let own = own.clone();
            let received: Vec<Review> = reviews
                .iter()
                .filter(|r| r.reviewed == own.role && r.is_usable())
                .cloned()
                .collect();
            let problem = problem.clone();
            tasks.spawn(async move {
                let refs: Vec<&Review> = received.iter().collect();
                let result = agent.refine(&problem, &own, &refs).await;
                (own, result)
            });
        }

        let mut refined = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            let (original, result) =
                joined.map_err(|e| PipelineError::TaskPanicked(e.to_string()))?;
            match result {
                Ok(solution) => refined.push(solution),
                Err(e) => {
                    // Keep the role in the running on its original solution.
                    warn!(
                        problem = problem.id,
                        role = %original.role,
                        error = %e,
                        "refine call failed, falling back to initial solution"
                    );
                    refined.push(original);
                }
            }
        }
        refined.sort_by_key(|s| self.roster.solvers.iter().position(|r| r.name == s.role));
        Ok(refined)
    }

    #[allow(clippy::too_many_arguments)]
    fn finalize(
        &self,
        problem: &Problem,
        run: DebateRun,
        initial_solutions: Vec<Solution>,
        reviews: Vec<Review>,
        refined_solutions: Vec<Solution>,
        judgment: Option<Judgment>,
        correct: Option<bool>,
    ) -> Result<RunOutcome, PipelineError> {
        let transcript = Transcript {
            version: Transcript::CURRENT_VERSION,
            problem: problem.clone(),
            initial_solutions,
            reviews,
            refined_solutions,
            judgment,
            correct,
            phase: run.phase,
            transitions: run.transitions,
            started_at: run.started_at,
            completed_at: chrono::Utc::now(),
        };
        self.checkpoint.persist(&transcript)?;
        Ok(RunOutcome::Completed(Box::new(transcript)))
    }
}

fn display_winner(judgment: &Judgment) -> &str {
    if judgment.winner.is_empty() {
        "(unresolved)"
    } else {
        &judgment.winner
    }
}

/// The answer that gets validated: the judgment's restated final answer,
/// falling back to the winning solution's own extraction.
fn selected_answer(judgment: &Judgment, refined: &[Solution]) -> String {
    if !judgment.final_answer.is_empty() {
        return judgment.final_answer.clone();
    }
    refined
        .iter()
        .find(|s| s.role == judgment.winner)
        .map(|s| s.final_answer.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::gateway::{GatewayConfig, GenerateError, TextGenerator};
    use crate::transcript::CanonicalAnswer;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Which stage a prompt belongs to, recovered from the template text.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Stage {
        Solve,
        Review,
        Refine,
        Judge,
    }

    fn classify(prompt: &str) -> Stage {
        if prompt.contains("Evaluate all solutions and determine which is best") {
            Stage::Judge
        } else if prompt.contains("Critically evaluate this solution") {
            Stage::Review
        } else if prompt.contains("Address each critique") {
            Stage::Refine
        } else {
            Stage::Solve
        }
    }

    /// Role recovered from the instruction the agent prepends.
    fn classify_role(prompt: &str) -> &'static str {
        if prompt.contains("mathematical rigor") {
            "Solver_1"
        } else if prompt.contains("intuition") {
            "Solver_2"
        } else if prompt.contains("edge cases") {
            "Solver_3"
        } else {
            "Judge"
        }
    }

    #[derive(Debug, Clone)]
    struct CallRecord {
        stage: Stage,
        role: &'static str,
        at: Instant,
    }

    /// Produces well-formed stage responses, with optional failure injection.
    struct StageGenerator {
        calls: StdMutex<Vec<CallRecord>>,
        fail_solve_roles: Vec<&'static str>,
        fail_judge: bool,
    }

    impl StageGenerator {
        fn new() -> Self {
            Self {
                calls: StdMutex::new(Vec::new()),
                fail_solve_roles: Vec::new(),
                fail_judge: false,
            }
        }

        fn failing_solvers(roles: &[&'static str]) -> Self {
            Self {
                fail_solve_roles: roles.to_vec(),
                ..Self::new()
            }
        }

        fn failing_judge() -> Self {
            Self {
                fail_judge: true,
                ..Self::new()
            }
        }

        fn records(&self) -> Vec<CallRecord> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn answer_for(role: &str) -> &'static str {
            match role {
                "Solver_3" => "5",
                _ => "4",
            }
        }
    }

    #[async_trait]
    impl TextGenerator for StageGenerator {
        async fn generate(&self, prompt: &str, _temperature: f64) -> Result<String, GenerateError> {
            let stage = classify(prompt);
            let role = classify_role(prompt);
            self.calls.lock().unwrap().push(CallRecord {
                stage,
                role,
                at: Instant::now(),
            });

            match stage {
                Stage::Solve => {
                    if self.fail_solve_roles.contains(&role) {
                        return Err(GenerateError::Fatal("malformed request".to_string()));
                    }
                    Ok(format!(
                        "REASONING:\nStepwise work by {role}.\n\nANSWER:\n{}\n\nCONFIDENCE:\n0.9\n",
                        Self::answer_for(role)
                    ))
                }
                Stage::Review => Ok("STRENGTHS:\n- clear setup\n\nWEAKNESSES:\n- terse\n\n\
                     ERRORS:\n- none found\n\nSUGGESTED_CHANGES:\n- show more steps\n\n\
                     OVERALL_ASSESSMENT:\nsound_solution\n"
                    .to_string()),
                Stage::Refine => Ok(format!(
                    "RESPONSE_TO_CRITIQUES:\n- accepted\n\nREFINED_REASONING:\nImproved by {role}.\n\n\
                     REFINED_ANSWER:\n{}\n\nCONFIDENCE:\n0.95\n",
                    Self::answer_for(role)
                )),
                Stage::Judge => {
                    if self.fail_judge {
                        return Err(GenerateError::Fatal("malformed request".to_string()));
                    }
                    Ok("ANALYSIS:\nSolver_2 is most convincing.\n\nWINNER:\nSolver_2\n\n\
                        REASONING:\nClean and correct.\n\nCONFIDENCE:\n0.8\n\nFINAL_ANSWER:\n4\n"
                        .to_string())
                }
            }
        }
    }

    fn problem() -> Problem {
        Problem {
            id: 1,
            category: "math".to_string(),
            question: "What is 2+2?".to_string(),
            answer: CanonicalAnswer::from("4"),
        }
    }

    fn test_gateway_config() -> GatewayConfig {
        GatewayConfig {
            max_requests_per_minute: 100,
            min_spacing: Duration::from_millis(50),
            cooldown: Duration::from_secs(70),
            transient_attempts: 3,
            backoff_base: Duration::from_millis(100),
        }
    }

    fn pipeline(generator: Arc<StageGenerator>) -> (DebatePipeline, Arc<MemoryCheckpointStore>) {
        let gateway = Arc::new(Gateway::new(generator, test_gateway_config()));
        let checkpoint = Arc::new(MemoryCheckpointStore::new());
        let pipeline = DebatePipeline::new(
            gateway,
            Roster::default_panel(),
            AnswerValidator::default(),
            checkpoint.clone(),
        );
        (pipeline, checkpoint)
    }

    fn completed(outcome: RunOutcome) -> Transcript {
        match outcome {
            RunOutcome::Completed(t) => *t,
            RunOutcome::Skipped => panic!("expected a completed run"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_reaches_scored() {
        let generator = Arc::new(StageGenerator::new());
        let (pipeline, checkpoint) = pipeline(generator.clone());

        let transcript = completed(pipeline.run_problem(&problem()).await.unwrap());

        assert_eq!(transcript.phase, DebatePhase::Scored);
        assert_eq!(transcript.initial_solutions.len(), 3);
        assert_eq!(transcript.reviews.len(), 6);
        assert_eq!(transcript.refined_solutions.len(), 3);
        assert!(transcript.refined_solutions.iter().all(|s| s.refined));
        assert_eq!(transcript.judgment.as_ref().unwrap().winner, "Solver_2");
        assert_eq!(transcript.correct, Some(true));
        assert!(checkpoint.is_complete(1));
        // 3 solves + 6 reviews + 3 refines + 1 judgment.
        assert_eq!(generator.count(), 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_review_pairs_complete_and_irreflexive() {
        let generator = Arc::new(StageGenerator::new());
        let (pipeline, _) = pipeline(generator);

        let transcript = completed(pipeline.run_problem(&problem()).await.unwrap());
        let mut seen = std::collections::HashSet::new();
        for review in &transcript.reviews {
            assert_ne!(review.reviewer, review.reviewed);
            assert!(seen.insert((review.reviewer.clone(), review.reviewed.clone())));
        }
        assert_eq!(seen.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stage_ordering_by_call_timestamps() {
        let generator = Arc::new(StageGenerator::new());
        let (pipeline, _) = pipeline(generator.clone());
        completed(pipeline.run_problem(&problem()).await.unwrap());

        let records = generator.records();
        let last_at = |stage| {
            records
                .iter()
                .filter(|r| r.stage == stage)
                .map(|r| r.at)
                .max()
                .unwrap()
        };
        let first_at = |stage| {
            records
                .iter()
                .filter(|r| r.stage == stage)
                .map(|r| r.at)
                .min()
                .unwrap()
        };
        // No review before solve fan-in completes, and so on down the line.
        assert!(last_at(Stage::Solve) <= first_at(Stage::Review));
        assert!(last_at(Stage::Review) <= first_at(Stage::Refine));
        assert!(last_at(Stage::Refine) <= first_at(Stage::Judge));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_solver_fatal_still_scores() {
        let generator = Arc::new(StageGenerator::failing_solvers(&["Solver_3"]));
        let (pipeline, _) = pipeline(generator.clone());

        let transcript = completed(pipeline.run_problem(&problem()).await.unwrap());

        assert_eq!(transcript.phase, DebatePhase::Scored);
        assert_eq!(transcript.initial_solutions.len(), 3);
        assert!(!transcript.initial_solutions[2].is_usable());
        // Two usable solvers: 2 ordered pairs, 2 refinements.
        assert_eq!(transcript.reviews.len(), 2);
        assert_eq!(transcript.refined_solutions.len(), 2);
        assert_eq!(transcript.correct, Some(true));
        // 3 solve attempts (Fatal is not retried) + 2 + 2 + 1.
        assert_eq!(generator.count(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_solvers_fatal_fails_with_no_downstream_calls() {
        let generator = Arc::new(StageGenerator::failing_solvers(&[
            "Solver_1", "Solver_2", "Solver_3",
        ]));
        let (pipeline, checkpoint) = pipeline(generator.clone());

        let transcript = completed(pipeline.run_problem(&problem()).await.unwrap());

        assert_eq!(transcript.phase, DebatePhase::Failed);
        assert!(transcript.judgment.is_none());
        assert!(transcript.reviews.is_empty());
        assert_eq!(transcript.correct, None);
        // Failed problems are still persisted and resumable-as-complete.
        assert!(checkpoint.is_complete(1));
        assert_eq!(generator.count(), 3);
        assert!(generator.records().iter().all(|r| r.stage == Stage::Solve));
    }

    #[tokio::test(start_paused = true)]
    async fn test_judge_failure_marks_problem_failed() {
        let generator = Arc::new(StageGenerator::failing_judge());
        let (pipeline, _) = pipeline(generator);

        let transcript = completed(pipeline.run_problem(&problem()).await.unwrap());

        assert_eq!(transcript.phase, DebatePhase::Failed);
        assert!(transcript.judgment.is_none());
        // Earlier stages were still recorded for audit.
        assert_eq!(transcript.initial_solutions.len(), 3);
        assert_eq!(transcript.reviews.len(), 6);
        assert_eq!(transcript.refined_solutions.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_skips_completed_problems() {
        let generator = Arc::new(StageGenerator::new());
        let (pipeline, _) = pipeline(generator.clone());

        completed(pipeline.run_problem(&problem()).await.unwrap());
        let calls_after_first = generator.count();

        let outcome = pipeline.run_problem(&problem()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Skipped));
        // Zero additional gateway calls on the second run.
        assert_eq!(generator.count(), calls_after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_history_recorded() {
        let generator = Arc::new(StageGenerator::new());
        let (pipeline, _) = pipeline(generator);

        let transcript = completed(pipeline.run_problem(&problem()).await.unwrap());
        let phases: Vec<DebatePhase> = transcript.transitions.iter().map(|t| t.to).collect();
        assert_eq!(
            phases,
            vec![
                DebatePhase::Generated,
                DebatePhase::Reviewed,
                DebatePhase::Refined,
                DebatePhase::Judged,
                DebatePhase::Scored,
            ]
        );
    }

    #[test]
    fn test_selected_answer_falls_back_to_winner_solution() {
        let refined = vec![Solution {
            role: "Solver_1".to_string(),
            problem_id: 1,
            reasoning: String::new(),
            final_answer: "42".to_string(),
            confidence: None,
            raw: String::new(),
            parse: crate::transcript::ParseStatus::Complete,
            refined: true,
        }];
        let judgment = Judgment {
            winner: "Solver_1".to_string(),
            confidence: None,
            analysis: String::new(),
            reasoning: String::new(),
            final_answer: String::new(),
            raw: String::new(),
            parse: crate::transcript::ParseStatus::Incomplete {
                missing: vec!["FINAL_ANSWER".to_string()],
            },
        };
        assert_eq!(selected_answer(&judgment, &refined), "42");
    }
}
