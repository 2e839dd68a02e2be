//! Agent operations: Solve, Review, Refine, and Judge.
//!
//! An agent is a role binding plus a handle to the shared gateway. Each
//! operation formats one stage prompt, issues exactly one gateway call at
//! the role's bound temperature, and parses the response into a structured
//! result. Parsing degrades gracefully: missing sections yield an
//! `Incomplete` result with best-effort fields, never an error.

use std::sync::Arc;

use tracing::debug;

use crate::gateway::{Gateway, GatewayError};
use crate::parse;
use crate::prompts;
use crate::roles::AgentRole;
use crate::transcript::{Assessment, Judgment, ParseStatus, Problem, Review, Solution};

/// A role bound to the shared gateway.
#[derive(Clone)]
pub struct Agent {
    role: AgentRole,
    gateway: Arc<Gateway>,
}

impl Agent {
    pub fn new(role: AgentRole, gateway: Arc<Gateway>) -> Self {
        Self { role, gateway }
    }

    pub fn name(&self) -> &str {
        &self.role.name
    }

    /// One gateway call with the role's instruction prepended.
    async fn generate(&self, prompt: &str) -> Result<String, GatewayError> {
        let full_prompt = format!("{}\n\n{}", self.role.instruction, prompt);
        self.gateway.call(&full_prompt, self.role.temperature).await
    }

    /// Stage 1: produce an independent solution.
    pub async fn solve(&self, problem: &Problem) -> Result<Solution, GatewayError> {
        let raw = self.generate(&prompts::solve_prompt(&problem.question)).await?;
        debug!(role = %self.role.name, problem = problem.id, "solution generated");
        Ok(parse_solution(&self.role.name, problem.id, &raw, false))
    }

    /// Stage 2: critique a peer's solution.
    pub async fn review(&self, problem: &Problem, peer: &Solution) -> Result<Review, GatewayError> {
        let raw = self
            .generate(&prompts::review_prompt(&problem.question, peer))
            .await?;
        debug!(
            reviewer = %self.role.name,
            reviewed = %peer.role,
            problem = problem.id,
            "review generated"
        );
        Ok(parse_review(&self.role.name, &peer.role, problem.id, &raw))
    }

    /// Stage 3: refine the own solution against received reviews.
    pub async fn refine(
        &self,
        problem: &Problem,
        own: &Solution,
        reviews: &[&Review],
    ) -> Result<Solution, GatewayError> {
        let raw = self
            .generate(&prompts::refine_prompt(&problem.question, own, reviews))
            .await?;
        debug!(role = %self.role.name, problem = problem.id, "refined solution generated");
        Ok(parse_solution(&self.role.name, problem.id, &raw, true))
    }

    /// Stage 4: arbitrate among refined solutions (judge role only).
    pub async fn judge(
        &self,
        problem: &Problem,
        refined: &[Solution],
        reviews: &[Review],
        solver_names: &[String],
    ) -> Result<Judgment, GatewayError> {
        let raw = self
            .generate(&prompts::judge_prompt(&problem.question, refined, reviews))
            .await?;
        debug!(problem = problem.id, "judgment generated");
        Ok(parse_judgment(&raw, solver_names))
    }
}

/// Parse a solve/refine response into a `Solution`.
fn parse_solution(role: &str, problem_id: u32, raw: &str, refined: bool) -> Solution {
    let expected: &[&str] = if refined {
        &["REFINED_REASONING", "REFINED_ANSWER", "CONFIDENCE"]
    } else {
        &["REASONING", "ANSWER", "CONFIDENCE"]
    };
    let (sections, missing) = parse::expect_sections(raw, expected);

    let reasoning = sections
        .get(if refined { "REFINED_REASONING" } else { "REASONING" })
        .cloned()
        .unwrap_or_default();
    let final_answer = sections
        .get(if refined { "REFINED_ANSWER" } else { "ANSWER" })
        .and_then(|body| body.lines().find(|l| !l.trim().is_empty()))
        .map(|l| l.trim().to_string())
        .or_else(|| parse::extract_final_answer(raw))
        .unwrap_or_default();
    let confidence = sections.get("CONFIDENCE").and_then(|b| parse::parse_confidence(b));

    Solution {
        role: role.to_string(),
        problem_id,
        reasoning,
        final_answer,
        confidence,
        raw: raw.to_string(),
        parse: status_from_missing(missing),
        refined,
    }
}

/// Parse a review response into a structured `Review`.
fn parse_review(reviewer: &str, reviewed: &str, problem_id: u32, raw: &str) -> Review {
    let expected = [
        "STRENGTHS",
        "WEAKNESSES",
        "ERRORS",
        "SUGGESTED_CHANGES",
        "OVERALL_ASSESSMENT",
    ];
    let (sections, missing) = parse::expect_sections(raw, &expected);

    let items = |key: &str| {
        sections
            .get(key)
            .map(|body| parse::parse_items(body))
            .unwrap_or_default()
    };
    let assessment = sections
        .get("OVERALL_ASSESSMENT")
        .map(|body| parse_assessment(body))
        .unwrap_or(Assessment::Unspecified);

    Review {
        reviewer: reviewer.to_string(),
        reviewed: reviewed.to_string(),
        problem_id,
        strengths: items("STRENGTHS"),
        weaknesses: items("WEAKNESSES"),
        errors: items("ERRORS"),
        suggestions: items("SUGGESTED_CHANGES"),
        assessment,
        raw: raw.to_string(),
        parse: status_from_missing(missing),
    }
}

fn parse_assessment(body: &str) -> Assessment {
    let body = body.to_lowercase();
    if body.contains("fundamentally_flawed") || body.contains("fundamentally flawed") {
        Assessment::FundamentallyFlawed
    } else if body.contains("sound_solution") || body.contains("sound solution") {
        Assessment::SoundSolution
    } else if body.contains("promising") {
        Assessment::PromisingButFlawed
    } else {
        Assessment::Unspecified
    }
}

/// Parse a judgment response, resolving the winner against solver names.
fn parse_judgment(raw: &str, solver_names: &[String]) -> Judgment {
    let expected = ["ANALYSIS", "WINNER", "REASONING", "CONFIDENCE", "FINAL_ANSWER"];
    let (sections, mut missing) = parse::expect_sections(raw, &expected);

    let winner_text = sections.get("WINNER").cloned().unwrap_or_default();
    let winner = solver_names
        .iter()
        .find(|name| winner_text.to_lowercase().contains(&name.to_lowercase()))
        .cloned()
        .unwrap_or_default();
    if winner.is_empty() && !missing.contains(&"WINNER".to_string()) {
        // The section existed but named no known solver.
        missing.push("WINNER".to_string());
    }

    let final_answer = sections
        .get("FINAL_ANSWER")
        .and_then(|body| body.lines().find(|l| !l.trim().is_empty()))
        .map(|l| l.trim().to_string())
        .or_else(|| parse::extract_final_answer(raw))
        .unwrap_or_default();

    Judgment {
        winner,
        confidence: sections.get("CONFIDENCE").and_then(|b| parse::parse_confidence(b)),
        analysis: sections.get("ANALYSIS").cloned().unwrap_or_default(),
        reasoning: sections.get("REASONING").cloned().unwrap_or_default(),
        final_answer,
        raw: raw.to_string(),
        parse: status_from_missing(missing),
    }
}

fn status_from_missing(missing: Vec<String>) -> ParseStatus {
    if missing.is_empty() {
        ParseStatus::Complete
    } else {
        ParseStatus::Incomplete { missing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_solution_complete() {
        let raw = "REASONING:\nTorque balance about the base.\n\nANSWER:\ncot(θ)/2\n\nCONFIDENCE:\n0.85\n";
        let s = parse_solution("Solver_1", 1, raw, false);
        assert_eq!(s.parse, ParseStatus::Complete);
        assert_eq!(s.final_answer, "cot(θ)/2");
        assert_eq!(s.confidence, Some(0.85));
        assert!(s.reasoning.contains("Torque balance"));
        assert!(!s.refined);
    }

    #[test]
    fn test_parse_solution_missing_sections_degrades() {
        let raw = "I think the answer is 42.";
        let s = parse_solution("Solver_2", 1, raw, false);
        match &s.parse {
            ParseStatus::Incomplete { missing } => {
                assert!(missing.contains(&"REASONING".to_string()));
                assert!(missing.contains(&"ANSWER".to_string()));
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
        // Best-effort answer via the extraction heuristics.
        assert_eq!(s.final_answer, "42.");
        assert!(s.is_usable());
    }

    #[test]
    fn test_parse_refined_solution() {
        let raw = "RESPONSE_TO_CRITIQUES:\n- accepted\n\nREFINED_REASONING:\nBetter steps.\n\nREFINED_ANSWER:\n4\n\nCONFIDENCE:\n0.9\n";
        let s = parse_solution("Solver_1", 1, raw, true);
        assert_eq!(s.parse, ParseStatus::Complete);
        assert!(s.refined);
        assert_eq!(s.final_answer, "4");
    }

    #[test]
    fn test_parse_review_complete() {
        let raw = "STRENGTHS:\n- clear setup\n\nWEAKNESSES:\n- skips a case\n\nERRORS:\n- sign error in step 3\n\nSUGGESTED_CHANGES:\n- recheck step 3\n\nOVERALL_ASSESSMENT:\npromising_but_flawed\n";
        let r = parse_review("Solver_1", "Solver_2", 1, raw);
        assert_eq!(r.parse, ParseStatus::Complete);
        assert_eq!(r.strengths, vec!["clear setup"]);
        assert_eq!(r.errors, vec!["sign error in step 3"]);
        assert_eq!(r.assessment, Assessment::PromisingButFlawed);
    }

    #[test]
    fn test_parse_review_unstructured_degrades() {
        let r = parse_review("Solver_1", "Solver_2", 1, "Looks fine to me.");
        assert!(matches!(r.parse, ParseStatus::Incomplete { .. }));
        assert_eq!(r.assessment, Assessment::Unspecified);
        assert!(r.strengths.is_empty());
    }

    #[test]
    fn test_parse_assessment_variants() {
        assert_eq!(parse_assessment("sound_solution"), Assessment::SoundSolution);
        assert_eq!(
            parse_assessment("This is fundamentally flawed."),
            Assessment::FundamentallyFlawed
        );
        assert_eq!(
            parse_assessment("promising but flawed"),
            Assessment::PromisingButFlawed
        );
        assert_eq!(parse_assessment("meh"), Assessment::Unspecified);
    }

    #[test]
    fn test_parse_judgment_resolves_winner() {
        let raw = "ANALYSIS:\nAll three are close.\n\nWINNER:\nSolver_2\n\nREASONING:\nMost rigorous.\n\nCONFIDENCE:\n0.8\n\nFINAL_ANSWER:\n42\n";
        let names: Vec<String> = ["Solver_1", "Solver_2", "Solver_3"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let j = parse_judgment(raw, &names);
        assert_eq!(j.parse, ParseStatus::Complete);
        assert_eq!(j.winner, "Solver_2");
        assert_eq!(j.final_answer, "42");
        assert_eq!(j.confidence, Some(0.8));
    }

    #[test]
    fn test_parse_judgment_unknown_winner_flagged() {
        let raw = "WINNER:\nSolver_7\n\nFINAL_ANSWER:\n42\n";
        let names = vec!["Solver_1".to_string(), "Solver_2".to_string()];
        let j = parse_judgment(raw, &names);
        assert!(j.winner.is_empty());
        match &j.parse {
            ParseStatus::Incomplete { missing } => {
                assert!(missing.contains(&"WINNER".to_string()))
            }
            other => panic!("expected Incomplete, got {other:?}"),
        }
        assert_eq!(j.final_answer, "42");
    }

    #[test]
    fn test_winner_case_insensitive() {
        let raw = "WINNER:\nThe winner is SOLVER_3.\n\nFINAL_ANSWER:\nx\n";
        let names = vec!["Solver_3".to_string()];
        let j = parse_judgment(raw, &names);
        assert_eq!(j.winner, "Solver_3");
    }
}
