//! Stage prompt construction for the debate pipeline.
//!
//! Each operation formats the relevant inputs into one prompt asking for
//! `HEADER:` structured output that `parse` understands. The role's
//! behavioral instruction is prepended separately by the agent, so these
//! templates stay role-agnostic.

use crate::transcript::{Review, Solution};

/// Stage 1: independent solution.
pub fn solve_prompt(question: &str) -> String {
    format!(
        "Problem: {question}\n\n\
         Provide a complete solution with step-by-step reasoning. Structure your response as:\n\n\
         REASONING:\n\
         [Your detailed step-by-step reasoning]\n\n\
         ANSWER:\n\
         [Your final answer]\n\n\
         CONFIDENCE:\n\
         [Your confidence level from 0 to 1]\n"
    )
}

/// Stage 2: critique of a peer's solution.
pub fn review_prompt(question: &str, peer: &Solution) -> String {
    format!(
        "Problem: {question}\n\n\
         Solution to review from {peer_role}:\n\
         {peer_text}\n\n\
         Critically evaluate this solution. Provide:\n\n\
         STRENGTHS:\n\
         - [List strengths]\n\n\
         WEAKNESSES:\n\
         - [List weaknesses]\n\n\
         ERRORS:\n\
         - [Identify any logical errors, calculation mistakes, or unjustified assumptions]\n\n\
         SUGGESTED_CHANGES:\n\
         - [Specific suggestions for improvement]\n\n\
         OVERALL_ASSESSMENT:\n\
         [promising_but_flawed / sound_solution / fundamentally_flawed]\n",
        peer_role = peer.role,
        peer_text = peer.raw,
    )
}

/// Stage 3: refinement against the reviews a solver received.
pub fn refine_prompt(question: &str, own: &Solution, reviews: &[&Review]) -> String {
    let mut review_block = String::new();
    if reviews.is_empty() {
        review_block.push_str("(No peer reviews were received.)\n");
    }
    for (i, review) in reviews.iter().enumerate() {
        review_block.push_str(&format!(
            "Review {n} (from {reviewer}):\n{text}\n\n",
            n = i + 1,
            reviewer = review.reviewer,
            text = review.raw,
        ));
    }
    format!(
        "Problem: {question}\n\n\
         Your original solution:\n\
         {own_text}\n\n\
         Peer reviews you received:\n\n\
         {review_block}\
         Address each critique and produce your refined solution. Structure as:\n\n\
         RESPONSE_TO_CRITIQUES:\n\
         - [For each critique, explain whether you accept it and what changes you made]\n\n\
         REFINED_REASONING:\n\
         [Your improved step-by-step reasoning]\n\n\
         REFINED_ANSWER:\n\
         [Your final answer]\n\n\
         CONFIDENCE:\n\
         [Your confidence level from 0 to 1]\n",
        own_text = own.raw,
    )
}

/// Stage 4: judgment over all refined solutions and reviews.
pub fn judge_prompt(question: &str, refined: &[Solution], reviews: &[Review]) -> String {
    let mut solutions_block = String::new();
    for solution in refined {
        solutions_block.push_str(&format!(
            "{role} REFINED SOLUTION:\n{text}\n\n",
            role = solution.role.to_uppercase(),
            text = solution.raw,
        ));
    }
    let mut reviews_block = String::new();
    for review in reviews.iter().filter(|r| r.is_usable()) {
        reviews_block.push_str(&format!(
            "Review of {reviewed} by {reviewer}: {assessment}\n",
            reviewed = review.reviewed,
            reviewer = review.reviewer,
            assessment = review.assessment,
        ));
    }
    format!(
        "Problem: {question}\n\n\
         You are judging the following refined solutions to this problem.\n\n\
         {solutions_block}\
         Peer review verdicts:\n\
         {reviews_block}\n\
         Evaluate all solutions and determine which is best. Provide:\n\n\
         ANALYSIS:\n\
         [Compare the solutions, identify strengths and weaknesses of each]\n\n\
         WINNER:\n\
         [The name of the winning solver]\n\n\
         REASONING:\n\
         [Explain why this solution is best]\n\n\
         CONFIDENCE:\n\
         [Your confidence in this judgment from 0 to 1]\n\n\
         FINAL_ANSWER:\n\
         [The answer from the winning solution]\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::ParseStatus;

    fn solution(role: &str, raw: &str) -> Solution {
        Solution {
            role: role.to_string(),
            problem_id: 1,
            reasoning: String::new(),
            final_answer: String::new(),
            confidence: None,
            raw: raw.to_string(),
            parse: ParseStatus::Complete,
            refined: false,
        }
    }

    #[test]
    fn test_solve_prompt_asks_for_sections() {
        let p = solve_prompt("What is 2+2?");
        assert!(p.contains("Problem: What is 2+2?"));
        assert!(p.contains("REASONING:"));
        assert!(p.contains("ANSWER:"));
        assert!(p.contains("CONFIDENCE:"));
    }

    #[test]
    fn test_review_prompt_embeds_peer() {
        let peer = solution("Solver_2", "ANSWER: 4");
        let p = review_prompt("What is 2+2?", &peer);
        assert!(p.contains("Solution to review from Solver_2"));
        assert!(p.contains("ANSWER: 4"));
        assert!(p.contains("OVERALL_ASSESSMENT:"));
    }

    #[test]
    fn test_refine_prompt_numbers_reviews() {
        let own = solution("Solver_1", "ANSWER: 4");
        let r1 = Review::failed("Solver_2", "Solver_1", 1, "n/a");
        let mut r1 = r1;
        r1.raw = "WEAKNESSES:\n- none".to_string();
        r1.parse = ParseStatus::Complete;
        let p = refine_prompt("q", &own, &[&r1]);
        assert!(p.contains("Review 1 (from Solver_2):"));
        assert!(p.contains("REFINED_ANSWER:"));
    }

    #[test]
    fn test_refine_prompt_without_reviews() {
        let own = solution("Solver_1", "ANSWER: 4");
        let p = refine_prompt("q", &own, &[]);
        assert!(p.contains("No peer reviews were received"));
    }

    #[test]
    fn test_judge_prompt_lists_all_refined() {
        let refined = vec![
            solution("Solver_1", "REFINED_ANSWER: 4"),
            solution("Solver_3", "REFINED_ANSWER: 5"),
        ];
        let p = judge_prompt("q", &refined, &[]);
        assert!(p.contains("SOLVER_1 REFINED SOLUTION:"));
        assert!(p.contains("SOLVER_3 REFINED SOLUTION:"));
        assert!(p.contains("WINNER:"));
        assert!(p.contains("FINAL_ANSWER:"));
    }
}
