//! Sectioned-response parsing for agent outputs.
//!
//! Agents are asked to structure responses as `HEADER:` sections
//! (REASONING / ANSWER / CONFIDENCE and friends). Generation output is
//! loosely structured at best, so everything here is best-effort: callers
//! get whatever sections were found plus the list of expected sections
//! that were missing, never an error.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Matches a section header at the start of a line, e.g. `FINAL_ANSWER:`.
fn header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Z][A-Z0-9_]{2,}):\s*(.*)$").unwrap())
}

/// Split a response into `HEADER -> body` sections.
///
/// Text before the first header is ignored. Headers repeated later in the
/// text keep the first occurrence (models sometimes echo the template).
pub fn split_sections(text: &str) -> HashMap<String, String> {
    let mut sections: HashMap<String, String> = HashMap::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        if let Some(caps) = header_re().captures(line.trim_end()) {
            if let Some((name, body)) = current.take() {
                sections.entry(name).or_insert_with(|| join_body(&body));
            }
            let name = caps[1].to_string();
            let rest = caps.get(2).map_or("", |m| m.as_str()).trim();
            let mut body = Vec::new();
            if !rest.is_empty() {
                body.push(rest);
            }
            current = Some((name, body));
        } else if let Some((_, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some((name, body)) = current.take() {
        sections.entry(name).or_insert_with(|| join_body(&body));
    }
    sections
}

fn join_body(lines: &[&str]) -> String {
    lines.join("\n").trim().to_string()
}

/// Collect the named sections, reporting which expected ones are missing.
pub fn expect_sections(text: &str, expected: &[&str]) -> (HashMap<String, String>, Vec<String>) {
    let sections = split_sections(text);
    let missing = expected
        .iter()
        .filter(|name| {
            sections
                .get(**name)
                .map(|body| body.is_empty())
                .unwrap_or(true)
        })
        .map(|name| name.to_string())
        .collect();
    (sections, missing)
}

/// Parse a bulleted section body (`- item` lines) into items.
///
/// Non-bulleted bodies collapse to a single item so no content is lost.
pub fn parse_items(body: &str) -> Vec<String> {
    let items: Vec<String> = body
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            line.strip_prefix("- ")
                .or_else(|| line.strip_prefix("* "))
                .map(|item| item.trim().to_string())
        })
        .filter(|item| !item.is_empty() && item != "[List strengths]" && item != "[List weaknesses]")
        .collect();
    if items.is_empty() && !body.trim().is_empty() {
        vec![body.trim().to_string()]
    } else {
        items
    }
}

/// Parse a confidence section into a value in [0, 1].
///
/// Tolerates prose around the number and percentage forms ("85%").
pub fn parse_confidence(body: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(\d+(?:\.\d+)?)\s*(%)?").unwrap());
    let caps = re.captures(body)?;
    let mut value: f64 = caps[1].parse().ok()?;
    if caps.get(2).is_some() || value > 1.0 {
        value /= 100.0;
    }
    (0.0..=1.0).contains(&value).then_some(value)
}

/// Extract a final answer from free-form solution or judgment text.
///
/// Layered heuristics: FINAL_ANSWER / REFINED_ANSWER / ANSWER sections,
/// then "the answer is ..." phrasing, then the last content line that is
/// not a confidence statement.
pub fn extract_final_answer(text: &str) -> Option<String> {
    let sections = split_sections(text);
    for key in ["FINAL_ANSWER", "REFINED_ANSWER", "ANSWER"] {
        if let Some(body) = sections.get(key) {
            if let Some(first_line) = body.lines().find(|l| !l.trim().is_empty()) {
                return Some(first_line.trim().to_string());
            }
        }
    }

    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"(?i)(?:the answer is|answer is|equals?)\s*:?\s*([^\n]+)").unwrap());
    if let Some(caps) = re.captures(text) {
        return Some(caps[1].trim().to_string());
    }

    text.lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("CONFIDENCE"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOLUTION: &str = "\
REASONING:
Step 1: consider torque balance.
Step 2: solve for mu.

ANSWER:
cot(θ)/2

CONFIDENCE:
0.85
";

    #[test]
    fn test_split_sections_basic() {
        let sections = split_sections(SOLUTION);
        assert_eq!(sections["ANSWER"], "cot(θ)/2");
        assert!(sections["REASONING"].contains("torque balance"));
        assert_eq!(sections["CONFIDENCE"], "0.85");
    }

    #[test]
    fn test_split_sections_inline_body() {
        let sections = split_sections("ANSWER: 42\nCONFIDENCE: 0.9");
        assert_eq!(sections["ANSWER"], "42");
        assert_eq!(sections["CONFIDENCE"], "0.9");
    }

    #[test]
    fn test_expect_sections_reports_missing() {
        let (sections, missing) = expect_sections("ANSWER: 7", &["REASONING", "ANSWER", "CONFIDENCE"]);
        assert_eq!(sections["ANSWER"], "7");
        assert_eq!(missing, vec!["REASONING".to_string(), "CONFIDENCE".to_string()]);
    }

    #[test]
    fn test_empty_section_counts_as_missing() {
        let (_, missing) = expect_sections("ANSWER:\n\nCONFIDENCE: 0.5", &["ANSWER"]);
        assert_eq!(missing, vec!["ANSWER".to_string()]);
    }

    #[test]
    fn test_parse_items_bulleted() {
        let items = parse_items("- clear setup\n- correct algebra\nnoise");
        assert_eq!(items, vec!["clear setup", "correct algebra"]);
    }

    #[test]
    fn test_parse_items_prose_fallback() {
        let items = parse_items("The approach is sound overall.");
        assert_eq!(items, vec!["The approach is sound overall."]);
    }

    #[test]
    fn test_parse_confidence_forms() {
        assert_eq!(parse_confidence("0.85"), Some(0.85));
        assert_eq!(parse_confidence("I'd say 0.7 roughly"), Some(0.7));
        assert_eq!(parse_confidence("85%"), Some(0.85));
        assert_eq!(parse_confidence("confidence: 90"), Some(0.9));
        assert_eq!(parse_confidence("no number here"), None);
    }

    #[test]
    fn test_extract_final_answer_sections() {
        assert_eq!(extract_final_answer(SOLUTION).as_deref(), Some("cot(θ)/2"));
        assert_eq!(
            extract_final_answer("FINAL_ANSWER:\nSolver_2's answer: 4\n").as_deref(),
            Some("Solver_2's answer: 4")
        );
    }

    #[test]
    fn test_extract_final_answer_phrase() {
        assert_eq!(
            extract_final_answer("After some thought, the answer is 42.").as_deref(),
            Some("42.")
        );
    }

    #[test]
    fn test_extract_final_answer_last_line_fallback() {
        let text = "some reasoning\nmu = 1/2\nCONFIDENCE: 0.6";
        assert_eq!(extract_final_answer(text).as_deref(), Some("mu = 1/2"));
    }
}
