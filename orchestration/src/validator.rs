//! Answer-equivalence validator with layered match strategies.
//!
//! Free-text generation yields answers in inconsistent surface forms, so a
//! single exact-match strategy produces unacceptable false negatives. The
//! validator layers strategies and short-circuits on the first match:
//! normalized exact equality, token containment, numeric tolerance, then a
//! small table of known symbolic equivalences.

use std::sync::OnceLock;

use regex::Regex;

use crate::transcript::CanonicalAnswer;

/// Known equivalent-form token patterns, checked in both directions.
/// A pair matches when one side's tokens all appear in the produced answer
/// and the other side's tokens all appear in the canonical answer.
const EQUIVALENCE_RULES: &[(&[&str], &[&str])] = &[
    // Reciprocal trig: cot(θ)/2 vs 1/(2 tan(θ)).
    (&["cot", "2"], &["1", "2", "tan"]),
    (&["cotangent", "2"], &["1", "2", "tangent"]),
    // Nash equilibrium phrasing.
    (&["defect", "not", "pareto"], &["defect", "not", "pareto"]),
    // Dominant pure strategies described differently.
    (&["play", "paper", "100"], &["play", "paper", "100"]),
    (&["always", "paper"], &["paper", "100"]),
    // Circuit answers: "goes out" vs "no current".
    (&["goes", "out", "completely"], &["goes", "out", "completely"]),
    (&["zero", "current"], &["no", "current"]),
    (&["not", "light"], &["goes", "out"]),
];

/// Tolerances for the numeric comparison layer.
#[derive(Debug, Clone, Copy)]
pub struct ValidatorConfig {
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-3,
            absolute_tolerance: 1e-6,
        }
    }
}

/// Decides whether a produced answer matches a canonical answer.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnswerValidator {
    config: ValidatorConfig,
}

impl AnswerValidator {
    pub fn new(config: ValidatorConfig) -> Self {
        Self { config }
    }

    /// Whether `produced` matches any accepted form of the canonical answer.
    pub fn is_correct(&self, produced: &str, canonical: &CanonicalAnswer) -> bool {
        canonical
            .forms()
            .iter()
            .any(|form| self.matches(produced, form))
    }

    /// Layered comparison against one canonical form.
    pub fn matches(&self, produced: &str, canonical: &str) -> bool {
        let produced_norm = normalize(produced);
        let canonical_norm = normalize(canonical);
        if produced_norm.is_empty() || canonical_norm.is_empty() {
            return false;
        }

        // 1. Normalized exact equality.
        if produced_norm == canonical_norm {
            return true;
        }

        let produced_tokens = tokens(&produced_norm);
        let canonical_tokens = tokens(&canonical_norm);

        // 2. Token containment, only when the canonical form has words
        //    (bare numbers are left to the tolerance layer).
        if canonical_tokens.iter().any(|t| t.chars().any(char::is_alphabetic))
            && contains_all(&produced_tokens, &canonical_tokens)
        {
            return true;
        }

        // 3. Numeric comparison with relative-or-absolute tolerance.
        if let (Some(a), Some(b)) = (first_number(&produced_norm), first_number(&canonical_norm)) {
            let scale = a.abs().max(b.abs());
            if (a - b).abs() <= self.config.absolute_tolerance + self.config.relative_tolerance * scale
            {
                return true;
            }
        }

        // 4. Symbolic equivalence via the rule table, both directions.
        for (lhs, rhs) in EQUIVALENCE_RULES {
            if (contains_all_str(&produced_tokens, lhs) && contains_all_str(&canonical_tokens, rhs))
                || (contains_all_str(&produced_tokens, rhs)
                    && contains_all_str(&canonical_tokens, lhs))
            {
                return true;
            }
        }

        false
    }
}

/// Trim, lowercase, collapse whitespace, strip trailing punctuation.
pub fn normalize(s: &str) -> String {
    let collapsed = s
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    collapsed
        .trim_end_matches(['.', ',', '!', '?', ';', ':'])
        .to_string()
}

/// Alphabetic words and numbers, with symbols and punctuation dropped.
fn tokens(s: &str) -> Vec<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\p{Alphabetic}+|\d+(?:\.\d+)?").unwrap());
    re.find_iter(s).map(|m| m.as_str().to_string()).collect()
}

/// First number appearing in the string, if any.
fn first_number(s: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"-?\d+(?:\.\d+)?").unwrap());
    re.find(s)?.as_str().parse().ok()
}

fn contains_all(haystack: &[String], needles: &[String]) -> bool {
    needles.iter().all(|n| haystack.contains(n))
}

fn contains_all_str(haystack: &[String], needles: &[&str]) -> bool {
    needles.iter().all(|n| haystack.iter().any(|h| h == n))
}
