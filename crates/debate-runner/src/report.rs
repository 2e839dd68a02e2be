//! Run summary over persisted transcripts.
//!
//! Aggregates accuracy, per-category accuracy, and judge selection counts
//! into a plain-text report. Consumed by humans and external tooling;
//! plotting lives elsewhere.

use std::collections::BTreeMap;

use orchestration::{CheckpointStore, DebatePhase, Transcript};

/// Aggregated metrics over a set of transcripts.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub correct: usize,
    pub incorrect: usize,
    pub failed: usize,
    /// (correct, total) per problem category.
    pub by_category: BTreeMap<String, (usize, usize)>,
    /// Times each role was selected as winner.
    pub wins: BTreeMap<String, usize>,
}

impl RunSummary {
    /// Build a summary from every transcript the store holds.
    pub fn from_store(store: &dyn CheckpointStore) -> Self {
        let transcripts: Vec<Transcript> = store
            .completed_ids()
            .into_iter()
            .filter_map(|id| store.load(id))
            .collect();
        Self::from_transcripts(&transcripts)
    }

    pub fn from_transcripts(transcripts: &[Transcript]) -> Self {
        let mut summary = Self::default();
        for transcript in transcripts {
            summary.total += 1;
            let category = if transcript.problem.category.is_empty() {
                "uncategorized".to_string()
            } else {
                transcript.problem.category.clone()
            };
            let entry = summary.by_category.entry(category).or_insert((0, 0));
            entry.1 += 1;

            if transcript.phase == DebatePhase::Failed {
                summary.failed += 1;
                continue;
            }
            match transcript.correct {
                Some(true) => {
                    summary.correct += 1;
                    entry.0 += 1;
                }
                Some(false) | None => summary.incorrect += 1,
            }
            if let Some(judgment) = &transcript.judgment {
                if !judgment.winner.is_empty() {
                    *summary.wins.entry(judgment.winner.clone()).or_insert(0) += 1;
                }
            }
        }
        summary
    }

    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    /// Render the plain-text report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str("==================================================\n");
        out.push_str("        MULTI-AGENT DEBATE RUN SUMMARY\n");
        out.push_str("==================================================\n\n");
        out.push_str(&format!("Total problems:   {}\n", self.total));
        out.push_str(&format!("Correct answers:  {}\n", self.correct));
        out.push_str(&format!("Incorrect:        {}\n", self.incorrect));
        out.push_str(&format!("Failed problems:  {}\n", self.failed));
        out.push_str(&format!("Accuracy:         {:.2}%\n", self.accuracy() * 100.0));

        if !self.by_category.is_empty() {
            out.push_str("\nBy category:\n");
            for (category, (correct, total)) in &self.by_category {
                out.push_str(&format!("  {category:<16} {correct}/{total}\n"));
            }
        }
        if !self.wins.is_empty() {
            out.push_str("\nJudge selections:\n");
            for (role, wins) in &self.wins {
                out.push_str(&format!("  {role:<16} {wins}\n"));
            }
        }
        out
    }
}
