mod config;
mod gemini;
mod report;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use orchestration::{
    AnswerValidator, DebatePipeline, FsCheckpointStore, Gateway, Problem, RunOutcome,
};

use config::RunnerConfig;
use gemini::GeminiClient;
use report::RunSummary;

/// Multi-agent debate benchmark runner.
#[derive(Debug, Parser)]
#[command(name = "debate-runner", about = "Run the multi-agent debate pipeline")]
struct Cli {
    /// Run a single problem by id.
    #[arg(long, conflicts_with = "all")]
    problem_id: Option<u32>,
    /// Run every problem in the set, resuming past completed ones.
    #[arg(long)]
    all: bool,
    /// Problem-set JSON file (overrides DEBATE_PROBLEMS_FILE).
    #[arg(long)]
    problems: Option<PathBuf>,
    /// Results directory (overrides DEBATE_RESULTS_DIR).
    #[arg(long)]
    results: Option<PathBuf>,
    /// Print the summary report over persisted results and exit.
    #[arg(long)]
    report: bool,
}

fn load_problems(path: &PathBuf) -> Result<Vec<Problem>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading problem set {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing problem set {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    let mut config = RunnerConfig::default();
    if let Some(problems) = cli.problems {
        config.problems_file = problems;
    }
    if let Some(results) = cli.results {
        config.results_dir = results;
    }

    let checkpoint = Arc::new(
        FsCheckpointStore::new(&config.results_dir)
            .with_context(|| format!("opening results dir {}", config.results_dir.display()))?,
    );

    if cli.report {
        print!("{}", RunSummary::from_store(checkpoint.as_ref()).render());
        return Ok(());
    }

    if config.endpoint.api_key.is_empty() {
        anyhow::bail!("DEBATE_API_KEY is not set");
    }

    let problems = load_problems(&config.problems_file)?;
    info!(
        count = problems.len(),
        model = %config.endpoint.model,
        rpm = config.gateway.max_requests_per_minute,
        "debate runner starting"
    );

    let generator = Arc::new(GeminiClient::new(config.endpoint.clone()));
    let gateway = Arc::new(Gateway::new(generator, config.gateway.clone()));
    let pipeline = DebatePipeline::new(
        gateway,
        config.roster(),
        AnswerValidator::new(config.validator),
        checkpoint.clone(),
    );

    let selected: Vec<&Problem> = match cli.problem_id {
        Some(id) => {
            let problem = problems
                .iter()
                .find(|p| p.id == id)
                .with_context(|| format!("problem {id} not found in the problem set"))?;
            vec![problem]
        }
        None => {
            if !cli.all {
                info!("no selection flags given, running the full problem set");
            }
            problems.iter().collect()
        }
    };

    // Ctrl-C finishes the in-flight problem (and persists it) before exit.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("shutdown requested, finishing the current problem before exit");
                shutdown.cancel();
            }
        });
    }

    let mut skipped = 0usize;
    let mut failures = 0usize;
    for problem in selected {
        if shutdown.is_cancelled() {
            warn!(problem = problem.id, "skipping remaining problems after shutdown request");
            break;
        }
        match pipeline.run_problem(problem).await {
            Ok(RunOutcome::Skipped) => skipped += 1,
            Ok(RunOutcome::Completed(transcript)) => {
                info!("{}", transcript.summary_line());
            }
            Err(e) => {
                // Per-problem failure only; the run continues.
                failures += 1;
                warn!(problem = problem.id, error = %e, "problem run failed");
            }
        }
    }

    info!(skipped, failures, "run finished");
    print!("{}", RunSummary::from_store(checkpoint.as_ref()).render());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_problems_parses_answer_forms() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("problems.json");
        std::fs::write(
            &path,
            r#"[
                {"id": 1, "category": "math", "question": "2+2?", "correct_answer": "4"},
                {"id": 2, "category": "physics", "question": "mu?",
                 "correct_answer": {"primary": "cot(θ)/2", "alternates": ["1/(2tan(θ))"]}}
            ]"#,
        )
        .unwrap();

        let problems = load_problems(&path).unwrap();
        assert_eq!(problems.len(), 2);
        assert_eq!(problems[0].answer.primary(), "4");
        assert_eq!(problems[1].answer.forms().len(), 2);
    }

    #[test]
    fn test_load_problems_missing_file_errors() {
        let err = load_problems(&PathBuf::from("/nonexistent/problems.json")).unwrap_err();
        assert!(err.to_string().contains("problems.json"));
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from(["debate-runner", "--problem-id", "3", "--results", "out"]);
        assert_eq!(cli.problem_id, Some(3));
        assert_eq!(cli.results, Some(PathBuf::from("out")));
        assert!(!cli.all);
    }
}
