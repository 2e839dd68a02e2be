//! Runtime configuration with environment overrides.
//!
//! Defaults target the free-tier request budget of the hosted generation
//! service; every knob can be overridden through `DEBATE_*` environment
//! variables so runs can be tuned without rebuilding.

use std::path::PathBuf;
use std::time::Duration;

use orchestration::{GatewayConfig, Roster, ValidatorConfig};

/// Hosted generation endpoint configuration.
#[derive(Debug, Clone)]
pub struct ApiEndpoint {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

/// Top-level runner configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub endpoint: ApiEndpoint,
    pub gateway: GatewayConfig,
    pub validator: ValidatorConfig,
    /// Problem-set JSON path.
    pub problems_file: PathBuf,
    /// Directory transcripts are persisted into.
    pub results_dir: PathBuf,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            endpoint: ApiEndpoint {
                base_url: env_or(
                    "DEBATE_API_URL",
                    "https://generativelanguage.googleapis.com/v1beta",
                ),
                api_key: std::env::var("DEBATE_API_KEY").unwrap_or_default(),
                model: env_or("DEBATE_MODEL", "gemini-2.0-flash-exp"),
            },
            gateway: GatewayConfig {
                max_requests_per_minute: env_parse("DEBATE_RPM", 10),
                min_spacing: Duration::from_secs(env_parse("DEBATE_MIN_SPACING_S", 6)),
                cooldown: Duration::from_secs(env_parse("DEBATE_COOLDOWN_S", 70)),
                transient_attempts: env_parse("DEBATE_RETRY_ATTEMPTS", 3),
                backoff_base: Duration::from_secs(1),
            },
            validator: ValidatorConfig::default(),
            problems_file: env_or("DEBATE_PROBLEMS_FILE", "data/problems/problems.json").into(),
            results_dir: env_or("DEBATE_RESULTS_DIR", "data/results").into(),
        }
    }
}

impl RunnerConfig {
    /// The fixed role panel for this run.
    pub fn roster(&self) -> Roster {
        Roster::default_panel()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::default();
        assert_eq!(config.gateway.max_requests_per_minute, 10);
        assert_eq!(config.gateway.min_spacing, Duration::from_secs(6));
        assert_eq!(config.gateway.cooldown, Duration::from_secs(70));
        assert_eq!(config.gateway.transient_attempts, 3);
        assert!(config.endpoint.model.starts_with("gemini"));
        assert_eq!(config.results_dir, PathBuf::from("data/results"));
    }

    #[test]
    fn test_roster_is_three_plus_judge() {
        let roster = RunnerConfig::default().roster();
        assert_eq!(roster.solvers.len(), 3);
        assert_eq!(roster.judge.name, "Judge");
    }
}
