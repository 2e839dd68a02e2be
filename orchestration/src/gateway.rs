//! Rate-limited gateway, the single admission point for generation calls.
//!
//! Every agent operation funnels through one `Gateway` instance, which
//! enforces a requests-per-minute ceiling over a rolling 60-second window,
//! a minimum spacing between consecutive calls, and a fixed cooldown after
//! quota exhaustion. The prune-check-record sequence runs under one mutex
//! guard, so the window invariant holds even with concurrent stage fan-out.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Rolling window the request ceiling applies to.
const WINDOW: Duration = Duration::from_secs(60);

/// Error from the external text-generation capability.
#[derive(Debug, Clone, Error)]
pub enum GenerateError {
    /// Network or server hiccup; worth retrying.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The service reported quota exhaustion.
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),
    /// Malformed request; never retried.
    #[error("fatal request error: {0}")]
    Fatal(String),
}

/// The sole external dependency the engine orchestrates against.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, temperature: f64) -> Result<String, GenerateError>;
}

/// Error surfaced by the gateway after local recovery is exhausted.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Transient failures persisted through the whole retry budget.
    #[error("transient failure after {attempts} attempts: {reason}")]
    Transient { attempts: u32, reason: String },
    /// Quota still exhausted after one cooldown and retry.
    #[error("quota exceeded after cooldown retry: {0}")]
    QuotaExceeded(String),
    /// Malformed request, surfaced immediately.
    #[error("fatal request error: {0}")]
    Fatal(String),
}

/// Gateway throttling and retry configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Maximum admitted calls in any rolling 60-second window.
    pub max_requests_per_minute: usize,
    /// Minimum spacing between consecutive admitted calls.
    pub min_spacing: Duration,
    /// Cooldown after a quota-exhaustion signal (window length plus margin;
    /// a configured guess, not a service-provided retry hint).
    pub cooldown: Duration,
    /// Total attempts per call for transient failures.
    pub transient_attempts: u32,
    /// Base delay for exponential transient backoff.
    pub backoff_base: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_requests_per_minute: 10,
            min_spacing: Duration::from_secs(6),
            cooldown: Duration::from_secs(70),
            transient_attempts: 3,
            backoff_base: Duration::from_secs(1),
        }
    }
}

/// Shared mutable throttling state. Mutated only inside `admit`.
#[derive(Debug, Default)]
struct RateBudget {
    /// Admission instants inside the trailing window, oldest first.
    admitted: VecDeque<Instant>,
    /// Most recent admission, for spacing enforcement.
    last_admitted: Option<Instant>,
    /// Admissions are refused until this deadline after quota exhaustion.
    cooldown_until: Option<Instant>,
}

/// What the admission check decided under the lock.
enum Admission {
    Admitted,
    Wait(Duration),
}

/// Single shared chokepoint for every generation call.
pub struct Gateway {
    generator: Arc<dyn TextGenerator>,
    config: GatewayConfig,
    budget: Mutex<RateBudget>,
}

impl Gateway {
    pub fn new(generator: Arc<dyn TextGenerator>, config: GatewayConfig) -> Self {
        Self {
            generator,
            config,
            budget: Mutex::new(RateBudget::default()),
        }
    }

    /// Issue one generation call through the shared rate budget.
    ///
    /// Recovery is local: transient failures retry with exponential backoff
    /// inside the attempt budget, and a quota signal triggers exactly one
    /// cooldown-then-retry before surfacing. Every attempt re-passes
    /// admission, so retries cannot break the window invariant.
    pub async fn call(&self, prompt: &str, temperature: f64) -> Result<String, GatewayError> {
        let mut attempts = 0u32;
        let mut cooled_down = false;

        loop {
            self.admit().await;
            attempts += 1;

            match self.generator.generate(prompt, temperature).await {
                Ok(text) => return Ok(text),
                Err(GenerateError::Fatal(reason)) => {
                    return Err(GatewayError::Fatal(reason));
                }
                Err(GenerateError::Transient(reason)) => {
                    if attempts >= self.config.transient_attempts {
                        return Err(GatewayError::Transient { attempts, reason });
                    }
                    let backoff = self.config.backoff_base * 2u32.pow(attempts - 1);
                    warn!(
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        reason = %reason,
                        "transient generation failure, backing off"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(GenerateError::QuotaExceeded(reason)) => {
                    if cooled_down {
                        return Err(GatewayError::QuotaExceeded(reason));
                    }
                    cooled_down = true;
                    let until = Instant::now() + self.config.cooldown;
                    {
                        let mut budget = self.budget.lock().await;
                        budget.cooldown_until = Some(until);
                    }
                    warn!(
                        cooldown_s = self.config.cooldown.as_secs(),
                        reason = %reason,
                        "quota exhausted, entering cooldown"
                    );
                    // The next admit() blocks behind the cooldown deadline,
                    // as do all concurrent callers.
                }
            }
        }
    }

    /// Block until the rate budget admits one call, then record it.
    async fn admit(&self) {
        loop {
            let decision = {
                let mut budget = self.budget.lock().await;
                self.check_and_record(&mut budget)
            };
            match decision {
                Admission::Admitted => return,
                Admission::Wait(wait) => {
                    debug!(wait_ms = wait.as_millis() as u64, "rate budget full, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// The prune-check-record sequence. Runs under the budget lock.
    fn check_and_record(&self, budget: &mut RateBudget) -> Admission {
        let now = Instant::now();

        if let Some(until) = budget.cooldown_until {
            if until > now {
                return Admission::Wait(until - now);
            }
            budget.cooldown_until = None;
        }

        while let Some(&oldest) = budget.admitted.front() {
            if now.duration_since(oldest) >= WINDOW {
                budget.admitted.pop_front();
            } else {
                break;
            }
        }

        if budget.admitted.len() >= self.config.max_requests_per_minute {
            if let Some(&oldest) = budget.admitted.front() {
                // Wait until the oldest admission exits the window.
                return Admission::Wait(oldest + WINDOW - now);
            }
        }

        if let Some(last) = budget.last_admitted {
            let since = now.duration_since(last);
            if since < self.config.min_spacing {
                return Admission::Wait(self.config.min_spacing - since);
            }
        }

        budget.admitted.push_back(now);
        budget.last_admitted = Some(now);
        Admission::Admitted
    }

    /// Calls admitted inside the current trailing window.
    pub async fn admitted_in_window(&self) -> usize {
        let mut budget = self.budget.lock().await;
        let now = Instant::now();
        while let Some(&oldest) = budget.admitted.front() {
            if now.duration_since(oldest) >= WINDOW {
                budget.admitted.pop_front();
            } else {
                break;
            }
        }
        budget.admitted.len()
    }
}
