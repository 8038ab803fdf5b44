//! Retry subsystem: named backoff presets, policy construction, and the retry loop.

use attractor_types::{Context, Outcome, StageStatus};
use std::time::Duration;

/// Backoff policy controlling the delay between retry attempts.
#[derive(Debug, Clone)]
pub enum BackoffPolicy {
    /// Fixed delay between retries.
    Fixed(Duration),
    /// Exponential backoff: initial * factor^attempt, capped at max.
    Exponential {
        initial: Duration,
        max: Duration,
        factor: f64,
    },
    /// No delay between retries.
    None,
}

impl BackoffPolicy {
    /// Compute the unjittered delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        match self {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential {
                initial,
                max,
                factor,
            } => {
                let millis = initial.as_millis() as f64 * factor.powi(attempt as i32);
                Duration::from_millis(millis.round() as u64).min(*max)
            }
            BackoffPolicy::None => Duration::ZERO,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
            factor: 2.0,
        }
    }
}

/// Named retry preset, carrying both the backoff shape and its own default
/// `maxAttempts` (used only when neither node nor graph override it).
struct Preset {
    backoff: BackoffPolicy,
    max_attempts: usize,
}

fn resolve_preset(name: &str) -> Preset {
    match name {
        "aggressive" => Preset {
            backoff: BackoffPolicy::Exponential {
                initial: Duration::from_millis(200),
                max: Duration::from_secs(10),
                factor: 2.0,
            },
            max_attempts: 5,
        },
        "patient" => Preset {
            backoff: BackoffPolicy::Exponential {
                initial: Duration::from_secs(2),
                max: Duration::from_secs(120),
                factor: 2.0,
            },
            max_attempts: 3,
        },
        "none" => Preset {
            backoff: BackoffPolicy::None,
            max_attempts: 1,
        },
        _ => Preset {
            backoff: BackoffPolicy::Exponential {
                initial: Duration::from_millis(500),
                max: Duration::from_secs(30),
                factor: 2.0,
            },
            max_attempts: 3,
        },
    }
}

/// A fully resolved retry policy for one node's execution.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub backoff: BackoffPolicy,
    pub max_attempts: usize,
    /// When set, delays are perturbed by a deterministic jitter derived from
    /// this seed combined with the attempt number. `None` means no jitter.
    pub jitter_seed: Option<u64>,
}

impl RetryPolicy {
    /// Build a policy from a named preset, applying the node/graph override
    /// precedence for `maxAttempts`: `1 + (node_max_retries ?? graph_default_max_retry
    /// ?? preset.max_attempts - 1)`.
    pub fn build(
        preset_name: &str,
        node_max_retries: Option<usize>,
        graph_default_max_retry: Option<usize>,
    ) -> Self {
        let preset = resolve_preset(preset_name);
        let retries = node_max_retries
            .or(graph_default_max_retry)
            .unwrap_or(preset.max_attempts.saturating_sub(1));
        RetryPolicy {
            backoff: preset.backoff,
            max_attempts: 1 + retries,
            jitter_seed: None,
        }
    }

    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.jitter_seed = Some(seed);
        self
    }

    fn delay(&self, attempt: usize) -> Duration {
        let base = self.backoff.delay_for_attempt(attempt);
        match self.jitter_seed {
            Some(seed) => {
                let mult = jitter_multiplier(seed, attempt);
                Duration::from_millis((base.as_millis() as f64 * mult).round() as u64)
            }
            None => base,
        }
    }
}

/// Deterministic pseudo-random multiplier in `[0.5, 1.5)` derived from a seed
/// and attempt number, giving ±50% jitter without pulling in a RNG crate.
fn jitter_multiplier(seed: u64, attempt: usize) -> f64 {
    let mut x = seed ^ (attempt as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    x ^= x >> 30;
    x = x.wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x ^= x >> 27;
    x = x.wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^= x >> 31;
    let frac = (x >> 11) as f64 / (1u64 << 53) as f64;
    0.5 + frac
}

fn retry_count_key(node_id: &str) -> String {
    format!("internal.retry_count.{node_id}")
}

/// Execute a handler under the retry loop described by `policy`, recording
/// `internal.retry_count.{node_id}` in `context` across attempts and clearing
/// it on terminal success.
///
/// Handler errors are folded into a FAIL outcome rather than propagated, so
/// the retry loop always produces an [`Outcome`].
pub async fn execute_with_retry<F, Fut>(
    f: F,
    policy: &RetryPolicy,
    node_id: &str,
    context: &Context,
    allow_partial: bool,
) -> Outcome
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = attractor_types::Result<Outcome>>,
{
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let attempts_remain = attempt < max_attempts;
        match f().await {
            Ok(outcome) => match outcome.status {
                StageStatus::Success | StageStatus::PartialSuccess => {
                    context.set(retry_count_key(node_id), "").await;
                    return outcome;
                }
                StageStatus::Retry if attempts_remain => {
                    context.set(retry_count_key(node_id), attempt.to_string()).await;
                    tracing::info!(node = %node_id, attempt, "retrying");
                    tokio::time::sleep(policy.delay(attempt - 1)).await;
                    continue;
                }
                StageStatus::Retry => {
                    if allow_partial {
                        return Outcome {
                            status: StageStatus::PartialSuccess,
                            notes: "retries exhausted, partial accepted".to_string(),
                            ..outcome
                        };
                    }
                    return Outcome::fail("max retries exceeded");
                }
                StageStatus::Fail => return outcome,
                _ => return outcome,
            },
            Err(e) if e.is_retryable() && attempts_remain => {
                context.set(retry_count_key(node_id), attempt.to_string()).await;
                tracing::warn!(node = %node_id, attempt, error = %e, "retryable error, retrying");
                tokio::time::sleep(policy.delay(attempt - 1)).await;
            }
            Err(e) => return Outcome::fail(e.to_string()),
        }
    }
    Outcome::fail("max retries exceeded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use attractor_types::AttractorError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn success_on_first_try() {
        let ctx = Context::new();
        let policy = RetryPolicy::build("none", None, None);
        let outcome = execute_with_retry(
            || async { Ok(Outcome::success("done")) },
            &policy,
            "node_a",
            &ctx,
            false,
        )
        .await;
        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(outcome.notes, "done");
    }

    #[tokio::test]
    async fn retry_on_retryable_error_succeeds() {
        let ctx = Context::new();
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();
        let policy = RetryPolicy::build("standard", Some(2), None);

        let outcome = execute_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    let n = cc.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err(AttractorError::RateLimited {
                            provider: "test".into(),
                            retry_after_ms: 0,
                        })
                    } else {
                        Ok(Outcome::success("recovered"))
                    }
                }
            },
            &policy,
            "node_b",
            &ctx,
            false,
        )
        .await;

        assert_eq!(outcome.status, StageStatus::Success);
        assert_eq!(call_count.load(Ordering::SeqCst), 2);
        assert_eq!(ctx.get("internal.retry_count.node_b").await, Some(String::new()));
    }

    #[tokio::test]
    async fn max_retries_exhausted_on_error_returns_fail() {
        let ctx = Context::new();
        let policy = RetryPolicy::build("none", None, None);
        let outcome = execute_with_retry(
            || async {
                Err(AttractorError::RateLimited {
                    provider: "test".into(),
                    retry_after_ms: 0,
                })
            },
            &policy,
            "node_c",
            &ctx,
            false,
        )
        .await;
        assert_eq!(outcome.status, StageStatus::Fail);
    }

    #[test]
    fn fixed_backoff_constant_delay() {
        let policy = BackoffPolicy::Fixed(Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(200));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let policy = BackoffPolicy::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            factor: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn retry_status_exhausted_without_allow_partial_fails() {
        let ctx = Context::new();
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();
        let policy = RetryPolicy::build("none", None, None);

        let outcome = execute_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Ok(Outcome::with_label(StageStatus::Retry, "retry_edge"))
                }
            },
            &policy,
            "node_d",
            &ctx,
            false,
        )
        .await;

        assert_eq!(outcome.status, StageStatus::Fail);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_status_exhausted_with_allow_partial_succeeds_partially() {
        let ctx = Context::new();
        let policy = RetryPolicy::build("none", None, None);

        let outcome = execute_with_retry(
            || async { Ok(Outcome::with_label(StageStatus::Retry, "retry_edge")) },
            &policy,
            "node_g",
            &ctx,
            true,
        )
        .await;

        assert_eq!(outcome.status, StageStatus::PartialSuccess);
        assert_eq!(outcome.notes, "retries exhausted, partial accepted");
    }

    #[tokio::test]
    async fn non_retryable_error_no_retry() {
        let ctx = Context::new();
        let call_count = Arc::new(AtomicUsize::new(0));
        let cc = call_count.clone();
        let policy = RetryPolicy::build("aggressive", None, None);

        let outcome = execute_with_retry(
            move || {
                let cc = cc.clone();
                async move {
                    cc.fetch_add(1, Ordering::SeqCst);
                    Err(AttractorError::AuthError {
                        provider: "test".into(),
                    })
                }
            },
            &policy,
            "node_e",
            &ctx,
            false,
        )
        .await;

        assert_eq!(outcome.status, StageStatus::Fail);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn none_backoff_zero_delay() {
        let policy = BackoffPolicy::None;
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(99), Duration::ZERO);
    }

    #[test]
    fn standard_preset_defaults() {
        let policy = RetryPolicy::build("standard", None, None);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff.delay_for_attempt(0), Duration::from_millis(500));
    }

    #[test]
    fn aggressive_preset_defaults() {
        let policy = RetryPolicy::build("aggressive", None, None);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff.delay_for_attempt(0), Duration::from_millis(200));
        assert_eq!(policy.backoff.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[test]
    fn patient_preset_defaults() {
        let policy = RetryPolicy::build("patient", None, None);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff.delay_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.backoff.delay_for_attempt(10), Duration::from_secs(120));
    }

    #[test]
    fn none_preset_is_single_attempt() {
        let policy = RetryPolicy::build("none", None, None);
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn node_override_wins_over_preset_default() {
        let policy = RetryPolicy::build("standard", Some(6), None);
        assert_eq!(policy.max_attempts, 7);
    }

    #[test]
    fn graph_default_used_when_node_absent() {
        let policy = RetryPolicy::build("standard", None, Some(1));
        assert_eq!(policy.max_attempts, 2);
    }

    #[test]
    fn jitter_is_deterministic_for_fixed_seed() {
        let policy = RetryPolicy::build("standard", None, None).with_jitter_seed(42);
        let a = policy.delay(1);
        let b = policy.delay(1);
        assert_eq!(a, b);
    }

    #[test]
    fn jitter_stays_within_fifty_percent_band() {
        let policy = RetryPolicy::build("standard", None, None).with_jitter_seed(7);
        let base = policy.backoff.delay_for_attempt(2).as_millis() as f64;
        let jittered = policy.delay(2).as_millis() as f64;
        assert!(jittered >= base * 0.5 && jittered < base * 1.5);
    }
}
