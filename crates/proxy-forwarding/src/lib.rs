//! Forwarding Executor (C5): turns a `RoutingDecision` into a result,
//! escalating along a path of backends when the first choice doesn't
//! satisfy the caller's policy. Each backend gets its own `RetryExecutor`
//! pass before the walk moves on to the next one, so a transient failure
//! doesn't burn an escalation step it didn't need to.

use proxy_common::cancellation::CancellationToken;
use proxy_common::error::{Error, Result};
use proxy_common::retry::{RetryConfig, RetryExecutor};
use proxy_common::types::{
    Attempt, AttemptState, Backend, BackendId, BackendRequest, BackendResponse, ForwardingPolicy,
    HardwareClass,
};
use proxy_registry::Registry;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// The result of a successful (possibly degraded) forwarding attempt.
#[derive(Debug, Clone)]
pub struct ForwardingOutcome {
    pub backend_id: BackendId,
    pub response: BackendResponse,
    /// Set when the policy's `return_best_attempt` fallback kicked in: no
    /// attempt passed every gate, but the best non-error attempt is
    /// returned anyway.
    pub degraded: bool,
    pub attempts: Vec<Attempt>,
}

/// A thermal eligibility check the core wires up from the thermal monitor
/// and cooldown set, keeping this crate decoupled from thermal internals
/// the same way the router takes its thermal inputs as plain parameters.
pub trait ThermalEligibility: Send + Sync {
    fn is_eligible(&self, hardware: HardwareClass) -> bool;
}

impl<F: Fn(HardwareClass) -> bool + Send + Sync> ThermalEligibility for F {
    fn is_eligible(&self, hardware: HardwareClass) -> bool {
        self(hardware)
    }
}

pub struct ForwardingExecutor {
    registry: Arc<Registry>,
    retry: RetryConfig,
}

impl ForwardingExecutor {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self::with_retry_config(registry, RetryConfig::default())
    }

    /// Same as `new`, but with an explicit per-backend retry policy (the
    /// core wires this from `ForwardingConfig::retry_config`).
    pub fn with_retry_config(registry: Arc<Registry>, retry: RetryConfig) -> Self {
        Self { registry, retry }
    }

    /// Walk `escalation_path` in order, dispatching `request` to each
    /// backend until one attempt passes every gate or the path is
    /// exhausted (spec §4.5).
    pub async fn execute(
        &self,
        request: BackendRequest,
        policy: &ForwardingPolicy,
        escalation_path: &[BackendId],
        thermal: &dyn ThermalEligibility,
        cancellation: &CancellationToken,
    ) -> Result<ForwardingOutcome> {
        let mut attempts = Vec::with_capacity(escalation_path.len());
        let mut best_attempt: Option<(BackendId, BackendResponse, f32)> = None;

        for backend_id in escalation_path {
            if cancellation.is_cancelled() {
                attempts.push(Attempt {
                    backend_id: backend_id.clone(),
                    state: AttemptState::Cancelled,
                    latency_ms: None,
                    confidence: None,
                    reason: "cancelled before dispatch".to_string(),
                });
                continue;
            }

            let Some(backend) = self.registry.lookup(backend_id) else {
                attempts.push(Attempt {
                    backend_id: backend_id.clone(),
                    state: AttemptState::Failed,
                    latency_ms: None,
                    confidence: None,
                    reason: "backend not found in registry".to_string(),
                });
                continue;
            };

            if policy.respect_thermal_limits && !thermal.is_eligible(backend.config().hardware) {
                debug!(backend_id, "skipping thermally ineligible backend");
                attempts.push(Attempt {
                    backend_id: backend_id.clone(),
                    state: AttemptState::Failed,
                    latency_ms: None,
                    confidence: None,
                    reason: "thermally ineligible".to_string(),
                });
                continue;
            }

            let started = Instant::now();
            let retry = RetryExecutor::new(self.retry.clone(), backend_id.clone());
            let outcome = tokio::select! {
                result = retry.execute(|| backend.generate(request.clone())) => result,
                _ = cancellation.cancelled() => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.registry.record_outcome(backend_id, latency_ms, false).ok();
                    attempts.push(Attempt {
                        backend_id: backend_id.clone(),
                        state: AttemptState::Cancelled,
                        latency_ms: Some(latency_ms),
                        confidence: None,
                        reason: "cancelled mid-attempt".to_string(),
                    });
                    continue;
                }
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(response) => {
                    let ok = true;
                    self.registry.record_outcome(backend_id, latency_ms, ok).ok();

                    let confidence = response.confidence.unwrap_or(1.0);
                    let confidence_ok = confidence >= policy.min_confidence;
                    let latency_ok = policy.max_latency_ms == 0 || latency_ms <= policy.max_latency_ms;

                    if confidence_ok && latency_ok {
                        attempts.push(Attempt {
                            backend_id: backend_id.clone(),
                            state: AttemptState::Completed,
                            latency_ms: Some(latency_ms),
                            confidence: Some(confidence),
                            reason: "accepted".to_string(),
                        });
                        return Ok(ForwardingOutcome {
                            backend_id: backend_id.clone(),
                            response,
                            degraded: false,
                            attempts,
                        });
                    }

                    let reason = if !confidence_ok {
                        "confidence below min_confidence"
                    } else {
                        "latency exceeded max_latency_ms"
                    };
                    attempts.push(Attempt {
                        backend_id: backend_id.clone(),
                        state: AttemptState::Failed,
                        latency_ms: Some(latency_ms),
                        confidence: Some(confidence),
                        reason: reason.to_string(),
                    });

                    let is_better = best_attempt
                        .as_ref()
                        .map(|(_, _, best_confidence)| confidence > *best_confidence)
                        .unwrap_or(true);
                    if is_better {
                        best_attempt = Some((backend_id.clone(), response, confidence));
                    }
                }
                Err(err) => {
                    self.registry.record_outcome(backend_id, latency_ms, false).ok();
                    warn!(backend_id, error = %err, "attempt failed");
                    attempts.push(Attempt {
                        backend_id: backend_id.clone(),
                        state: AttemptState::Failed,
                        latency_ms: Some(latency_ms),
                        confidence: None,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if policy.return_best_attempt {
            if let Some((backend_id, response, _)) = best_attempt {
                return Ok(ForwardingOutcome {
                    backend_id,
                    response,
                    degraded: true,
                    attempts,
                });
            }
        }

        Err(Error::PolicyViolated(format!(
            "no_backend_satisfied_policy: {} attempts, none accepted",
            attempts.len()
        )))
    }
}
