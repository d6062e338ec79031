//! Configuration for the compute-aware inference proxy.
//!
//! This aggregate is constructed in process (no file or CLI parsing layer,
//! consistent with the Non-goals): callers build a `Config`, override the
//! fields they need, and hand it to the components that read it.

use crate::retry::RetryConfig;
use crate::thermal::ThermalConfig;
use crate::types::ForwardingPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration handed to the proxy core and its components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub registry: RegistryConfig,
    pub thermal: ThermalConfig,
    pub router: RouterConfig,
    pub forwarding: ForwardingConfig,
}

/// Backend Registry (C1) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub health_check_interval: Duration,
    pub health_check_timeout: Duration,
}

/// Thermal Monitor (C2) polling interval. Thresholds live on `ThermalConfig`
/// itself since they're also consulted outside the monitor (by the router).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub poll_interval: Duration,
}

/// Forwarding Executor (C5) defaults, used when a request's `ForwardingPolicy`
/// leaves a field unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingConfig {
    pub default_max_retries: u32,
    pub default_min_confidence: f32,
    pub default_max_latency_ms: u64,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    pub backoff_multiplier: f32,
}

impl ForwardingConfig {
    /// Backoff parameters for `RetryExecutor`'s per-backend retry loop,
    /// derived from this config's `backoff_*` fields. Attempt count is
    /// fixed at 2: a single retry within one escalation-path entry, kept
    /// separate from `default_max_retries` (which governs how many
    /// *backends* the escalation path walks, not how many times a single
    /// backend is retried).
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: 2,
            base_delay: self.backoff_initial,
            max_delay: self.backoff_max,
            backoff_multiplier: self.backoff_multiplier as f64,
            use_jitter: true,
        }
    }

    /// The policy a caller gets when it doesn't supply one of its own.
    pub fn default_policy(&self) -> ForwardingPolicy {
        ForwardingPolicy {
            min_confidence: self.default_min_confidence,
            max_latency_ms: self.default_max_latency_ms,
            max_retries: self.default_max_retries,
            ..ForwardingPolicy::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: RegistryConfig {
                health_check_interval: Duration::from_secs(30),
                health_check_timeout: Duration::from_secs(5),
            },
            thermal: ThermalConfig::default(),
            router: RouterConfig {
                poll_interval: Duration::from_secs(5),
            },
            forwarding: ForwardingConfig {
                default_max_retries: 2,
                default_min_confidence: 0.0,
                default_max_latency_ms: 0,
                backoff_initial: Duration::from_millis(100),
                backoff_max: Duration::from_secs(5),
                backoff_multiplier: 2.0,
            },
        }
    }
}
