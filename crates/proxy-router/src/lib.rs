//! Router (C4): a pure function from (candidate backends, thermal snapshot,
//! efficiency mode, cooldown set, annotations) to a `RoutingDecision`.
//! Never performs I/O, never blocks beyond a short read of its inputs, and
//! never stores state between calls (invariant 7).

use proxy_common::efficiency::ModeConfig;
use proxy_common::thermal::ThermalState;
use proxy_common::types::{
    AlternateCandidate, Annotations, Backend, HardwareClass, RoutingDecision,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

struct ScoredCandidate {
    backend: Arc<dyn Backend>,
    score: f64,
}

/// Selects a backend for `annotations` from `candidates`, given the current
/// thermal snapshot, the effective mode's configuration, and the set of
/// hardware classes presently serving a thermal cooldown. Implements spec
/// §4.4 exactly: candidate filtering, explicit target override, hard
/// filters, then weighted scoring.
pub fn select(
    candidates: &[Arc<dyn Backend>],
    thermal: &HashMap<HardwareClass, ThermalState>,
    mode_config: &ModeConfig,
    cooldown: &HashSet<HardwareClass>,
    annotations: &Annotations,
) -> RoutingDecision {
    let eligible: Vec<Arc<dyn Backend>> = candidates
        .iter()
        .filter(|b| {
            let c = b.config();
            c.enabled
                && b.healthy()
                && c.supports_model(&annotations.model)
                && c.capabilities.supports_media_type(annotations.media_type)
        })
        .cloned()
        .collect();

    if eligible.is_empty() {
        return RoutingDecision::none("no backend enabled, healthy, and capable of this request");
    }

    if let Some(target) = &annotations.target {
        if let Some(backend) = eligible.iter().find(|b| &b.config().id == target) {
            return decision_for(backend, "explicit target", &[]);
        }
    }

    let mut filtered_out_reasons: Vec<&'static str> = Vec::new();
    let survivors: Vec<Arc<dyn Backend>> = eligible
        .into_iter()
        .filter(|backend| {
            let c = backend.config();
            if annotations.max_power_watts > 0.0 && c.power_watts > annotations.max_power_watts {
                filtered_out_reasons.push("max_power_watts");
                return false;
            }
            if annotations.max_latency_ms > 0
                && c.avg_latency_ms_declared as u64 > annotations.max_latency_ms
            {
                filtered_out_reasons.push("max_latency_ms");
                return false;
            }
            let thermal_state = thermal.get(&c.hardware);
            let (temp, fan) = thermal_state
                .map(|t| (t.temperature_c, t.fan_percent))
                .unwrap_or((0.0, 0.0));
            if temp > mode_config.max_temperature_c || fan > mode_config.max_fan_percent {
                filtered_out_reasons.push("mode thermal/noise gate");
                return false;
            }
            if cooldown.contains(&c.hardware) {
                filtered_out_reasons.push("thermal cooldown");
                return false;
            }
            true
        })
        .collect();

    if survivors.is_empty() {
        let reason = filtered_out_reasons
            .first()
            .copied()
            .unwrap_or("all candidates filtered");
        return RoutingDecision::none(format!("all filtered by {reason}"));
    }

    let mut scored: Vec<ScoredCandidate> = survivors
        .into_iter()
        .map(|backend| {
            let score = score_backend(&backend, thermal, mode_config, annotations);
            ScoredCandidate { backend, score }
        })
        .collect();

    // Highest score wins; ties broken by higher declared priority, then by
    // registration order (stable sort preserves the input's relative order).
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.backend.config().priority.cmp(&a.backend.config().priority))
    });

    let winner = &scored[0].backend;
    let alternates: Vec<AlternateCandidate> = scored[1..]
        .iter()
        .map(|c| AlternateCandidate {
            backend_id: c.backend.config().id.clone(),
            score: c.score,
        })
        .collect();

    decision_for(winner, "scored candidate", &alternates)
}

/// Derives an escalation path from a `RoutingDecision`: the winner followed
/// by its alternates in score order, truncated to `n` entries. Used by the
/// forwarding executor when a request's policy doesn't supply an explicit
/// path (spec §4.5 step 1).
pub fn escalation_path(decision: &RoutingDecision, n: usize) -> Vec<String> {
    let mut path = Vec::with_capacity(n);
    if let Some(id) = &decision.backend_id {
        path.push(id.clone());
    }
    for alt in &decision.alternates {
        if path.len() >= n {
            break;
        }
        path.push(alt.backend_id.clone());
    }
    path
}

fn decision_for(
    backend: &Arc<dyn Backend>,
    reason: &str,
    alternates: &[AlternateCandidate],
) -> RoutingDecision {
    let config = backend.config();
    RoutingDecision {
        backend_id: Some(config.id.clone()),
        reason: reason.to_string(),
        estimated_power_watts: config.power_watts,
        estimated_latency_ms: config.avg_latency_ms_declared,
        alternates: alternates.to_vec(),
        confidence_that_this_will_succeed: confidence_for(backend),
    }
}

/// A rough confidence estimate from the backend's own observed success
/// rate; defaults to 1.0 when no history exists yet.
fn confidence_for(backend: &Arc<dyn Backend>) -> f32 {
    let snapshot = backend.metrics().snapshot();
    if snapshot.request_count == 0 {
        1.0
    } else {
        (1.0 - snapshot.error_rate).clamp(0.0, 1.0) as f32
    }
}

fn score_backend(
    backend: &Arc<dyn Backend>,
    thermal: &HashMap<HardwareClass, ThermalState>,
    mode_config: &ModeConfig,
    annotations: &Annotations,
) -> f64 {
    let config = backend.config();
    let mut score = 0.0;

    score += annotations.priority.score_boost();

    let latency_ms = config.avg_latency_ms_declared.max(0) as f64;
    score += (1000.0 - latency_ms.min(1000.0)) * 2.0;

    let power = config.power_watts as f64;
    if annotations.prefer_power_efficiency {
        score += (1000.0 - power * 10.0) * 1.5;
    } else {
        score += (1000.0 - power * 10.0) * 0.1;
    }

    let pending = backend.pending_requests() as f64;
    score -= 50.0 * pending;

    if let Some(position) = mode_config
        .preferred_hardware
        .iter()
        .position(|hw| *hw == config.hardware)
    {
        score += match position {
            0 => 300.0,
            1 => 150.0,
            2 => 50.0,
            _ => 0.0,
        };
    }

    if let Some(state) = thermal.get(&config.hardware) {
        let margin = mode_config.max_temperature_c - state.temperature_c;
        score += (0.5 * margin as f64).clamp(0.0, 50.0);
    }

    debug!(backend_id = %config.id, score, "scored candidate");
    score
}
