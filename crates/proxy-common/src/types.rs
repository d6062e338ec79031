//! Core data model shared by every component of the proxy.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use uuid::Uuid;

/// Unique identifier for a registered backend, stable for process lifetime.
pub type BackendId = String;

/// Coarse hardware tag used by mode preferences and thermal policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareClass {
    Npu,
    Igpu,
    Gpu,
    Cpu,
    Cloud,
}

impl HardwareClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            HardwareClass::Npu => "npu",
            HardwareClass::Igpu => "igpu",
            HardwareClass::Gpu => "gpu",
            HardwareClass::Cpu => "cpu",
            HardwareClass::Cloud => "cloud",
        }
    }
}

/// Request priority levels; higher values receive a larger routing score boost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    BestEffort,
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Priority boost applied during scoring (spec §4.4).
    pub fn score_boost(&self) -> f64 {
        match self {
            Priority::Critical => 500.0,
            Priority::High => 200.0,
            Priority::Normal => 0.0,
            Priority::BestEffort => -100.0,
        }
    }
}

/// Coarse media kind used for capability matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Text,
    Code,
    Audio,
    Image,
    Realtime,
    Auto,
}

/// Capability flags a backend declares support for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Capabilities {
    pub text_generate: bool,
    pub text_stream: bool,
    pub embed: bool,
    pub speech_to_text: bool,
    pub text_to_speech: bool,
    pub image: bool,
    pub video: bool,
}

impl Capabilities {
    /// Whether this capability set can serve the given media type. `Auto`
    /// always matches; other media types require the matching flag.
    pub fn supports_media_type(&self, media_type: MediaType) -> bool {
        match media_type {
            MediaType::Auto => true,
            MediaType::Text | MediaType::Code => self.text_generate,
            MediaType::Audio => self.speech_to_text || self.text_to_speech,
            MediaType::Image => self.image,
            MediaType::Realtime => self.text_stream,
        }
    }
}

/// Declared, immutable characteristics of a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub id: BackendId,
    pub name: String,
    pub backend_type: String,
    pub hardware: HardwareClass,
    pub power_watts: f32,
    pub avg_latency_ms_declared: i32,
    pub priority: i32,
    pub enabled: bool,
    pub max_model_size_gb: f32,
    pub supported_patterns: Vec<String>,
    pub preferred_models: Vec<String>,
    pub excluded_patterns: Vec<String>,
    pub capabilities: Capabilities,
}

impl BackendConfig {
    /// Model-capability matching per spec §4.4 candidate filtering:
    /// an excluded pattern always wins, then an exact preferred match,
    /// then glob-style pattern matching against `supported_patterns`.
    pub fn supports_model(&self, model: &str) -> bool {
        if self
            .excluded_patterns
            .iter()
            .any(|pattern| glob_match(pattern, model))
        {
            return false;
        }
        if self.preferred_models.iter().any(|m| m == model) {
            return true;
        }
        self.supported_patterns
            .iter()
            .any(|pattern| glob_match(pattern, model))
    }
}

/// Minimal glob matcher supporting a single trailing or leading `*` wildcard,
/// sufficient for the `supported_patterns`/`excluded_patterns` fields.
pub fn glob_match(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return value.starts_with(prefix);
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        return value.ends_with(suffix);
    }
    pattern == value
}

/// Rolling outcome counters for a single backend.
///
/// `request_count` and `error_count` are monotonic non-decreasing (invariant
/// 2). `total_latency_ms` accumulates only over successful attempts.
/// `avg_latency_ms_observed` is recomputed under the same lock as the other
/// three fields to keep them self-consistent (§5, §9): it divides by
/// `success_count`, not `request_count`, so a string of failures does not
/// silently inflate the reported average.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendMetricsSnapshot {
    pub request_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub total_latency_ms: u64,
    pub avg_latency_ms_observed: f64,
    pub error_rate: f64,
}

#[derive(Debug, Default)]
struct MetricsInner {
    request_count: u64,
    success_count: u64,
    error_count: u64,
    total_latency_ms: u64,
}

/// Thread-safe rolling metrics for a backend.
#[derive(Debug, Default)]
pub struct BackendMetrics {
    inner: Mutex<MetricsInner>,
    pending: AtomicU32,
}

impl BackendMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one attempt. Safe to call concurrently.
    pub fn record_outcome(&self, latency_ms: u64, ok: bool) {
        let mut inner = self.inner.lock();
        inner.request_count += 1;
        if ok {
            inner.success_count += 1;
            inner.total_latency_ms += latency_ms;
        } else {
            inner.error_count += 1;
        }
    }

    /// Approximate number of requests currently in flight on this backend,
    /// used for the queue-depth scoring penalty.
    pub fn pending_requests(&self) -> u32 {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn pending_started(&self) {
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pending_finished(&self) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> BackendMetricsSnapshot {
        let inner = self.inner.lock();
        let avg = if inner.success_count > 0 {
            inner.total_latency_ms as f64 / inner.success_count as f64
        } else {
            0.0
        };
        let error_rate = if inner.request_count > 0 {
            inner.error_count as f64 / inner.request_count as f64
        } else {
            0.0
        };
        BackendMetricsSnapshot {
            request_count: inner.request_count,
            success_count: inner.success_count,
            error_count: inner.error_count,
            total_latency_ms: inner.total_latency_ms,
            avg_latency_ms_observed: avg,
            error_rate,
        }
    }
}

/// Atomic liveness flag plus last-check timestamp for a backend.
#[derive(Debug)]
pub struct HealthState {
    healthy: AtomicBool,
    last_check: Mutex<DateTime<Utc>>,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            last_check: Mutex::new(Utc::now()),
        }
    }
}

impl HealthState {
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
        *self.last_check.lock() = Utc::now();
    }

    pub fn last_check(&self) -> DateTime<Utc> {
        *self.last_check.lock()
    }
}

/// Per-request routing hints consumed by the router.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotations {
    pub target: Option<String>,
    pub model: String,
    pub media_type: MediaType,
    pub priority: Priority,
    pub latency_critical: bool,
    pub prefer_power_efficiency: bool,
    pub max_latency_ms: u64,
    pub max_power_watts: f32,
    pub deadline_ms: Option<u64>,
}

impl Default for Annotations {
    fn default() -> Self {
        Self {
            target: None,
            model: String::new(),
            media_type: MediaType::Auto,
            priority: Priority::Normal,
            latency_critical: false,
            prefer_power_efficiency: false,
            max_latency_ms: 0,
            max_power_watts: 0.0,
            deadline_ms: None,
        }
    }
}

/// An alternate backend considered but not chosen, kept for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternateCandidate {
    pub backend_id: BackendId,
    pub score: f64,
}

/// Outcome of `Router::select`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub backend_id: Option<BackendId>,
    pub reason: String,
    pub estimated_power_watts: f32,
    pub estimated_latency_ms: i32,
    pub alternates: Vec<AlternateCandidate>,
    pub confidence_that_this_will_succeed: f32,
}

impl RoutingDecision {
    pub fn none(reason: impl Into<String>) -> Self {
        Self {
            backend_id: None,
            reason: reason.into(),
            estimated_power_watts: 0.0,
            estimated_latency_ms: 0,
            alternates: Vec::new(),
            confidence_that_this_will_succeed: 0.0,
        }
    }
}

/// Policy the forwarding executor applies while walking an escalation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardingPolicy {
    pub min_confidence: f32,
    pub max_latency_ms: u64,
    pub max_retries: u32,
    pub escalation_path: Vec<BackendId>,
    pub respect_thermal_limits: bool,
    pub return_best_attempt: bool,
}

impl Default for ForwardingPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            max_latency_ms: 0,
            max_retries: 2,
            escalation_path: Vec::new(),
            respect_thermal_limits: true,
            return_best_attempt: true,
        }
    }
}

/// The operation a `BackendRequest` asks a backend to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Generate,
    GenerateStream,
    Embed,
    TranscribeAudio,
    SynthesizeSpeech,
}

/// A request dispatched to a single backend. The payload is intentionally
/// opaque (`serde_json::Value`) since concrete backend wire formats are out
/// of scope for the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    pub id: Uuid,
    pub operation: Operation,
    pub model: String,
    pub payload: serde_json::Value,
    pub annotations: Annotations,
}

/// A backend's response to a `BackendRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendResponse {
    pub id: Uuid,
    pub payload: serde_json::Value,
    /// Self-reported confidence in [0, 1], when the backend provides one.
    pub confidence: Option<f32>,
}

/// A single streamed chunk of a `generate_stream` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStreamChunk {
    pub id: Uuid,
    pub sequence: u32,
    pub payload: serde_json::Value,
    pub done: bool,
}

/// The lifecycle state of a single forwarding attempt (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptState {
    Pending,
    Dispatched,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

/// Record of one escalation-path attempt, used for request-trace output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub backend_id: BackendId,
    pub state: AttemptState,
    pub latency_ms: Option<u64>,
    pub confidence: Option<f32>,
    pub reason: String,
}

/// External capability a concrete model-serving process exposes to the
/// proxy. The proxy core never speaks a backend's wire protocol directly;
/// it depends only on this trait, so a backend can be a local subprocess,
/// an in-process engine, or a remote cloud API behind an HTTP client.
#[async_trait]
pub trait Backend: Send + Sync {
    fn config(&self) -> &BackendConfig;
    fn metrics(&self) -> &BackendMetrics;

    fn healthy(&self) -> bool;
    fn set_healthy(&self, healthy: bool);
    fn last_health_check_at(&self) -> DateTime<Utc>;

    /// Approximate number of requests currently dispatched to this backend.
    fn pending_requests(&self) -> u32 {
        self.metrics().pending_requests()
    }

    fn supports_model(&self, model: &str) -> bool {
        self.config().supports_model(model)
    }

    fn supports_media_type(&self, media_type: MediaType) -> bool {
        self.config().capabilities.supports_media_type(media_type)
    }

    /// Probe the backend's liveness out of band. Must not mutate `healthy`
    /// itself; the Registry applies the result.
    async fn health_check(&self) -> Result<()>;

    async fn generate(&self, request: BackendRequest) -> Result<BackendResponse>;

    async fn generate_stream(
        &self,
        request: BackendRequest,
    ) -> Result<Vec<BackendStreamChunk>>;

    async fn embed(&self, request: BackendRequest) -> Result<BackendResponse>;

    async fn transcribe_audio(&self, request: BackendRequest) -> Result<BackendResponse>;

    async fn synthesize_speech(&self, request: BackendRequest) -> Result<BackendResponse>;

    /// Acquire whatever runtime resources the backend needs (connection
    /// pools, subprocess handles). Idempotent.
    async fn start(&self) -> Result<()>;

    /// Release runtime resources acquired by `start`.
    async fn stop(&self) -> Result<()>;

    fn update_metrics(&self, latency_ms: u64, ok: bool) {
        self.metrics().record_outcome(latency_ms, ok);
    }
}
