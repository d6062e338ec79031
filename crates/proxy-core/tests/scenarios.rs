//! End-to-end scenarios exercising `ProxyCore::handle_request` the way a
//! caller would: register backends, route, and observe the outcome. These
//! correspond to the proxy's testable scenarios (explicit targets, power
//! filters, Auto resolution, confidence escalation, best-attempt fallback,
//! and thermal hysteresis).

use async_trait::async_trait;
use chrono::Utc;
use proxy_common::cancellation::CancellationToken;
use proxy_common::config::Config;
use proxy_common::efficiency::{EfficiencyMode, SystemState};
use proxy_common::error::Result;
use proxy_common::thermal::{ThermalSensor, ThermalState};
use proxy_common::types::{
    Annotations, Backend, BackendConfig, BackendMetrics, BackendRequest, BackendResponse,
    BackendStreamChunk, Capabilities, ForwardingPolicy, HardwareClass, MediaType, Operation,
    Priority,
};
use proxy_core::ProxyCore;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct ScriptedBackend {
    config: BackendConfig,
    metrics: BackendMetrics,
    healthy: AtomicBool,
    outcomes: Vec<std::result::Result<f32, ()>>,
    call_count: AtomicU32,
}

impl ScriptedBackend {
    fn new(
        id: &str,
        hardware: HardwareClass,
        power: f32,
        latency: i32,
        outcomes: Vec<std::result::Result<f32, ()>>,
    ) -> Arc<dyn Backend> {
        Arc::new(Self {
            config: BackendConfig {
                id: id.to_string(),
                name: id.to_string(),
                backend_type: "local-model-server".into(),
                hardware,
                power_watts: power,
                avg_latency_ms_declared: latency,
                priority: 0,
                enabled: true,
                max_model_size_gb: 8.0,
                supported_patterns: vec!["*".into()],
                preferred_models: vec![],
                excluded_patterns: vec![],
                capabilities: Capabilities {
                    text_generate: true,
                    ..Default::default()
                },
            },
            metrics: BackendMetrics::new(),
            healthy: AtomicBool::new(true),
            outcomes,
            call_count: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    fn config(&self) -> &BackendConfig {
        &self.config
    }
    fn metrics(&self) -> &BackendMetrics {
        &self.metrics
    }
    fn healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }
    fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::Release);
    }
    fn last_health_check_at(&self) -> chrono::DateTime<Utc> {
        Utc::now()
    }
    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
    async fn generate(&self, request: BackendRequest) -> Result<BackendResponse> {
        let i = self.call_count.fetch_add(1, Ordering::SeqCst) as usize;
        match self.outcomes[i.min(self.outcomes.len() - 1)] {
            Ok(confidence) => Ok(BackendResponse {
                id: request.id,
                payload: serde_json::json!({}),
                confidence: Some(confidence),
            }),
            Err(()) => Err(proxy_common::error::Error::BackendError(
                "simulated failure".into(),
            )),
        }
    }
    async fn generate_stream(&self, _request: BackendRequest) -> Result<Vec<BackendStreamChunk>> {
        Ok(vec![])
    }
    async fn embed(&self, request: BackendRequest) -> Result<BackendResponse> {
        self.generate(request).await
    }
    async fn transcribe_audio(&self, request: BackendRequest) -> Result<BackendResponse> {
        self.generate(request).await
    }
    async fn synthesize_speech(&self, request: BackendRequest) -> Result<BackendResponse> {
        self.generate(request).await
    }
    async fn start(&self) -> Result<()> {
        Ok(())
    }
    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

struct AmbientSensor;

#[async_trait]
impl ThermalSensor for AmbientSensor {
    async fn read(&self, _hardware: HardwareClass) -> Result<ThermalState> {
        Ok(ThermalState {
            temperature_c: 40.0,
            fan_percent: 10.0,
            fan_rpm: None,
            power_draw_w: None,
            utilization_pct: 0.0,
            throttling: false,
            updated_at: Utc::now(),
        })
    }
}

/// Reports a fixed temperature for one hardware class, ambient for the rest.
struct FixedTempSensor {
    hardware: HardwareClass,
    temperature_c: std::sync::Mutex<f32>,
}

#[async_trait]
impl ThermalSensor for FixedTempSensor {
    async fn read(&self, hardware: HardwareClass) -> Result<ThermalState> {
        let temp = if hardware == self.hardware {
            *self.temperature_c.lock().unwrap()
        } else {
            40.0
        };
        Ok(ThermalState {
            temperature_c: temp,
            fan_percent: 10.0,
            fan_rpm: None,
            power_draw_w: None,
            utilization_pct: 0.0,
            throttling: false,
            updated_at: Utc::now(),
        })
    }
}

fn request(model: &str) -> BackendRequest {
    BackendRequest {
        id: Uuid::new_v4(),
        operation: Operation::Generate,
        model: model.to_string(),
        payload: serde_json::json!({}),
        annotations: Annotations {
            model: model.to_string(),
            media_type: MediaType::Text,
            priority: Priority::Normal,
            ..Annotations::default()
        },
    }
}

fn core_with_ambient_sensor(hardware: Vec<HardwareClass>) -> Arc<ProxyCore> {
    ProxyCore::new(Config::default(), Arc::new(AmbientSensor), hardware, EfficiencyMode::Performance)
}

/// S1 - an explicit target in the request annotations is honored even when
/// a higher-scoring backend is available.
#[tokio::test]
async fn s1_explicit_target_is_honored() {
    let core = core_with_ambient_sensor(vec![HardwareClass::Npu, HardwareClass::Gpu]);
    core.register_backend(ScriptedBackend::new(
        "npu-1",
        HardwareClass::Npu,
        3.0,
        200,
        vec![Ok(0.9)],
    ))
    .await
    .unwrap();
    core.register_backend(ScriptedBackend::new(
        "gpu-1",
        HardwareClass::Gpu,
        55.0,
        10,
        vec![Ok(0.9)],
    ))
    .await
    .unwrap();

    let mut req = request("llama-3-8b");
    req.annotations.target = Some("npu-1".to_string());

    let outcome = core
        .handle_request(req, ForwardingPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.backend_id, "npu-1");
}

/// S2 - a power ceiling in the annotations excludes the GPU backend even
/// though it would otherwise win on latency.
#[tokio::test]
async fn s2_power_filter_excludes_gpu() {
    let core = core_with_ambient_sensor(vec![HardwareClass::Npu, HardwareClass::Igpu, HardwareClass::Gpu]);
    core.set_mode(EfficiencyMode::Balanced);
    core.register_backend(ScriptedBackend::new(
        "npu-1",
        HardwareClass::Npu,
        3.0,
        200,
        vec![Ok(0.9)],
    ))
    .await
    .unwrap();
    core.register_backend(ScriptedBackend::new(
        "igpu-1",
        HardwareClass::Igpu,
        12.0,
        50,
        vec![Ok(0.9)],
    ))
    .await
    .unwrap();
    core.register_backend(ScriptedBackend::new(
        "gpu-1",
        HardwareClass::Gpu,
        55.0,
        10,
        vec![Ok(0.9)],
    ))
    .await
    .unwrap();

    let mut req = request("llama-3-8b");
    req.annotations.max_power_watts = 15.0;

    let outcome = core
        .handle_request(req, ForwardingPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.backend_id == "npu-1" || outcome.backend_id == "igpu-1");
}

/// S3 - Auto mode resolves to UltraEfficiency once the system reports low
/// battery, which steers routing toward the NPU-only preferred hardware.
#[tokio::test]
async fn s3_auto_resolves_to_ultra_efficiency_on_low_battery() {
    let core = core_with_ambient_sensor(vec![HardwareClass::Npu, HardwareClass::Igpu, HardwareClass::Gpu]);
    core.register_backend(ScriptedBackend::new(
        "npu-1",
        HardwareClass::Npu,
        3.0,
        200,
        vec![Ok(0.9)],
    ))
    .await
    .unwrap();
    core.register_backend(ScriptedBackend::new(
        "igpu-1",
        HardwareClass::Igpu,
        12.0,
        50,
        vec![Ok(0.9)],
    ))
    .await
    .unwrap();
    core.register_backend(ScriptedBackend::new(
        "gpu-1",
        HardwareClass::Gpu,
        55.0,
        10,
        vec![Ok(0.9)],
    ))
    .await
    .unwrap();

    core.set_mode(EfficiencyMode::Auto);
    core.efficiency().set_system_state(SystemState {
        battery_percent: 15.0,
        on_battery: true,
        avg_temp_c: 60.0,
        avg_fan_pct: 30.0,
        quiet_hours: false,
    });
    assert_eq!(core.efficiency().effective_mode(), EfficiencyMode::UltraEfficiency);

    let outcome = core
        .handle_request(request("llama-3-8b"), ForwardingPolicy::default(), &CancellationToken::new())
        .await
        .unwrap();

    // UltraEfficiency's only preferred hardware is the NPU, and its power
    // ceiling (5W) rules both the iGPU and GPU out entirely.
    assert_eq!(outcome.backend_id, "npu-1");
}

/// S4 - a low-confidence NPU attempt and a low-confidence iGPU attempt are
/// both escalated past before the GPU attempt clears the confidence gate.
#[tokio::test]
async fn s4_confidence_escalation_invokes_every_backend_on_the_path() {
    let core = core_with_ambient_sensor(vec![
        HardwareClass::Npu,
        HardwareClass::Igpu,
        HardwareClass::Gpu,
    ]);
    core.register_backend(ScriptedBackend::new(
        "npu-1",
        HardwareClass::Npu,
        3.0,
        200,
        vec![Ok(0.3)],
    ))
    .await
    .unwrap();
    core.register_backend(ScriptedBackend::new(
        "igpu-1",
        HardwareClass::Igpu,
        15.0,
        100,
        vec![Ok(0.5)],
    ))
    .await
    .unwrap();
    core.register_backend(ScriptedBackend::new(
        "gpu-1",
        HardwareClass::Gpu,
        55.0,
        10,
        vec![Ok(0.95)],
    ))
    .await
    .unwrap();

    let policy = ForwardingPolicy {
        min_confidence: 0.8,
        escalation_path: vec!["npu-1".into(), "igpu-1".into(), "gpu-1".into()],
        ..ForwardingPolicy::default()
    };

    let outcome = core
        .handle_request(request("llama-3-8b"), policy, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.backend_id, "gpu-1");
    assert!(!outcome.degraded);
    assert_eq!(outcome.attempts.len(), 3);
}

/// S5 - same path as S4, but the GPU attempt fails outright. No attempt
/// clears the confidence gate, so the best (highest-confidence) attempt is
/// returned with `degraded = true` rather than failing the request.
#[tokio::test]
async fn s5_best_attempt_fallback_when_every_attempt_fails_the_gate() {
    let core = core_with_ambient_sensor(vec![
        HardwareClass::Npu,
        HardwareClass::Igpu,
        HardwareClass::Gpu,
    ]);
    core.register_backend(ScriptedBackend::new(
        "npu-1",
        HardwareClass::Npu,
        3.0,
        200,
        vec![Ok(0.3)],
    ))
    .await
    .unwrap();
    core.register_backend(ScriptedBackend::new(
        "igpu-1",
        HardwareClass::Igpu,
        15.0,
        100,
        vec![Ok(0.5)],
    ))
    .await
    .unwrap();
    core.register_backend(ScriptedBackend::new(
        "gpu-1",
        HardwareClass::Gpu,
        55.0,
        10,
        vec![Err(())],
    ))
    .await
    .unwrap();

    let policy = ForwardingPolicy {
        min_confidence: 0.8,
        return_best_attempt: true,
        escalation_path: vec!["npu-1".into(), "igpu-1".into(), "gpu-1".into()],
        ..ForwardingPolicy::default()
    };

    let outcome = core
        .handle_request(request("llama-3-8b"), policy, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.backend_id, "igpu-1");
    assert!(outcome.degraded);
}

/// S6 - a hardware class crossing into a critical thermal state enters
/// cooldown and is excluded from routing until it has spent `cooldown_time`
/// back under the warning threshold.
#[tokio::test]
async fn s6_thermal_exclusion_with_hysteresis() {
    let sensor = Arc::new(FixedTempSensor {
        hardware: HardwareClass::Gpu,
        temperature_c: std::sync::Mutex::new(95.0),
    });
    let mut config = Config::default();
    config.thermal.cooldown_time = Duration::from_millis(40);

    let core = ProxyCore::new(
        config,
        sensor.clone(),
        vec![HardwareClass::Npu, HardwareClass::Gpu],
        EfficiencyMode::Performance,
    );
    core.register_backend(ScriptedBackend::new(
        "npu-1",
        HardwareClass::Npu,
        3.0,
        200,
        vec![Ok(0.9)],
    ))
    .await
    .unwrap();
    core.register_backend(ScriptedBackend::new(
        "gpu-1",
        HardwareClass::Gpu,
        55.0,
        10,
        vec![Ok(0.9); 4],
    ))
    .await
    .unwrap();

    // t=0: GPU reads critical, enters cooldown.
    core.thermal().poll_once().await;
    assert!(core.thermal().is_in_cooldown(HardwareClass::Gpu));
    let decision = core.route(&request("llama-3-8b").annotations);
    assert_eq!(decision.backend_id.as_deref(), Some("npu-1"));

    // Temperature drops below warning, but cooldown_time hasn't elapsed yet.
    *sensor.temperature_c.lock().unwrap() = 50.0;
    core.thermal().poll_once().await;
    let decision = core.route(&request("llama-3-8b").annotations);
    assert_eq!(
        decision.backend_id.as_deref(),
        Some("npu-1"),
        "gpu must stay excluded until cooldown_time has elapsed since recovery"
    );

    // Wait past cooldown_time, then poll again: the monitor observes the
    // recovery has held long enough and clears the cooldown entry.
    tokio::time::sleep(Duration::from_millis(60)).await;
    core.thermal().poll_once().await;
    assert!(!core.thermal().is_in_cooldown(HardwareClass::Gpu));

    let decision = core.route(&request("llama-3-8b").annotations);
    assert_eq!(decision.backend_id.as_deref(), Some("gpu-1"));
}
