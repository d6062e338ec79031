//! Orchestrator that wires the Backend Registry, Thermal Monitor,
//! Efficiency Manager, Router and Forwarding Executor into a single
//! `handle_request` entry point. This crate owns no wire protocol: the
//! surrounding process (HTTP server, CLI, whatever) is out of scope and
//! calls into `ProxyCore` directly.

pub mod signals;

use proxy_common::cancellation::CancellationToken;
use proxy_common::config::Config;
use proxy_common::efficiency::EfficiencyMode;
use proxy_common::error::{Error, Result};
use proxy_common::thermal::ThermalSensor;
use proxy_common::types::{Annotations, Backend, BackendRequest, ForwardingPolicy, HardwareClass};
use proxy_efficiency::EfficiencyManager;
use proxy_forwarding::{ForwardingExecutor, ForwardingOutcome};
use proxy_registry::Registry;
use proxy_thermal::ThermalMonitor;
use parking_lot::Mutex;
use signals::Signal;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Everything the core needs to route and forward one request.
pub struct ProxyCore {
    config: Config,
    registry: Arc<Registry>,
    thermal: Arc<ThermalMonitor>,
    efficiency: Arc<EfficiencyManager>,
    forwarding: ForwardingExecutor,
    signals: broadcast::Sender<Signal>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ProxyCore {
    pub fn new(
        config: Config,
        sensor: Arc<dyn ThermalSensor>,
        hardware_classes: Vec<HardwareClass>,
        mode: EfficiencyMode,
    ) -> Arc<Self> {
        let registry = Arc::new(Registry::new(config.registry.clone()));
        let thermal = ThermalMonitor::new(
            sensor,
            config.thermal,
            config.router.poll_interval,
            hardware_classes,
        );
        let efficiency = Arc::new(EfficiencyManager::new(
            mode,
            proxy_common::efficiency::SystemState {
                battery_percent: 100.0,
                on_battery: false,
                avg_temp_c: 0.0,
                avg_fan_pct: 0.0,
                quiet_hours: false,
            },
        ));
        let forwarding =
            ForwardingExecutor::with_retry_config(Arc::clone(&registry), config.forwarding.retry_config());
        let (signals, _) = signals::channel();

        Arc::new(Self {
            config,
            registry,
            thermal,
            efficiency,
            forwarding,
            signals,
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn thermal(&self) -> &Arc<ThermalMonitor> {
        &self.thermal
    }

    pub fn efficiency(&self) -> &Arc<EfficiencyManager> {
        &self.efficiency
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.signals.subscribe()
    }

    pub fn set_mode(&self, mode: EfficiencyMode) {
        let previous = self.efficiency.mode();
        self.efficiency.set_mode(mode);
        let _ = self.signals.send(Signal::ModeChanged {
            previous,
            current: mode,
        });
    }

    /// Register a backend and call its `start` hook; a failing `start`
    /// prevents registration (spec §6).
    pub async fn register_backend(&self, backend: Arc<dyn Backend>) -> Result<()> {
        backend.start().await?;
        self.registry.register(backend)
    }

    /// Launch the registry health-check loop and the thermal monitor poll
    /// loop. Both are joined by `stop`. Unlike `Registry::start_health_check_loop`
    /// and `ThermalMonitor::start`, these loops are driven here rather than
    /// delegated, so each tick's health/throttling transitions can be
    /// published on `signals`.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        workers.push(self.spawn_health_check_loop());
        workers.push(self.spawn_thermal_loop());
    }

    fn spawn_health_check_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let interval = this.config.registry.health_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for (backend_id, healthy) in this.registry.health_check_all().await {
                    let _ = this.signals.send(Signal::BackendStatusChanged { backend_id, healthy });
                }
            }
        })
    }

    fn spawn_thermal_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let interval = this.config.router.poll_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for (hardware, throttling) in this.thermal.poll_once().await {
                    let _ = this.signals.send(Signal::ThermalThresholdCrossed { hardware, throttling });
                }
            }
        })
    }

    /// Abort every background worker and wait for them to finish.
    pub async fn stop(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock();
            workers.drain(..).collect()
        };
        for handle in handles {
            handle.abort();
            let _ = handle.await;
        }
    }

    /// Route and forward a single request end to end: apply mode intent to
    /// its annotations, ask the router for a decision, derive (or take) an
    /// escalation path, and walk it with the forwarding executor.
    pub async fn handle_request(
        &self,
        mut request: BackendRequest,
        mut policy: ForwardingPolicy,
        cancellation: &CancellationToken,
    ) -> Result<ForwardingOutcome> {
        self.efficiency.apply_to_annotations(&mut request.annotations);

        let decision = self.route(&request.annotations);
        let Some(_) = &decision.backend_id else {
            return Err(Error::NoCandidate(decision.reason));
        };

        if policy.escalation_path.is_empty() {
            let n = (policy.max_retries as usize) + 1;
            policy.escalation_path = proxy_router::escalation_path(&decision, n);
        }

        info!(
            request_id = %request.id,
            reason = %decision.reason,
            path_len = policy.escalation_path.len(),
            "routed request"
        );

        let thermal = Arc::clone(&self.thermal);
        let mode_config = self.efficiency.effective_mode_config();
        let eligibility = move |hw: HardwareClass| {
            if thermal.is_in_cooldown(hw) {
                return false;
            }
            thermal
                .get(hw)
                .map(|state| state.temperature_c <= mode_config.max_temperature_c)
                .unwrap_or(true)
        };

        self.forwarding
            .execute(request, &policy, &policy.escalation_path, &eligibility, cancellation)
            .await
    }

    /// Pure routing decision for the given annotations, using the current
    /// registry/thermal/efficiency snapshots (spec §4.4 invariant 7: same
    /// inputs produce the same decision).
    pub fn route(&self, annotations: &Annotations) -> proxy_common::types::RoutingDecision {
        let candidates = self.registry.list();
        let thermal_snapshot = self.thermal.get_all();
        let mode_config = self.efficiency.effective_mode_config();
        let cooldown = self.thermal.cooldown_snapshot();
        proxy_router::select(&candidates, &thermal_snapshot, &mode_config, &cooldown, annotations)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The policy `handle_request` callers get when they don't have
    /// opinions of their own, built from `config.forwarding`'s defaults.
    pub fn default_policy(&self) -> ForwardingPolicy {
        self.config.forwarding.default_policy()
    }

    /// Aggregate health of the proxy's own components (not any individual
    /// backend's health): the worst of every registered backend's health
    /// flag and every tracked hardware class's throttling state.
    pub fn system_health(&self) -> proxy_common::metrics::SystemHealth {
        let mut components = std::collections::HashMap::new();
        for backend in self.registry.list() {
            let id = backend.config().id.clone();
            let health = if backend.healthy() {
                proxy_common::metrics::ComponentHealth::healthy("backend reporting healthy")
            } else {
                proxy_common::metrics::ComponentHealth::critical("backend reporting unhealthy")
            };
            components.insert(id, health);
        }
        for (hardware, state) in self.thermal.get_all().iter() {
            let health = if state.is_throttling(&self.config.thermal) {
                proxy_common::metrics::ComponentHealth::critical("hardware class throttling")
            } else {
                proxy_common::metrics::ComponentHealth::healthy("hardware class nominal")
            };
            components.insert(format!("thermal:{hardware:?}"), health);
        }
        proxy_common::metrics::SystemHealth::from_components(components)
    }
}
