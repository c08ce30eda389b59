//! Background readiness monitor for the engine handles

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::gate::EngineGate;
use crate::engine::traits::EngineVariant;

/// Probe history of one engine handle
#[derive(Debug, Clone)]
pub struct ProbeStatus {
    pub loaded: bool,
    pub last_check: Instant,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
}

impl Default for ProbeStatus {
    fn default() -> Self {
        Self {
            loaded: false,
            last_check: Instant::now(),
            consecutive_failures: 0,
            consecutive_successes: 0,
        }
    }
}

/// Keeps the gate's readiness flags current.
///
/// Unloaded handles are retried with `load`; loaded handles are
/// health-checked and flipped to not-ready after `failure_threshold`
/// consecutive failures, back to ready after `recovery_threshold` successes.
pub struct EngineMonitor {
    gate: Arc<EngineGate>,
    status: Arc<DashMap<EngineVariant, ProbeStatus>>,
    check_task: RwLock<Option<JoinHandle<()>>>,
    failure_threshold: u32,
    recovery_threshold: u32,
}

impl EngineMonitor {
    pub fn new(gate: Arc<EngineGate>) -> Self {
        Self {
            gate,
            status: Arc::new(DashMap::new()),
            check_task: RwLock::new(None),
            failure_threshold: 3,
            recovery_threshold: 2,
        }
    }

    /// Run one probe round over both handles
    pub async fn probe_once(&self) {
        probe_round(
            &self.gate,
            &self.status,
            self.failure_threshold,
            self.recovery_threshold,
        )
        .await;
    }

    /// Start the background probe task
    pub async fn start(&self, interval_secs: u64) {
        let gate = self.gate.clone();
        let status = self.status.clone();
        let failure_threshold = self.failure_threshold;
        let recovery_threshold = self.recovery_threshold;

        let handle = tokio::spawn(async move {
            let interval = Duration::from_secs(interval_secs.max(1));
            loop {
                tokio::time::sleep(interval).await;
                probe_round(&gate, &status, failure_threshold, recovery_threshold).await;
            }
        });

        *self.check_task.write().await = Some(handle);
        info!(interval_secs, "Started engine readiness monitor");
    }

    /// Stop the background probe task
    pub async fn stop(&self) {
        if let Some(handle) = self.check_task.write().await.take() {
            handle.abort();
            info!("Stopped engine readiness monitor");
        }
    }

    /// Get probe status for a handle
    pub fn get_status(&self, variant: EngineVariant) -> Option<ProbeStatus> {
        self.status.get(&variant).map(|s| s.clone())
    }
}

async fn probe_round(
    gate: &EngineGate,
    status: &DashMap<EngineVariant, ProbeStatus>,
    failure_threshold: u32,
    recovery_threshold: u32,
) {
    for variant in EngineVariant::ALL {
        let was_ready = gate.is_ready(variant);
        let loaded = was_ready || status.get(&variant).map(|s| s.loaded).unwrap_or(false);

        // Handles are never recreated: a loaded handle is only health-checked.
        let healthy = if loaded {
            gate.engine(variant).health_check().await
        } else {
            gate.load(variant).await.is_ok()
        };

        let mut entry = status.entry(variant).or_default();
        entry.last_check = Instant::now();
        entry.loaded |= gate.is_ready(variant);

        if healthy {
            entry.consecutive_failures = 0;
            entry.consecutive_successes += 1;

            if !gate.is_ready(variant) && entry.consecutive_successes >= recovery_threshold {
                gate.set_ready(variant, true);
                info!(engine = %variant, "Engine recovered and marked ready");
            }
        } else {
            entry.consecutive_successes = 0;
            entry.consecutive_failures += 1;

            if was_ready && entry.consecutive_failures >= failure_threshold {
                gate.set_ready(variant, false);
                warn!(
                    engine = %variant,
                    failures = entry.consecutive_failures,
                    "Engine marked not ready after consecutive failures"
                );
            }
        }

        debug!(
            engine = %variant,
            ready = gate.is_ready(variant),
            consecutive_failures = entry.consecutive_failures,
            consecutive_successes = entry.consecutive_successes,
            "Engine probe completed"
        );
    }
}
