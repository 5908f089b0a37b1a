//! Long-running daemon
//!
//! Runs the controller tiers as background tasks and the evolution cycle on
//! its own interval until the shutdown future resolves. Shutdown only takes
//! effect between ticks.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use morphos_common::MorphosError;
use morphos_mloop::telemetry::ControllerMetrics;
use morphos_mloop::HierarchicalController;
use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::domain::cycle::{ControllerMode, CycleComponents, CycleReport, EvolutionCycle};

/// Metrics file name under the log directory
pub const METRICS_FILE: &str = "metrics.prom";

/// Directive used when `RUST_LOG` is unset or unparseable
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Log filter for the given `RUST_LOG` value
pub fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Evolution cycle metrics
#[derive(Clone)]
pub struct CycleMetrics {
    cycles: IntCounterVec,
    failures: IntCounter,
    conflicts: IntCounter,
    discoveries: IntCounter,
    sweet_spot_distance: Gauge,
}

impl CycleMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            cycles: IntCounterVec::new(
                Opts::new("morphos_cycles_total", "Committed evolution cycles by operator"),
                &["operator"],
            )?,
            failures: IntCounter::new("morphos_cycle_failures_total", "Cycles that did not commit")?,
            conflicts: IntCounter::new(
                "morphos_cycle_conflicts_total",
                "Commit attempts lost to a concurrent writer",
            )?,
            discoveries: IntCounter::new(
                "morphos_discoveries_total",
                "Valid sweet spots appended to the discovery ledger",
            )?,
            sweet_spot_distance: Gauge::new(
                "morphos_sweet_spot_distance",
                "Normalized distance of the latest sweet spot from its threshold",
            )?,
        };

        registry.register(Box::new(metrics.cycles.clone()))?;
        registry.register(Box::new(metrics.failures.clone()))?;
        registry.register(Box::new(metrics.conflicts.clone()))?;
        registry.register(Box::new(metrics.discoveries.clone()))?;
        registry.register(Box::new(metrics.sweet_spot_distance.clone()))?;

        Ok(metrics)
    }

    pub fn record(&self, report: &CycleReport) {
        self.cycles
            .with_label_values(&[report.operator.as_str()])
            .inc();
        self.conflicts.inc_by(u64::from(report.attempts.saturating_sub(1)));
        if report.recorded {
            self.discoveries.inc();
        }
        self.sweet_spot_distance.set(report.state.sweet_spot_distance);
    }

    pub fn record_failure(&self) {
        self.failures.inc();
    }
}

pub struct Daemon {
    cycle: Arc<EvolutionCycle>,
    sensors: Arc<dyn morphos_mloop::SensorSource>,
    registry: Registry,
    metrics: CycleMetrics,
    metrics_path: PathBuf,
    period: Duration,
}

impl Daemon {
    /// Wire production components with metrics on a fresh registry
    pub fn new(config: EngineConfig) -> Result<Self, MorphosError> {
        let registry = Registry::new();
        let controller_metrics = ControllerMetrics::register(&registry).map_err(metrics_error)?;
        let metrics = CycleMetrics::register(&registry).map_err(metrics_error)?;

        let mut components = CycleComponents::from_config(&config)?;
        components.controller = Arc::new(
            HierarchicalController::new(config.mloop.clone()).with_metrics(controller_metrics),
        );
        Ok(Self::with_components(config, components, registry, metrics))
    }

    pub fn with_components(
        config: EngineConfig,
        components: CycleComponents,
        registry: Registry,
        metrics: CycleMetrics,
    ) -> Self {
        let sensors = components.sensors.clone();
        let metrics_path = config.storage.log_dir.join(METRICS_FILE);
        let period = Duration::from_secs(config.cycle.period_secs.max(1));
        Self {
            cycle: Arc::new(EvolutionCycle::new(config, components, ControllerMode::Background)),
            sensors,
            registry,
            metrics,
            metrics_path,
            period,
        }
    }

    pub fn cycle(&self) -> &Arc<EvolutionCycle> {
        &self.cycle
    }

    /// Run until `shutdown` resolves
    pub async fn run<S>(self, shutdown: S) -> Result<(), MorphosError>
    where
        S: Future<Output = ()>,
    {
        let initial = self.cycle.store().snapshot().await?;
        let (state_tx, state_rx) = watch::channel(initial.value);
        let (stop_tx, stop_rx) = watch::channel(false);

        let tiers = self
            .cycle
            .controller()
            .clone()
            .spawn(self.sensors.clone(), state_rx, stop_rx);
        info!(period_secs = self.period.as_secs(), "Morphos daemon started");

        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.cycle.run_once(None).await {
                        Ok(report) => {
                            self.metrics.record(&report);
                            state_tx.send_replace(report.state);
                        }
                        Err(e) if e.is_retriable() => {
                            self.metrics.record_failure();
                            warn!(error = %e, "Cycle lost its commit race, retrying next tick");
                        }
                        Err(e) => {
                            self.metrics.record_failure();
                            error!(error = %e, "Evolution cycle failed");
                        }
                    }
                    if let Err(e) = self.write_metrics().await {
                        warn!(error = %e, "Failed to write metrics");
                    }
                }
                _ = &mut shutdown => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.cycle.cancel();
        let _ = stop_tx.send(true);
        for handle in tiers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Controller tier ended abnormally");
            }
        }
        info!("Morphos daemon stopped");
        Ok(())
    }

    /// Prometheus text exposition of every registered metric
    pub fn render_metrics(&self) -> Result<Vec<u8>, MorphosError> {
        let mut buf = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .map_err(metrics_error)?;
        Ok(buf)
    }

    async fn write_metrics(&self) -> Result<(), MorphosError> {
        let body = self.render_metrics()?;
        if let Some(parent) = self.metrics_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.metrics_path, body).await?;
        Ok(())
    }
}

fn metrics_error(e: prometheus::Error) -> MorphosError {
    MorphosError::Internal(format!("metrics: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use morphos_common::{FixedEntropy, PlatformState};

    #[test]
    fn test_log_filter_defaults_to_info() {
        assert_eq!(log_filter(None).to_string(), "info");
        assert_eq!(log_filter(Some("  ")).to_string(), "info");
        assert_eq!(
            log_filter(Some("morphos_engine=debug")).to_string(),
            "morphos_engine=debug"
        );
    }

    #[tokio::test]
    async fn test_daemon_runs_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.storage.log_dir = dir.path().to_path_buf();
        config.cycle.period_secs = 60;
        config.mloop.micro_hz = 100.0;

        let components = CycleComponents::ephemeral(
            &config,
            Box::new(FixedEntropy(0.3)),
            PlatformState::default(),
        );
        let registry = Registry::new();
        let metrics = CycleMetrics::register(&registry).unwrap();
        let daemon = Daemon::with_components(config, components, registry, metrics);
        let cycle = daemon.cycle().clone();

        // The first interval tick fires immediately, the second is a minute out
        daemon
            .run(tokio::time::sleep(Duration::from_millis(200)))
            .await
            .unwrap();

        let snap = cycle.store().snapshot().await.unwrap();
        assert_eq!(snap.version, 1);
        assert!(cycle.is_cancelled());
        assert!(!cycle.controller().micro_history().is_empty());

        let exposition = std::fs::read_to_string(dir.path().join(METRICS_FILE)).unwrap();
        assert!(exposition.contains("morphos_cycles_total"));
    }
}
