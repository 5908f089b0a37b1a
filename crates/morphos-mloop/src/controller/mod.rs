//! Hierarchical controller (micro / meso / macro)
pub mod meso;
pub mod pid;
pub mod strategic;

pub use self::meso::MesoOutput;
pub use self::pid::{MicroController, MicroTerms};
pub use self::strategic::{MacroDirective, MacroObservation, StrategicPlanner};

use std::sync::Arc;
use std::time::Instant;

use morphos_common::{ControlSample, PlatformState};
use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument};

use crate::cadence::{period_for, Cadence};
use crate::history::HistoryRing;
use crate::sensors::SensorSource;
use crate::telemetry::ControllerMetrics;
use crate::MLoopConfig;

/// Outputs of an inline controller step
#[derive(Debug, Clone, Default)]
pub struct StepOutcome {
    pub micro: Option<ControlSample>,
    pub micro_ticks: usize,
    pub meso: Option<MesoOutput>,
    pub directive: Option<MacroDirective>,
}

impl StepOutcome {
    /// Write meso weights and the macro directive into state
    pub fn apply_to(&self, state: &mut PlatformState) {
        apply_feedback(state, self.meso.as_ref(), self.directive.as_ref());
    }
}

/// Write controller feedback into platform state
pub fn apply_feedback(
    state: &mut PlatformState,
    meso: Option<&MesoOutput>,
    directive: Option<&MacroDirective>,
) {
    if let Some(meso) = meso {
        state.operator_weights = Some(meso.operator_weights);
    }
    if let Some(directive) = directive {
        state.strategic_mode = Some(directive.mode);
        state.resource_allocation = directive.allocation;
    }
}

/// The three M-loop tiers sharing history rings
///
/// Each tier may be driven independently (`*_tick`), inline on a cadence
/// (`step`), or as background tasks (`spawn`).
pub struct HierarchicalController {
    config: MLoopConfig,
    micro: Mutex<MicroController>,
    planner: Mutex<StrategicPlanner>,
    micro_history: RwLock<HistoryRing<ControlSample>>,
    meso_history: RwLock<HistoryRing<ControlSample>>,
    macro_history: RwLock<HistoryRing<ControlSample>>,
    latest_meso: RwLock<Option<MesoOutput>>,
    latest_directive: RwLock<Option<MacroDirective>>,
    meso_cadence: Mutex<Cadence>,
    macro_cadence: Mutex<Cadence>,
    metrics: Option<ControllerMetrics>,
}

impl HierarchicalController {
    pub fn new(config: MLoopConfig) -> Self {
        Self {
            micro: Mutex::new(MicroController::new(config.target_cpu, config.gains)),
            planner: Mutex::new(StrategicPlanner::new()),
            micro_history: RwLock::new(HistoryRing::new(config.micro_window)),
            meso_history: RwLock::new(HistoryRing::new(config.meso_window)),
            macro_history: RwLock::new(HistoryRing::new(config.macro_window)),
            latest_meso: RwLock::new(None),
            latest_directive: RwLock::new(None),
            meso_cadence: Mutex::new(Cadence::from_hz(config.meso_hz)),
            macro_cadence: Mutex::new(Cadence::from_hz(config.macro_hz)),
            metrics: None,
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &MLoopConfig {
        &self.config
    }

    /// One micro tick: read sensors, run the PID, record the sample
    pub fn micro_tick(&self, sensors: &dyn SensorSource) -> ControlSample {
        let reading = sensors.read();
        let sample = self.micro.lock().tick(&reading);
        self.micro_history.write().push(sample);
        if let Some(metrics) = &self.metrics {
            metrics.record_micro(sample.signal, sample.stability_index);
        }
        sample
    }

    /// One meso tick: aggregate the micro window and retune micro gains
    pub fn meso_tick(&self) -> MesoOutput {
        let window = self.micro_history.read().snapshot();
        let out = MesoOutput::aggregate(&window);
        self.micro.lock().retune(out.gain_modifier, out.damping_factor);
        self.meso_history
            .write()
            .push(out.sample(chrono::Utc::now().timestamp_millis()));
        *self.latest_meso.write() = Some(out);
        if let Some(metrics) = &self.metrics {
            metrics.record_meso(&out);
        }
        debug!(
            avg_stability = out.avg_stability,
            control_variance = out.control_variance,
            gain_modifier = out.gain_modifier,
            "Meso tick"
        );
        out
    }

    /// One macro tick against a platform state snapshot
    pub fn macro_tick(&self, state: &PlatformState) -> MacroDirective {
        let meso_window = self.meso_history.read().snapshot();
        let directive = self
            .planner
            .lock()
            .plan(MacroObservation::from(state), &meso_window);
        self.macro_history
            .write()
            .push(directive.sample(chrono::Utc::now().timestamp_millis()));
        *self.latest_directive.write() = Some(directive);
        if let Some(metrics) = &self.metrics {
            metrics.record_macro(&directive);
        }
        info!(
            mode = %directive.mode,
            growth_rate = directive.knowledge_growth_rate,
            convergence = directive.sweet_spot_convergence,
            "Macro tick"
        );
        directive
    }

    /// Inline step: `micro_ticks` micro ticks, then meso and macro when due
    #[instrument(skip(self, sensors, state))]
    pub fn step(
        &self,
        now: Instant,
        sensors: &dyn SensorSource,
        state: &PlatformState,
        micro_ticks: usize,
    ) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        for _ in 0..micro_ticks {
            outcome.micro = Some(self.micro_tick(sensors));
            outcome.micro_ticks += 1;
        }
        if self.meso_cadence.lock().due(now) {
            outcome.meso = Some(self.meso_tick());
        }
        if self.macro_cadence.lock().due(now) {
            outcome.directive = Some(self.macro_tick(state));
        }
        outcome
    }

    pub fn latest_meso(&self) -> Option<MesoOutput> {
        *self.latest_meso.read()
    }

    pub fn latest_directive(&self) -> Option<MacroDirective> {
        *self.latest_directive.read()
    }

    pub fn micro_history(&self) -> Vec<ControlSample> {
        self.micro_history.read().snapshot()
    }

    pub fn meso_history(&self) -> Vec<ControlSample> {
        self.meso_history.read().snapshot()
    }

    pub fn macro_history(&self) -> Vec<ControlSample> {
        self.macro_history.read().snapshot()
    }

    /// Run each tier as an independent interval task until `shutdown` flips
    ///
    /// Tasks only stop between ticks. The macro tier reads the most recent
    /// state published on `state_rx`.
    pub fn spawn(
        self: Arc<Self>,
        sensors: Arc<dyn SensorSource>,
        state_rx: watch::Receiver<PlatformState>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let micro = {
            let ctl = self.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period_for(ctl.config.micro_hz));
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            ctl.micro_tick(sensors.as_ref());
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("Micro loop stopped");
            })
        };

        let meso = {
            let ctl = self.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period_for(ctl.config.meso_hz));
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            ctl.meso_tick();
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("Meso loop stopped");
            })
        };

        let strategic = {
            let ctl = self;
            let mut shutdown = shutdown;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period_for(ctl.config.macro_hz));
                interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            let state = state_rx.borrow().clone();
                            ctl.macro_tick(&state);
                        }
                        _ = shutdown.changed() => break,
                    }
                }
                debug!("Macro loop stopped");
            })
        };

        vec![micro, meso, strategic]
    }
}
