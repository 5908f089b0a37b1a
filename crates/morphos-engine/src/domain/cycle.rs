//! Evolution cycle
//!
//! One cycle is a single read-modify-write of platform state:
//!
//! ```text
//! snapshot -> select -> apply -> controller feedback -> sweet-spot search
//!          -> phase schedule -> commit -> operator log / discovery ledger
//! ```
//!
//! Everything up to the commit is re-run from a fresh snapshot when the commit
//! loses a version race. Logs are only written once the state has landed, so
//! a conflicted attempt leaves no trace. With a ledger attached, a valid sweet
//! spot is only counted in `discoveries` by a second commit made after its
//! ledger line is on disk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use morphos_common::entropy::OsEntropy;
use morphos_common::{
    EntropyPool, EntropySource, HesaError, MorphosError, OperatorKind, PlatformState,
    SeededEntropy, SweetSpot,
};
use morphos_hesa::{DiscoveryLedger, SweetSpotFinder};
use morphos_mloop::controller::apply_feedback;
use morphos_mloop::{HierarchicalController, ProcSensors, SensorSource, StaticSensors};
use morphos_operators::OperatorSelector;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::{phase, search};
use crate::config::{EngineConfig, EntropySettings};
use crate::infra::operator_log::{OperatorLog, OperatorRecord};
use crate::infra::state_store::{
    retry_on_conflict, InMemoryStateStore, JsonFileStateStore, StateStore,
};

/// Discovery ledger file name under the log directory
pub const LEDGER_FILE: &str = "discoveries.jsonl";

/// How the cycle obtains controller feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerMode {
    /// Step the controller inside the cycle (one-shot invocations)
    Inline,
    /// Read the latest outputs of tiers running as background tasks
    Background,
}

/// Collaborators handed to an [`EvolutionCycle`]
pub struct CycleComponents {
    pub store: Arc<dyn StateStore>,
    pub controller: Arc<HierarchicalController>,
    pub sensors: Arc<dyn SensorSource>,
    pub entropy: EntropyPool,
    pub ledger: Option<Arc<DiscoveryLedger>>,
    pub operator_log: Option<OperatorLog>,
}

impl CycleComponents {
    /// Production wiring: JSON state file, `/proc` sensors, file logs
    pub fn from_config(config: &EngineConfig) -> Result<Self, MorphosError> {
        let ledger = DiscoveryLedger::open(config.storage.log_dir.join(LEDGER_FILE))?;
        Ok(Self {
            store: Arc::new(JsonFileStateStore::new(&config.storage.state_path)),
            controller: Arc::new(HierarchicalController::new(config.mloop.clone())),
            sensors: Arc::new(ProcSensors::new()),
            entropy: entropy_pool(&config.entropy),
            ledger: Some(Arc::new(ledger)),
            operator_log: Some(OperatorLog::new(&config.storage.log_dir)),
        })
    }

    /// In-memory store, static sensors, no logs
    pub fn ephemeral(
        config: &EngineConfig,
        entropy: Box<dyn EntropySource>,
        initial: PlatformState,
    ) -> Self {
        Self {
            store: Arc::new(InMemoryStateStore::new(initial)),
            controller: Arc::new(HierarchicalController::new(config.mloop.clone())),
            sensors: Arc::new(StaticSensors::default()),
            entropy: EntropyPool::new(entropy, config.entropy.pool_size, config.entropy.fallback),
            ledger: None,
            operator_log: None,
        }
    }
}

/// Entropy pool for the configured source
pub fn entropy_pool(settings: &EntropySettings) -> EntropyPool {
    let source: Box<dyn EntropySource> = match settings.seed {
        Some(seed) => Box::new(SeededEntropy::new(seed)),
        None => Box::new(OsEntropy),
    };
    EntropyPool::new(source, settings.pool_size, settings.fallback)
}

/// Result of one committed cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub operator: OperatorKind,
    pub entropy: f64,
    pub ordinal: Option<u64>,
    pub state_version: u64,
    pub state: PlatformState,
    pub sweet_spot: Option<SweetSpot>,
    /// Whether the sweet spot was appended to the discovery ledger
    pub recorded: bool,
    /// Why a valid sweet spot did not make it into the ledger or the count
    pub discovery_error: Option<String>,
    /// Commit attempts, including the successful one
    pub attempts: u32,
}

/// Outcome of the attempt that won the commit
struct Committed {
    operator: OperatorKind,
    entropy: f64,
    before: PlatformState,
    after: PlatformState,
    sweet_spot: Option<SweetSpot>,
    attempts: u32,
}

pub struct EvolutionCycle {
    config: EngineConfig,
    selector: OperatorSelector,
    finder: SweetSpotFinder,
    store: Arc<dyn StateStore>,
    controller: Arc<HierarchicalController>,
    sensors: Arc<dyn SensorSource>,
    controller_mode: ControllerMode,
    entropy: Arc<parking_lot::Mutex<EntropyPool>>,
    ledger: Option<Arc<DiscoveryLedger>>,
    operator_log: Option<OperatorLog>,
    /// Held for the duration of a search; one search at a time
    search_gate: tokio::sync::Mutex<()>,
    cancel: Arc<AtomicBool>,
}

impl EvolutionCycle {
    pub fn new(config: EngineConfig, components: CycleComponents, mode: ControllerMode) -> Self {
        Self {
            selector: OperatorSelector::new(config.methodology),
            finder: SweetSpotFinder::new(config.simplex.clone()),
            store: components.store,
            controller: components.controller,
            sensors: components.sensors,
            controller_mode: mode,
            entropy: Arc::new(parking_lot::Mutex::new(components.entropy)),
            ledger: components.ledger,
            operator_log: components.operator_log,
            search_gate: tokio::sync::Mutex::new(()),
            cancel: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn controller(&self) -> &Arc<HierarchicalController> {
        &self.controller
    }

    /// Abort any running sweet-spot search; later searches are skipped
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Run one cycle
    ///
    /// `ordinal` (or the configured one) pins the operator to
    /// `ALL[ordinal mod 6]`. A commit that keeps conflicting after the
    /// configured retries surfaces as a retriable [`MorphosError::Store`].
    #[instrument(skip(self), fields(cycle_id = tracing::field::Empty))]
    pub async fn run_once(&self, ordinal: Option<u64>) -> Result<CycleReport, MorphosError> {
        let cycle_id = Uuid::now_v7().to_string();
        tracing::Span::current().record("cycle_id", cycle_id.as_str());
        let ordinal = ordinal.or(self.config.cycle.ordinal);

        let committed = retry_on_conflict(self.config.storage.write_retries, |attempt| {
            self.attempt(ordinal, attempt)
        })
        .await?;

        if let Some(log) = &self.operator_log {
            let record = OperatorRecord::summarize(
                &cycle_id,
                committed.operator,
                committed.entropy,
                ordinal,
                &committed.before,
                &committed.after,
            );
            if let Err(e) = log.append(&record).await {
                warn!(error = %e, operator = %committed.operator, "Failed to append operator log");
            }
        }

        let mut state = committed.after;
        let mut recorded = false;
        let mut discovery_error = None;
        if let (Some(ledger), Some(spot)) = (&self.ledger, &committed.sweet_spot) {
            if spot.valid {
                match self
                    .record_discovery(ledger.clone(), &cycle_id, spot.clone())
                    .await
                {
                    Ok(appended) => recorded = appended,
                    Err(e) => {
                        warn!(error = %e, "Failed to record sweet spot, not counting it");
                        discovery_error = Some(e.to_string());
                    }
                }
            }
        }
        if recorded {
            match retry_on_conflict(self.config.storage.write_retries, |_| {
                self.count_discovery()
            })
            .await
            {
                Ok(counted) => state = counted,
                Err(e) => {
                    warn!(error = %e, "Sweet spot recorded but discovery count not committed");
                    discovery_error = Some(e.to_string());
                }
            }
        }

        info!(
            operator = %committed.operator,
            entropy = committed.entropy,
            version = state.version,
            attempts = committed.attempts,
            "Evolution cycle committed"
        );

        Ok(CycleReport {
            cycle_id,
            operator: committed.operator,
            entropy: committed.entropy,
            ordinal,
            state_version: state.version,
            state,
            sweet_spot: committed.sweet_spot,
            recorded,
            discovery_error,
            attempts: committed.attempts,
        })
    }

    /// One read-modify-write against the store
    async fn attempt(&self, ordinal: Option<u64>, attempt: u32) -> Result<Committed, MorphosError> {
        let snapshot = self.store.snapshot().await?;
        let before = snapshot.value;

        let operator = self.selector.select(&before, ordinal);
        let (entropy, consumed_before) = {
            let mut pool = self.entropy.lock();
            let consumed = pool.consumed();
            (pool.draw(), consumed)
        };

        let mut next = morphos_operators::apply(operator, &before, entropy);
        next.experiments_completed = next.experiments_completed.saturating_add(1);

        self.controller_feedback(&mut next);

        let sweet_spot = if next.experiments_completed % self.config.cycle.sweet_spot_every == 0 {
            self.search(&next).await?
        } else {
            None
        };
        if let Some(spot) = &sweet_spot {
            next.sweet_spot_distance =
                search::sweet_spot_distance(spot, &search::search_space(&next));
            // Counted after the ledger append when a ledger is attached
            if spot.valid && self.ledger.is_none() {
                next.discoveries = next.discoveries.saturating_add(1);
            }
        }

        next.entropy_consumed += self.entropy.lock().consumed() - consumed_before;
        phase::apply_schedule(
            &mut next,
            self.config.cycle.exploration_horizon,
            self.config.cycle.auto_phase,
        );

        let version = self.store.commit(snapshot.version, next.clone()).await?;
        next.version = version;

        Ok(Committed {
            operator,
            entropy,
            before,
            after: next,
            sweet_spot,
            attempts: attempt + 1,
        })
    }

    /// Bump `discoveries` for a spot that reached the ledger
    async fn count_discovery(&self) -> Result<PlatformState, MorphosError> {
        let snapshot = self.store.snapshot().await?;
        let mut next = snapshot.value;
        next.discoveries = next.discoveries.saturating_add(1);
        phase::apply_schedule(&mut next, self.config.cycle.exploration_horizon, false);
        next.version = self.store.commit(snapshot.version, next.clone()).await?;
        Ok(next)
    }

    fn controller_feedback(&self, state: &mut PlatformState) {
        match self.controller_mode {
            ControllerMode::Inline => {
                let outcome = self.controller.step(
                    Instant::now(),
                    self.sensors.as_ref(),
                    state,
                    self.config.cycle.micro_ticks,
                );
                outcome.apply_to(state);
            }
            ControllerMode::Background => {
                let meso = self.controller.latest_meso();
                let directive = self.controller.latest_directive();
                apply_feedback(state, meso.as_ref(), directive.as_ref());
            }
        }
    }

    /// Sweet-spot search on the blocking pool
    ///
    /// Skipped when another search holds the gate or the cycle is cancelled;
    /// a search cancelled midway is discarded.
    async fn search(&self, state: &PlatformState) -> Result<Option<SweetSpot>, MorphosError> {
        if self.is_cancelled() {
            return Ok(None);
        }
        let Ok(_gate) = self.search_gate.try_lock() else {
            debug!("Sweet-spot search already running, skipping");
            return Ok(None);
        };

        let space = search::search_space(state);
        let threshold = search::entropy_threshold(state);
        let finder = self.finder.clone();
        let entropy = self.entropy.clone();
        let cancel = self.cancel.clone();

        let result = tokio::task::spawn_blocking(move || {
            let mut pool = entropy.lock();
            finder.find_with_cancel(&space, threshold, &mut *pool, &cancel)
        })
        .await
        .map_err(|e| MorphosError::Internal(format!("sweet-spot search panicked: {e}")))?;

        match result {
            Ok(spot) => Ok(Some(spot)),
            Err(HesaError::Cancelled { iterations }) => {
                info!(iterations, "Sweet-spot search cancelled, discarding simplex");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn record_discovery(
        &self,
        ledger: Arc<DiscoveryLedger>,
        cycle_id: &str,
        spot: SweetSpot,
    ) -> Result<bool, MorphosError> {
        let id = cycle_id.to_string();
        let recorded = tokio::task::spawn_blocking(move || ledger.record(&id, &spot))
            .await
            .map_err(|e| MorphosError::Internal(format!("discovery recording task failed: {e}")))??;
        Ok(recorded)
    }
}
