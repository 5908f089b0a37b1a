//! Macro tier: strategic mode and resource allocation

use morphos_common::{
    ControlSample, LoopTier, PlatformState, ResourceAllocation, StrategicMode,
    DEFAULT_AVG_STABILITY,
};
use serde::{Deserialize, Serialize};

/// Growth rate below which the platform keeps exploring
const EXPLORATION_GROWTH: f64 = 0.1;

/// Convergence above which the platform exploits
const EXPLOITATION_CONVERGENCE: f64 = 0.8;

/// Efficiency below which validation gets extra budget
const LOW_EFFICIENCY: f64 = 0.01;

/// Meso stability below which validation gets extra budget
const LOW_STABILITY: f64 = 0.3;

/// Long-run metrics observed at one macro tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroObservation {
    pub knowledge_graph_size: u64,
    pub experiments_completed: u64,
    pub discoveries: u64,
    pub entropy_consumed: f64,
    pub sweet_spot_distance: f64,
}

impl From<&PlatformState> for MacroObservation {
    fn from(state: &PlatformState) -> Self {
        Self {
            knowledge_graph_size: state.knowledge_graph_size,
            experiments_completed: state.experiments_completed,
            discoveries: state.discoveries,
            entropy_consumed: state.entropy_consumed,
            sweet_spot_distance: state.sweet_spot_distance,
        }
    }
}

/// Strategic decision written back into platform state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroDirective {
    pub mode: StrategicMode,
    pub allocation: ResourceAllocation,
    pub knowledge_growth_rate: f64,
    pub entropy_efficiency: f64,
    pub sweet_spot_convergence: f64,
    pub meso_stability: f64,
}

impl MacroDirective {
    pub fn sample(&self, timestamp: i64) -> ControlSample {
        ControlSample::with_stability(
            timestamp,
            LoopTier::Macro,
            self.knowledge_growth_rate,
            self.sweet_spot_convergence,
        )
    }
}

/// Stateful macro planner; remembers the previous observation for growth
#[derive(Debug, Default)]
pub struct StrategicPlanner {
    previous: Option<MacroObservation>,
}

impl StrategicPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide mode and allocation from long-run metrics and meso history
    pub fn plan(&mut self, obs: MacroObservation, meso_window: &[ControlSample]) -> MacroDirective {
        let knowledge_growth_rate = self.growth_rate(&obs);
        self.previous = Some(obs);

        let entropy_efficiency = if obs.entropy_consumed > 0.0 {
            obs.discoveries as f64 / obs.entropy_consumed
        } else {
            0.0
        };
        let sweet_spot_convergence = (1.0 - obs.sweet_spot_distance).clamp(0.0, 1.0);
        let meso_stability = if meso_window.is_empty() {
            DEFAULT_AVG_STABILITY
        } else {
            meso_window.iter().map(|s| s.stability_index).sum::<f64>() / meso_window.len() as f64
        };

        let mode = choose_mode(knowledge_growth_rate, sweet_spot_convergence);
        let allocation = allocate(mode, entropy_efficiency, meso_stability);

        MacroDirective {
            mode,
            allocation,
            knowledge_growth_rate,
            entropy_efficiency,
            sweet_spot_convergence,
            meso_stability,
        }
    }

    /// Knowledge gained per experiment
    ///
    /// Uses the delta since the previous observation when experiments have
    /// advanced, otherwise the lifetime average.
    fn growth_rate(&self, obs: &MacroObservation) -> f64 {
        if let Some(prev) = self.previous {
            if obs.experiments_completed > prev.experiments_completed {
                let knowledge = obs.knowledge_graph_size as f64 - prev.knowledge_graph_size as f64;
                let experiments = (obs.experiments_completed - prev.experiments_completed) as f64;
                return knowledge / experiments;
            }
        }
        if obs.experiments_completed == 0 {
            0.0
        } else {
            obs.knowledge_graph_size as f64 / obs.experiments_completed as f64
        }
    }
}

pub fn choose_mode(growth_rate: f64, convergence: f64) -> StrategicMode {
    if growth_rate < EXPLORATION_GROWTH {
        StrategicMode::Exploration
    } else if convergence > EXPLOITATION_CONVERGENCE {
        StrategicMode::Exploitation
    } else {
        StrategicMode::Balanced
    }
}

/// Research/optimization/validation fractions; always sum to 1
pub fn allocate(mode: StrategicMode, entropy_efficiency: f64, meso_stability: f64) -> ResourceAllocation {
    let mut allocation = match mode {
        StrategicMode::Exploration => ResourceAllocation {
            research: 0.6,
            optimization: 0.2,
            validation: 0.2,
        },
        StrategicMode::Exploitation => ResourceAllocation {
            research: 0.2,
            optimization: 0.6,
            validation: 0.2,
        },
        StrategicMode::Balanced => ResourceAllocation::default(),
    };
    if entropy_efficiency < LOW_EFFICIENCY || meso_stability < LOW_STABILITY {
        allocation.research -= 0.1;
        allocation.validation += 0.1;
    }
    allocation
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(knowledge: u64, experiments: u64, distance: f64) -> MacroObservation {
        MacroObservation {
            knowledge_graph_size: knowledge,
            experiments_completed: experiments,
            discoveries: 1,
            entropy_consumed: 10.0,
            sweet_spot_distance: distance,
        }
    }

    #[test]
    fn test_mode_thresholds() {
        assert_eq!(choose_mode(0.05, 0.99), StrategicMode::Exploration);
        assert_eq!(choose_mode(0.5, 0.9), StrategicMode::Exploitation);
        assert_eq!(choose_mode(0.5, 0.5), StrategicMode::Balanced);
    }

    #[test]
    fn test_fresh_platform_explores() {
        let mut planner = StrategicPlanner::new();
        let directive = planner.plan(obs(0, 0, 1.0), &[]);
        assert_eq!(directive.mode, StrategicMode::Exploration);
        assert_eq!(directive.meso_stability, 0.5);
    }

    #[test]
    fn test_growth_uses_delta_after_first_tick() {
        let mut planner = StrategicPlanner::new();
        planner.plan(obs(10, 10, 0.1), &[]);
        let directive = planner.plan(obs(15, 20, 0.1), &[]);
        assert!((directive.knowledge_growth_rate - 0.5).abs() < 1e-12);
        assert_eq!(directive.mode, StrategicMode::Exploitation);
    }

    #[test]
    fn test_allocations_sum_to_one() {
        for mode in [
            StrategicMode::Exploration,
            StrategicMode::Exploitation,
            StrategicMode::Balanced,
        ] {
            for (eff, stab) in [(0.0, 0.5), (1.0, 0.5), (1.0, 0.1)] {
                let a = allocate(mode, eff, stab);
                assert!((a.total() - 1.0).abs() < 1e-12);
                assert!(a.research > 0.0 && a.optimization > 0.0 && a.validation > 0.0);
            }
        }
    }

    #[test]
    fn test_low_efficiency_shifts_to_validation() {
        let a = allocate(StrategicMode::Balanced, 0.0, 0.5);
        assert!((a.validation - 0.4).abs() < 1e-12);
        assert!((a.research - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_low_meso_stability_shifts_to_validation_once() {
        let unstable = allocate(StrategicMode::Exploration, 1.0, 0.1);
        assert!((unstable.validation - 0.3).abs() < 1e-12);
        assert!((unstable.research - 0.5).abs() < 1e-12);

        let both = allocate(StrategicMode::Exploration, 0.0, 0.1);
        assert_eq!(both, unstable);

        let steady = allocate(StrategicMode::Exploration, 1.0, 0.5);
        assert!((steady.validation - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_first_observation_uses_lifetime_average() {
        let mut planner = StrategicPlanner::new();
        let directive = planner.plan(obs(30, 10, 0.1), &[]);
        assert!((directive.knowledge_growth_rate - 3.0).abs() < 1e-12);

        // No new experiments since the last tick falls back to the average too
        let directive = planner.plan(obs(30, 10, 0.1), &[]);
        assert!((directive.knowledge_growth_rate - 3.0).abs() < 1e-12);
    }
}
