//! Phase schedule
//!
//! Derives the selector's phase flags for the next cycle from the state the
//! current cycle produced.

use morphos_common::{PlatformState, StrategicMode};

/// Allocation share of validation that turns component testing on
const COMPONENT_TESTING_SHARE: f64 = 0.3;

/// Allocation share of optimization that turns the optimization phase on
const OPTIMIZATION_SHARE: f64 = 0.4;

/// Validation score below which refinement is needed
const REFINEMENT_SCORE: f64 = 0.5;

/// Recompute derived fields; flags only when `auto_phase` is set
pub fn apply_schedule(state: &mut PlatformState, exploration_horizon: f64, auto_phase: bool) {
    state.knowledge_graph_size = state.module_count() as u64 + state.discoveries;

    if !auto_phase {
        return;
    }

    let horizon = if exploration_horizon > 0.0 {
        exploration_horizon
    } else {
        1.0
    };
    let mode = state.strategic_mode.unwrap_or_default();
    let alloc = state.resource_allocation;

    state.exploration_phase = (state.experiments_completed as f64 / horizon).min(1.0);
    state.refinement_needed = state.validation_score < REFINEMENT_SCORE;
    state.perspective_shift = mode == StrategicMode::Exploration;
    state.component_testing = alloc.validation >= COMPONENT_TESTING_SHARE;
    state.optimization_phase =
        mode == StrategicMode::Exploitation || alloc.optimization >= OPTIMIZATION_SHARE;
}

#[cfg(test)]
mod tests {
    use super::*;
    use morphos_common::ResourceAllocation;
    use ordered_float::OrderedFloat;

    #[test]
    fn test_exploration_ramps_to_one() {
        let mut state = PlatformState {
            experiments_completed: 5,
            ..Default::default()
        };
        apply_schedule(&mut state, 10.0, true);
        assert_eq!(state.exploration_phase, 0.5);

        state.experiments_completed = 40;
        apply_schedule(&mut state, 10.0, true);
        assert_eq!(state.exploration_phase, 1.0);
    }

    #[test]
    fn test_flags_follow_mode_and_allocation() {
        let mut state = PlatformState {
            validation_score: 0.8,
            strategic_mode: Some(StrategicMode::Exploitation),
            resource_allocation: ResourceAllocation {
                research: 0.2,
                optimization: 0.6,
                validation: 0.2,
            },
            ..Default::default()
        };
        apply_schedule(&mut state, 10.0, true);
        assert!(!state.refinement_needed);
        assert!(!state.perspective_shift);
        assert!(!state.component_testing);
        assert!(state.optimization_phase);

        state.strategic_mode = Some(StrategicMode::Exploration);
        state.resource_allocation = ResourceAllocation {
            research: 0.6,
            optimization: 0.2,
            validation: 0.2,
        };
        state.validation_score = 0.1;
        apply_schedule(&mut state, 10.0, true);
        assert!(state.refinement_needed);
        assert!(state.perspective_shift);
        assert!(!state.optimization_phase);
    }

    #[test]
    fn test_manual_flags_are_left_alone() {
        let mut state = PlatformState {
            exploration_phase: 0.9,
            component_testing: true,
            discoveries: 2,
            ..Default::default()
        };
        state.modules_active.insert(OrderedFloat(0.25));
        apply_schedule(&mut state, 10.0, false);
        assert_eq!(state.exploration_phase, 0.9);
        assert!(state.component_testing);
        assert_eq!(state.knowledge_graph_size, 3);
    }
}
