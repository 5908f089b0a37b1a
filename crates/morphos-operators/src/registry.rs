//! Operator registry
//!
//! Each operator is a pure `fn(&PlatformState, entropy) -> PlatformState`.
//! Operators never fail: entropy is clamped into `[0, 1)` and out-of-domain
//! prior values are folded back into their domain.

use std::f64::consts::PI;

use morphos_common::entropy::clamp_unit;
use morphos_common::{OperatorKind, PlatformState};
use ordered_float::OrderedFloat;

/// Signature shared by every operator
pub type TransformFn = fn(&PlatformState, f64) -> PlatformState;

/// Static lookup from kind to transform
pub struct OperatorRegistry;

impl OperatorRegistry {
    pub fn lookup(kind: OperatorKind) -> TransformFn {
        match kind {
            OperatorKind::Linear => linear,
            OperatorKind::Circular => circular,
            OperatorKind::Rotating => rotating,
            OperatorKind::Modular => modular,
            OperatorKind::Iterative => iterative,
            OperatorKind::Inverted => inverted,
        }
    }
}

/// Apply `kind` to `state` with the given entropy
pub fn apply(kind: OperatorKind, state: &PlatformState, entropy: f64) -> PlatformState {
    let entropy = clamp_unit(entropy);
    let mut next = OperatorRegistry::lookup(kind)(state, entropy);
    next.last_entropy = entropy;
    next.last_operator = Some(kind);
    next
}

fn linear(state: &PlatformState, entropy: f64) -> PlatformState {
    let mut next = state.clone();
    next.linear_progress += entropy;
    next
}

fn circular(state: &PlatformState, entropy: f64) -> PlatformState {
    let mut next = state.clone();
    let phase = (state.circular_phase + entropy).rem_euclid(1.0);
    // rem_euclid can round up to exactly 1.0 for tiny negative inputs
    next.circular_phase = if phase >= 1.0 || !phase.is_finite() {
        0.0
    } else {
        phase
    };
    next
}

fn rotating(state: &PlatformState, entropy: f64) -> PlatformState {
    let mut next = state.clone();
    next.rotation_angle += entropy * PI;
    next
}

fn modular(state: &PlatformState, entropy: f64) -> PlatformState {
    let mut next = state.clone();
    next.modules_active.insert(OrderedFloat(entropy));
    next
}

fn iterative(state: &PlatformState, entropy: f64) -> PlatformState {
    let mut next = state.clone();
    let step = (entropy * 10.0).floor() as u64;
    next.iteration_count = state.iteration_count.saturating_add(step);
    next
}

fn inverted(state: &PlatformState, entropy: f64) -> PlatformState {
    let mut next = state.clone();
    next.validation_score = (1.0 - (state.validation_score - entropy).abs()).clamp(0.0, 1.0);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_linear_adds_entropy() {
        let state = PlatformState {
            linear_progress: 2.0,
            ..Default::default()
        };
        let next = apply(OperatorKind::Linear, &state, 0.3);
        assert!((next.linear_progress - 2.3).abs() < 1e-12);
        assert_eq!(next.last_operator, Some(OperatorKind::Linear));
        assert_eq!(next.last_entropy, 0.3);
    }

    #[test]
    fn test_circular_wraps() {
        let state = PlatformState {
            circular_phase: 0.9,
            ..Default::default()
        };
        let next = apply(OperatorKind::Circular, &state, 0.3);
        assert!((next.circular_phase - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_rotating_scales_by_pi() {
        let next = apply(OperatorKind::Rotating, &PlatformState::default(), 0.5);
        assert!((next.rotation_angle - PI / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_modular_deduplicates() {
        let once = apply(OperatorKind::Modular, &PlatformState::default(), 0.42);
        let twice = apply(OperatorKind::Modular, &once, 0.42);
        assert_eq!(twice.module_count(), 1);

        let three = apply(OperatorKind::Modular, &twice, 0.17);
        assert_eq!(three.module_count(), 2);
    }

    #[test]
    fn test_iterative_floors() {
        let state = PlatformState {
            iteration_count: 4,
            ..Default::default()
        };
        let next = apply(OperatorKind::Iterative, &state, 0.79);
        assert_eq!(next.iteration_count, 11);
    }

    #[test]
    fn test_inverted_distance() {
        let state = PlatformState {
            validation_score: 0.8,
            ..Default::default()
        };
        let next = apply(OperatorKind::Inverted, &state, 0.3);
        assert!((next.validation_score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_operators_touch_only_their_field() {
        let state = PlatformState {
            linear_progress: 1.0,
            circular_phase: 0.5,
            ..Default::default()
        };
        let next = apply(OperatorKind::Rotating, &state, 0.2);
        assert_eq!(next.linear_progress, 1.0);
        assert_eq!(next.circular_phase, 0.5);
    }

    fn arb_state() -> impl Strategy<Value = PlatformState> {
        (0.0..1e6f64, 0.0..1.0f64, 0.0..1e6f64, 0u64..1_000_000, 0.0..=1.0f64).prop_map(
            |(linear, phase, angle, iterations, score)| PlatformState {
                linear_progress: linear,
                circular_phase: phase,
                rotation_angle: angle,
                iteration_count: iterations,
                validation_score: score,
                ..Default::default()
            },
        )
    }

    proptest! {
        #[test]
        fn prop_operators_preserve_domains(
            state in arb_state(),
            entropy in 0.0..1.0f64,
            ordinal in 0u64..6,
        ) {
            let kind = OperatorKind::from_ordinal(ordinal);
            let next = apply(kind, &state, entropy);
            prop_assert!(next.field_domains_hold());
            prop_assert!((0.0..1.0).contains(&next.circular_phase));
            prop_assert!((0.0..=1.0).contains(&next.validation_score));
            prop_assert!(next.linear_progress >= state.linear_progress);
            prop_assert!(next.iteration_count >= state.iteration_count);
        }
    }
}
