//! Operator selection policy
//!
//! First match wins:
//!
//! 1. `exploration_phase < 0.2` → Linear
//! 2. `refinement_needed` → Circular
//! 3. `perspective_shift` → Rotating
//! 4. `component_testing` → Modular
//! 5. `optimization_phase` → Iterative
//! 6. otherwise → Inverted
//!
//! Rule order is authoritative: a set flag always beats the flags below it.
//! The bias only acts where the rules leave a choice, which is the fallback
//! branch. There an operator holding a clear majority of the bias weight
//! replaces Inverted. The bias is the meso loop's `operator_weights` carried
//! in state, or the configured methodology weights when the controller has
//! not written any. An explicit ordinal overrides everything with
//! `ALL[ordinal mod 6]`.

use morphos_common::{OperatorKind, OperatorWeights, PlatformState, EXPLORATION_CUTOFF};
use tracing::debug;

/// Normalized bias weight an operator needs to displace the fallback
pub const CLEAR_MAJORITY: f64 = 0.5;

/// Deterministic operator selector
#[derive(Debug, Clone, Default)]
pub struct OperatorSelector {
    methodology: OperatorWeights,
}

impl OperatorSelector {
    pub fn new(methodology: OperatorWeights) -> Self {
        Self { methodology }
    }

    pub fn methodology(&self) -> &OperatorWeights {
        &self.methodology
    }

    /// Pick the operator for this cycle
    pub fn select(&self, state: &PlatformState, ordinal: Option<u64>) -> OperatorKind {
        if let Some(ordinal) = ordinal {
            return OperatorKind::from_ordinal(ordinal);
        }

        if state.exploration_phase < EXPLORATION_CUTOFF {
            return OperatorKind::Linear;
        }

        let rules = [
            (state.refinement_needed, OperatorKind::Circular),
            (state.perspective_shift, OperatorKind::Rotating),
            (state.component_testing, OperatorKind::Modular),
            (state.optimization_phase, OperatorKind::Iterative),
        ];
        if let Some((_, kind)) = rules.into_iter().find(|(flag, _)| *flag) {
            return kind;
        }

        let bias = state.operator_weights.unwrap_or(self.methodology);
        Self::fallback(&bias)
    }

    fn fallback(bias: &OperatorWeights) -> OperatorKind {
        let bias = bias.normalized();
        let favoured = OperatorKind::ALL
            .into_iter()
            .find(|&kind| bias.get(kind) > CLEAR_MAJORITY);
        match favoured {
            Some(kind) if kind != OperatorKind::Inverted => {
                debug!(%kind, weight = bias.get(kind), "Fallback displaced by bias");
                kind
            }
            _ => OperatorKind::Inverted,
        }
    }
}
