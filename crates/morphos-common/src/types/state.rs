//! PlatformState - the single mutable shared object
//!
//! Persisted as one flat JSON object. Every field carries a serde default so
//! that partial or legacy documents load with the missing fields at rest.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::operator::{OperatorKind, OperatorWeights};

/// Strategic mode chosen by the macro loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategicMode {
    Exploration,
    Exploitation,
    #[default]
    Balanced,
}

impl std::fmt::Display for StrategicMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StrategicMode::Exploration => "exploration",
            StrategicMode::Exploitation => "exploitation",
            StrategicMode::Balanced => "balanced",
        };
        f.write_str(s)
    }
}

/// Resource allocation fractions written back by the macro loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceAllocation {
    pub research: f64,
    pub optimization: f64,
    pub validation: f64,
}

impl Default for ResourceAllocation {
    fn default() -> Self {
        Self {
            research: 0.4,
            optimization: 0.3,
            validation: 0.3,
        }
    }
}

impl ResourceAllocation {
    pub fn total(&self) -> f64 {
        self.research + self.optimization + self.validation
    }
}

/// Shared platform state evolved by the operators
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformState {
    /// Store version for optimistic concurrency
    pub version: u64,

    // Operator-owned fields
    /// Unbounded, non-decreasing
    pub linear_progress: f64,
    /// In [0, 1)
    pub circular_phase: f64,
    /// Radians, non-decreasing
    pub rotation_angle: f64,
    /// Deduplicated entropy values seen by the modular operator
    pub modules_active: BTreeSet<OrderedFloat<f64>>,
    pub iteration_count: u64,
    /// In [0, 1]
    pub validation_score: f64,
    pub last_entropy: f64,
    pub last_operator: Option<OperatorKind>,

    // Phase flags consulted by the selector
    pub exploration_phase: f64,
    pub refinement_needed: bool,
    pub perspective_shift: bool,
    pub component_testing: bool,
    pub optimization_phase: bool,

    // Long-run metrics
    pub experiments_completed: u64,
    pub knowledge_graph_size: u64,
    /// In [0, 1]
    pub sweet_spot_distance: f64,
    pub discoveries: u64,
    pub entropy_consumed: f64,

    // Controller feedback
    pub operator_weights: Option<OperatorWeights>,
    pub strategic_mode: Option<StrategicMode>,
    pub resource_allocation: ResourceAllocation,
}

impl PlatformState {
    /// Parse a persisted document; anything malformed yields the empty state
    pub fn from_json_lenient(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "Malformed platform state, starting from defaults");
                Self::default()
            }
        }
    }

    /// Check the declared field domains
    pub fn field_domains_hold(&self) -> bool {
        let finite = [
            self.linear_progress,
            self.circular_phase,
            self.rotation_angle,
            self.validation_score,
            self.last_entropy,
            self.exploration_phase,
            self.sweet_spot_distance,
            self.entropy_consumed,
        ]
        .iter()
        .all(|v| v.is_finite());

        finite
            && (0.0..1.0).contains(&self.circular_phase)
            && (0.0..=1.0).contains(&self.validation_score)
            && (0.0..=1.0).contains(&self.sweet_spot_distance)
            && (0.0..1.0).contains(&self.last_entropy)
            && self.modules_active.iter().all(|m| (0.0..1.0).contains(&m.0))
    }

    /// Number of distinct active modules
    pub fn module_count(&self) -> usize {
        self.modules_active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_in_domain() {
        assert!(PlatformState::default().field_domains_hold());
    }

    #[test]
    fn test_partial_document_loads_with_defaults() {
        let state: PlatformState =
            serde_json::from_str(r#"{"exploration_phase": 0.5, "refinement_needed": true}"#)
                .unwrap();
        assert_eq!(state.exploration_phase, 0.5);
        assert!(state.refinement_needed);
        assert_eq!(state.linear_progress, 0.0);
        assert!(state.modules_active.is_empty());
    }

    #[test]
    fn test_malformed_document_is_empty_state() {
        let state = PlatformState::from_json_lenient("{not json");
        assert_eq!(state, PlatformState::default());
    }

    #[test]
    fn test_modules_serialize_as_numbers() {
        let mut state = PlatformState::default();
        state.modules_active.insert(OrderedFloat(0.25));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["modules_active"], serde_json::json!([0.25]));
    }

    #[test]
    fn test_out_of_domain_phase_detected() {
        let state = PlatformState {
            circular_phase: 1.0,
            ..Default::default()
        };
        assert!(!state.field_domains_hold());
    }
}
