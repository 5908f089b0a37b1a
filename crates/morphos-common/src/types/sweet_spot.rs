//! Simplex points and sweet-spot discoveries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One vertex of the working simplex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplexPoint {
    pub coordinates: Vec<f64>,
    pub objective_value: f64,
}

impl SimplexPoint {
    pub fn new(coordinates: Vec<f64>, objective_value: f64) -> Self {
        Self {
            coordinates,
            objective_value,
        }
    }

    pub fn dimension(&self) -> usize {
        self.coordinates.len()
    }
}

/// Locally optimal operating point found by the simplex search
///
/// Never mutated after creation; the discovery ledger only appends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweetSpot {
    pub position: Vec<f64>,
    pub value: f64,
    pub entropy_level: f64,
    /// Normalized distance from the best vertex to its nearest neighbour
    pub stability_radius: f64,
    pub valid: bool,
    pub iterations: u32,
    pub converged: bool,
    pub discovered_at: DateTime<Utc>,
}
