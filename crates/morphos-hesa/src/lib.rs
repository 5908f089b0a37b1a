//! # HESA
//!
//! Sweet-spot finder: a derivative-free Nelder-Mead search over the objective
//!
//! ```text
//! f(x) = 1 / (1 + ‖x/scale - θ‖)
//! ```
//!
//! where `θ` is the entropy threshold. The search **maximizes** `f`; the
//! working simplex is kept sorted ascending so the worst vertex is first.
//!
//! A result is a valid sweet spot when its stability radius exceeds 0.1 and
//! its value exceeds 0.7. Only valid spots reach the [`DiscoveryLedger`].

pub mod finder;
pub mod ledger;
pub mod simplex;

pub use finder::SweetSpotFinder;
pub use ledger::DiscoveryLedger;
pub use simplex::Simplex;

use serde::{Deserialize, Serialize};

/// Simplex search configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplexConfig {
    /// Stop when both the spread of `f` and the simplex diameter (normalized
    /// units) fall below this
    pub convergence_threshold: f64,
    /// Hard iteration cap; reaching it is a normal termination
    pub max_iterations: u32,
    pub reflection: f64,
    pub expansion: f64,
    pub contraction: f64,
    pub shrink: f64,
    /// Minimum separation (normalized units) between initial vertices
    pub initial_step: f64,
}

impl Default for SimplexConfig {
    fn default() -> Self {
        Self {
            convergence_threshold: 0.001,
            max_iterations: 100,
            reflection: 1.0,
            expansion: 2.0,
            contraction: 0.5,
            shrink: 0.5,
            initial_step: 0.05,
        }
    }
}
