//! # Morphos Common
//!
//! Shared types, errors, and entropy sources for the Morphos evolution engine.
//!
//! ## Core Types
//!
//! - [`PlatformState`]: the shared state evolved by the operators
//! - [`OperatorKind`]: the six state-transform operators
//! - [`ControlSample`]: one tick of a controller tier
//! - [`SimplexPoint`]/[`SweetSpot`]: simplex search working set and result
//!
//! ## Entropy
//!
//! - [`entropy::EntropySource`]: fallible bounded random input
//! - [`entropy::EntropyPool`]: infallible buffered wrapper with fallback

pub mod entropy;
pub mod error;
pub mod types;

// Re-export commonly used types at crate root
pub use entropy::{EntropyPool, EntropySource, FixedEntropy, SeededEntropy};
pub use error::{ConfigError, EntropyError, HesaError, MorphosError, Result, StoreError};
pub use types::{
    control::{ControlSample, LoopTier},
    operator::{OperatorKind, OperatorWeights, OPERATOR_COUNT},
    state::{PlatformState, ResourceAllocation, StrategicMode},
    sweet_spot::{SimplexPoint, SweetSpot},
};

/// Morphos version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Exploration phase below which the linear operator always runs
pub const EXPLORATION_CUTOFF: f64 = 0.2;

/// Minimum stability radius for a valid sweet spot
pub const MIN_STABILITY_RADIUS: f64 = 0.1;

/// Minimum objective value for a valid sweet spot
pub const MIN_SWEET_SPOT_VALUE: f64 = 0.7;

/// Default cpu usage when the sensor is unavailable
pub const DEFAULT_CPU_USAGE: f64 = 50.0;

/// Default average stability for an empty micro window
pub const DEFAULT_AVG_STABILITY: f64 = 0.5;

/// Default control variance for an empty micro window
pub const DEFAULT_CONTROL_VARIANCE: f64 = 0.1;
