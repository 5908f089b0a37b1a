//! # M-loop
//!
//! Three-tier hierarchical controller for the Morphos evolution engine.
//!
//! ## Tiers
//!
//! ```text
//! micro  (~1000 Hz)  PID on cpu usage:  u = e·Kp + Σe·Ki + Δcpu·Kd
//! meso   (~1 Hz)     adapts micro gains, emits operator weights
//! macro  (~1/60 Hz)  picks a strategic mode and resource allocation
//! ```
//!
//! Each tier only reads the most recent completed output of the tier below
//! through a bounded history ring, so no tier ever blocks on another.

pub mod cadence;
pub mod controller;
pub mod history;
pub mod sensors;
pub mod telemetry;

pub use controller::{
    HierarchicalController, MacroDirective, MesoOutput, MicroController, StepOutcome,
};
pub use history::HistoryRing;
pub use sensors::{ProcSensors, SensorReading, SensorSource, StaticSensors};

use serde::{Deserialize, Serialize};

/// PID gains for the micro loop
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.1,
            kd: 0.05,
        }
    }
}

/// M-loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MLoopConfig {
    /// Micro loop frequency (Hz)
    pub micro_hz: f64,
    /// Meso loop frequency (Hz)
    pub meso_hz: f64,
    /// Macro loop frequency (Hz)
    pub macro_hz: f64,
    /// Target cpu usage (percent)
    pub target_cpu: f64,
    /// Base micro gains, scaled each tick by the meso output
    pub gains: PidGains,
    /// Micro samples retained for meso aggregation
    pub micro_window: usize,
    /// Meso samples retained for macro aggregation
    pub meso_window: usize,
    /// Macro samples retained for reporting
    pub macro_window: usize,
}

impl Default for MLoopConfig {
    fn default() -> Self {
        Self {
            micro_hz: 1000.0,
            meso_hz: 1.0,
            macro_hz: 1.0 / 60.0,
            target_cpu: 70.0,
            gains: PidGains::default(),
            micro_window: 1000,
            meso_window: 60,
            macro_window: 24,
        }
    }
}
