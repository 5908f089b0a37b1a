//! Control samples emitted by the M-loop tiers

use serde::{Deserialize, Serialize};

/// Controller tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopTier {
    Micro,
    Meso,
    Macro,
}

/// Immutable record of one loop tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlSample {
    /// Unix milliseconds
    pub timestamp: i64,
    pub tier: LoopTier,
    pub signal: f64,
    pub stability_index: f64,
}

impl ControlSample {
    /// Sample stamped with the current time; stability is `1 / (1 + |signal|)`
    pub fn new(tier: LoopTier, signal: f64) -> Self {
        Self::at(chrono::Utc::now().timestamp_millis(), tier, signal)
    }

    pub fn at(timestamp: i64, tier: LoopTier, signal: f64) -> Self {
        Self::with_stability(timestamp, tier, signal, 1.0 / (1.0 + signal.abs()))
    }

    /// Sample carrying an explicitly aggregated stability index
    pub fn with_stability(timestamp: i64, tier: LoopTier, signal: f64, stability_index: f64) -> Self {
        Self {
            timestamp,
            tier,
            signal,
            stability_index,
        }
    }
}
