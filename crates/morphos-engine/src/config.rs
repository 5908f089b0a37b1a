//! Engine configuration
//!
//! Layered: struct defaults, then an optional file named by `MORPHOS_CONFIG`
//! (TOML, JSON, or YAML by extension), then `MORPHOS_*` environment variables
//! with `__` between nested keys, e.g. `MORPHOS_SIMPLEX__MAX_ITERATIONS=200`.
//! Read once at start and immutable for the life of a cycle.

use std::path::PathBuf;

use config::{Config, Environment, File};
use morphos_common::{ConfigError, OperatorWeights};
use morphos_hesa::SimplexConfig;
use morphos_mloop::MLoopConfig;
use serde::{Deserialize, Serialize};

/// Tolerance on the methodology weight sum
const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Operator methodology weights (fallback bias, sum to 1.0)
    pub methodology: OperatorWeights,
    /// M-loop frequencies and gains
    pub mloop: MLoopConfig,
    /// Entropy pool parameters
    pub entropy: EntropySettings,
    /// Simplex search parameters
    pub simplex: SimplexConfig,
    /// Persistence locations
    pub storage: StorageSettings,
    /// Evolution cycle cadence
    pub cycle: CycleSettings,
}

impl EngineConfig {
    /// Load configuration from `.env`, optional file, and environment
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load .env file
        let _ = dotenvy::dotenv();

        let mut builder = Config::builder();
        if let Ok(path) = std::env::var("MORPHOS_CONFIG") {
            builder = builder.add_source(File::with_name(&path));
        }
        builder = builder.add_source(
            Environment::with_prefix("MORPHOS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ConfigError::Load(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = self.methodology.to_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(invalid("methodology", "weights must be finite and non-negative"));
        }
        let sum = self.methodology.sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::WeightSum(sum));
        }

        for (field, hz) in [
            ("mloop.micro_hz", self.mloop.micro_hz),
            ("mloop.meso_hz", self.mloop.meso_hz),
            ("mloop.macro_hz", self.mloop.macro_hz),
        ] {
            if !(hz.is_finite() && hz > 0.0) {
                return Err(invalid(field, "frequency must be positive"));
            }
        }

        if self.simplex.max_iterations == 0 {
            return Err(invalid("simplex.max_iterations", "must be at least 1"));
        }
        if !(self.simplex.convergence_threshold >= 0.0) {
            return Err(invalid("simplex.convergence_threshold", "must be non-negative"));
        }
        if self.entropy.pool_size == 0 {
            return Err(invalid("entropy.pool_size", "must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.entropy.fallback) {
            return Err(invalid("entropy.fallback", "must lie in [0, 1)"));
        }
        if self.cycle.sweet_spot_every == 0 {
            return Err(invalid("cycle.sweet_spot_every", "must be at least 1"));
        }
        if !(self.cycle.exploration_horizon > 0.0) {
            return Err(invalid("cycle.exploration_horizon", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Entropy pool parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropySettings {
    /// Seed for a reproducible source; OS randomness when absent
    pub seed: Option<u64>,
    /// Samples buffered ahead of use
    pub pool_size: usize,
    /// Value substituted when the source is unavailable
    pub fallback: f64,
}

impl Default for EntropySettings {
    fn default() -> Self {
        Self {
            seed: None,
            pool_size: 16,
            fallback: 0.0,
        }
    }
}

/// Persistence locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Platform state document
    pub state_path: PathBuf,
    /// Directory for operator logs, the discovery ledger, and metrics
    pub log_dir: PathBuf,
    /// Commit attempts after the first on a write conflict
    pub write_retries: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from("morphos-data/state.json"),
            log_dir: PathBuf::from("morphos-data/logs"),
            write_retries: 3,
        }
    }
}

/// Evolution cycle cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleSettings {
    /// Seconds between cycles in daemon mode
    pub period_secs: u64,
    /// Run the sweet-spot search every N completed experiments
    pub sweet_spot_every: u64,
    /// Experiments until the exploration phase completes
    pub exploration_horizon: f64,
    /// Micro ticks per inline controller step
    pub micro_ticks: usize,
    /// Derive phase flags from state after each cycle
    pub auto_phase: bool,
    /// Worker ordinal for statically sharded deployments
    pub ordinal: Option<u64>,
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            period_secs: 300,
            sweet_spot_every: 3,
            exploration_horizon: 10.0,
            micro_ticks: 10,
            auto_phase: true,
            ordinal: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_weight_sum_enforced() {
        let cfg = EngineConfig {
            methodology: OperatorWeights::from_array([0.5, 0.5, 0.5, 0.0, 0.0, 0.0]),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::WeightSum(_))));
    }

    #[test]
    fn test_negative_weight_rejected() {
        let cfg = EngineConfig {
            methodology: OperatorWeights::from_array([1.5, -0.5, 0.0, 0.0, 0.0, 0.0]),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_zero_frequency_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.mloop.meso_hz = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"simplex": {"max_iterations": 250}, "cycle": {"ordinal": 2}}"#)
                .unwrap();
        assert_eq!(cfg.simplex.max_iterations, 250);
        assert_eq!(cfg.simplex.convergence_threshold, 0.001);
        assert_eq!(cfg.cycle.ordinal, Some(2));
        assert_eq!(cfg.cycle.period_secs, 300);
        cfg.validate().unwrap();
    }
}
