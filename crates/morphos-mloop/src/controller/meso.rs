//! Meso tier: adapts micro gains from the recent micro window

use morphos_common::{
    ControlSample, LoopTier, OperatorWeights, DEFAULT_AVG_STABILITY, DEFAULT_CONTROL_VARIANCE,
};
use serde::{Deserialize, Serialize};

/// Aggregated result of one meso tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MesoOutput {
    pub avg_stability: f64,
    pub control_variance: f64,
    pub gain_modifier: f64,
    pub damping_factor: f64,
    /// Soft operator preferences, normalized to sum 1
    pub operator_weights: OperatorWeights,
}

impl MesoOutput {
    /// Aggregate a window of micro samples
    ///
    /// An empty window yields `avg_stability = 0.5` and
    /// `control_variance = 0.1`.
    pub fn aggregate(window: &[ControlSample]) -> Self {
        let (avg_stability, control_variance) = if window.is_empty() {
            (DEFAULT_AVG_STABILITY, DEFAULT_CONTROL_VARIANCE)
        } else {
            let n = window.len() as f64;
            let avg_stability = window.iter().map(|s| s.stability_index).sum::<f64>() / n;
            let mean_signal = window.iter().map(|s| s.signal).sum::<f64>() / n;
            let variance = window
                .iter()
                .map(|s| (s.signal - mean_signal).powi(2))
                .sum::<f64>()
                / n;
            (avg_stability, variance)
        };

        let gain_modifier = 1.0 + (0.5 - avg_stability) * 0.1;
        let damping_factor = 1.0 / (1.0 + control_variance);
        let operator_weights =
            operator_weights(avg_stability, control_variance, gain_modifier, damping_factor);

        Self {
            avg_stability,
            control_variance,
            gain_modifier,
            damping_factor,
            operator_weights,
        }
    }

    /// Sample recorded in the meso history for the macro tier
    pub fn sample(&self, timestamp: i64) -> ControlSample {
        ControlSample::with_stability(
            timestamp,
            LoopTier::Meso,
            self.gain_modifier * self.damping_factor,
            self.avg_stability,
        )
    }
}

fn operator_weights(
    avg_stability: f64,
    control_variance: f64,
    gain_modifier: f64,
    damping_factor: f64,
) -> OperatorWeights {
    let pick = |cond: bool, hi: f64, lo: f64| if cond { hi } else { lo };
    OperatorWeights {
        linear: pick(avg_stability > 0.7, 0.8, 0.2),
        circular: pick(control_variance < 0.1, 0.7, 0.3),
        rotating: pick(gain_modifier > 1.0, 0.6, 0.4),
        modular: pick(damping_factor > 0.9, 0.7, 0.3),
        iterative: pick((0.4..=0.7).contains(&avg_stability), 0.8, 0.2),
        inverted: pick(control_variance >= 0.1, 0.6, 0.4),
    }
    .normalized()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_window_defaults() {
        let out = MesoOutput::aggregate(&[]);
        assert_eq!(out.avg_stability, 0.5);
        assert_eq!(out.control_variance, 0.1);
        assert_eq!(out.gain_modifier, 1.0);
        assert!((out.damping_factor - 1.0 / 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_aggregates_window() {
        let window = [
            ControlSample::at(0, LoopTier::Micro, 1.0),
            ControlSample::at(1, LoopTier::Micro, 3.0),
        ];
        let out = MesoOutput::aggregate(&window);
        // stabilities 0.5 and 0.25
        assert!((out.avg_stability - 0.375).abs() < 1e-12);
        assert!((out.control_variance - 1.0).abs() < 1e-12);
        assert!((out.gain_modifier - 1.0125).abs() < 1e-12);
        assert!((out.damping_factor - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_weights_are_normalized_and_deterministic() {
        let window = [ControlSample::at(0, LoopTier::Micro, 0.1)];
        let a = MesoOutput::aggregate(&window);
        let b = MesoOutput::aggregate(&window);
        assert_eq!(a.operator_weights, b.operator_weights);
        assert!((a.operator_weights.sum() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_stable_window_prefers_linear() {
        let window: Vec<_> = (0..10)
            .map(|t| ControlSample::at(t, LoopTier::Micro, 0.05))
            .collect();
        let out = MesoOutput::aggregate(&window);
        assert!(out.avg_stability > 0.7);
        assert!(out.operator_weights.linear > out.operator_weights.iterative);
    }
}
