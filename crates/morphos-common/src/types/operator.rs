//! OperatorKind - the six state-transform operators
//!
//! The kind doubles as registry key and audit tag in operator logs.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Number of operator variants
pub const OPERATOR_COUNT: usize = 6;

/// Closed set of operators that transform platform state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Linear,
    Circular,
    Rotating,
    Modular,
    Iterative,
    Inverted,
}

impl OperatorKind {
    /// All operators in registry order (ordinal sharding uses this order)
    pub const ALL: [OperatorKind; OPERATOR_COUNT] = [
        OperatorKind::Linear,
        OperatorKind::Circular,
        OperatorKind::Rotating,
        OperatorKind::Modular,
        OperatorKind::Iterative,
        OperatorKind::Inverted,
    ];

    /// Position in registry order
    pub fn index(self) -> usize {
        match self {
            OperatorKind::Linear => 0,
            OperatorKind::Circular => 1,
            OperatorKind::Rotating => 2,
            OperatorKind::Modular => 3,
            OperatorKind::Iterative => 4,
            OperatorKind::Inverted => 5,
        }
    }

    /// Operator for a worker ordinal (`ordinal mod 6`)
    pub fn from_ordinal(ordinal: u64) -> Self {
        Self::ALL[(ordinal % OPERATOR_COUNT as u64) as usize]
    }

    /// Lowercase name, used for log file names
    pub fn as_str(self) -> &'static str {
        match self {
            OperatorKind::Linear => "linear",
            OperatorKind::Circular => "circular",
            OperatorKind::Rotating => "rotating",
            OperatorKind::Modular => "modular",
            OperatorKind::Iterative => "iterative",
            OperatorKind::Inverted => "inverted",
        }
    }
}

impl std::fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown operator: {s}"))
    }
}

/// Per-operator preference weights
///
/// Produced by the meso loop (soft bias) or supplied by configuration
/// (methodology weights). Never a hard selection on their own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OperatorWeights {
    pub linear: f64,
    pub circular: f64,
    pub rotating: f64,
    pub modular: f64,
    pub iterative: f64,
    pub inverted: f64,
}

impl Default for OperatorWeights {
    fn default() -> Self {
        Self::uniform()
    }
}

impl OperatorWeights {
    /// Equal weight for every operator
    pub fn uniform() -> Self {
        let w = 1.0 / OPERATOR_COUNT as f64;
        Self::from_array([w; OPERATOR_COUNT])
    }

    pub fn from_array(values: [f64; OPERATOR_COUNT]) -> Self {
        Self {
            linear: values[0],
            circular: values[1],
            rotating: values[2],
            modular: values[3],
            iterative: values[4],
            inverted: values[5],
        }
    }

    pub fn to_array(&self) -> [f64; OPERATOR_COUNT] {
        [
            self.linear,
            self.circular,
            self.rotating,
            self.modular,
            self.iterative,
            self.inverted,
        ]
    }

    pub fn get(&self, kind: OperatorKind) -> f64 {
        self.to_array()[kind.index()]
    }

    pub fn sum(&self) -> f64 {
        self.to_array().iter().sum()
    }

    /// Scale so the weights sum to 1.0; all-zero input becomes uniform
    pub fn normalized(&self) -> Self {
        let total = self.sum();
        if total <= f64::EPSILON || !total.is_finite() {
            return Self::uniform();
        }
        Self::from_array(self.to_array().map(|w| w / total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinal_wraps() {
        assert_eq!(OperatorKind::from_ordinal(0), OperatorKind::Linear);
        assert_eq!(OperatorKind::from_ordinal(5), OperatorKind::Inverted);
        assert_eq!(OperatorKind::from_ordinal(7), OperatorKind::Circular);
    }

    #[test]
    fn test_parse_and_display() {
        for kind in OperatorKind::ALL {
            assert_eq!(kind.to_string().parse::<OperatorKind>().unwrap(), kind);
        }
        assert!("sideways".parse::<OperatorKind>().is_err());
    }

    #[test]
    fn test_weights_normalize() {
        let weights = OperatorWeights::from_array([2.0, 2.0, 0.0, 0.0, 0.0, 0.0]).normalized();
        assert!((weights.linear - 0.5).abs() < 1e-12);
        assert!((weights.sum() - 1.0).abs() < 1e-12);

        let zero = OperatorWeights::from_array([0.0; OPERATOR_COUNT]).normalized();
        assert_eq!(zero, OperatorWeights::uniform());
    }
}
