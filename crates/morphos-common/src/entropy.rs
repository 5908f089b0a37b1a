//! Entropy sources
//!
//! Entropy is a bounded value in `[0, 1)` drawn on demand. Sources may fail;
//! [`EntropyPool`] turns failures into a deterministic fallback so callers
//! never have to.

use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};
use tracing::warn;

use crate::error::EntropyError;

/// Supplier of bounded random values in `[0, 1)`
pub trait EntropySource: Send {
    fn sample(&mut self) -> Result<f64, EntropyError>;
}

/// Reproducible source backed by a seeded `StdRng`
pub struct SeededEntropy {
    rng: StdRng,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl EntropySource for SeededEntropy {
    fn sample(&mut self) -> Result<f64, EntropyError> {
        Ok(self.rng.gen::<f64>())
    }
}

/// Operating-system randomness
#[derive(Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn sample(&mut self) -> Result<f64, EntropyError> {
        let mut buf = [0u8; 8];
        OsRng
            .try_fill_bytes(&mut buf)
            .map_err(|e| EntropyError::Unavailable(e.to_string()))?;
        // 53 high bits give a uniform double in [0, 1)
        let bits = u64::from_le_bytes(buf) >> 11;
        Ok(bits as f64 * (1.0 / (1u64 << 53) as f64))
    }
}

/// Frozen value, for tests and replay
#[derive(Debug, Clone, Copy)]
pub struct FixedEntropy(pub f64);

impl EntropySource for FixedEntropy {
    fn sample(&mut self) -> Result<f64, EntropyError> {
        Ok(self.0)
    }
}

/// Source that always fails
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableEntropy;

impl EntropySource for UnavailableEntropy {
    fn sample(&mut self) -> Result<f64, EntropyError> {
        Err(EntropyError::Unavailable("no entropy configured".into()))
    }
}

/// Infallible wrapper around an entropy source
///
/// Buffers up to `pool_size` samples ahead, clamps values into `[0, 1)` and
/// substitutes `fallback` whenever the source fails.
pub struct EntropyPool {
    source: Box<dyn EntropySource>,
    buffer: Vec<f64>,
    pool_size: usize,
    fallback: f64,
    consumed: f64,
    draws: u64,
    fallbacks: u64,
}

impl EntropyPool {
    pub fn new(source: Box<dyn EntropySource>, pool_size: usize, fallback: f64) -> Self {
        Self {
            source,
            buffer: Vec::with_capacity(pool_size),
            pool_size: pool_size.max(1),
            fallback: clamp_unit(fallback),
            consumed: 0.0,
            draws: 0,
            fallbacks: 0,
        }
    }

    /// Pool with a single-sample buffer and a zero fallback
    pub fn unbuffered(source: Box<dyn EntropySource>) -> Self {
        Self::new(source, 1, 0.0)
    }

    /// Draw one value; never fails
    pub fn draw(&mut self) -> f64 {
        if self.buffer.is_empty() {
            self.refill();
        }
        let value = match self.buffer.pop() {
            Some(v) => v,
            None => {
                self.fallbacks += 1;
                self.fallback
            }
        };
        self.consumed += value;
        self.draws += 1;
        value
    }

    fn refill(&mut self) {
        for _ in 0..self.pool_size {
            match self.source.sample() {
                Ok(v) if v.is_finite() => self.buffer.push(clamp_unit(v)),
                Ok(v) => {
                    warn!(value = v, "Discarding non-finite entropy sample");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, fallback = self.fallback, "Entropy source unavailable");
                    break;
                }
            }
        }
        // Pop from the back while preserving draw order
        self.buffer.reverse();
    }

    /// Sum of every value handed out
    pub fn consumed(&self) -> f64 {
        self.consumed
    }

    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// How many draws were served by the fallback value
    pub fn fallbacks(&self) -> u64 {
        self.fallbacks
    }

    /// Fraction of the buffer currently filled
    pub fn fill_ratio(&self) -> f64 {
        self.buffer.len() as f64 / self.pool_size as f64
    }
}

impl EntropySource for EntropyPool {
    fn sample(&mut self) -> Result<f64, EntropyError> {
        Ok(self.draw())
    }
}

/// Clamp into `[0, 1)`
pub fn clamp_unit(value: f64) -> f64 {
    if !value.is_finite() || value < 0.0 {
        0.0
    } else if value >= 1.0 {
        1.0 - f64::EPSILON
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_is_reproducible() {
        let mut a = SeededEntropy::new(42);
        let mut b = SeededEntropy::new(42);
        for _ in 0..16 {
            assert_eq!(a.sample().unwrap(), b.sample().unwrap());
        }
    }

    #[test]
    fn test_pool_preserves_source_order() {
        let mut direct = SeededEntropy::new(7);
        let mut pool = EntropyPool::new(Box::new(SeededEntropy::new(7)), 4, 0.0);
        for _ in 0..10 {
            assert_eq!(pool.draw(), direct.sample().unwrap());
        }
        assert_eq!(pool.draws(), 10);
    }

    #[test]
    fn test_pool_falls_back_when_unavailable() {
        let mut pool = EntropyPool::new(Box::new(UnavailableEntropy), 8, 0.0);
        assert_eq!(pool.draw(), 0.0);
        assert_eq!(pool.draw(), 0.0);
        assert_eq!(pool.fallbacks(), 2);
    }

    #[test]
    fn test_pool_clamps_out_of_range() {
        let mut pool = EntropyPool::unbuffered(Box::new(FixedEntropy(1.5)));
        let v = pool.draw();
        assert!((0.0..1.0).contains(&v));

        let mut pool = EntropyPool::unbuffered(Box::new(FixedEntropy(-0.2)));
        assert_eq!(pool.draw(), 0.0);
    }

    #[test]
    fn test_consumed_accumulates() {
        let mut pool = EntropyPool::unbuffered(Box::new(FixedEntropy(0.25)));
        pool.draw();
        pool.draw();
        assert!((pool.consumed() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_os_entropy_in_range() {
        let mut os = OsEntropy;
        if let Ok(v) = os.sample() {
            assert!((0.0..1.0).contains(&v));
        }
    }
}
