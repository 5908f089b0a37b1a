//! Sweet-spot finder
//!
//! Runs the simplex in normalized coordinates (`x / scale`), so every
//! dimension of the search space spans roughly `[0, 1)` and the stability
//! radius is comparable across spaces of different extents.

use std::sync::atomic::{AtomicBool, Ordering};

use morphos_common::{
    EntropySource, HesaError, SweetSpot, MIN_STABILITY_RADIUS, MIN_SWEET_SPOT_VALUE,
};
use tracing::{debug, instrument, warn};

use crate::simplex::{distance, Simplex};
use crate::SimplexConfig;

/// A simplex smaller than this cannot make further progress
const COLLAPSE_EPS: f64 = 1e-12;

/// Objective in normalized coordinates: `1 / (1 + ‖u - θ‖)`
pub fn objective(normalized: &[f64], entropy_threshold: f64) -> f64 {
    let deviation = normalized
        .iter()
        .map(|u| (u - entropy_threshold).powi(2))
        .sum::<f64>()
        .sqrt();
    1.0 / (1.0 + deviation)
}

/// Derivative-free sweet-spot search
#[derive(Debug, Clone, Default)]
pub struct SweetSpotFinder {
    config: SimplexConfig,
}

impl SweetSpotFinder {
    pub fn new(config: SimplexConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimplexConfig {
        &self.config
    }

    /// Search `search_space` (per-dimension extents) for the point closest to
    /// `entropy_threshold`
    pub fn find(
        &self,
        search_space: &[f64],
        entropy_threshold: f64,
        entropy: &mut dyn EntropySource,
    ) -> Result<SweetSpot, HesaError> {
        self.find_with_cancel(search_space, entropy_threshold, entropy, &AtomicBool::new(false))
    }

    /// As [`find`](Self::find), checking `cancel` before every iteration
    ///
    /// A cancelled search drops its simplex and returns
    /// [`HesaError::Cancelled`].
    #[instrument(skip(self, entropy, cancel), fields(dimension = search_space.len()))]
    pub fn find_with_cancel(
        &self,
        search_space: &[f64],
        entropy_threshold: f64,
        entropy: &mut dyn EntropySource,
        cancel: &AtomicBool,
    ) -> Result<SweetSpot, HesaError> {
        if search_space.is_empty() {
            return Err(HesaError::EmptySearchSpace);
        }
        let scales: Vec<f64> = search_space
            .iter()
            .map(|&s| if s.is_finite() && s > 0.0 { s } else { 1.0 })
            .collect();
        let threshold = if entropy_threshold.is_finite() {
            entropy_threshold
        } else {
            0.0
        };
        let f = |u: &[f64]| objective(u, threshold);

        let vertices = self.initial_vertices(scales.len(), entropy);
        let mut simplex = Simplex::from_vertices(vertices, &f);

        let mut iterations = 0u32;
        let mut converged = false;
        loop {
            if cancel.load(Ordering::Relaxed) {
                debug!(iterations, "Sweet-spot search cancelled");
                return Err(HesaError::Cancelled { iterations });
            }
            // f is symmetric around the threshold, so a flat spread alone can
            // hold on a wide simplex straddling it
            let tolerance = self.config.convergence_threshold;
            if (simplex.spread() < tolerance && simplex.diameter() < tolerance)
                || simplex.diameter() < COLLAPSE_EPS
            {
                converged = true;
                break;
            }
            if iterations >= self.config.max_iterations {
                break;
            }
            simplex.step(&f, &self.config);
            iterations += 1;
        }

        let best = simplex.best();
        let position = best
            .coordinates
            .iter()
            .zip(&scales)
            .map(|(u, s)| u * s)
            .collect();
        let value = best.objective_value;
        let stability_radius = simplex.stability_radius();
        let valid = stability_radius > MIN_STABILITY_RADIUS && value > MIN_SWEET_SPOT_VALUE;

        debug!(
            iterations,
            converged,
            value,
            stability_radius,
            valid,
            "Sweet-spot search finished"
        );

        Ok(SweetSpot {
            position,
            value,
            entropy_level: threshold,
            stability_radius,
            valid,
            iterations,
            converged,
            discovered_at: chrono::Utc::now(),
        })
    }

    /// N+1 random vertices in `[0, 1)^N`
    ///
    /// A vertex closer than `initial_step` to an earlier one is moved to
    /// `x0 + k·step` along its own axis, so the starting simplex is never
    /// already inside the convergence tolerance.
    fn initial_vertices(&self, n: usize, entropy: &mut dyn EntropySource) -> Vec<Vec<f64>> {
        let mut failed = false;
        let mut draw = || match entropy.sample() {
            Ok(v) if v.is_finite() => v,
            Ok(_) | Err(_) => {
                failed = true;
                0.0
            }
        };

        let mut vertices: Vec<Vec<f64>> = (0..=n)
            .map(|_| (0..n).map(|_| draw()).collect())
            .collect();
        if failed {
            warn!("Entropy unavailable during simplex initialization, using fallback");
        }

        let step = if self.config.initial_step > 0.0 {
            self.config.initial_step
        } else {
            0.05
        };
        for i in 1..vertices.len() {
            let mut k = 1.0;
            while vertices[..i]
                .iter()
                .any(|v| distance(v, &vertices[i]) < step)
            {
                let mut moved = vertices[0].clone();
                moved[(i - 1) % n] += step * k;
                vertices[i] = moved;
                k += 1.0;
            }
        }
        vertices
    }
}
