//! Nelder-Mead working simplex (maximization)
//!
//! Vertices are kept sorted ascending by objective value: index 0 is the
//! worst vertex, the last index the best.

use morphos_common::SimplexPoint;

use crate::SimplexConfig;

/// Move performed by one iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Reflect,
    Expand,
    ContractOutside,
    ContractInside,
    Shrink,
}

/// N+1 vertices in an N-dimensional space
#[derive(Debug, Clone, PartialEq)]
pub struct Simplex {
    points: Vec<SimplexPoint>,
}

impl Simplex {
    /// Evaluate `objective` at each vertex and sort
    pub fn from_vertices<F>(vertices: Vec<Vec<f64>>, objective: &F) -> Self
    where
        F: Fn(&[f64]) -> f64,
    {
        let points = vertices
            .into_iter()
            .map(|v| {
                let value = objective(&v);
                SimplexPoint::new(v, value)
            })
            .collect();
        let mut simplex = Self { points };
        simplex.sort();
        simplex
    }

    pub fn points(&self) -> &[SimplexPoint] {
        &self.points
    }

    pub fn dimension(&self) -> usize {
        self.points.first().map(|p| p.dimension()).unwrap_or(0)
    }

    pub fn worst(&self) -> &SimplexPoint {
        &self.points[0]
    }

    pub fn best(&self) -> &SimplexPoint {
        &self.points[self.points.len() - 1]
    }

    /// Difference between the best and worst objective values
    pub fn spread(&self) -> f64 {
        self.best().objective_value - self.worst().objective_value
    }

    /// Smallest distance from the best vertex to any other vertex
    pub fn stability_radius(&self) -> f64 {
        let best = &self.best().coordinates;
        self.points[..self.points.len() - 1]
            .iter()
            .map(|p| distance(&p.coordinates, best))
            .fold(f64::INFINITY, f64::min)
    }

    /// Largest pairwise vertex distance
    pub fn diameter(&self) -> f64 {
        let mut max: f64 = 0.0;
        for (i, a) in self.points.iter().enumerate() {
            for b in &self.points[i + 1..] {
                max = max.max(distance(&a.coordinates, &b.coordinates));
            }
        }
        max
    }

    fn sort(&mut self) {
        self.points
            .sort_by(|a, b| a.objective_value.total_cmp(&b.objective_value));
    }

    /// Centroid of every vertex except the worst
    fn centroid(&self) -> Vec<f64> {
        let n = self.dimension();
        let others = &self.points[1..];
        let mut c = vec![0.0; n];
        for p in others {
            for (ci, xi) in c.iter_mut().zip(&p.coordinates) {
                *ci += xi;
            }
        }
        let k = others.len() as f64;
        c.iter_mut().for_each(|ci| *ci /= k);
        c
    }

    /// One Nelder-Mead iteration; leaves the simplex sorted
    pub fn step<F>(&mut self, objective: &F, config: &SimplexConfig) -> StepKind
    where
        F: Fn(&[f64]) -> f64,
    {
        let centroid = self.centroid();
        let worst = self.worst().clone();
        let best_value = self.best().objective_value;
        let second_worst_value = self.points[1].objective_value;

        let reflected = along(&centroid, &worst.coordinates, -config.reflection);
        let reflected_value = objective(&reflected);

        let kind = if reflected_value > best_value {
            let expanded = along(&centroid, &reflected, config.expansion);
            let expanded_value = objective(&expanded);
            if expanded_value > reflected_value {
                self.points[0] = SimplexPoint::new(expanded, expanded_value);
                StepKind::Expand
            } else {
                self.points[0] = SimplexPoint::new(reflected, reflected_value);
                StepKind::Reflect
            }
        } else if reflected_value > second_worst_value {
            self.points[0] = SimplexPoint::new(reflected, reflected_value);
            StepKind::Reflect
        } else if reflected_value > worst.objective_value {
            let contracted = along(&centroid, &reflected, config.contraction);
            let contracted_value = objective(&contracted);
            if contracted_value >= reflected_value {
                self.points[0] = SimplexPoint::new(contracted, contracted_value);
                StepKind::ContractOutside
            } else {
                self.shrink(objective, config.shrink);
                StepKind::Shrink
            }
        } else {
            let contracted = along(&centroid, &worst.coordinates, config.contraction);
            let contracted_value = objective(&contracted);
            if contracted_value > worst.objective_value {
                self.points[0] = SimplexPoint::new(contracted, contracted_value);
                StepKind::ContractInside
            } else {
                self.shrink(objective, config.shrink);
                StepKind::Shrink
            }
        };

        self.sort();
        kind
    }

    /// Pull every vertex toward the best one
    fn shrink<F>(&mut self, objective: &F, sigma: f64)
    where
        F: Fn(&[f64]) -> f64,
    {
        let last = self.points.len() - 1;
        let best = self.points[last].coordinates.clone();
        for p in &mut self.points[..last] {
            let coords = along(&best, &p.coordinates, sigma);
            let value = objective(&coords);
            *p = SimplexPoint::new(coords, value);
        }
    }
}

/// `origin + t·(target - origin)`
fn along(origin: &[f64], target: &[f64], t: f64) -> Vec<f64> {
    origin
        .iter()
        .zip(target)
        .map(|(o, x)| o + t * (x - o))
        .collect()
}

pub fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(x: &[f64]) -> f64 {
        1.0 / (1.0 + distance(x, &[0.5, 0.5]))
    }

    fn triangle() -> Simplex {
        Simplex::from_vertices(vec![vec![0.0, 0.0], vec![0.2, 0.0], vec![0.0, 0.2]], &peak)
    }

    #[test]
    fn test_sorted_worst_first() {
        let simplex = triangle();
        assert_eq!(simplex.worst().coordinates, vec![0.0, 0.0]);
        assert!(simplex.best().objective_value >= simplex.points()[1].objective_value);
    }

    #[test]
    fn test_reflection_moves_toward_peak() {
        let mut simplex = triangle();
        let before = simplex.best().objective_value;
        let kind = simplex.step(&peak, &SimplexConfig::default());
        assert!(matches!(kind, StepKind::Expand | StepKind::Reflect));
        assert!(simplex.best().objective_value > before);
    }

    #[test]
    fn test_best_never_gets_worse() {
        let mut simplex = triangle();
        let config = SimplexConfig::default();
        let mut best = simplex.best().objective_value;
        for _ in 0..50 {
            simplex.step(&peak, &config);
            assert!(simplex.best().objective_value >= best);
            best = simplex.best().objective_value;
        }
        assert!(best > 0.9);
    }

    #[test]
    fn test_stability_radius_and_diameter() {
        let simplex = Simplex::from_vertices(
            vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![0.5, 0.5]],
            &peak,
        );
        // best is (0.5, 0.5)
        assert!((simplex.stability_radius() - 0.5f64.hypot(0.5)).abs() < 1e-12);
        assert!((simplex.diameter() - 5.0).abs() < 1e-12);
    }
}
