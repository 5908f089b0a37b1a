//! Sweet-spot search inputs and outputs derived from platform state

use morphos_common::{PlatformState, SweetSpot};

/// Per-dimension extents searched for the current state
///
/// Two unit axes plus one scaled to linear progress, so the space grows as
/// the platform advances.
pub fn search_space(state: &PlatformState) -> Vec<f64> {
    vec![1.0, 1.0, state.linear_progress.max(1.0)]
}

/// Entropy threshold the search aims for
pub fn entropy_threshold(state: &PlatformState) -> f64 {
    state.last_entropy
}

/// Distance of `spot` from its threshold, normalized to `[0, 1]`
pub fn sweet_spot_distance(spot: &SweetSpot, search_space: &[f64]) -> f64 {
    if spot.position.is_empty() {
        return 1.0;
    }
    let n = spot.position.len() as f64;
    let sq: f64 = spot
        .position
        .iter()
        .zip(search_space)
        .map(|(x, scale)| {
            let scale = if *scale > 0.0 && scale.is_finite() { *scale } else { 1.0 };
            (x / scale - spot.entropy_level).powi(2)
        })
        .sum();
    let d = sq.sqrt() / n.sqrt();
    if d.is_finite() {
        d.clamp(0.0, 1.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn spot(position: Vec<f64>, entropy_level: f64) -> SweetSpot {
        SweetSpot {
            position,
            value: 0.9,
            entropy_level,
            stability_radius: 0.0,
            valid: false,
            iterations: 1,
            converged: true,
            discovered_at: Utc::now(),
        }
    }

    #[test]
    fn test_space_tracks_linear_progress() {
        let mut state = PlatformState::default();
        assert_eq!(search_space(&state), vec![1.0, 1.0, 1.0]);
        state.linear_progress = 4.5;
        assert_eq!(search_space(&state), vec![1.0, 1.0, 4.5]);
    }

    #[test]
    fn test_distance_is_normalized() {
        let space = [1.0, 1.0, 4.0];
        assert_eq!(sweet_spot_distance(&spot(vec![0.5, 0.5, 2.0], 0.5), &space), 0.0);

        let far = sweet_spot_distance(&spot(vec![1.0, 1.0, 4.0], 0.0), &space);
        assert!((far - 1.0).abs() < 1e-12);

        let mid = sweet_spot_distance(&spot(vec![0.5, 0.5, 2.0], 0.0), &space);
        assert!((mid - 0.5).abs() < 1e-12);
    }
}
