//! Frequency-based tick scheduling for inline controller steps

use std::time::{Duration, Instant};

/// Decides whether a tier running at `hz` is due
#[derive(Debug, Clone)]
pub struct Cadence {
    period: Duration,
    last: Option<Instant>,
}

impl Cadence {
    pub fn from_hz(hz: f64) -> Self {
        Self {
            period: period_for(hz),
            last: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// True (and marks the tick) when a full period has elapsed; the first
    /// call is always due
    pub fn due(&mut self, now: Instant) -> bool {
        let ready = match self.last {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.period,
        };
        if ready {
            self.last = Some(now);
        }
        ready
    }
}

/// Tick period for a frequency; non-positive frequencies tick once a day
pub fn period_for(hz: f64) -> Duration {
    if hz.is_finite() && hz > 0.0 {
        Duration::from_secs_f64(1.0 / hz)
    } else {
        Duration::from_secs(86_400)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_due() {
        let mut cadence = Cadence::from_hz(1.0);
        assert!(cadence.due(Instant::now()));
    }

    #[test]
    fn test_waits_for_period() {
        let mut cadence = Cadence::from_hz(1.0);
        let start = Instant::now();
        assert!(cadence.due(start));
        assert!(!cadence.due(start + Duration::from_millis(500)));
        assert!(cadence.due(start + Duration::from_millis(1000)));
    }

    #[test]
    fn test_period_for_frequencies() {
        assert_eq!(period_for(1000.0), Duration::from_millis(1));
        assert_eq!(period_for(1.0 / 60.0), Duration::from_secs(60));
        assert_eq!(period_for(0.0), Duration::from_secs(86_400));
    }
}
