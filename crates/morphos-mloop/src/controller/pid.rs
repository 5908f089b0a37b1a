//! Micro tier: PID control of cpu usage

use morphos_common::{ControlSample, LoopTier};
use pid::Pid;

use crate::sensors::SensorReading;
use crate::PidGains;

/// Term limit passed to the `pid` crate; terms are effectively unbounded
const TERM_LIMIT: f64 = f64::MAX;

/// Terms of a single micro tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MicroTerms {
    pub p: f64,
    pub i: f64,
    pub d: f64,
    pub output: f64,
}

pub struct MicroController {
    pid: Pid<f64>,
    base: PidGains,
    gain_modifier: f64,
    damping_factor: f64,
}

impl MicroController {
    pub fn new(target_cpu: f64, gains: PidGains) -> Self {
        let mut pid = Pid::new(target_cpu, TERM_LIMIT);
        pid.p(gains.kp, TERM_LIMIT);
        pid.i(gains.ki, TERM_LIMIT);
        pid.d(gains.kd, TERM_LIMIT);

        Self {
            pid,
            base: gains,
            gain_modifier: 1.0,
            damping_factor: 1.0,
        }
    }

    pub fn target(&self) -> f64 {
        self.pid.setpoint
    }

    /// Gains currently in effect
    pub fn effective_gains(&self) -> PidGains {
        PidGains {
            kp: self.pid.kp,
            ki: self.pid.ki,
            kd: self.pid.kd,
        }
    }

    /// Scale the base gains for the next tick
    ///
    /// All gains scale with `gain_modifier`; the derivative gain is further
    /// damped by `damping_factor`.
    pub fn retune(&mut self, gain_modifier: f64, damping_factor: f64) {
        self.gain_modifier = gain_modifier;
        self.damping_factor = damping_factor;
        self.pid.p(self.base.kp * gain_modifier, TERM_LIMIT);
        self.pid.i(self.base.ki * gain_modifier, TERM_LIMIT);
        self.pid
            .d(self.base.kd * gain_modifier * damping_factor, TERM_LIMIT);
    }

    /// Run the PID on the current cpu reading
    ///
    /// `p = e·Kp`, `i` accumulates `e·Ki`, `d = (cpu - cpu_prev)·Kd`, with
    /// `e = target - cpu`.
    pub fn compute(&mut self, cpu_usage: f64) -> MicroTerms {
        let out = self.pid.next_control_output(cpu_usage);
        // The pid crate differentiates on measurement with a negative sign
        let d = -out.d;
        MicroTerms {
            p: out.p,
            i: out.i,
            d,
            output: out.p + out.i + d,
        }
    }

    /// One micro tick producing a control sample
    pub fn tick(&mut self, reading: &SensorReading) -> ControlSample {
        let terms = self.compute(reading.cpu_usage());
        ControlSample::new(LoopTier::Micro, terms.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gains() -> PidGains {
        PidGains {
            kp: 1.0,
            ki: 0.1,
            kd: 0.05,
        }
    }

    #[test]
    fn test_first_tick_has_no_derivative() {
        let mut micro = MicroController::new(70.0, gains());
        let terms = micro.compute(50.0);
        assert!((terms.p - 20.0).abs() < 1e-12);
        assert!((terms.i - 2.0).abs() < 1e-12);
        assert_eq!(terms.d, 0.0);
        assert!((terms.output - 22.0).abs() < 1e-12);
    }

    #[test]
    fn test_integral_accumulates_and_derivative_follows_cpu() {
        let mut micro = MicroController::new(70.0, gains());
        micro.compute(50.0);
        let terms = micro.compute(60.0);
        assert!((terms.p - 10.0).abs() < 1e-12);
        assert!((terms.i - 3.0).abs() < 1e-12);
        assert!((terms.d - 0.5).abs() < 1e-12);
        assert!((terms.output - 13.5).abs() < 1e-12);
    }

    #[test]
    fn test_retune_scales_gains() {
        let mut micro = MicroController::new(70.0, gains());
        micro.retune(1.1, 0.5);
        let g = micro.effective_gains();
        assert!((g.kp - 1.1).abs() < 1e-12);
        assert!((g.ki - 0.11).abs() < 1e-12);
        assert!((g.kd - 0.0275).abs() < 1e-12);
    }

    #[test]
    fn test_tick_uses_default_cpu_when_missing() {
        let mut micro = MicroController::new(70.0, gains());
        let sample = micro.tick(&SensorReading::default());
        assert_eq!(sample.tier, LoopTier::Micro);
        assert!((sample.signal - 22.0).abs() < 1e-12);
        assert!((sample.stability_index - 1.0 / 23.0).abs() < 1e-12);
    }
}
