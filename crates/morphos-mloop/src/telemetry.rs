//! Prometheus gauges for the controller tiers

use prometheus::{Gauge, IntCounterVec, IntGauge, Opts, Registry};

use morphos_common::StrategicMode;

use crate::controller::{MacroDirective, MesoOutput};

/// Controller metrics registered on a caller-supplied registry
#[derive(Clone)]
pub struct ControllerMetrics {
    micro_signal: Gauge,
    micro_stability: Gauge,
    meso_gain_modifier: Gauge,
    meso_damping_factor: Gauge,
    meso_avg_stability: Gauge,
    macro_mode: IntGauge,
    macro_growth_rate: Gauge,
    ticks: IntCounterVec,
}

impl ControllerMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            micro_signal: Gauge::new("morphos_micro_signal", "Latest micro control output")?,
            micro_stability: Gauge::new(
                "morphos_micro_stability",
                "Stability index of the latest micro output",
            )?,
            meso_gain_modifier: Gauge::new(
                "morphos_meso_gain_modifier",
                "Gain modifier applied to micro gains",
            )?,
            meso_damping_factor: Gauge::new(
                "morphos_meso_damping_factor",
                "Damping factor applied to the micro derivative gain",
            )?,
            meso_avg_stability: Gauge::new(
                "morphos_meso_avg_stability",
                "Mean micro stability over the meso window",
            )?,
            macro_mode: IntGauge::new(
                "morphos_macro_mode",
                "Strategic mode (0 exploration, 1 exploitation, 2 balanced)",
            )?,
            macro_growth_rate: Gauge::new(
                "morphos_macro_growth_rate",
                "Knowledge growth rate per experiment",
            )?,
            ticks: IntCounterVec::new(
                Opts::new("morphos_loop_ticks_total", "Controller ticks by tier"),
                &["tier"],
            )?,
        };

        registry.register(Box::new(metrics.micro_signal.clone()))?;
        registry.register(Box::new(metrics.micro_stability.clone()))?;
        registry.register(Box::new(metrics.meso_gain_modifier.clone()))?;
        registry.register(Box::new(metrics.meso_damping_factor.clone()))?;
        registry.register(Box::new(metrics.meso_avg_stability.clone()))?;
        registry.register(Box::new(metrics.macro_mode.clone()))?;
        registry.register(Box::new(metrics.macro_growth_rate.clone()))?;
        registry.register(Box::new(metrics.ticks.clone()))?;

        Ok(metrics)
    }

    pub fn record_micro(&self, signal: f64, stability: f64) {
        self.micro_signal.set(signal);
        self.micro_stability.set(stability);
        self.ticks.with_label_values(&["micro"]).inc();
    }

    pub fn record_meso(&self, out: &MesoOutput) {
        self.meso_gain_modifier.set(out.gain_modifier);
        self.meso_damping_factor.set(out.damping_factor);
        self.meso_avg_stability.set(out.avg_stability);
        self.ticks.with_label_values(&["meso"]).inc();
    }

    pub fn record_macro(&self, directive: &MacroDirective) {
        let mode = match directive.mode {
            StrategicMode::Exploration => 0,
            StrategicMode::Exploitation => 1,
            StrategicMode::Balanced => 2,
        };
        self.macro_mode.set(mode);
        self.macro_growth_rate.set(directive.knowledge_growth_rate);
        self.ticks.with_label_values(&["macro"]).inc();
    }
}
