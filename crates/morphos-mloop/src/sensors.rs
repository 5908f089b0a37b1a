//! Instantaneous sensor readings for the micro loop
//!
//! Missing readings resolve to fixed defaults; a tier never fails because a
//! sensor is unavailable.

use std::fs;

use morphos_common::DEFAULT_CPU_USAGE;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default free memory (percent)
pub const DEFAULT_MEMORY_FREE: f64 = 50.0;

/// Default entropy rate
pub const DEFAULT_ENTROPY_RATE: f64 = 0.5;

/// Raw reading; `None` means the sensor was unavailable
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub cpu_usage: Option<f64>,
    pub memory_free: Option<f64>,
    pub entropy_rate: Option<f64>,
}

impl SensorReading {
    pub fn cpu_usage(&self) -> f64 {
        finite_or(self.cpu_usage, DEFAULT_CPU_USAGE)
    }

    pub fn memory_free(&self) -> f64 {
        finite_or(self.memory_free, DEFAULT_MEMORY_FREE)
    }

    pub fn entropy_rate(&self) -> f64 {
        finite_or(self.entropy_rate, DEFAULT_ENTROPY_RATE)
    }
}

fn finite_or(value: Option<f64>, default: f64) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(default)
}

/// Source of sensor readings
pub trait SensorSource: Send + Sync {
    fn read(&self) -> SensorReading;
}

/// Fixed readings, for tests and hosts without `/proc`
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSensors(pub SensorReading);

impl SensorSource for StaticSensors {
    fn read(&self) -> SensorReading {
        self.0
    }
}

/// Linux `/proc` sensors
///
/// Cpu usage is the busy share of jiffies since the previous read, so the
/// first read after construction reports the share since boot.
pub struct ProcSensors {
    previous: Mutex<Option<CpuTimes>>,
}

#[derive(Debug, Clone, Copy)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

impl Default for ProcSensors {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcSensors {
    pub fn new() -> Self {
        Self {
            previous: Mutex::new(None),
        }
    }

    fn cpu_usage(&self) -> Option<f64> {
        let raw = fs::read_to_string("/proc/stat").ok()?;
        let current = parse_cpu_times(&raw)?;
        let mut previous = self.previous.lock();
        let (busy, total) = match *previous {
            Some(prev) if current.total > prev.total => (
                current.busy.saturating_sub(prev.busy),
                current.total - prev.total,
            ),
            _ => (current.busy, current.total),
        };
        *previous = Some(current);
        (total > 0).then(|| busy as f64 / total as f64 * 100.0)
    }

    fn memory_free(&self) -> Option<f64> {
        let raw = fs::read_to_string("/proc/meminfo").ok()?;
        parse_memory_free(&raw)
    }

    fn entropy_rate(&self) -> Option<f64> {
        let raw = fs::read_to_string("/proc/sys/kernel/random/entropy_avail").ok()?;
        let avail: f64 = raw.trim().parse().ok()?;
        // Kernel pool is 256 bits on current kernels
        Some((avail / 256.0).clamp(0.0, 1.0))
    }
}

impl SensorSource for ProcSensors {
    fn read(&self) -> SensorReading {
        let reading = SensorReading {
            cpu_usage: self.cpu_usage(),
            memory_free: self.memory_free(),
            entropy_rate: self.entropy_rate(),
        };
        debug!(?reading, "Sensor read");
        reading
    }
}

fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        busy: total.saturating_sub(idle),
        total,
    })
}

fn parse_memory_free(meminfo: &str) -> Option<f64> {
    let field = |name: &str| -> Option<f64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(name))
            .and_then(|l| l.split_whitespace().nth(1))
            .and_then(|v| v.parse().ok())
    };
    let total = field("MemTotal:")?;
    let available = field("MemAvailable:").or_else(|| field("MemFree:"))?;
    (total > 0.0).then(|| available / total * 100.0)
}
