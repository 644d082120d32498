//! CPU usage sensor.

use super::SensorError;
use std::fs;

const PROC_STAT: &str = "/proc/stat";

/// CPU usage sensor computing utilisation between consecutive samples.
pub struct CpuSensor {
    last_idle: u64,
    last_total: u64,
}

impl CpuSensor {
    /// Creates a new CPU sensor and takes the first reference sample.
    pub fn new() -> Self {
        let mut sensor = Self {
            last_idle: 0,
            last_total: 0,
        };
        if let Ok((idle, total)) = read_cpu_stats() {
            sensor.last_idle = idle;
            sensor.last_total = total;
        }
        sensor
    }

    /// Returns CPU usage in percent since the previous sample.
    pub fn sample(&mut self) -> Result<f64, SensorError> {
        let (idle, total) = read_cpu_stats()?;
        let idle_delta = idle.saturating_sub(self.last_idle);
        let total_delta = total.saturating_sub(self.last_total);
        self.last_idle = idle;
        self.last_total = total;

        if total_delta == 0 {
            return Ok(0.0);
        }
        Ok(100.0 * (1.0 - (idle_delta as f64 / total_delta as f64)))
    }
}

impl Default for CpuSensor {
    fn default() -> Self {
        Self::new()
    }
}

fn read_cpu_stats() -> Result<(u64, u64), SensorError> {
    let content = fs::read_to_string(PROC_STAT).map_err(|e| SensorError::io(PROC_STAT, e))?;
    parse_cpu_line(content.lines().next().unwrap_or_default())
        .ok_or_else(|| SensorError::Parse(PROC_STAT.to_string()))
}

/// Parses the aggregate `cpu` line into (idle, total) jiffies.
fn parse_cpu_line(line: &str) -> Option<(u64, u64)> {
    let parts: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|s| s.parse().ok())
        .collect();

    if parts.len() >= 4 {
        let idle = parts[3];
        let total: u64 = parts.iter().sum();
        Some((idle, total))
    } else {
        None
    }
}
