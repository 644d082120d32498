//! Memory usage sensor.

use super::SensorError;
use std::fs;

const PROC_MEMINFO: &str = "/proc/meminfo";

/// Reports RAM in use as `MemTotal - MemAvailable`.
pub struct MemorySensor;

impl MemorySensor {
    /// Returns RAM in use, in bytes.
    pub fn used_bytes(&self) -> Result<u64, SensorError> {
        let content =
            fs::read_to_string(PROC_MEMINFO).map_err(|e| SensorError::io(PROC_MEMINFO, e))?;
        parse_used_bytes(&content).ok_or_else(|| SensorError::Parse(PROC_MEMINFO.to_string()))
    }
}

fn field_kb(content: &str, key: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with(key))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse().ok())
}

fn parse_used_bytes(content: &str) -> Option<u64> {
    let total = field_kb(content, "MemTotal:")?;
    let available = field_kb(content, "MemAvailable:")?;
    Some(total.saturating_sub(available) * 1024)
}
