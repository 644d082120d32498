//! Cumulative network byte counters.

use super::data::CounterPair;
use super::SensorError;
use std::fs;
use tracing::info;

/// Reads the byte counters of one interface from sysfs.
pub struct NetworkCounters {
    interface: String,
}

impl NetworkCounters {
    /// Creates counters for a specific interface.
    pub fn new(interface: &str) -> Self {
        Self {
            interface: interface.to_string(),
        }
    }

    /// Creates counters for the auto-detected interface.
    /// Tries the default route interface, falls back to the first real interface.
    pub fn auto() -> Self {
        let interface = Self::detect_interface().unwrap_or_else(|| "eth0".to_string());
        info!("Network counters using interface: {}", interface);
        Self::new(&interface)
    }

    /// Creates counters from a configured name, where "auto" means detect.
    pub fn from_config(interface: &str) -> Self {
        if interface == "auto" {
            Self::auto()
        } else {
            Self::new(interface)
        }
    }

    /// Detects the primary network interface.
    pub fn detect_interface() -> Option<String> {
        if let Ok(content) = fs::read_to_string("/proc/net/route") {
            if let Some(iface) = default_route_interface(&content) {
                return Some(iface);
            }
        }

        let mut names: Vec<String> = fs::read_dir("/sys/class/net")
            .ok()?
            .flatten()
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .filter(|name| !(name == "lo" || name.starts_with("veth") || name.starts_with("docker")))
            .filter(|name| {
                fs::metadata(format!("/sys/class/net/{}/statistics/rx_bytes", name)).is_ok()
            })
            .collect();
        names.sort();
        names.into_iter().next()
    }

    fn read_counter(&self, name: &str) -> Result<u64, SensorError> {
        let path = format!("/sys/class/net/{}/statistics/{}", self.interface, name);
        let content = fs::read_to_string(&path).map_err(|e| SensorError::io(&path, e))?;
        content
            .trim()
            .parse()
            .map_err(|_| SensorError::Parse(path))
    }

    /// Reads the cumulative (received, sent) byte counters.
    pub fn read(&self) -> Result<CounterPair, SensorError> {
        Ok(CounterPair {
            received: self.read_counter("rx_bytes")?,
            sent: self.read_counter("tx_bytes")?,
        })
    }

    /// Returns the interface name.
    pub fn interface_name(&self) -> &str {
        &self.interface
    }
}

/// Finds the interface carrying the default route (destination 00000000).
fn default_route_interface(route_table: &str) -> Option<String> {
    route_table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [iface, "00000000", ..] => Some(iface.to_string()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_route_interface() {
        let table = "Iface\tDestination\tGateway\tFlags\n\
                     wlan0\t0001A8C0\t00000000\t0001\n\
                     eth0\t00000000\t0101A8C0\t0003\n";
        assert_eq!(default_route_interface(table), Some("eth0".to_string()));
        assert_eq!(default_route_interface("Iface\tDestination\n"), None);
    }

    #[test]
    fn test_missing_interface() {
        let counters = NetworkCounters::new("does-not-exist0");
        assert!(counters.read().is_err());
    }
}
