//! Sampler backed by INA219 sensors and the Linux kernel interfaces.

use super::{CounterPair, CpuSensor, MemorySensor, NetworkCounters, Sampler, SensorError};
use crate::config::SensorConfig;
use solarmon_hw::{Ina219, Ina219Reading};
use std::fs;
use tracing::info;

/// One opened shunt channel.
struct Channel {
    name: String,
    sensor: Ina219,
}

/// Sampler for the real device.
pub struct HardwareSampler {
    channels: Vec<Channel>,
    cpu: CpuSensor,
    memory: MemorySensor,
    network: NetworkCounters,
    hostname: String,
}

impl HardwareSampler {
    /// Opens every configured shunt sensor.
    ///
    /// Fails if any sensor cannot be opened; the loop cannot run with a
    /// partial channel set.
    pub fn open(config: &SensorConfig) -> Result<Self, SensorError> {
        let channels = config
            .channels
            .iter()
            .map(|ch| -> Result<Channel, SensorError> {
                Ok(Channel {
                    name: ch.name.clone(),
                    sensor: Ina219::open(config.i2c_bus, ch.address, config.shunt_ohms)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let network = NetworkCounters::from_config(&config.interface);
        info!(
            "Hardware sampler ready: {} channels, interface {}",
            channels.len(),
            network.interface_name()
        );

        Ok(Self {
            channels,
            cpu: CpuSensor::new(),
            memory: MemorySensor,
            network,
            hostname: hostname(),
        })
    }
}

impl Sampler for HardwareSampler {
    fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|ch| ch.name.clone()).collect()
    }

    fn read_channel(&mut self, index: usize) -> Result<Ina219Reading, SensorError> {
        let channel = self
            .channels
            .get_mut(index)
            .ok_or(SensorError::NoChannel(index))?;
        Ok(channel.sensor.read()?)
    }

    fn read_cpu_ram(&mut self) -> Result<(f64, f64), SensorError> {
        let cpu = self.cpu.sample()?;
        let ram = self.memory.used_bytes()?;
        Ok((cpu, ram as f64))
    }

    fn read_network_counters(&mut self) -> Result<CounterPair, SensorError> {
        self.network.read()
    }

    fn machine_id(&self) -> String {
        self.hostname.clone()
    }
}

/// Returns the hostname of the system.
fn hostname() -> String {
    fs::read_to_string("/etc/hostname")
        .map(|s| s.trim().to_string())
        .or_else(|_| fs::read_to_string("/proc/sys/kernel/hostname").map(|s| s.trim().to_string()))
        .unwrap_or_else(|_| "Machine Undetected".to_string())
}
