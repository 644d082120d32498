//! Deterministic sampler for hosts without sensors.
//!
//! Every value follows a sinusoid of an internal step counter, so plots of
//! uploaded data show a recognisable shape that makes pipeline faults easy
//! to spot.

use super::{CounterPair, Sampler, SensorError};
use solarmon_hw::Ina219Reading;

const CHANNELS: [&str; 4] = ["blue_house", "red_house", "green_house", "bus"];

/// Phase advance per read.
const STEP: f64 = 0.1;

/// Sampler producing synthetic readings.
pub struct SyntheticSampler {
    step: u64,
    counters: CounterPair,
    last_counters: Option<CounterPair>,
}

impl SyntheticSampler {
    pub fn new() -> Self {
        Self {
            step: 0,
            counters: CounterPair::new(1_000_000, 250_000),
            last_counters: None,
        }
    }

    /// The most recent counter pair handed out.
    pub fn last_counters(&self) -> Option<CounterPair> {
        self.last_counters
    }

    fn phase(&mut self) -> f64 {
        self.step += 1;
        self.step as f64 * STEP
    }
}

impl Default for SyntheticSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for SyntheticSampler {
    fn channel_names(&self) -> Vec<String> {
        CHANNELS.iter().map(|name| name.to_string()).collect()
    }

    fn read_channel(&mut self, index: usize) -> Result<Ina219Reading, SensorError> {
        if index >= CHANNELS.len() {
            return Err(SensorError::NoChannel(index));
        }
        let amplitude = (index + 1) as f64;
        let phase = self.phase();
        Ok(Ina219Reading {
            shunt_millivolts: 10.0 * amplitude * phase.cos(),
            bus_volts: 5.0 + amplitude * phase.sin(),
        })
    }

    fn read_cpu_ram(&mut self) -> Result<(f64, f64), SensorError> {
        let phase = self.phase();
        Ok((100.0 * phase.sin().abs(), 1000.0 * phase.cos().abs()))
    }

    fn read_network_counters(&mut self) -> Result<CounterPair, SensorError> {
        let phase = self.phase();
        self.counters.received += 10_000 + (5_000.0 * phase.cos().abs()) as u64;
        self.counters.sent += 1_000 + (500.0 * phase.sin().abs()) as u64;
        self.last_counters = Some(self.counters);
        Ok(self.counters)
    }

    fn machine_id(&self) -> String {
        "synthetic".to_string()
    }
}
