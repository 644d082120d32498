//! Averaging of shunt channel samples.

use super::{BusAverage, ChannelReading, Sampler, SensorError};
use crate::config::SensorConfig;
use std::time::Duration;

/// Number of leading channels that feed the bus average.
pub const HOUSE_CHANNELS: usize = 3;

#[derive(Default)]
struct Accumulator {
    voltage: f64,
    power: f64,
    bus_voltage: f64,
    error: Option<SensorError>,
}

/// Turns repeated raw samples into one averaged reading per channel.
#[derive(Debug, Clone)]
pub struct ChannelAverager {
    samples: u32,
    pause: Duration,
    power_coefficient: f64,
}

impl ChannelAverager {
    pub fn new(samples: u32, pause: Duration, power_coefficient: f64) -> Self {
        Self {
            samples: samples.max(1),
            pause,
            power_coefficient,
        }
    }

    pub fn from_config(config: &SensorConfig) -> Self {
        Self::new(
            config.samples_per_reading,
            Duration::from_millis(config.sample_pause_ms),
            config.power_coefficient,
        )
    }

    /// Derived power for a bus voltage.
    pub fn power(&self, bus_voltage: f64) -> f64 {
        self.power_coefficient * bus_voltage * bus_voltage
    }

    /// Reads every channel `samples` times and returns the per-channel means.
    ///
    /// A channel that fails once is not read again this round; its slot
    /// carries the first error so the result always has one entry per channel.
    pub async fn read_all<S: Sampler + ?Sized>(
        &self,
        sampler: &mut S,
    ) -> Vec<(String, Result<ChannelReading, SensorError>)> {
        let names = sampler.channel_names();
        let mut sums: Vec<Accumulator> = names.iter().map(|_| Accumulator::default()).collect();

        for round in 0..self.samples {
            if round > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }
            for (index, acc) in sums.iter_mut().enumerate() {
                if acc.error.is_some() {
                    continue;
                }
                match sampler.read_channel(index) {
                    Ok(sample) => {
                        acc.voltage += sample.shunt_millivolts;
                        acc.power += self.power(sample.bus_volts);
                        acc.bus_voltage += sample.bus_volts;
                    }
                    Err(e) => acc.error = Some(e),
                }
            }
        }

        let n = self.samples as f64;
        names
            .into_iter()
            .zip(sums)
            .map(|(name, acc)| {
                let reading = match acc.error {
                    Some(e) => Err(e),
                    None => Ok(ChannelReading {
                        voltage: acc.voltage / n,
                        power: acc.power / n,
                        bus_voltage: acc.bus_voltage / n,
                    }),
                };
                (name, reading)
            })
            .collect()
    }

    /// Bus average over the house channels.
    pub fn bus_average(&self, readings: &[ChannelReading]) -> BusAverage {
        bus_average(readings, self.power_coefficient)
    }
}

/// Averages the bus voltage of the house channels, skipping failed ones.
pub fn bus_average(readings: &[ChannelReading], power_coefficient: f64) -> BusAverage {
    let valid: Vec<f64> = readings
        .iter()
        .take(HOUSE_CHANNELS)
        .filter(|r| !r.is_sentinel())
        .map(|r| r.bus_voltage)
        .collect();

    if valid.is_empty() {
        return BusAverage::SENTINEL;
    }
    let voltage = valid.iter().sum::<f64>() / valid.len() as f64;
    BusAverage {
        voltage,
        power: power_coefficient * voltage * voltage,
    }
}
