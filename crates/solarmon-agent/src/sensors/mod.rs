//! Sensor sampling.
//!
//! A [`Sampler`] exposes the raw reads the loop needs each iteration. Two
//! implementations exist: [`HardwareSampler`] for the Raspberry Pi with its
//! INA219 sensors and [`SyntheticSampler`] for hosts without hardware.

mod channels;
mod cpu;
pub mod data;
mod hardware;
mod memory;
mod network;
mod synthetic;

pub use channels::ChannelAverager;
pub use cpu::CpuSensor;
pub use data::{BusAverage, ChannelReading, CounterPair, Snapshot, TaggedGroup, SENTINEL};
pub use hardware::HardwareSampler;
pub use memory::MemorySensor;
pub use network::NetworkCounters;
pub use synthetic::SyntheticSampler;

use solarmon_hw::Ina219Reading;
use thiserror::Error;

/// Errors raised by sensor reads.
#[derive(Error, Debug)]
pub enum SensorError {
    /// A kernel interface file could not be read.
    #[error("{path} unreadable: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A kernel interface file had unexpected contents.
    #[error("unexpected contents in {0}")]
    Parse(String),

    /// Shunt sensor hardware failed.
    #[error(transparent)]
    Hardware(#[from] solarmon_hw::Error),

    /// Channel index outside the configured set.
    #[error("channel {0} is not configured")]
    NoChannel(usize),

    /// The reading is not available right now.
    #[error("{0} unavailable")]
    Unavailable(String),
}

impl SensorError {
    pub(crate) fn io(path: &str, source: std::io::Error) -> Self {
        SensorError::Io {
            path: path.to_string(),
            source,
        }
    }
}

/// Raw measurement capabilities of the device.
pub trait Sampler: Send {
    /// Names of the shunt channels, in a fixed order.
    fn channel_names(&self) -> Vec<String>;

    /// Takes one raw sample from a shunt channel.
    fn read_channel(&mut self, index: usize) -> Result<Ina219Reading, SensorError>;

    /// Returns (CPU percent, RAM used in bytes).
    fn read_cpu_ram(&mut self) -> Result<(f64, f64), SensorError>;

    /// Returns the cumulative network byte counters.
    fn read_network_counters(&mut self) -> Result<CounterPair, SensorError>;

    /// Identifier used as the machine tag.
    fn machine_id(&self) -> String;
}

impl<T: Sampler + ?Sized> Sampler for Box<T> {
    fn channel_names(&self) -> Vec<String> {
        (**self).channel_names()
    }

    fn read_channel(&mut self, index: usize) -> Result<Ina219Reading, SensorError> {
        (**self).read_channel(index)
    }

    fn read_cpu_ram(&mut self) -> Result<(f64, f64), SensorError> {
        (**self).read_cpu_ram()
    }

    fn read_network_counters(&mut self) -> Result<CounterPair, SensorError> {
        (**self).read_network_counters()
    }

    fn machine_id(&self) -> String {
        (**self).machine_id()
    }
}
