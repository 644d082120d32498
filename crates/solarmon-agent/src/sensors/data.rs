//! Measurement records produced once per loop iteration.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Sentinel substituted for values that could not be measured.
pub const SENTINEL: f64 = -1.0;

/// Tag used for the bus average in the channel group.
pub const BUS_AVERAGE_TAG: &str = "bus_average";

/// Values grouped by tag, then by field name.
pub type TaggedGroup = BTreeMap<String, BTreeMap<String, f64>>;

/// Averaged reading of one shunt sensor channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReading {
    /// Shunt voltage in millivolts
    pub voltage: f64,
    /// Derived power, k * bus_voltage²
    pub power: f64,
    /// Bus voltage in volts
    pub bus_voltage: f64,
}

impl ChannelReading {
    /// Reading used for a channel whose sensor failed.
    pub const SENTINEL: ChannelReading = ChannelReading {
        voltage: SENTINEL,
        power: SENTINEL,
        bus_voltage: SENTINEL,
    };

    /// Returns true if this is the failed-channel sentinel.
    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }
}

/// Average over the house channels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BusAverage {
    pub voltage: f64,
    pub power: f64,
}

impl BusAverage {
    pub const SENTINEL: BusAverage = BusAverage {
        voltage: SENTINEL,
        power: SENTINEL,
    };
}

/// Cumulative network byte counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterPair {
    pub received: u64,
    pub sent: u64,
}

impl CounterPair {
    pub fn new(received: u64, sent: u64) -> Self {
        Self { received, sent }
    }
}

/// One iteration's measurements. Never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    /// Named channel readings, in configuration order
    pub channels: Vec<(String, ChannelReading)>,
    pub bus_average: BusAverage,
    pub cpu_percent: f64,
    /// RAM in use, in bytes
    pub ram_used: f64,
    /// MiB received during the last interval
    pub net_in_rate: f64,
    /// MiB sent during the last interval
    pub net_out_rate: f64,
}

impl Snapshot {
    /// Builds the per-channel group uploaded as one tagged point per channel.
    pub fn channel_group(&self) -> TaggedGroup {
        let mut group = TaggedGroup::new();
        for (name, reading) in &self.channels {
            let fields = BTreeMap::from([
                ("voltage".to_string(), reading.voltage),
                ("power".to_string(), reading.power),
                ("bus_voltage".to_string(), reading.bus_voltage),
            ]);
            group.insert(name.clone(), fields);
        }
        group.insert(
            BUS_AVERAGE_TAG.to_string(),
            BTreeMap::from([
                ("voltage".to_string(), self.bus_average.voltage),
                ("power".to_string(), self.bus_average.power),
            ]),
        );
        group
    }
}
