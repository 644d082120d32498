//! Fault classification.
//!
//! Every failure at a boundary (sensor read, counter read, upload, timing) is
//! turned into a [`Fault`] with one of five severities. The severity fixes the
//! indicator pattern and the control action; the fault log write is
//! unconditional and always happens before the indicator is touched.

mod log;

pub use log::FaultLog;

use chrono::{DateTime, Local};
use solarmon_hw::{play, Indicator, PulsePattern};
use std::fmt;
use tracing::{debug, error, warn};

/// Pattern marking the start of every loop iteration.
pub const HEARTBEAT: PulsePattern = PulsePattern::new(1, 50, 50);

/// Pattern played once at startup to show the indicator works.
pub const SELF_TEST: PulsePattern = PulsePattern::new(3, 500, 250);

const SHORT_PULSES: PulsePattern = PulsePattern::new(1, 150, 150);
const SENDING_PULSES: PulsePattern = PulsePattern::new(2, 150, 150);
const MEASURING_PULSES: PulsePattern = PulsePattern::new(3, 150, 150);
const CRITICAL_PULSES: PulsePattern = PulsePattern::new(3, 800, 200);

/// Fault severity, from cosmetic to fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// Data-quality issue; the caller substitutes a sentinel.
    Silent,
    /// Transient environmental issue.
    Short,
    /// Sink-side issue; the point is dropped.
    Sending,
    /// Sensor-side issue; the channel uses a sentinel.
    Measuring,
    /// Structural issue; the process cannot continue.
    Critical,
}

/// What the caller does after a fault has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Keep going.
    Continue,
    /// Use the sentinel value in place of the failed reading.
    Substitute,
    /// Drop this upload and keep going.
    SkipUpload,
    /// Stop the loop and end the process with a failure.
    Abort,
}

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Severity; 5] = [
        Severity::Silent,
        Severity::Short,
        Severity::Sending,
        Severity::Measuring,
        Severity::Critical,
    ];

    /// Indicator pattern for this severity.
    pub const fn pattern(self) -> Option<PulsePattern> {
        match self {
            Severity::Silent => None,
            Severity::Short => Some(SHORT_PULSES),
            Severity::Sending => Some(SENDING_PULSES),
            Severity::Measuring => Some(MEASURING_PULSES),
            Severity::Critical => Some(CRITICAL_PULSES),
        }
    }

    /// Control action for this severity.
    pub const fn control(self) -> Control {
        match self {
            Severity::Silent => Control::Substitute,
            Severity::Short => Control::Continue,
            Severity::Sending => Control::SkipUpload,
            Severity::Measuring => Control::Substitute,
            Severity::Critical => Control::Abort,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Silent => write!(f, "silent"),
            Severity::Short => write!(f, "short"),
            Severity::Sending => write!(f, "sending"),
            Severity::Measuring => write!(f, "measuring"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Fault {
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl Fault {
    /// Creates a fault stamped with the current local time.
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            timestamp: Local::now(),
        }
    }

    pub fn silent(message: impl Into<String>) -> Self {
        Self::new(Severity::Silent, message)
    }

    pub fn short(message: impl Into<String>) -> Self {
        Self::new(Severity::Short, message)
    }

    pub fn sending(message: impl Into<String>) -> Self {
        Self::new(Severity::Sending, message)
    }

    pub fn measuring(message: impl Into<String>) -> Self {
        Self::new(Severity::Measuring, message)
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(Severity::Critical, message)
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fault: {}", self.severity, self.message)
    }
}

/// Number of faults handled per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultCounts([u32; 5]);

impl FaultCounts {
    /// Returns how many faults of `severity` were handled.
    pub fn get(&self, severity: Severity) -> u32 {
        self.0[severity.index()]
    }

    /// Total faults handled.
    pub fn total(&self) -> u32 {
        self.0.iter().sum()
    }

    fn add(&mut self, severity: Severity) {
        self.0[severity.index()] += 1;
    }
}

impl fmt::Display for FaultCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = Severity::ALL
            .iter()
            .map(|s| format!("{}={}", s, self.get(*s)))
            .collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Records faults and signals them on the indicator.
pub struct FaultHandler {
    log: FaultLog,
    indicator: Box<dyn Indicator>,
    counts: FaultCounts,
}

impl FaultHandler {
    /// Creates a handler owning the log and the indicator.
    pub fn new(log: FaultLog, indicator: Box<dyn Indicator>) -> Self {
        Self {
            log,
            indicator,
            counts: FaultCounts::default(),
        }
    }

    /// Handles a fault and returns the control action for the caller.
    pub async fn raise(&mut self, fault: Fault) -> Control {
        if let Err(e) = self.log.record(&fault) {
            error!("Failed to write fault log {}: {}", self.log.path().display(), e);
        }

        match fault.severity {
            Severity::Silent => debug!("{}", fault),
            Severity::Critical => error!("{}", fault),
            _ => warn!("{}", fault),
        }
        self.counts.add(fault.severity);

        if fault.severity == Severity::Critical {
            if let Err(e) = self.log.sync() {
                error!("Failed to flush fault log: {}", e);
            }
        }

        if let Some(pattern) = fault.severity.pattern() {
            self.pulse(pattern).await;
        }

        fault.severity.control()
    }

    /// Plays a pattern, swallowing indicator failures.
    pub async fn pulse(&mut self, pattern: PulsePattern) {
        if let Err(e) = play(self.indicator.as_mut(), pattern).await {
            debug!("Indicator unavailable: {}", e);
        }
    }

    /// Returns the per-severity counts.
    pub fn counts(&self) -> FaultCounts {
        self.counts
    }
}
