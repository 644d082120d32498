//! The sampling/upload loop.
//!
//! One iteration samples the device, computes network rates against the
//! retained baseline, uploads three points and sleeps away the rest of the
//! target period. Faults are classified where they happen; only a Critical
//! fault leaves the loop.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::{debug, info};

use crate::delta;
use crate::error::AgentError;
use crate::fault::{Control, Fault, FaultHandler, HEARTBEAT};
use crate::sensors::{
    BusAverage, ChannelAverager, ChannelReading, CounterPair, Sampler, SensorError, Snapshot,
    SENTINEL,
};
use crate::upload::{Uploader, CPU_RAM, NET_RATE};

/// Measurement name of the channel group.
pub const CHANNEL_POINT: &str = "Electricity Gen";
/// Tag key of the channel group.
pub const CHANNEL_TAG: &str = "House";

/// Source of wall-clock time for iteration timing.
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// How long the loop runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Stop after this many iterations.
    Bounded(u64),
    /// Run until stopped from outside.
    Endless,
}

/// Loop states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Sampling,
    Delta,
    Uploading,
    Timing,
    Sleeping,
    Terminated,
}

/// Outcome of the timing step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pace {
    /// Within the period; sleep the remainder.
    Sleep(Duration),
    /// Took longer than the period.
    Overrun,
    /// The clock went backwards.
    ClockSkew,
    /// The timing contract cannot be met.
    Stalled,
}

/// Decides what to do with an iteration that took `elapsed` seconds.
///
/// A measurement or remainder that cannot be represented as a sleep counts
/// as a stall.
pub fn pace(elapsed: f64, target: f64, stall_limit: f64) -> Pace {
    if elapsed.is_nan() || elapsed.abs() >= stall_limit {
        Pace::Stalled
    } else if elapsed < 0.0 {
        Pace::ClockSkew
    } else if elapsed <= target {
        match Duration::try_from_secs_f64(target - elapsed) {
            Ok(remaining) => Pace::Sleep(remaining),
            Err(_) => Pace::Stalled,
        }
    } else {
        Pace::Overrun
    }
}

/// Loop timing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    /// Target period in seconds
    pub period: f64,
    /// Elapsed seconds at which an iteration is fatal
    pub stall_limit: f64,
    pub mode: RunMode,
}

/// State owned by the driver and mutated once per iteration.
#[derive(Debug, Clone)]
pub struct LoopState {
    pub iteration: u64,
    pub phase: Phase,
    /// Counter pair read at the start of the last completed iteration
    pub baseline: Option<CounterPair>,
    /// Phases entered since the current iteration started
    pub trail: Vec<Phase>,
}

/// Totals reported when the loop ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    pub iterations: u64,
    pub snapshots: u64,
    pub faults: crate::fault::FaultCounts,
}

/// Drives the loop over a sampler and an uploader.
pub struct LoopDriver<S, U> {
    sampler: S,
    uploader: U,
    faults: FaultHandler,
    averager: ChannelAverager,
    clock: Box<dyn Clock>,
    settings: LoopSettings,
    state: LoopState,
    machine_id: String,
    snapshots: u64,
    last_snapshot: Option<Snapshot>,
}

impl<S: Sampler, U: Uploader> LoopDriver<S, U> {
    pub fn new(
        sampler: S,
        uploader: U,
        faults: FaultHandler,
        averager: ChannelAverager,
        settings: LoopSettings,
    ) -> Self {
        let machine_id = sampler.machine_id();
        Self {
            sampler,
            uploader,
            faults,
            averager,
            clock: Box::new(SystemClock),
            settings,
            state: LoopState {
                iteration: 0,
                phase: Phase::Idle,
                baseline: None,
                trail: Vec::new(),
            },
            machine_id,
            snapshots: 0,
            last_snapshot: None,
        }
    }

    /// Replaces the wall clock used for iteration timing.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn enter(&mut self, phase: Phase) {
        debug!(
            "Iteration {}: {:?} -> {:?}",
            self.state.iteration, self.state.phase, phase
        );
        self.state.phase = phase;
        self.state.trail.push(phase);
    }

    /// Handles a fault, turning an abort into an error.
    async fn raise(&mut self, fault: Fault) -> Result<Control, AgentError> {
        let message = fault.message.clone();
        match self.faults.raise(fault).await {
            Control::Abort => {
                self.enter(Phase::Terminated);
                Err(AgentError::Critical(message))
            }
            control => Ok(control),
        }
    }

    fn finished(&self) -> bool {
        match self.settings.mode {
            RunMode::Bounded(limit) => self.state.iteration >= limit,
            RunMode::Endless => false,
        }
    }

    /// Runs until the iteration bound is reached or a Critical fault occurs.
    pub async fn run(&mut self) -> Result<RunSummary, AgentError> {
        info!(
            "Loop starting: period {}s, {:?}, machine {}",
            self.settings.period, self.settings.mode, self.machine_id
        );
        self.prime().await?;

        while !self.finished() {
            self.step().await?;
        }
        self.enter(Phase::Terminated);

        let summary = self.summary();
        info!(
            "Loop finished after {} iterations, faults: {}",
            summary.iterations, summary.faults
        );
        Ok(summary)
    }

    /// Takes the first counter reading so the first iteration has a baseline.
    async fn prime(&mut self) -> Result<(), AgentError> {
        match self.sampler.read_network_counters() {
            Ok(counters) => self.state.baseline = Some(counters),
            Err(e) => {
                self.raise(Fault::short(format!("Network measurement failed: {}", e)))
                    .await?;
            }
        }
        Ok(())
    }

    /// Runs one full iteration, including the end-of-iteration sleep.
    pub async fn step(&mut self) -> Result<(), AgentError> {
        let start = self.clock.now();
        self.state.trail.clear();
        self.enter(Phase::Sampling);
        self.faults.pulse(HEARTBEAT).await;

        let counters = self.sampler.read_network_counters();
        let (cpu_percent, ram_used) = self.read_cpu_ram().await?;
        let channels = self.read_channels().await?;
        let readings: Vec<ChannelReading> = channels.iter().map(|(_, r)| *r).collect();
        let bus_average: BusAverage = self.averager.bus_average(&readings);

        self.enter(Phase::Delta);
        let (net_in_rate, net_out_rate) = self.network_rates(counters).await?;

        let snapshot = Snapshot {
            timestamp: start,
            channels,
            bus_average,
            cpu_percent,
            ram_used,
            net_in_rate,
            net_out_rate,
        };
        self.snapshots += 1;

        self.enter(Phase::Uploading);
        self.upload(&snapshot).await?;
        self.last_snapshot = Some(snapshot);

        self.enter(Phase::Timing);
        let end = self.clock.now();
        let elapsed = (end - start)
            .num_microseconds()
            .map(|us| us as f64 / 1e6)
            .unwrap_or(f64::MAX);

        match pace(elapsed, self.settings.period, self.settings.stall_limit) {
            Pace::Sleep(remaining) => {
                self.enter(Phase::Sleeping);
                tokio::time::sleep(remaining).await;
            }
            Pace::Overrun => {
                self.raise(Fault::short(format!(
                    "Loop overrun: iteration took {:.3}s, target {}s",
                    elapsed, self.settings.period
                )))
                .await?;
            }
            Pace::ClockSkew => {
                self.raise(Fault::short(format!(
                    "Clock went backwards by {:.3}s during iteration",
                    -elapsed
                )))
                .await?;
            }
            Pace::Stalled => {
                self.raise(Fault::critical(format!(
                    "Loop cannot keep its period: iteration measured {:.3}s, limit {}s",
                    elapsed, self.settings.stall_limit
                )))
                .await?;
            }
        }

        self.state.iteration += 1;
        Ok(())
    }

    /// Computes the rate against the baseline and moves the baseline forward.
    async fn network_rates(
        &mut self,
        counters: Result<CounterPair, SensorError>,
    ) -> Result<(f64, f64), AgentError> {
        let current = match counters {
            Ok(current) => current,
            Err(e) => {
                self.state.baseline = None;
                self.raise(Fault::short(format!("Network measurement failed: {}", e)))
                    .await?;
                return Ok((SENTINEL, SENTINEL));
            }
        };

        let Some(previous) = self.state.baseline.replace(current) else {
            return Ok((SENTINEL, SENTINEL));
        };
        let rate = delta::rate(previous, current);
        if delta::is_rollback(rate) {
            self.raise(Fault::short(format!(
                "Network counters went backwards: {}/{} -> {}/{}",
                previous.received, previous.sent, current.received, current.sent
            )))
            .await?;
        }
        Ok((delta::to_mib(rate.0), delta::to_mib(rate.1)))
    }

    /// Returns (CPU percent, RAM bytes), or sentinels after a Silent fault.
    pub async fn read_cpu_ram(&mut self) -> Result<(f64, f64), AgentError> {
        match self.sampler.read_cpu_ram() {
            Ok(values) => Ok(values),
            Err(e) => {
                self.raise(Fault::silent(format!("CPU or RAM could not be measured: {}", e)))
                    .await?;
                Ok((SENTINEL, SENTINEL))
            }
        }
    }

    /// Returns one reading per channel, with sentinels for failed channels.
    pub async fn read_channels(&mut self) -> Result<Vec<(String, ChannelReading)>, AgentError> {
        let results = self.averager.read_all(&mut self.sampler).await;
        let mut channels = Vec::with_capacity(results.len());
        for (name, result) in results {
            let reading = match result {
                Ok(reading) => reading,
                Err(e) => {
                    self.raise(Fault::measuring(format!(
                        "Channel {} could not be measured: {}",
                        name, e
                    )))
                    .await?;
                    ChannelReading::SENTINEL
                }
            };
            channels.push((name, reading));
        }
        Ok(channels)
    }

    /// Sends the three points; each failure is handled on its own.
    async fn upload(&mut self, snapshot: &Snapshot) -> Result<(), AgentError> {
        let net = self
            .uploader
            .send_scalar_pair(
                &NET_RATE,
                &self.machine_id,
                snapshot.net_in_rate,
                snapshot.net_out_rate,
                snapshot.timestamp,
            )
            .await;
        let cpu = self
            .uploader
            .send_scalar_pair(
                &CPU_RAM,
                &self.machine_id,
                snapshot.cpu_percent,
                snapshot.ram_used,
                snapshot.timestamp,
            )
            .await;
        let group = self
            .uploader
            .send_tagged_group(
                CHANNEL_POINT,
                CHANNEL_TAG,
                &snapshot.channel_group(),
                snapshot.timestamp,
            )
            .await;

        for result in [net, cpu, group] {
            if let Err(fault) = result {
                self.raise(fault).await?;
            }
        }
        Ok(())
    }

    /// Current totals.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            iterations: self.state.iteration,
            snapshots: self.snapshots,
            faults: self.faults.counts(),
        }
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn uploader(&self) -> &U {
        &self.uploader
    }

    pub fn last_snapshot(&self) -> Option<&Snapshot> {
        self.last_snapshot.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultLog, Severity};
    use crate::sensors::{SensorError, SyntheticSampler, TaggedGroup};
    use crate::upload::{ScalarPair, UploadError};
    use solarmon_hw::{Ina219Reading, NullIndicator};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// In-memory backend recording every call.
    #[derive(Default)]
    struct RecordingUploader {
        pairs: Mutex<Vec<(String, f64, f64)>>,
        groups: Mutex<Vec<TaggedGroup>>,
        timestamps: Mutex<Vec<DateTime<Utc>>>,
        reject: bool,
    }

    impl RecordingUploader {
        fn pair_calls(&self, name: &str) -> usize {
            self.pairs
                .lock()
                .unwrap()
                .iter()
                .filter(|(n, _, _)| n == name)
                .count()
        }
    }

    impl Uploader for RecordingUploader {
        async fn write(&self, _body: String) -> Result<(), UploadError> {
            Ok(())
        }

        async fn send_scalar_pair(
            &self,
            pair: &ScalarPair,
            _machine_id: &str,
            value_a: f64,
            value_b: f64,
            timestamp: DateTime<Utc>,
        ) -> Result<(), Fault> {
            self.timestamps.lock().unwrap().push(timestamp);
            self.pairs
                .lock()
                .unwrap()
                .push((pair.name.to_string(), value_a, value_b));
            if self.reject {
                return Err(Fault::sending(format!("{} rejected", pair.name)));
            }
            Ok(())
        }

        async fn send_tagged_group(
            &self,
            _point_name: &str,
            _tag_key: &str,
            group: &TaggedGroup,
            timestamp: DateTime<Utc>,
        ) -> Result<(), Fault> {
            self.timestamps.lock().unwrap().push(timestamp);
            self.groups.lock().unwrap().push(group.clone());
            if self.reject {
                return Err(Fault::sending("group rejected"));
            }
            Ok(())
        }
    }

    /// Sampler with scripted counters and a failing channel.
    struct ScriptedSampler {
        counters: VecDeque<CounterPair>,
        broken_channel: Option<usize>,
        cpu_fails: bool,
    }

    impl Sampler for ScriptedSampler {
        fn channel_names(&self) -> Vec<String> {
            ["blue_house", "red_house", "green_house", "bus"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        }

        fn read_channel(&mut self, index: usize) -> Result<Ina219Reading, SensorError> {
            if self.broken_channel == Some(index) {
                return Err(SensorError::Unavailable("INA219".to_string()));
            }
            Ok(Ina219Reading {
                shunt_millivolts: 2.0,
                bus_volts: 5.0,
            })
        }

        fn read_cpu_ram(&mut self) -> Result<(f64, f64), SensorError> {
            if self.cpu_fails {
                return Err(SensorError::Unavailable("/proc/stat".to_string()));
            }
            Ok((25.0, 512.0))
        }

        fn read_network_counters(&mut self) -> Result<CounterPair, SensorError> {
            self.counters
                .pop_front()
                .ok_or_else(|| SensorError::Unavailable("eth0".to_string()))
        }

        fn machine_id(&self) -> String {
            "scripted".to_string()
        }
    }

    /// Clock returning scripted offsets from a fixed origin, then repeating the last.
    struct ScriptedClock {
        origin: DateTime<Utc>,
        offsets_ms: Mutex<VecDeque<i64>>,
    }

    impl Clock for ScriptedClock {
        fn now(&self) -> DateTime<Utc> {
            let mut offsets = self.offsets_ms.lock().unwrap();
            let offset = if offsets.len() > 1 {
                offsets.pop_front().unwrap()
            } else {
                offsets.front().copied().unwrap_or(0)
            };
            self.origin + chrono::Duration::milliseconds(offset)
        }
    }

    fn fault_handler(dir: &tempfile::TempDir) -> FaultHandler {
        let log = FaultLog::open(dir.path().join("errorfile.txt"), 100_000_000).unwrap();
        FaultHandler::new(log, Box::new(NullIndicator))
    }

    fn settings(iterations: u64) -> LoopSettings {
        LoopSettings {
            period: 3.0,
            stall_limit: 10.0,
            mode: RunMode::Bounded(iterations),
        }
    }

    fn averager() -> ChannelAverager {
        ChannelAverager::new(10, Duration::from_millis(50), 0.1)
    }

    /// Virtual time one iteration spends in pulses and averaging pauses.
    fn busy_time() -> Duration {
        HEARTBEAT.duration() + Duration::from_millis(50 * 9)
    }

    fn scripted(counters: &[(u64, u64)]) -> ScriptedSampler {
        ScriptedSampler {
            counters: counters
                .iter()
                .map(|(r, s)| CounterPair::new(*r, *s))
                .collect(),
            broken_channel: None,
            cpu_fails: false,
        }
    }

    #[test]
    fn test_pace_policy() {
        assert_eq!(pace(2.5, 3.0, 10.0), Pace::Sleep(Duration::from_millis(500)));
        assert_eq!(pace(0.0, 3.0, 10.0), Pace::Sleep(Duration::from_secs(3)));
        assert_eq!(pace(3.0, 3.0, 10.0), Pace::Sleep(Duration::ZERO));
        assert_eq!(pace(5.0, 3.0, 10.0), Pace::Overrun);
        assert_eq!(pace(-1.0, 3.0, 10.0), Pace::ClockSkew);
        assert_eq!(pace(11.0, 3.0, 10.0), Pace::Stalled);
        assert_eq!(pace(10.0, 3.0, 10.0), Pace::Stalled);
        assert_eq!(pace(-12.0, 3.0, 10.0), Pace::Stalled);
    }

    #[test]
    fn test_pace_never_panics_on_unrepresentable_values() {
        assert_eq!(pace(0.5, f64::INFINITY, 10.0), Pace::Stalled);
        assert_eq!(pace(0.5, 1e30, f64::INFINITY), Pace::Stalled);
        assert_eq!(pace(0.5, f64::NAN, 10.0), Pace::Overrun);
        assert_eq!(pace(f64::NAN, 3.0, 10.0), Pace::Stalled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_run_with_synthetic_sampler() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = LoopDriver::new(
            SyntheticSampler::new(),
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(3),
        );

        let summary = driver.run().await.unwrap();

        assert_eq!(summary.iterations, 3);
        assert_eq!(summary.snapshots, 3);
        assert_eq!(summary.faults.total(), 0);
        assert_eq!(driver.uploader().pair_calls(NET_RATE.name), 3);
        assert_eq!(driver.uploader().pair_calls(CPU_RAM.name), 3);
        assert_eq!(driver.uploader().groups.lock().unwrap().len(), 3);
        assert_eq!(driver.state().baseline, driver.sampler().last_counters());
        assert_eq!(driver.state().phase, Phase::Terminated);

        let snapshot = driver.last_snapshot().unwrap();
        assert_eq!(snapshot.channels.len(), 4);
        assert!(snapshot.net_in_rate > 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_period_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = LoopDriver::new(
            SyntheticSampler::new(),
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(2),
        )
        .with_clock(Box::new(ScriptedClock {
            origin: Utc::now(),
            offsets_ms: Mutex::new(VecDeque::from([0, 2_500, 3_000, 5_500])),
        }));
        let start = tokio::time::Instant::now();

        driver.run().await.unwrap();

        // Each iteration sleeps the 0.5s remainder on top of its own pauses.
        assert_eq!(
            start.elapsed(),
            (busy_time() + Duration::from_millis(500)) * 2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_points_carry_snapshot_time() {
        let dir = tempfile::tempdir().unwrap();
        let origin = Utc::now();
        let mut driver = LoopDriver::new(
            SyntheticSampler::new(),
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(2),
        )
        .with_clock(Box::new(ScriptedClock {
            origin,
            offsets_ms: Mutex::new(VecDeque::from([0, 2_500, 3_000, 5_500])),
        }));

        driver.run().await.unwrap();

        let second = origin + chrono::Duration::milliseconds(3_000);
        assert_eq!(
            *driver.uploader().timestamps.lock().unwrap(),
            vec![origin, origin, origin, second, second, second]
        );
        assert_eq!(driver.last_snapshot().unwrap().timestamp, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_phases_follow_iteration_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = LoopDriver::new(
            SyntheticSampler::new(),
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(1),
        );

        driver.run().await.unwrap();

        assert_eq!(
            driver.state().trail,
            vec![
                Phase::Sampling,
                Phase::Delta,
                Phase::Uploading,
                Phase::Timing,
                Phase::Sleeping,
                Phase::Terminated,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_channel_uses_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = scripted(&[(0, 0), (100, 100)]);
        sampler.broken_channel = Some(2);
        let mut driver = LoopDriver::new(
            sampler,
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(1),
        );

        let summary = driver.run().await.unwrap();

        let snapshot = driver.last_snapshot().unwrap();
        assert_eq!(snapshot.channels.len(), 4);
        assert!(snapshot.channels[2].1.is_sentinel());
        assert!(!snapshot.channels[1].1.is_sentinel());
        assert!((snapshot.bus_average.voltage - 5.0).abs() < 1e-9);
        assert_eq!(summary.faults.get(Severity::Measuring), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cpu_failure_is_silent_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let mut sampler = scripted(&[(0, 0), (1, 1)]);
        sampler.cpu_fails = true;
        let mut driver = LoopDriver::new(
            sampler,
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(1),
        );

        let summary = driver.run().await.unwrap();

        let snapshot = driver.last_snapshot().unwrap();
        assert_eq!((snapshot.cpu_percent, snapshot.ram_used), (SENTINEL, SENTINEL));
        assert_eq!(summary.faults.get(Severity::Silent), 1);
        assert_eq!(driver.uploader().pair_calls(CPU_RAM.name), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_rollback_is_short_fault() {
        let dir = tempfile::tempdir().unwrap();
        let mib = delta::MIB as u64;
        let sampler = scripted(&[(4 * mib, mib), (mib, 3 * mib)]);
        let mut driver = LoopDriver::new(
            sampler,
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(1),
        );

        let summary = driver.run().await.unwrap();

        let snapshot = driver.last_snapshot().unwrap();
        assert_eq!(snapshot.net_in_rate, -3.0);
        assert_eq!(snapshot.net_out_rate, 2.0);
        assert_eq!(summary.faults.get(Severity::Short), 1);
        assert_eq!(
            driver.state().baseline,
            Some(CounterPair::new(mib, 3 * mib))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_failure_clears_baseline() {
        let dir = tempfile::tempdir().unwrap();
        // Prime succeeds, then the counters disappear.
        let sampler = scripted(&[(10, 10)]);
        let mut driver = LoopDriver::new(
            sampler,
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(2),
        );

        let summary = driver.run().await.unwrap();

        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.faults.get(Severity::Short), 2);
        assert_eq!(driver.state().baseline, None);
        let snapshot = driver.last_snapshot().unwrap();
        assert_eq!(snapshot.net_in_rate, SENTINEL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_upload_failures_do_not_stop_loop() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = RecordingUploader {
            reject: true,
            ..Default::default()
        };
        let mut driver = LoopDriver::new(
            SyntheticSampler::new(),
            uploader,
            fault_handler(&dir),
            averager(),
            settings(2),
        );

        let summary = driver.run().await.unwrap();

        assert_eq!(summary.iterations, 2);
        assert_eq!(summary.faults.get(Severity::Sending), 6);
        assert_eq!(driver.uploader().groups.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_is_short_fault() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = LoopDriver::new(
            SyntheticSampler::new(),
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(1),
        )
        .with_clock(Box::new(ScriptedClock {
            origin: Utc::now(),
            offsets_ms: Mutex::new(VecDeque::from([0, 5_000])),
        }));
        let start = tokio::time::Instant::now();

        let summary = driver.run().await.unwrap();

        assert_eq!(summary.iterations, 1);
        assert_eq!(summary.faults.get(Severity::Short), 1);
        // The Short pulse is played and no remainder is slept.
        let short = Severity::Short.pattern().unwrap().duration();
        assert_eq!(start.elapsed(), busy_time() + short);
        assert!(!driver.state().trail.contains(&Phase::Sleeping));
        let log = std::fs::read_to_string(dir.path().join("errorfile.txt")).unwrap();
        assert!(log.contains("| Loop overrun"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_skew_is_short_fault() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = LoopDriver::new(
            SyntheticSampler::new(),
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(1),
        )
        .with_clock(Box::new(ScriptedClock {
            origin: Utc::now(),
            offsets_ms: Mutex::new(VecDeque::from([0, -1_000])),
        }));
        let start = tokio::time::Instant::now();

        let summary = driver.run().await.unwrap();

        assert_eq!(summary.faults.get(Severity::Short), 1);
        let short = Severity::Short.pattern().unwrap().duration();
        assert_eq!(start.elapsed(), busy_time() + short);
        assert!(!driver.state().trail.contains(&Phase::Sleeping));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stall_is_critical() {
        let dir = tempfile::tempdir().unwrap();
        let mut driver = LoopDriver::new(
            SyntheticSampler::new(),
            RecordingUploader::default(),
            fault_handler(&dir),
            averager(),
            settings(5),
        )
        .with_clock(Box::new(ScriptedClock {
            origin: Utc::now(),
            offsets_ms: Mutex::new(VecDeque::from([0, 11_000])),
        }));

        let result = driver.run().await;

        assert!(matches!(result, Err(AgentError::Critical(_))));
        assert_eq!(driver.summary().snapshots, 1);
        assert_eq!(driver.state().iteration, 0);
        assert_eq!(driver.state().phase, Phase::Terminated);
        let log = std::fs::read_to_string(dir.path().join("errorfile.txt")).unwrap();
        assert!(log.contains("| Loop cannot keep its period"));
    }
}
