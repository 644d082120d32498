//! Timed pulse patterns.

use super::Indicator;
use crate::Result;
use std::time::Duration;

/// A fixed sequence of identical pulses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulsePattern {
    /// Number of pulses.
    pub count: u8,
    /// Time the output stays on per pulse.
    pub on: Duration,
    /// Time the output stays off after each pulse.
    pub off: Duration,
}

impl PulsePattern {
    /// Creates a pattern from millisecond durations.
    pub const fn new(count: u8, on_ms: u64, off_ms: u64) -> Self {
        Self {
            count,
            on: Duration::from_millis(on_ms),
            off: Duration::from_millis(off_ms),
        }
    }

    /// Total time the pattern takes to play.
    pub fn duration(&self) -> Duration {
        (self.on + self.off) * self.count as u32
    }
}

/// Plays a pattern on the indicator.
///
/// Stops at the first failed write. The output is switched off before
/// returning the error.
pub async fn play(indicator: &mut dyn Indicator, pattern: PulsePattern) -> Result<()> {
    for _ in 0..pattern.count {
        if let Err(e) = indicator.set(true) {
            let _ = indicator.set(false);
            return Err(e);
        }
        tokio::time::sleep(pattern.on).await;
        indicator.set(false)?;
        tokio::time::sleep(pattern.off).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[derive(Default)]
    struct Recorder {
        states: Vec<bool>,
        fail_after: Option<usize>,
    }

    impl Indicator for Recorder {
        fn set(&mut self, on: bool) -> Result<()> {
            if self.fail_after == Some(self.states.len()) {
                return Err(Error::Indicator {
                    path: "recorder".to_string(),
                    source: std::io::Error::other("gone"),
                });
            }
            self.states.push(on);
            Ok(())
        }
    }

    #[test]
    fn test_duration() {
        assert_eq!(
            PulsePattern::new(3, 150, 150).duration(),
            Duration::from_millis(900)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_toggles_and_takes_fixed_time() {
        let mut recorder = Recorder::default();
        let pattern = PulsePattern::new(2, 100, 50);
        let start = tokio::time::Instant::now();

        play(&mut recorder, pattern).await.unwrap();

        assert_eq!(recorder.states, vec![true, false, true, false]);
        assert_eq!(start.elapsed(), pattern.duration());
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_stops_on_failure() {
        let mut recorder = Recorder {
            fail_after: Some(2),
            ..Default::default()
        };
        let pattern = PulsePattern::new(3, 100, 100);
        let start = tokio::time::Instant::now();

        assert!(play(&mut recorder, pattern).await.is_err());
        assert!(start.elapsed() < pattern.duration());
    }
}
