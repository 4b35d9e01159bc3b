//! Fixed-cadence tick pacing.
//!
//! Each tick sleeps for whatever is left of the period after the pipeline ran.
//! An overrun tick is followed immediately by the next one; missed ticks are
//! never replayed.

use std::time::Duration;

use tokio::time::Instant;

/// Remaining sleep for a tick whose work took `elapsed`.
pub fn sleep_duration(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Paces the sampling loop at `1 / rate_hz`.
///
/// A tick that starts slightly late because of timer granularity is anchored
/// to its ideal start, so rounding does not accumulate into drift. A tick that
/// starts a full period late (after an overrun) is anchored to now.
#[derive(Debug)]
pub struct TickScheduler {
    period: Duration,
    tick_started: Option<Instant>,
    next_tick_at: Option<Instant>,
    ticks: u64,
    overruns: u64,
}

impl TickScheduler {
    pub fn new(rate_hz: u32) -> Self {
        let divisor = u64::from(rate_hz.max(1));
        Self::with_period(Duration::from_nanos(1_000_000_000 / divisor))
    }

    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            tick_started: None,
            next_tick_at: None,
            ticks: 0,
            overruns: 0,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Mark the start of a tick's work.
    pub fn begin_tick(&mut self) {
        let now = Instant::now();
        let anchor = self
            .next_tick_at
            .filter(|ideal| now.saturating_duration_since(*ideal) < self.period)
            .unwrap_or(now);
        self.tick_started = Some(anchor);
    }

    /// Time left before the next tick should start.
    pub fn remaining(&self) -> Duration {
        match self.tick_started {
            Some(started) => sleep_duration(self.period, started.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Sleep out the rest of the current tick.
    pub async fn wait_next_tick(&mut self) {
        let remaining = self.remaining();
        self.ticks = self.ticks.saturating_add(1);

        let next = self
            .tick_started
            .and_then(|started| started.checked_add(self.period))
            .filter(|_| !remaining.is_zero());

        match next {
            Some(deadline) => {
                self.next_tick_at = Some(deadline);
                tokio::time::sleep_until(deadline).await;
            }
            None => {
                self.overruns = self.overruns.saturating_add(1);
                self.next_tick_at = None;
                tokio::task::yield_now().await;
            }
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Ticks whose work took the whole period or longer.
    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_period_from_rate() -> TestResult {
        assert_eq!(TickScheduler::new(60).period(), Duration::from_nanos(16_666_666));
        assert_eq!(TickScheduler::new(1).period(), Duration::from_secs(1));
        assert_eq!(TickScheduler::new(0).period(), Duration::from_secs(1));
        Ok(())
    }

    #[test]
    fn test_remaining_before_first_tick_is_zero() -> TestResult {
        let scheduler = TickScheduler::new(60);
        assert_eq!(scheduler.remaining(), Duration::ZERO);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_noop_pipeline_converges_on_period() -> TestResult {
        let mut scheduler = TickScheduler::new(60);
        let start = Instant::now();
        let mut previous = start;
        let mut max_jitter = Duration::ZERO;

        for _ in 0..100 {
            scheduler.begin_tick();
            scheduler.wait_next_tick().await;
            let now = Instant::now();
            let spacing = now.duration_since(previous);
            let jitter = spacing.abs_diff(scheduler.period());
            max_jitter = max_jitter.max(jitter);
            previous = now;
        }

        let total = start.elapsed();
        let expected = scheduler.period() * 100;
        let drift = total.abs_diff(expected);
        assert!(drift <= Duration::from_millis(2), "drift {drift:?}");
        assert!(max_jitter <= Duration::from_millis(1), "jitter {max_jitter:?}");
        assert_eq!(scheduler.ticks(), 100);
        assert_eq!(scheduler.overruns(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_work_time_is_subtracted() -> TestResult {
        let mut scheduler = TickScheduler::with_period(Duration::from_millis(20));
        let start = Instant::now();

        scheduler.begin_tick();
        tokio::time::advance(Duration::from_millis(15)).await;
        scheduler.wait_next_tick().await;

        assert_eq!(start.elapsed(), Duration::from_millis(20));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_overrun_does_not_catch_up() -> TestResult {
        let mut scheduler = TickScheduler::with_period(Duration::from_millis(10));
        let start = Instant::now();

        scheduler.begin_tick();
        tokio::time::advance(Duration::from_millis(35)).await;
        scheduler.wait_next_tick().await;
        assert_eq!(start.elapsed(), Duration::from_millis(35));
        assert_eq!(scheduler.overruns(), 1);

        // The tick after an overrun gets a full period, not a burst of
        // back-to-back ticks for the ones that were missed.
        let resumed = Instant::now();
        scheduler.begin_tick();
        scheduler.wait_next_tick().await;
        assert_eq!(resumed.elapsed(), Duration::from_millis(10));
        assert_eq!(scheduler.overruns(), 1);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_sleep_never_exceeds_period(period_ms in 1u64..2000, elapsed_ms in 0u64..5000) {
            let period = Duration::from_millis(period_ms);
            let elapsed = Duration::from_millis(elapsed_ms);
            let sleep = sleep_duration(period, elapsed);
            prop_assert!(sleep <= period);
            if elapsed >= period {
                prop_assert_eq!(sleep, Duration::ZERO);
            } else {
                prop_assert_eq!(sleep + elapsed, period);
            }
        }
    }
}
