//! # Fixed-Timestep Tick Loop
//!
//! Drives the simulation thread at a constant rate.
//!
//! ## Design
//!
//! The loop must:
//! - Run `tick_rate` times per second on average
//! - Catch up after a stall, but never more than [`MAX_CATCH_UP_TICKS`]
//!   back-to-back (a long stall is forgotten instead of replayed)
//! - Measure every tick so late ticks show up in the status log

use std::time::{Duration, Instant};

/// Most ticks executed back-to-back after a stall.
pub const MAX_CATCH_UP_TICKS: u32 = 5;

/// Fixed-timestep tick loop controller.
#[derive(Debug)]
pub struct TickLoop {
    /// Target tick duration.
    tick_duration: Duration,
    /// Time of last accumulation.
    last_tick: Instant,
    /// Accumulated time not yet simulated.
    accumulator: Duration,
    /// Total ticks executed.
    tick_count: u64,
    /// Tick timing statistics.
    stats: TickStats,
}

/// Tick timing statistics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickStats {
    /// Fastest tick observed.
    pub min_tick_us: u64,
    /// Slowest tick observed.
    pub max_tick_us: u64,
    /// Rolling average tick duration.
    pub avg_tick_us: u64,
    /// Ticks that exceeded their budget.
    pub late_ticks: u64,
    /// Ticks skipped after a stall.
    pub skipped_ticks: u64,
    /// Total ticks measured.
    pub total_ticks: u64,
}

impl TickStats {
    fn fresh(tick_duration: Duration) -> Self {
        Self {
            min_tick_us: u64::MAX,
            max_tick_us: 0,
            avg_tick_us: duration_us(tick_duration),
            late_ticks: 0,
            skipped_ticks: 0,
            total_ticks: 0,
        }
    }
}

fn duration_us(duration: Duration) -> u64 {
    u64::try_from(duration.as_micros()).unwrap_or(u64::MAX)
}

impl TickLoop {
    /// Creates a loop ticking `tick_rate` times per second.
    ///
    /// # Panics
    ///
    /// Panics if `tick_rate` is zero.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        assert!(tick_rate > 0, "Tick rate must be greater than zero");
        Self::with_duration(Duration::from_micros(1_000_000 / u64::from(tick_rate)))
    }

    /// Creates a loop with an explicit tick duration.
    #[must_use]
    pub fn with_duration(tick_duration: Duration) -> Self {
        Self {
            tick_duration,
            last_tick: Instant::now(),
            accumulator: Duration::ZERO,
            tick_count: 0,
            stats: TickStats::fresh(tick_duration),
        }
    }

    /// Returns true if it's time to execute a tick.
    ///
    /// Call this in a loop until it returns false.
    #[must_use]
    pub fn should_tick(&mut self) -> bool {
        let now = Instant::now();
        self.accumulator += now.duration_since(self.last_tick);
        self.last_tick = now;

        let budget = self.tick_duration * MAX_CATCH_UP_TICKS;
        if self.accumulator > budget {
            let excess = self.accumulator - budget;
            let skipped = excess.as_nanos() / self.tick_duration.as_nanos().max(1);
            self.stats.skipped_ticks += u64::try_from(skipped).unwrap_or(u64::MAX);
            self.accumulator = budget;
        }

        self.accumulator >= self.tick_duration
    }

    /// Marks the start of a tick.
    ///
    /// Returns the tick start time for duration measurement.
    #[must_use]
    pub fn begin_tick(&mut self) -> Instant {
        self.accumulator = self.accumulator.saturating_sub(self.tick_duration);
        self.tick_count += 1;
        Instant::now()
    }

    /// Marks the end of a tick.
    pub fn end_tick(&mut self, start: Instant) {
        let duration = start.elapsed();
        let us = duration_us(duration);

        self.stats.total_ticks += 1;
        self.stats.min_tick_us = self.stats.min_tick_us.min(us);
        self.stats.max_tick_us = self.stats.max_tick_us.max(us);
        self.stats.avg_tick_us = (self.stats.avg_tick_us * 15 + us) / 16;

        if duration > self.tick_duration {
            self.stats.late_ticks += 1;
        }
    }

    /// Sleeps until the next tick is due.
    pub fn wait_for_next_tick(&self) {
        let elapsed = self.last_tick.elapsed() + self.accumulator;
        if elapsed < self.tick_duration {
            std::thread::sleep(self.tick_duration - elapsed);
        }
    }

    /// Returns the number of ticks executed.
    #[must_use]
    pub const fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Returns tick statistics.
    #[must_use]
    pub const fn stats(&self) -> &TickStats {
        &self.stats
    }

    /// Returns the target tick duration.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Resets statistics.
    pub fn reset_stats(&mut self) {
        self.stats = TickStats::fresh(self.tick_duration);
    }
}

impl Default for TickLoop {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_TICK_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_loop_creation() {
        let tick_loop = TickLoop::new(60);
        assert_eq!(tick_loop.tick_count(), 0);
        assert_eq!(tick_loop.tick_duration(), Duration::from_micros(16_666));
    }

    #[test]
    fn test_tick_execution() {
        let mut tick_loop = TickLoop::new(1000);
        std::thread::sleep(Duration::from_millis(5));
        assert!(tick_loop.should_tick());

        let start = tick_loop.begin_tick();
        tick_loop.end_tick(start);
        assert_eq!(tick_loop.tick_count(), 1);
        assert_eq!(tick_loop.stats().total_ticks, 1);
    }

    #[test]
    fn test_stall_is_capped() {
        let mut tick_loop = TickLoop::new(1000);
        std::thread::sleep(Duration::from_millis(50));

        let mut ran = 0;
        while tick_loop.should_tick() {
            let start = tick_loop.begin_tick();
            tick_loop.end_tick(start);
            ran += 1;
            assert!(ran <= MAX_CATCH_UP_TICKS + 2, "catch-up must be bounded");
        }
        assert!(tick_loop.stats().skipped_ticks > 0);
    }

    #[test]
    fn test_stats_tracking() {
        let mut tick_loop = TickLoop::new(1000);
        for _ in 0..10 {
            std::thread::sleep(Duration::from_micros(1_100));
            while tick_loop.should_tick() {
                let start = tick_loop.begin_tick();
                std::thread::sleep(Duration::from_micros(50));
                tick_loop.end_tick(start);
            }
        }

        let stats = tick_loop.stats();
        assert!(stats.total_ticks > 0);
        assert!(stats.min_tick_us > 0);
        assert!(stats.min_tick_us <= stats.max_tick_us);
    }
}
