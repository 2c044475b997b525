//! Airbrush repeat timer
//!
//! A recurring task owned by the thread driving the stroke. The event loop
//! polls it with the current time; every due tick re-stamps the last dab.
//! Any motion or the end of the stroke cancels it.

use std::time::{Duration, Instant};

/// Scale between the airbrush rate and the tick interval in milliseconds
const RATE_TO_MS: f64 = 10_000.0;

/// Interval between airbrush stamps for a rate in stamps-per-ten-seconds
/// units (0 - 150), or `None` when the rate is zero
pub fn interval_for_rate(rate: f64) -> Option<Duration> {
    if !rate.is_finite() || rate <= 0.0 {
        return None;
    }
    Some(Duration::from_micros((RATE_TO_MS / rate * 1000.0) as u64))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RepeatTimer {
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl RepeatTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the timer so the first tick fires one interval after `now`.
    /// A zero rate leaves the timer disarmed.
    pub fn schedule(&mut self, now: Instant, rate: f64) {
        self.interval = interval_for_rate(rate);
        self.next_due = self.interval.map(|interval| now + interval);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    /// Time left until the next tick
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.next_due.map(|due| due.saturating_duration_since(now))
    }

    /// Fire at most one tick if due, rescheduling from `now`.
    ///
    /// Missed ticks are dropped rather than replayed in a burst.
    pub fn poll(&mut self, now: Instant) -> bool {
        match (self.next_due, self.interval) {
            (Some(due), Some(interval)) if now >= due => {
                self.next_due = Some(now + interval);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_from_rate() {
        assert_eq!(interval_for_rate(80.0), Some(Duration::from_millis(125)));
        assert_eq!(interval_for_rate(0.0), None);
        assert_eq!(interval_for_rate(f64::NAN), None);
    }

    #[test]
    fn test_poll_fires_once_per_interval() {
        let start = Instant::now();
        let mut timer = RepeatTimer::new();
        timer.schedule(start, 100.0);
        assert!(timer.is_armed());

        assert!(!timer.poll(start + Duration::from_millis(50)));
        assert!(timer.poll(start + Duration::from_millis(100)));
        assert!(!timer.poll(start + Duration::from_millis(150)));
        // a long stall yields one tick, not a burst
        assert!(timer.poll(start + Duration::from_millis(1000)));
        assert!(!timer.poll(start + Duration::from_millis(1050)));
        assert_eq!(
            timer.remaining(start + Duration::from_millis(1050)),
            Some(Duration::from_millis(50))
        );
    }

    #[test]
    fn test_cancel_and_zero_rate() {
        let start = Instant::now();
        let mut timer = RepeatTimer::new();
        timer.schedule(start, 50.0);
        timer.cancel();
        assert!(!timer.poll(start + Duration::from_secs(5)));

        timer.schedule(start, 0.0);
        assert!(!timer.is_armed());
        assert!(!timer.poll(start + Duration::from_secs(5)));
    }
}
