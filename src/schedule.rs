/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Constant arrival rate schedule.
///
/// Tick `i` is due at `start + i * rate_unit / rate`, measured from the moment the schedule was
/// created. Offsets are computed from the tick index in whole nanoseconds, so the schedule does not
/// drift no matter how late the caller picks a tick up. A late caller receives the overdue ticks
/// back to back.
///
/// The schedule ends once the next offset would fall at or beyond `duration`, after waiting for the
/// duration itself to elapse.
pub struct ArrivalSchedule {
    rate: u32,
    rate_unit: Duration,
    duration: Duration,
    start: Instant,
    next: u64,
}

impl ArrivalSchedule {
    pub fn new(rate: u32, rate_unit: Duration, duration: Duration) -> Self {
        Self {
            rate: rate.max(1),
            rate_unit,
            duration,
            start: Instant::now(),
            next: 0,
        }
    }

    pub fn start(&self) -> Instant {
        self.start
    }

    /// Offset of tick `index` from the start of the schedule.
    pub fn offset(&self, index: u64) -> Duration {
        let nanos = self.rate_unit.as_nanos() * index as u128 / self.rate as u128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Number of ticks the schedule produces in total.
    pub fn total_ticks(&self) -> u64 {
        let unit = self.rate_unit.as_nanos().max(1);
        let ticks = (self.duration.as_nanos() * self.rate as u128).div_ceil(unit);
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }

    /// Waits until the next tick is due and returns its index, or `None` once the schedule is over.
    pub async fn next_tick(&mut self) -> Option<u64> {
        let offset = self.offset(self.next);
        if offset >= self.duration {
            sleep_until(self.start + self.duration).await;
            return None;
        }

        sleep_until(self.start + offset).await;

        let index = self.next;
        self.next += 1;
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time;

    #[test]
    fn offsets_are_evenly_spaced() {
        let schedule = ArrivalSchedule::new(10, Duration::from_secs(1), Duration::from_secs(30));

        assert_eq!(schedule.offset(0), Duration::ZERO);
        assert_eq!(schedule.offset(1), Duration::from_millis(100));
        assert_eq!(schedule.offset(299), Duration::from_millis(29_900));
    }

    #[test]
    fn offsets_do_not_drift_for_uneven_rates() {
        let schedule = ArrivalSchedule::new(3, Duration::from_secs(1), Duration::from_secs(60));

        // 1/3s cannot be represented exactly, but every third tick lands on a whole second
        assert_eq!(schedule.offset(3), Duration::from_secs(1));
        assert_eq!(schedule.offset(150), Duration::from_secs(50));
    }

    #[test]
    fn total_ticks_rounds_partial_units_up() {
        let full = ArrivalSchedule::new(10, Duration::from_secs(1), Duration::from_secs(30));
        assert_eq!(full.total_ticks(), 300);

        let partial = ArrivalSchedule::new(2, Duration::from_secs(1), Duration::from_millis(2_100));
        // ticks at 0s, 0.5s, 1s, 1.5s, 2s
        assert_eq!(partial.total_ticks(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn produces_every_tick_then_ends_at_duration() {
        let mut schedule = ArrivalSchedule::new(10, Duration::from_secs(1), Duration::from_secs(30));
        let start = schedule.start();

        let mut count = 0;
        while let Some(index) = schedule.next_tick().await {
            assert_eq!(index, count);
            assert_eq!(Instant::now() - start, schedule.offset(index));
            count += 1;
        }

        assert_eq!(count, 300);
        assert_eq!(Instant::now() - start, Duration::from_secs(30));
        assert_eq!(schedule.next_tick().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn late_caller_catches_up_without_shifting_schedule() {
        let mut schedule = ArrivalSchedule::new(10, Duration::from_secs(1), Duration::from_secs(1));
        let start = schedule.start();

        time::sleep(Duration::from_millis(350)).await;

        // ticks 0..=3 are overdue and returned immediately
        for expected in 0..4 {
            assert_eq!(schedule.next_tick().await, Some(expected));
            assert_eq!(Instant::now() - start, Duration::from_millis(350));
        }

        assert_eq!(schedule.next_tick().await, Some(4));
        assert_eq!(Instant::now() - start, Duration::from_millis(400));
    }
}
