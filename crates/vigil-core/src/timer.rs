//! Session countdown.
//!
//! The timer never decrements a counter. Every tick recomputes
//! `deadline - now`, so a suspended host that misses ticks simply observes a
//! smaller remaining time on the next one.
//!
//! The deadline is fixed on both clocks and the timer reports whichever has
//! less left. The monotonic clock stalls on some hosts while they sleep; the
//! wall clock does not, but can be set back by hand. Taking the minimum
//! means neither can extend an exam.

use std::{
    ops::Add,
    time::{Duration, Instant},
};

use chrono::{DateTime, TimeDelta, Utc};

use crate::env::Environment;

/// A reading of the monotonic and wall clocks taken together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockReading {
    /// Monotonic time.
    pub monotonic: Instant,
    /// Wall-clock time.
    pub wall: DateTime<Utc>,
}

impl ClockReading {
    /// Read both clocks of `env`.
    pub fn of<E: Environment>(env: &E) -> Self {
        Self { monotonic: env.now(), wall: env.wall_clock() }
    }
}

impl Add<Duration> for ClockReading {
    type Output = Self;

    fn add(self, by: Duration) -> Self {
        Self { monotonic: self.monotonic + by, wall: wall_after(self.wall, by) }
    }
}

fn wall_after(wall: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| wall.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Snapshot of a timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    /// Time left, saturating at zero.
    pub remaining: Duration,
    /// A low-time threshold crossed by this tick.
    pub low_time: Option<Duration>,
    /// This tick is the one that observed expiry.
    pub expired: bool,
}

/// Countdown to an absolute deadline.
#[derive(Debug, Clone)]
pub struct Timer {
    deadline: Instant,
    wall_deadline: DateTime<Utc>,
    /// Remaining thresholds, largest first.
    thresholds: Vec<Duration>,
    expired: bool,
}

impl Timer {
    /// Create a timer ending `duration` after `start`.
    pub fn starting_at(start: ClockReading, duration: Duration, low_time: &[Duration]) -> Self {
        let mut thresholds: Vec<Duration> =
            low_time.iter().copied().filter(|t| *t < duration).collect();
        thresholds.sort_unstable_by(|a, b| b.cmp(a));
        thresholds.dedup();

        Self {
            deadline: start.monotonic + duration,
            wall_deadline: wall_after(start.wall, duration),
            thresholds,
            expired: false,
        }
    }

    /// Absolute monotonic deadline.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Absolute wall-clock deadline.
    pub fn wall_deadline(&self) -> DateTime<Utc> {
        self.wall_deadline
    }

    /// Whether expiry has already fired.
    pub fn is_expired(&self) -> bool {
        self.expired
    }

    /// Time left at `now`, the smaller of the two clocks' answers.
    pub fn remaining(&self, now: ClockReading) -> Duration {
        let monotonic = self.deadline.saturating_duration_since(now.monotonic);
        let wall = (self.wall_deadline - now.wall).to_std().unwrap_or(Duration::ZERO);
        monotonic.min(wall)
    }

    /// Evaluate the timer at `now`.
    ///
    /// Returns `expired: true` exactly once. After that every tick reports
    /// zero remaining and nothing else.
    pub fn tick(&mut self, now: ClockReading) -> TimerTick {
        if self.expired {
            return TimerTick { remaining: Duration::ZERO, low_time: None, expired: false };
        }

        let remaining = self.remaining(now);
        if remaining.is_zero() {
            self.expired = true;
            self.thresholds.clear();
            return TimerTick { remaining, low_time: None, expired: true };
        }

        // A long suspension can cross several thresholds at once; report the
        // tightest one only.
        let mut low_time = None;
        while let Some(&threshold) = self.thresholds.first() {
            if remaining > threshold {
                break;
            }
            low_time = Some(threshold);
            self.thresholds.remove(0);
        }

        TimerTick { remaining, low_time, expired: false }
    }
}

/// Format a remaining time as `mm:ss`, or `h:mm:ss` above one hour.
pub fn format_remaining(remaining: Duration) -> String {
    let total = remaining.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if total > 3600 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{:02}:{seconds:02}", total / 60)
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;
    use proptest::prelude::*;

    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    fn reading() -> ClockReading {
        ClockReading { monotonic: Instant::now(), wall: DateTime::<Utc>::UNIX_EPOCH }
    }

    #[test]
    fn remaining_is_deadline_minus_now() {
        let start = reading();
        let timer = Timer::starting_at(start, 10 * MINUTE, &[]);

        assert_eq!(timer.remaining(start), 10 * MINUTE);
        assert_eq!(timer.remaining(start + 4 * MINUTE), 6 * MINUTE);
        assert_eq!(timer.remaining(start + 11 * MINUTE), Duration::ZERO);
    }

    #[test]
    fn expiry_fires_once() {
        let start = reading();
        let mut timer = Timer::starting_at(start, Duration::from_secs(2), &[]);

        assert!(!timer.tick(start + Duration::from_secs(1)).expired);
        assert!(timer.tick(start + Duration::from_secs(2)).expired);
        assert!(!timer.tick(start + Duration::from_secs(3)).expired);
        assert!(!timer.tick(start + Duration::from_secs(4)).expired);
        assert!(timer.is_expired());
    }

    #[test]
    fn suspended_host_sees_expiry_on_next_tick() {
        let start = reading();
        let mut timer = Timer::starting_at(start, 30 * MINUTE, &[5 * MINUTE, MINUTE]);

        // No ticks for an hour (tab suspended), then one tick.
        let tick = timer.tick(start + 60 * MINUTE);
        assert!(tick.expired);
        assert_eq!(tick.remaining, Duration::ZERO);
        assert_eq!(tick.low_time, None);
    }

    #[test]
    fn stalled_monotonic_clock_still_expires_on_wall_time() {
        let start = reading();
        let mut timer = Timer::starting_at(start, 30 * MINUTE, &[]);

        // Host asleep for 20 minutes: the wall clock moved, the monotonic one did not.
        let resumed = ClockReading { monotonic: start.monotonic, wall: (start + 20 * MINUTE).wall };
        assert_eq!(timer.tick(resumed).remaining, 10 * MINUTE);

        let later = ClockReading { monotonic: start.monotonic, wall: (start + 30 * MINUTE).wall };
        assert!(timer.tick(later).expired);
    }

    #[test]
    fn wall_clock_set_back_does_not_extend() {
        let start = reading();
        let timer = Timer::starting_at(start, 30 * MINUTE, &[]);

        let rewound = ClockReading { monotonic: (start + 10 * MINUTE).monotonic, wall: start.wall };
        assert_eq!(timer.remaining(rewound), 20 * MINUTE);
    }

    #[test]
    fn low_time_thresholds_fire_once_each() {
        let start = reading();
        let mut timer = Timer::starting_at(start, 10 * MINUTE, &[MINUTE, 5 * MINUTE]);

        assert_eq!(timer.tick(start + 4 * MINUTE).low_time, None);
        assert_eq!(timer.tick(start + 5 * MINUTE).low_time, Some(5 * MINUTE));
        assert_eq!(timer.tick(start + 6 * MINUTE).low_time, None);
        assert_eq!(timer.tick(start + 9 * MINUTE).low_time, Some(MINUTE));
        assert_eq!(timer.tick(start + 9 * MINUTE + Duration::from_secs(30)).low_time, None);
    }

    #[test]
    fn crossing_several_thresholds_reports_tightest() {
        let start = reading();
        let mut timer = Timer::starting_at(start, 10 * MINUTE, &[5 * MINUTE, MINUTE]);

        let tick = timer.tick(start + 9 * MINUTE + Duration::from_secs(30));
        assert_eq!(tick.low_time, Some(MINUTE));
        assert_eq!(timer.tick(start + 9 * MINUTE + Duration::from_secs(40)).low_time, None);
    }

    #[test]
    fn thresholds_longer_than_exam_are_ignored() {
        let start = reading();
        let mut timer = Timer::starting_at(start, 3 * MINUTE, &[5 * MINUTE, MINUTE]);

        assert_eq!(timer.tick(start + Duration::from_secs(1)).low_time, None);
        assert_eq!(timer.tick(start + 2 * MINUTE).low_time, Some(MINUTE));
    }

    #[test]
    fn display_formats() {
        assert_snapshot!(format_remaining(Duration::from_secs(65)), @"01:05");
        assert_snapshot!(format_remaining(Duration::from_secs(3600)), @"60:00");
        assert_snapshot!(format_remaining(Duration::from_secs(3601)), @"1:00:01");
        assert_snapshot!(format_remaining(Duration::from_secs(2 * 3600 + 5 * 60 + 9)), @"2:05:09");
        assert_snapshot!(format_remaining(Duration::ZERO), @"00:00");
    }

    proptest! {
        #[test]
        fn prop_expiry_fires_exactly_once(
            duration_secs in 1u64..7200,
            steps in proptest::collection::vec(0u64..600, 1..64),
        ) {
            let start = reading();
            let mut timer = Timer::starting_at(start, Duration::from_secs(duration_secs), &[]);

            let mut elapsed = 0;
            let mut fired = 0;
            for step in steps {
                elapsed += step;
                if timer.tick(start + Duration::from_secs(elapsed)).expired {
                    fired += 1;
                }
            }
            // One final tick well past the deadline.
            if timer.tick(start + Duration::from_secs(duration_secs + 1)).expired {
                fired += 1;
            }

            prop_assert_eq!(fired, 1);
        }
    }
}
