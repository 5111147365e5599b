use std::time::Duration;

use chrono::{Local, NaiveDateTime, NaiveTime, TimeDelta};

use crate::bail;
use crate::error::{ErrorKind, EtlResult};

/// Re-run schedule for the polling adapter.
///
/// Without an anchor every run is followed by a full `cycle` of sleep. With an anchor the
/// runs align to `anchor + k * cycle` (wall clock, local time); a boundary closer than
/// `min_delay` is skipped in favor of the one after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    cycle: Duration,
    anchor: Option<NaiveTime>,
    min_delay: Duration,
}

impl Cadence {
    pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(1);

    /// Creates an unanchored cadence. A zero `cycle` is rejected.
    pub fn every(cycle: Duration) -> EtlResult<Self> {
        if cycle.is_zero() {
            bail!(
                ErrorKind::InvalidArgument,
                "Polling cycle must be greater than zero"
            );
        }

        Ok(Self {
            cycle,
            anchor: None,
            min_delay: Self::DEFAULT_MIN_DELAY,
        })
    }

    pub fn anchored_at(mut self, anchor: NaiveTime) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    pub fn cycle(&self) -> Duration {
        self.cycle
    }

    /// Delay before the next run, measured from the current local time.
    pub fn delay_from_now(&self) -> Duration {
        self.next_delay(Local::now().naive_local())
    }

    /// Delay before the next run when the current time is `now`.
    pub fn next_delay(&self, now: NaiveDateTime) -> Duration {
        let Some(anchor) = self.anchor else {
            return self.cycle;
        };

        let cycle_ms = i64::try_from(self.cycle.as_millis()).unwrap_or(i64::MAX);
        let min_delay_ms = i64::try_from(self.min_delay.as_millis()).unwrap_or(i64::MAX);

        let since_anchor: TimeDelta = now - now.date().and_time(anchor);
        let into_cycle = since_anchor.num_milliseconds().rem_euclid(cycle_ms);

        let mut until_boundary = cycle_ms - into_cycle;
        if until_boundary < min_delay_ms {
            until_boundary = until_boundary.saturating_add(cycle_ms);
        }

        Duration::from_millis(until_boundary.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(hour: u32, minute: u32, second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(hour, minute, second)
            .unwrap()
    }

    fn anchor(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn zero_cycle_is_rejected() {
        let err = Cadence::every(Duration::ZERO).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn unanchored_cadence_sleeps_full_cycle() {
        let cadence = Cadence::every(Duration::from_secs(90)).unwrap();
        assert_eq!(cadence.next_delay(at(12, 0, 17)), Duration::from_secs(90));
    }

    #[test]
    fn anchored_cadence_waits_for_next_boundary() {
        let cadence = Cadence::every(Duration::from_secs(15 * 60))
            .unwrap()
            .anchored_at(anchor(0, 5));

        // Boundaries fall on :05, :20, :35 and :50.
        assert_eq!(cadence.next_delay(at(10, 12, 0)), Duration::from_secs(8 * 60));
        assert_eq!(cadence.next_delay(at(10, 50, 30)), Duration::from_secs(14 * 60 + 30));
    }

    #[test]
    fn anchored_cadence_handles_times_before_anchor() {
        let cadence = Cadence::every(Duration::from_secs(60 * 60))
            .unwrap()
            .anchored_at(anchor(22, 30));

        assert_eq!(cadence.next_delay(at(8, 0, 0)), Duration::from_secs(30 * 60));
    }

    #[test]
    fn boundary_closer_than_min_delay_is_skipped() {
        let cadence = Cadence::every(Duration::from_secs(60))
            .unwrap()
            .anchored_at(anchor(0, 0))
            .with_min_delay(Duration::from_secs(5));

        assert_eq!(cadence.next_delay(at(9, 0, 57)), Duration::from_secs(63));
        assert_eq!(cadence.next_delay(at(9, 0, 50)), Duration::from_secs(10));
    }

    #[test]
    fn exactly_on_boundary_waits_full_cycle() {
        let cadence = Cadence::every(Duration::from_secs(60))
            .unwrap()
            .anchored_at(anchor(0, 0));

        assert_eq!(cadence.next_delay(at(9, 1, 0)), Duration::from_secs(60));
    }
}
