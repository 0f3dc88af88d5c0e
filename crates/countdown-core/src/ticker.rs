//! Fixed-interval polling, kept apart from whatever renders each tick.

use std::ops::ControlFlow;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, interval: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Ticker {
    pub interval: Duration,
    pub max_ticks: Option<u64>,
}

impl Ticker {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            max_ticks: None,
        }
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = Some(max_ticks);
        self
    }

    /// Calls `on_tick` with the clock's time and the 0-based tick number,
    /// sleeping one interval between calls. Returns the number of ticks run.
    #[tracing::instrument(skip(self, clock, on_tick), fields(interval_ms = self.interval.as_millis() as u64))]
    pub fn run<C, F>(&self, clock: &C, mut on_tick: F) -> u64
    where
        C: Clock + ?Sized,
        F: FnMut(DateTime<Utc>, u64) -> ControlFlow<()>,
    {
        let mut tick = 0;
        loop {
            if self.max_ticks.is_some_and(|max| tick >= max) {
                debug!(ticks = tick, "tick limit reached");
                return tick;
            }

            let now = clock.now();
            trace!(tick, now = %now, "tick");
            let flow = on_tick(now, tick);
            tick += 1;
            if flow.is_break() {
                debug!(ticks = tick, "ticker stopped by callback");
                return tick;
            }

            if self.max_ticks.is_some_and(|max| tick >= max) {
                debug!(ticks = tick, "tick limit reached");
                return tick;
            }
            clock.sleep(self.interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use chrono::TimeZone;

    use super::*;
    use crate::remaining::{compute_remaining, format_display};

    struct ManualClock {
        now: Cell<DateTime<Utc>>,
        sleeps: RefCell<Vec<Duration>>,
    }

    impl ManualClock {
        fn at(now: DateTime<Utc>) -> Self {
            Self {
                now: Cell::new(now),
                sleeps: RefCell::new(vec![]),
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.now.get()
        }

        fn sleep(&self, interval: Duration) {
            self.sleeps.borrow_mut().push(interval);
            let step = chrono::Duration::from_std(interval).unwrap_or(chrono::Duration::zero());
            self.now.set(self.now.get() + step);
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0)
            .single()
            .expect("valid start")
    }

    #[test]
    fn stops_after_max_ticks_without_trailing_sleep() {
        let clock = ManualClock::at(start());
        let due = start() + chrono::Duration::seconds(65);
        let mut lines = vec![];

        let ran = Ticker::new(Duration::from_secs(1))
            .with_max_ticks(3)
            .run(&clock, |now, _| {
                lines.push(format_display(&compute_remaining(due, now), false));
                ControlFlow::Continue(())
            });

        assert_eq!(ran, 3);
        assert_eq!(lines, vec!["剩余 1分钟 5秒", "剩余 1分钟 4秒", "剩余 1分钟 3秒"]);
        assert_eq!(clock.sleeps.borrow().len(), 2);
    }

    #[test]
    fn callback_can_stop_the_ticker() {
        let clock = ManualClock::at(start());
        let due = start() + chrono::Duration::seconds(2);

        let ran = Ticker::new(Duration::from_secs(1)).run(&clock, |now, _| {
            if compute_remaining(due, now).total_seconds() == 0 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        });

        assert_eq!(ran, 3);
    }

    #[test]
    fn zero_max_ticks_never_calls_back() {
        let clock = ManualClock::at(start());
        let ran = Ticker::new(Duration::from_secs(5))
            .with_max_ticks(0)
            .run(&clock, |_, _| panic!("no ticks expected"));
        assert_eq!(ran, 0);
    }
}
