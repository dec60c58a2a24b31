use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Source of the current time for expiry checks and position timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClockError {
    #[error("clock cannot move past the representable time range")]
    OutOfRange,
}

/// Settable clock for simulations and tests.
///
/// Clones share the same underlying instant, so a scenario can keep a handle
/// and advance the time an engine sees.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start.timestamp_millis())),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    /// Move the clock by `by` and return the new time. Out-of-range moves
    /// leave the clock untouched.
    pub fn advance(&self, by: Duration) -> Result<DateTime<Utc>, ClockError> {
        let step = by.num_milliseconds();
        let mut reached = None;
        self.millis
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current.checked_add(step)?;
                reached = Some(DateTime::<Utc>::from_timestamp_millis(next)?);
                Some(next)
            })
            .map_err(|_| ClockError::OutOfRange)?;
        reached.ok_or(ClockError::OutOfRange)
    }

    pub fn advance_days(&self, days: i64) -> Result<DateTime<Utc>, ClockError> {
        let by = Duration::try_days(days).ok_or(ClockError::OutOfRange)?;
        self.advance(by)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}
