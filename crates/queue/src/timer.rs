//! Single-shot, resettable deadline timer.
//!
//! Wraps [`tokio::time::Sleep`] and makes the fire/stop race explicit: a timer
//! is either disarmed, armed at a deadline, or has fired without the fire
//! having been consumed yet. [`DeadlineTimer::stop`] reports which of the
//! last two it found; a pending fire is consumed by
//! [`acknowledge`](DeadlineTimer::acknowledge) or absorbed by the next
//! [`reset`](DeadlineTimer::reset).

use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{Instant, Sleep};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Disarmed,
    Armed(DateTime<Utc>),
    /// The deadline elapsed but nobody has consumed the fire yet.
    FiredPending,
}

pub struct DeadlineTimer {
    sleep: Pin<Box<Sleep>>,
    state: TimerState,
    idle: Duration,
}

/// Monotonic instant corresponding to a wall-clock deadline. Deadlines in the
/// past map to "now".
fn instant_for(deadline: DateTime<Utc>) -> Instant {
    let wait = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    instant_after(wait)
}

/// Cap for waits that `Instant` cannot represent (about 30 years).
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + wait`, saturating to [`FAR_FUTURE`] instead of overflowing.
fn instant_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

impl DeadlineTimer {
    /// A disarmed timer. The underlying sleep is parked `idle` into the future
    /// as a stand-in for "never".
    pub fn new(idle: Duration) -> Self {
        Self {
            sleep: Box::pin(tokio::time::sleep(idle)),
            state: TimerState::Disarmed,
            idle,
        }
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, TimerState::Armed(_))
    }

    /// The deadline the timer is armed at, if any.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self.state {
            TimerState::Armed(deadline) => Some(deadline),
            _ => None,
        }
    }

    /// Arm the timer at `deadline`. A deadline in the past fires on the next poll.
    ///
    /// Returns `true` if an unconsumed fire was pending and got absorbed; the
    /// new deadline takes over whatever that fire would have released.
    pub fn reset(&mut self, deadline: DateTime<Utc>) -> bool {
        let absorbed = self.state == TimerState::FiredPending;
        self.sleep.as_mut().reset(instant_for(deadline));
        self.state = TimerState::Armed(deadline);
        absorbed
    }

    /// Try to disarm the timer.
    ///
    /// Returns `true` if an armed timer was stopped before it fired. Returns
    /// `false` if it was not armed, or if its deadline already elapsed; in the
    /// latter case the timer moves to [`TimerState::FiredPending`].
    pub fn stop(&mut self) -> bool {
        if !self.is_armed() {
            return false;
        }
        if self.sleep.is_elapsed() || self.sleep.deadline() <= Instant::now() {
            self.state = TimerState::FiredPending;
            return false;
        }
        self.park();
        true
    }

    /// Consume a pending fire. Returns whether there was one.
    pub fn acknowledge(&mut self) -> bool {
        if self.state != TimerState::FiredPending {
            return false;
        }
        self.park();
        true
    }

    /// Wait for the armed deadline and return the wall-clock fire time.
    ///
    /// Never resolves while the timer is not armed. Cancel-safe: dropping the
    /// future leaves the timer untouched.
    pub async fn fired(&mut self) -> DateTime<Utc> {
        if !self.is_armed() {
            std::future::pending::<()>().await;
        }
        self.sleep.as_mut().await;
        self.park();
        Utc::now()
    }

    fn park(&mut self) {
        let parked = instant_after(self.idle);
        self.sleep.as_mut().reset(parked);
        self.state = TimerState::Disarmed;
    }
}
