use std::time::Duration;
use tokio::time::Instant;

/// A one-shot deadline owned by the state it belongs to
///
/// A `Timer` never fires on its own. The owning state machine reports its
/// deadlines through `next_deadline` and handles the ones that are due, so
/// dropping the owner drops the timer with it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timer {
    deadline: Option<Instant>,
}

impl Timer {
    /// A timer that is not scheduled
    pub const fn idle() -> Self {
        Timer { deadline: None }
    }

    /// A timer scheduled `delay` after `now`
    pub fn after(now: Instant, delay: Duration) -> Self {
        Timer {
            deadline: Some(now + delay),
        }
    }

    /// (Re)schedules the timer `delay` after `now`
    pub fn schedule_after(&mut self, now: Instant, delay: Duration) {
        self.deadline = Some(now + delay);
    }

    /// (Re)schedules the timer at `now`
    pub fn schedule_now(&mut self, now: Instant) {
        self.deadline = Some(now);
    }

    /// Unschedules the timer; a no-op when idle
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_scheduled(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until expiry, zero once due, `None` when idle
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Returns whether the timer is scheduled at or before `now`
    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(deadline) if deadline <= now)
    }
}
