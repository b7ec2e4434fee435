use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::time::Instant;

use crate::time::Timer;

/// Groups tracked on one interface
pub type GroupTable = BTreeMap<Ipv4Addr, GroupState>;

/// Whether a probe has already shortened its group's expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbePhase {
    /// No query sent yet; the first one also lowers the group timer
    JustStarted,
    /// At least one query sent
    InProgress,
}

/// A running sequence of Group-Specific Queries
#[derive(Debug, Clone)]
pub struct Probe {
    pub(crate) remaining: u32,
    pub(crate) phase: ProbePhase,
    pub(crate) timer: Timer,
}

impl Probe {
    /// Starts a sequence of `count` queries, the first one due at `now`
    pub fn start(count: u32, now: Instant) -> Self {
        let mut timer = Timer::idle();
        timer.schedule_now(now);
        Probe {
            remaining: count,
            phase: ProbePhase::JustStarted,
            timer,
        }
    }

    /// Queries still to be sent
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn phase(&self) -> ProbePhase {
        self.phase
    }

    pub fn next_query_at(&self) -> Option<Instant> {
        self.timer.deadline()
    }
}

/// Router view of a group, derived from [`GroupState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    /// No listener confirmed since the group was first seen
    NoConfirmedListener,
    /// A listener reported EXCLUDE mode and the group timer is running
    ConfirmedListener,
    /// A listener left and Group-Specific Queries are checking for others
    Probing,
}

/// Filter state of a multicast group on one interface
#[derive(Debug, Clone)]
pub struct GroupState {
    pub(crate) exclude: bool,
    pub(crate) expiry: Timer,
    pub(crate) probe: Option<Probe>,
}

impl GroupState {
    /// A group first seen at `now`, expiring after `lifetime`
    pub fn new(now: Instant, lifetime: Duration) -> Self {
        GroupState {
            exclude: false,
            expiry: Timer::after(now, lifetime),
            probe: None,
        }
    }

    /// Whether at least one listener is known (EXCLUDE filter mode)
    pub fn is_exclude(&self) -> bool {
        self.exclude
    }

    pub fn is_probing(&self) -> bool {
        self.probe.is_some()
    }

    pub fn probe(&self) -> Option<&Probe> {
        self.probe.as_ref()
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expiry.deadline()
    }

    pub fn listener_state(&self) -> ListenerState {
        match (self.exclude, &self.probe) {
            (false, _) => ListenerState::NoConfirmedListener,
            (true, None) => ListenerState::ConfirmedListener,
            (true, Some(_)) => ListenerState::Probing,
        }
    }

    /// S flag for a query about this group: set while the group timer is
    /// still above `last_member_query_time`
    pub fn suppress_flag(&self, now: Instant, last_member_query_time: Duration) -> bool {
        self.expiry
            .remaining(now)
            .map_or(false, |remaining| remaining > last_member_query_time)
    }
}
