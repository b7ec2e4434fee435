//! Router-side querier
//!
//! The [`Router`] keeps per-interface group state from received reports,
//! sends periodic General Queries on every interface, and probes a group
//! with Group-Specific Queries when a listener leaves.

mod group;

pub use self::group::{GroupState, GroupTable, ListenerState, Probe, ProbePhase};

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::core::{is_reportable_group, InterfaceId, Result, RouterConfig};
use crate::network::{Engine, InboundFrame, NetworkHandle, NoCommand, Outgoing};
use crate::protocol::{
    accept_frame, encode_interval, log_records, parse_report, serialize_query, GroupRecord,
    QueryMessage,
};
use crate::time::{due, earliest, Timer};
use crate::util::{to_deciseconds, to_seconds};

/// Timer expiries the router reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouterEvent {
    /// Send General Queries on every interface
    GeneralQuery,
    /// Send the next Group-Specific Query of a probe
    Probe(InterfaceId, Ipv4Addr),
    /// Drop a group nobody refreshed
    GroupExpire(InterfaceId, Ipv4Addr),
}

/// Summary of the router's current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterInfo {
    /// Interfaces on which at least one report was seen
    pub active_interfaces: usize,
    /// Groups tracked across all interfaces
    pub groups: usize,
    /// Groups with a confirmed listener
    pub excluded_groups: usize,
    /// Groups being probed
    pub probing_groups: usize,
    /// General Queries still to be sent at the startup interval
    pub startup_queries_remaining: u32,
}

/// IGMPv3 router state machine
pub struct Router {
    config: RouterConfig,
    interfaces: BTreeMap<InterfaceId, GroupTable>,
    general_timer: Timer,
    startup_remaining: u32,
    network: NetworkHandle,
}

impl Router {
    /// Creates a router sending its queries into `message_tx`
    ///
    /// The first General Query is due at `now`.
    pub fn new(
        config: RouterConfig,
        message_tx: mpsc::Sender<Outgoing>,
        now: Instant,
    ) -> Result<Self> {
        config.validate()?;
        let mut general_timer = Timer::idle();
        general_timer.schedule_now(now);
        Ok(Router {
            startup_remaining: config.startup_query_count,
            config,
            interfaces: BTreeMap::new(),
            general_timer,
            network: NetworkHandle::new(message_tx),
        })
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// State of `group` on `interface`, if tracked
    pub fn group(&self, interface: InterfaceId, group: Ipv4Addr) -> Option<&GroupState> {
        self.interfaces.get(&interface)?.get(&group)
    }

    /// Groups tracked on `interface` in address order
    pub fn groups(&self, interface: InterfaceId) -> impl Iterator<Item = (Ipv4Addr, &GroupState)> {
        self.interfaces
            .get(&interface)
            .into_iter()
            .flat_map(|table| table.iter().map(|(group, state)| (*group, state)))
    }

    /// When the next General Query goes out
    pub fn next_general_query(&self) -> Option<Instant> {
        self.general_timer.deadline()
    }

    /// Gets information about the current state
    pub fn info(&self) -> RouterInfo {
        let states = || self.interfaces.values().flat_map(|table| table.values());
        RouterInfo {
            active_interfaces: self.interfaces.len(),
            groups: states().count(),
            excluded_groups: states().filter(|state| state.is_exclude()).count(),
            probing_groups: states().filter(|state| state.is_probing()).count(),
            startup_queries_remaining: self.startup_remaining,
        }
    }

    /// Handles a packet received on `interface` whose IGMP message starts
    /// at `offset`
    pub fn on_report_received(
        &mut self,
        frame: &[u8],
        offset: usize,
        interface: InterfaceId,
        now: Instant,
    ) {
        if let Some((_, records)) = accept_frame(frame, offset, parse_report) {
            log_records("Received", &records);
            self.process_report(&records, interface, now);
        }
    }

    /// Applies the records of a validated report to `interface`
    pub fn process_report(&mut self, records: &[GroupRecord], interface: InterfaceId, now: Instant) {
        if interface >= self.config.interfaces {
            warn!(interface, "report on unconfigured interface");
        }

        let lifetime = self.config.group_membership_interval;
        let probe_count = self.config.last_member_query_count;
        let table = self.interfaces.entry(interface).or_default();

        for record in records {
            let group = record.multicast_address;
            if !is_reportable_group(group) {
                debug!(interface, group = %group, "ignoring record");
                continue;
            }
            let record_type = record.record_type;
            if !record_type.is_exclude() && !record_type.is_include() {
                trace!(interface, group = %group, %record_type, "source list change ignored");
                continue;
            }

            let state = table.entry(group).or_insert_with(|| {
                debug!(interface, group = %group, "tracking new group");
                GroupState::new(now, lifetime)
            });

            if record_type.is_exclude() {
                if !state.exclude {
                    info!(interface, group = %group, "listener confirmed");
                }
                state.exclude = true;
                state.expiry.schedule_after(now, lifetime);
            } else if state.exclude {
                if state.probe.is_some() {
                    debug!(interface, group = %group, "restarting probe");
                } else {
                    debug!(interface, group = %group, "probing for remaining listeners");
                }
                state.probe = Some(Probe::start(probe_count, now));
            }
        }
    }

    /// Forgets `group` on `interface`
    pub fn on_group_expire_timer_fire(&mut self, interface: InterfaceId, group: Ipv4Addr, _now: Instant) {
        let Some(table) = self.interfaces.get_mut(&interface) else {
            return;
        };
        if let Some(state) = table.get_mut(&group) {
            if state.exclude {
                state.exclude = false;
                info!(interface, group = %group, "no listeners left");
            }
        }
        if table.remove(&group).is_some() {
            debug!(interface, group = %group, "group expired");
        }
    }

    /// Sends the next Group-Specific Query of the probe on `group`
    ///
    /// The first query of a probe also lowers the group timer to the last
    /// member query time. A query that cannot be queued is retried after
    /// the last member query interval without counting against the probe.
    pub fn on_specific_query_probe_fire(&mut self, interface: InterfaceId, group: Ipv4Addr, now: Instant) {
        let last_member_query_time = self.config.last_member_query_time();
        let interval = self.config.last_member_query_interval;

        let suppress = match self.group(interface, group) {
            Some(state) if state.is_probing() => {
                state.suppress_flag(now, last_member_query_time)
            }
            _ => return,
        };
        let sent = self.send_group_specific_query(interface, group, suppress);

        let Some(state) = self
            .interfaces
            .get_mut(&interface)
            .and_then(|table| table.get_mut(&group))
        else {
            return;
        };
        let Some(probe) = state.probe.as_mut() else {
            return;
        };

        if let Err(e) = sent {
            warn!(interface, group = %group, error = %e, "group-specific query deferred");
            probe.timer.schedule_after(now, interval);
            return;
        }

        probe.remaining = probe.remaining.saturating_sub(1);
        if probe.phase == ProbePhase::JustStarted {
            probe.phase = ProbePhase::InProgress;
            state.expiry.schedule_after(now, last_member_query_time);
        }

        if probe.remaining == 0 {
            debug!(interface, group = %group, "probe complete");
            state.probe = None;
        } else {
            probe.timer.schedule_after(now, interval);
        }
    }

    /// Sends General Queries and reschedules the next round
    pub fn on_general_query_timer_fire(&mut self, now: Instant) {
        self.send_general_queries();

        if self.startup_remaining > 0 {
            self.startup_remaining -= 1;
            self.general_timer
                .schedule_after(now, self.config.startup_query_interval);
        } else {
            self.general_timer.schedule_after(now, self.config.query_interval);
        }
    }

    /// Sends a Group-Specific Query for `group` on `interface`
    pub fn send_group_specific_query(
        &self,
        interface: InterfaceId,
        group: Ipv4Addr,
        suppress: bool,
    ) -> Result<()> {
        let query = QueryMessage::group_specific(
            group,
            encode_interval(to_deciseconds(self.config.last_member_query_interval)),
            self.config.robustness,
            encode_interval(to_seconds(self.config.query_interval)),
            suppress,
        );
        self.network.send_message(interface, serialize_query(&query))?;
        debug!(interface, group = %group, suppress, "Sent group-specific query");
        Ok(())
    }

    /// Sends a General Query on every configured interface
    ///
    /// Interfaces whose query cannot be queued are skipped and logged.
    pub fn send_general_queries(&self) {
        let query = QueryMessage::general(
            encode_interval(to_deciseconds(self.config.query_response_interval)),
            self.config.robustness,
            encode_interval(to_seconds(self.config.query_interval)),
        );
        let frame = serialize_query(&query);

        for interface in 0..self.config.interfaces {
            match self.network.send_message(interface, frame.clone()) {
                Ok(()) => trace!(interface, "Sent general query"),
                Err(e) => warn!(interface, error = %e, "general query not sent"),
            }
        }
    }

    fn events(&self) -> impl Iterator<Item = (Instant, RouterEvent)> + '_ {
        let general = self
            .general_timer
            .deadline()
            .map(|deadline| (deadline, RouterEvent::GeneralQuery));
        let groups = self.interfaces.iter().flat_map(|(interface, table)| {
            table.iter().flat_map(move |(group, state)| {
                let probe = state
                    .probe
                    .as_ref()
                    .and_then(|probe| probe.timer.deadline())
                    .map(|deadline| (deadline, RouterEvent::Probe(*interface, *group)));
                let expiry = state
                    .expiry
                    .deadline()
                    .map(|deadline| (deadline, RouterEvent::GroupExpire(*interface, *group)));
                probe.into_iter().chain(expiry)
            })
        });
        general.into_iter().chain(groups)
    }

    fn deadline_of(&self, event: RouterEvent) -> Option<Instant> {
        match event {
            RouterEvent::GeneralQuery => self.general_timer.deadline(),
            RouterEvent::Probe(interface, group) => self
                .group(interface, group)
                .and_then(GroupState::probe)
                .and_then(Probe::next_query_at),
            RouterEvent::GroupExpire(interface, group) => {
                self.group(interface, group).and_then(GroupState::expires_at)
            }
        }
    }

    fn fire(&mut self, event: RouterEvent, deadline: Instant) {
        match event {
            RouterEvent::GeneralQuery => self.on_general_query_timer_fire(deadline),
            RouterEvent::Probe(interface, group) => {
                self.on_specific_query_probe_fire(interface, group, deadline)
            }
            RouterEvent::GroupExpire(interface, group) => {
                self.on_group_expire_timer_fire(interface, group, deadline)
            }
        }
    }
}

impl Engine for Router {
    type Command = NoCommand;

    fn handle_frame(&mut self, frame: &InboundFrame, now: Instant) {
        self.on_report_received(&frame.data, frame.offset, frame.port, now);
    }

    fn handle_command(&mut self, command: NoCommand, _now: Instant) -> Result<()> {
        match command {}
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest(self.events()).map(|(deadline, _)| deadline)
    }

    fn handle_timers(&mut self, now: Instant) {
        // a probe moves its group's expiry, so entries of a batch are
        // checked against their current deadline before firing
        loop {
            let batch = due(self.events(), now);
            if batch.is_empty() {
                break;
            }
            for (deadline, event) in batch {
                if self.deadline_of(event) == Some(deadline) {
                    self.fire(event, deadline);
                }
            }
        }
    }
}
