//! Host-side membership reporting
//!
//! The [`Client`] answers Membership Queries with randomly delayed reports
//! and announces local joins and leaves with unsolicited state-change
//! reports, retransmitted `qrv - 1` times.

mod membership;

pub use self::membership::Membership;

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::core::{
    is_reportable_group, ClientConfig, Error, Result, ALL_SYSTEMS, DEFAULT_ROBUSTNESS,
};
use crate::network::{Engine, InboundFrame, NetworkHandle, Outgoing};
use crate::protocol::{
    accept_frame, log_records, parse_query, serialize_report, GroupRecord, QueryMessage,
    RecordType,
};
use crate::time::{due, earliest, Jitter, Timer};

/// Local membership commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCommand {
    Join(Ipv4Addr),
    Leave(Ipv4Addr),
}

/// Timer expiries the client reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// Answer a General Query
    GeneralReport,
    /// Answer a Group-Specific Query
    GroupReport(Ipv4Addr),
    /// Repeat an unsolicited state-change report
    Retransmit(Ipv4Addr),
}

/// An unsolicited state-change report still being repeated
#[derive(Debug)]
struct Retransmission {
    frame: Bytes,
    remaining: u8,
    timer: Timer,
}

/// Summary of the client's current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Number of joined groups
    pub memberships: usize,
    /// Robustness learned from the last query
    pub qrv: u8,
    /// Whether a General Query response is scheduled
    pub general_report_pending: bool,
    /// Groups with a scheduled Group-Specific Query response
    pub pending_group_reports: usize,
    /// Groups with a state-change report still being repeated
    pub pending_retransmissions: usize,
}

/// IGMPv3 host state machine
pub struct Client {
    config: ClientConfig,
    membership: Membership,
    /// Querier's robustness variable
    qrv: u8,
    /// Querier's query interval, kept for inspection only
    querier_query_interval: Option<Duration>,
    general_timer: Timer,
    group_timers: BTreeMap<Ipv4Addr, Timer>,
    retransmissions: BTreeMap<Ipv4Addr, Retransmission>,
    jitter: Jitter,
    network: NetworkHandle,
}

impl Client {
    /// Creates a client sending its reports into `message_tx`
    pub fn new(config: ClientConfig, message_tx: mpsc::Sender<Outgoing>) -> Result<Self> {
        config.validate()?;
        Ok(Client {
            qrv: config.robustness,
            jitter: Jitter::new(config.seed),
            config,
            membership: Membership::new(),
            querier_query_interval: None,
            general_timer: Timer::idle(),
            group_timers: BTreeMap::new(),
            retransmissions: BTreeMap::new(),
            network: NetworkHandle::new(message_tx),
        })
    }

    pub fn qrv(&self) -> u8 {
        self.qrv
    }

    pub fn querier_query_interval(&self) -> Option<Duration> {
        self.querier_query_interval
    }

    pub fn is_member(&self, group: Ipv4Addr) -> bool {
        self.membership.contains(group)
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    /// When the pending General Query response fires
    pub fn general_report_deadline(&self) -> Option<Instant> {
        self.general_timer.deadline()
    }

    /// When the pending response for `group` fires
    pub fn group_report_deadline(&self, group: Ipv4Addr) -> Option<Instant> {
        self.group_timers.get(&group).and_then(Timer::deadline)
    }

    /// Restarts the report delay sequence from `seed`
    pub fn reseed(&mut self, seed: u64) {
        self.jitter.reseed(seed);
    }

    /// Gets information about the current state
    pub fn info(&self) -> ClientInfo {
        ClientInfo {
            memberships: self.membership.len(),
            qrv: self.qrv,
            general_report_pending: self.general_timer.is_scheduled(),
            pending_group_reports: self.group_timers.len(),
            pending_retransmissions: self.retransmissions.len(),
        }
    }

    /// Handles a received packet whose IGMP message starts at `offset`
    pub fn on_query_received(&mut self, frame: &[u8], offset: usize, now: Instant) {
        if let Some(query) = accept_frame(frame, offset, parse_query) {
            self.handle_query(&query, now);
        }
    }

    /// Schedules the response to a validated query
    pub fn handle_query(&mut self, query: &QueryMessage, now: Instant) {
        self.qrv = match query.qrv {
            0 => DEFAULT_ROBUSTNESS,
            qrv => qrv,
        };
        if let Some(interval) = query.query_interval() {
            self.querier_query_interval = Some(interval);
        }

        let delay = self.jitter.uniform(query.max_resp_time());

        if query.is_general() {
            match self.general_timer.remaining(now) {
                Some(remaining) if remaining < delay => {
                    debug!(?remaining, "general report already due sooner");
                }
                _ => {
                    debug!(?delay, "scheduling general report");
                    self.general_timer.schedule_after(now, delay);
                }
            }
            return;
        }

        let group = query.group_address;
        match self.group_timers.get_mut(&group) {
            None => {
                debug!(group = %group, ?delay, "scheduling group report");
                self.group_timers.insert(group, Timer::after(now, delay));
            }
            Some(timer) => {
                if timer.remaining(now).map_or(true, |remaining| remaining > delay) {
                    debug!(group = %group, ?delay, "moving group report earlier");
                    timer.schedule_after(now, delay);
                }
            }
        }
    }

    /// Reports every joined group in answer to a General Query
    pub fn on_general_report_timer_fire(&mut self, _now: Instant) {
        self.general_timer.cancel();

        if self.membership.is_empty() {
            debug!("no memberships, general report suppressed");
            return;
        }

        let records: Vec<_> = self
            .membership
            .iter()
            .map(|group| GroupRecord::new(RecordType::IsExclude, group))
            .collect();
        self.transmit(&records, "General");
    }

    /// Reports `group` in answer to a Group-Specific Query
    pub fn on_group_report_timer_fire(&mut self, group: Ipv4Addr, _now: Instant) {
        self.group_timers.remove(&group);

        if !self.membership.contains(group) || group == ALL_SYSTEMS {
            debug!(group = %group, "group report suppressed");
            return;
        }

        self.transmit(&[GroupRecord::new(RecordType::IsExclude, group)], "Group");
    }

    /// Joins `group`, announcing it unless already joined
    pub fn join(&mut self, group: Ipv4Addr, now: Instant) -> Result<()> {
        if !is_reportable_group(group) {
            return Err(Error::InvalidAddress(group));
        }
        if self.membership.add(group) {
            info!(group = %group, "joined group");
            self.schedule_state_change(RecordType::ChangeToExclude, group, now);
        }
        Ok(())
    }

    /// Leaves `group`, announcing it if it was joined
    pub fn leave(&mut self, group: Ipv4Addr, now: Instant) -> Result<()> {
        if !is_reportable_group(group) {
            return Err(Error::InvalidAddress(group));
        }
        if self.membership.remove(group) {
            info!(group = %group, "left group");
            self.schedule_state_change(RecordType::ChangeToInclude, group, now);
        }
        Ok(())
    }

    /// Sends a state-change report now and arms its retransmissions
    ///
    /// Any retransmissions still pending for `group` are replaced. When the
    /// first transmission cannot be queued, the full sequence of `qrv`
    /// transmissions is left to the retransmission timer.
    pub fn schedule_state_change(&mut self, record_type: RecordType, group: Ipv4Addr, now: Instant) {
        if self.retransmissions.remove(&group).is_some() {
            debug!(group = %group, "replaced pending state change");
        }

        let records = [GroupRecord::new(record_type, group)];
        let frame = serialize_report(&records);
        let remaining = if self.send(&frame, &records, "Interface Change") {
            self.qrv - 1
        } else {
            self.qrv
        };

        if remaining == 0 {
            return;
        }

        let delay = self.jitter.uniform(self.config.unsolicited_report_interval);
        debug!(group = %group, remaining, "state change retransmissions armed");
        self.retransmissions.insert(
            group,
            Retransmission {
                frame,
                remaining,
                timer: Timer::after(now, delay),
            },
        );
    }

    /// Repeats the pending state-change report for `group`
    pub fn on_change_retransmit_timer_fire(&mut self, group: Ipv4Addr, now: Instant) {
        let Some(pending) = self.retransmissions.get_mut(&group) else {
            return;
        };

        let interval = self.config.unsolicited_report_interval;
        if let Err(e) = self
            .network
            .send_message(self.config.output_port, pending.frame.clone())
        {
            warn!(group = %group, error = %e, "state change retransmission deferred");
            pending.timer.schedule_after(now, interval);
            return;
        }

        pending.remaining -= 1;
        debug!(group = %group, remaining = pending.remaining, "Interface Change retransmitted");
        if pending.remaining == 0 {
            self.retransmissions.remove(&group);
        } else {
            pending.timer.schedule_after(now, self.jitter.uniform(interval));
        }
    }

    fn transmit(&self, records: &[GroupRecord], context: &str) {
        self.send(&serialize_report(records), records, context);
    }

    fn send(&self, frame: &Bytes, records: &[GroupRecord], context: &str) -> bool {
        match self
            .network
            .send_message(self.config.output_port, frame.clone())
        {
            Ok(()) => {
                log_records(context, records);
                true
            }
            Err(e) => {
                warn!(error = %e, "{} report not sent", context);
                false
            }
        }
    }

    fn events(&self) -> impl Iterator<Item = (Instant, ClientEvent)> + '_ {
        let general = self
            .general_timer
            .deadline()
            .map(|deadline| (deadline, ClientEvent::GeneralReport));
        let groups = self.group_timers.iter().filter_map(|(group, timer)| {
            timer
                .deadline()
                .map(|deadline| (deadline, ClientEvent::GroupReport(*group)))
        });
        let changes = self.retransmissions.iter().filter_map(|(group, pending)| {
            pending
                .timer
                .deadline()
                .map(|deadline| (deadline, ClientEvent::Retransmit(*group)))
        });
        general.into_iter().chain(groups).chain(changes)
    }

    fn deadline_of(&self, event: ClientEvent) -> Option<Instant> {
        match event {
            ClientEvent::GeneralReport => self.general_timer.deadline(),
            ClientEvent::GroupReport(group) => self.group_report_deadline(group),
            ClientEvent::Retransmit(group) => self
                .retransmissions
                .get(&group)
                .and_then(|pending| pending.timer.deadline()),
        }
    }

    fn fire(&mut self, event: ClientEvent, deadline: Instant) {
        match event {
            ClientEvent::GeneralReport => self.on_general_report_timer_fire(deadline),
            ClientEvent::GroupReport(group) => self.on_group_report_timer_fire(group, deadline),
            ClientEvent::Retransmit(group) => self.on_change_retransmit_timer_fire(group, deadline),
        }
    }
}

impl Engine for Client {
    type Command = ClientCommand;

    fn handle_frame(&mut self, frame: &InboundFrame, now: Instant) {
        self.on_query_received(&frame.data, frame.offset, now);
    }

    fn handle_command(&mut self, command: ClientCommand, now: Instant) -> Result<()> {
        match command {
            ClientCommand::Join(group) => self.join(group, now),
            ClientCommand::Leave(group) => self.leave(group, now),
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        earliest(self.events()).map(|(deadline, _)| deadline)
    }

    fn handle_timers(&mut self, now: Instant) {
        // each expiry runs at its own deadline so rescheduled timers keep
        // their spacing when several are handled late
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
