//! Packet plumbing between the state machines and the host
//!
//! The host delivers inbound frames and commands over an mpsc channel and
//! receives outbound IGMP messages on another. [`run`] owns one engine and
//! processes every frame, command and timer expiry for it from a single
//! task, so no two events for the same instance are ever handled
//! concurrently.

use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use crate::core::{Error, Result};

/// An IGMP message ready for IP encapsulation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// Output the message leaves on; the interface index for routers
    pub port: usize,
    /// Checksummed IGMP message
    pub frame: Bytes,
}

/// A received IP packet carrying an IGMP message
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// Raw packet starting at the IP header
    pub data: Bytes,
    /// Offset of the IGMP message, i.e. the IP header length
    pub offset: usize,
    /// Interface the packet arrived on
    pub port: usize,
}

impl InboundFrame {
    pub fn new(data: Bytes, offset: usize, port: usize) -> Self {
        InboundFrame { data, offset, port }
    }
}

/// Events delivered to an engine
#[derive(Debug, Clone)]
pub enum Input<C> {
    /// A frame received from the network
    Frame(InboundFrame),
    /// A local command, such as a join request
    Command(C),
}

/// Handle for sending messages through the network
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    message_tx: mpsc::Sender<Outgoing>,
}

impl NetworkHandle {
    pub fn new(message_tx: mpsc::Sender<Outgoing>) -> Self {
        NetworkHandle { message_tx }
    }

    /// Queues `frame` on `port` without waiting
    ///
    /// A full or closed channel is reported as [`Error::Transmit`]; the
    /// caller drops the frame and relies on the protocol's own
    /// retransmissions.
    pub fn send_message(&self, port: usize, frame: Bytes) -> Result<()> {
        self.message_tx
            .try_send(Outgoing { port, frame })
            .map_err(|e| Error::transmit(format!("Failed to queue frame: {}", e)))
    }
}

/// A protocol state machine the driver can run
pub trait Engine {
    /// Local commands accepted besides network frames
    type Command;

    /// Processes a received frame; invalid frames are dropped and logged
    fn handle_frame(&mut self, frame: &InboundFrame, now: Instant);

    /// Processes a local command
    fn handle_command(&mut self, command: Self::Command, now: Instant) -> Result<()>;

    /// Earliest scheduled timer, if any
    fn next_deadline(&self) -> Option<Instant>;

    /// Fires every timer due at or before `now`
    fn handle_timers(&mut self, now: Instant);
}

/// Commands of engines that take none
pub type NoCommand = Infallible;

/// Runs `engine` until the inbound channel closes
pub async fn run<E: Engine>(
    engine: &mut E,
    mut inbound: mpsc::Receiver<Input<E::Command>>,
) -> Result<()> {
    loop {
        let deadline = engine.next_deadline();
        let wake = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

        tokio::select! {
            input = inbound.recv() => {
                let Some(input) = input else {
                    debug!("inbound channel closed, stopping engine");
                    return Ok(());
                };
                let now = Instant::now();
                match input {
                    Input::Frame(frame) => engine.handle_frame(&frame, now),
                    Input::Command(command) => {
                        if let Err(e) = engine.handle_command(command, now) {
                            warn!(error = %e, "command rejected");
                        }
                    }
                }
            }
            _ = sleep_until(wake), if deadline.is_some() => {
                engine.handle_timers(Instant::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{Client, ClientCommand};
    use crate::core::ClientConfig;
    use crate::protocol::{parse_report, RecordType};
    use std::net::Ipv4Addr;

    #[test]
    fn test_send_message_reports_full_channel() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = NetworkHandle::new(tx);

        handle.send_message(0, Bytes::from_static(b"one")).unwrap();
        let err = handle.send_message(0, Bytes::from_static(b"two")).unwrap_err();
        assert!(matches!(err, Error::Transmit(_)));

        assert_eq!(rx.try_recv().unwrap().frame, Bytes::from_static(b"one"));
        drop(rx);
        assert!(handle.send_message(1, Bytes::new()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_driver_runs_retransmissions() {
        let (out_tx, mut out_rx) = mpsc::channel(32);
        let (in_tx, in_rx) = mpsc::channel(32);
        let config = ClientConfig {
            seed: Some(1),
            ..ClientConfig::default()
        };
        let mut client = Client::new(config, out_tx).unwrap();

        let driver = tokio::spawn(async move {
            run(&mut client, in_rx).await.unwrap();
            client
        });

        let group = Ipv4Addr::new(239, 1, 1, 1);
        in_tx.send(Input::Command(ClientCommand::Join(group))).await.unwrap();

        // immediate report plus qrv - 1 retransmissions
        for _ in 0..2 {
            let sent = out_rx.recv().await.unwrap();
            let (_, records) = parse_report(&sent.frame).unwrap();
            assert_eq!(records[0].record_type, RecordType::ChangeToExclude);
            assert_eq!(records[0].multicast_address, group);
        }

        drop(in_tx);
        let client = driver.await.unwrap();
        assert_eq!(client.info().pending_retransmissions, 0);
        assert!(client.is_member(group));
        assert!(out_rx.try_recv().is_err());
    }
}
