use std::net::Ipv4Addr;
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::time::Instant;

use igmpv3::network::{self, Engine, InboundFrame, Input};
use igmpv3::protocol::{codec::ROUTER_ALERT, parse_query, parse_report};
use igmpv3::router::ListenerState;
use igmpv3::{Client, ClientConfig, Outgoing, RecordType, Router, RouterConfig};

const GROUP: Ipv4Addr = Ipv4Addr::new(239, 1, 1, 1);

/// Prepends a 24-byte IPv4 header whose only option is Router Alert
fn wrap(message: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(24 + message.len());
    frame.put_u8(0x46);
    frame.put_u8(0xC0);
    frame.put_u16((24 + message.len()) as u16);
    frame.put_u32(0);
    frame.put_u8(1);
    frame.put_u8(2);
    frame.put_u16(0);
    frame.put_slice(&[192, 168, 1, 2]);
    frame.put_slice(&[224, 0, 0, 22]);
    frame.put_slice(&ROUTER_ALERT);
    frame.put_slice(message);
    frame.freeze()
}

fn drain(rx: &mut mpsc::Receiver<Outgoing>) -> Vec<Outgoing> {
    let mut sent = Vec::new();
    while let Ok(message) = rx.try_recv() {
        sent.push(message);
    }
    sent
}

/// Delivers every report queued by the client to interface 0 of the router
fn forward_reports(rx: &mut mpsc::Receiver<Outgoing>, router: &mut Router, now: Instant) -> usize {
    let reports = drain(rx);
    for report in &reports {
        router.on_report_received(&wrap(&report.frame), 24, 0, now);
    }
    reports.len()
}

#[test]
fn test_join_then_leave_expires_group() {
    igmpv3::util::init_tracing();

    let (client_tx, mut client_rx) = mpsc::channel(64);
    let (router_tx, mut router_rx) = mpsc::channel(64);
    let t0 = Instant::now();

    let client_config = ClientConfig {
        seed: Some(5),
        ..ClientConfig::default()
    };
    let mut client = Client::new(client_config, client_tx).unwrap();
    let mut router = Router::new(RouterConfig::default(), router_tx, t0).unwrap();

    // startup General Query reaches the client before it joins anything
    router.handle_timers(t0);
    let queries = drain(&mut router_rx);
    assert_eq!(queries.len(), 1);
    assert!(parse_query(&queries[0].frame).unwrap().is_general());
    client.on_query_received(&wrap(&queries[0].frame), 24, t0);
    assert_eq!(client.qrv(), 2);

    client.join(GROUP, t0).unwrap();
    assert_eq!(forward_reports(&mut client_rx, &mut router, t0), 1);
    let state = router.group(0, GROUP).unwrap();
    assert_eq!(state.listener_state(), ListenerState::ConfirmedListener);

    // retransmission and the delayed General Query response
    let t1 = t0 + Duration::from_secs(10);
    client.handle_timers(t1);
    let reports = drain(&mut client_rx);
    assert_eq!(reports.len(), 2);
    let records: Vec<_> = reports
        .iter()
        .map(|report| parse_report(&report.frame).unwrap().1[0].record_type)
        .collect();
    assert!(records.contains(&RecordType::ChangeToExclude));
    assert!(records.contains(&RecordType::IsExclude));
    for report in &reports {
        router.on_report_received(&wrap(&report.frame), 24, 0, t1);
    }
    assert_eq!(
        router.group(0, GROUP).unwrap().expires_at(),
        Some(t1 + Duration::from_secs(260))
    );

    client.leave(GROUP, t1).unwrap();
    assert_eq!(forward_reports(&mut client_rx, &mut router, t1), 1);
    assert!(router.group(0, GROUP).unwrap().is_probing());

    // the repeated leave restarts the probe
    let repeat = client.next_deadline().unwrap();
    assert!(repeat <= t1 + Duration::from_secs(1));
    router.handle_timers(repeat);
    client.handle_timers(repeat);
    drain(&mut router_rx);
    assert_eq!(forward_reports(&mut client_rx, &mut router, repeat), 1);

    router.handle_timers(repeat + Duration::from_secs(2));
    let probes = drain(&mut router_rx);
    assert_eq!(probes.len(), 2);
    for probe in &probes {
        let query = parse_query(&probe.frame).unwrap();
        assert_eq!(query.group_address, GROUP);
        // the client no longer listens and stays silent
        client.on_query_received(&wrap(&probe.frame), 24, repeat);
    }
    assert!(router.group(0, GROUP).is_none());

    client.handle_timers(repeat + Duration::from_secs(2));
    assert!(drain(&mut client_rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_router_driver_probes_and_expires() {
    let (out_tx, mut out_rx) = mpsc::channel(32);
    let (in_tx, in_rx) = mpsc::channel(32);
    let config = RouterConfig {
        startup_query_count: 0,
        ..RouterConfig::default()
    };
    let mut router = Router::new(config, out_tx, Instant::now()).unwrap();

    let driver = tokio::spawn(async move {
        network::run(&mut router, in_rx).await.unwrap();
        router
    });

    let general = out_rx.recv().await.unwrap();
    assert!(parse_query(&general.frame).unwrap().is_general());

    let records = [
        igmpv3::GroupRecord::new(RecordType::IsExclude, GROUP),
        igmpv3::GroupRecord::new(RecordType::ChangeToInclude, GROUP),
    ];
    let report = igmpv3::protocol::serialize_report(&records);
    in_tx
        .send(Input::Frame(InboundFrame::new(wrap(&report), 24, 0)))
        .await
        .unwrap();

    for _ in 0..2 {
        let probe = out_rx.recv().await.unwrap();
        let query = parse_query(&probe.frame).unwrap();
        assert_eq!(query.group_address, GROUP);
        assert_eq!(query.max_resp_time(), Duration::from_secs(1));
    }

    tokio::time::sleep(Duration::from_secs(3)).await;
    drop(in_tx);
    let router = driver.await.unwrap();
    assert!(router.group(0, GROUP).is_none());
    assert_eq!(router.info().groups, 0);
    assert!(out_rx.try_recv().is_err());
}
