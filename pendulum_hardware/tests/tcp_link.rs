//! Loopback tests for the TCP device link.
//!
//! A local `TcpListener` stands in for the controller so the read loop,
//! framing and teardown paths run against a real socket.

use crossbeam_channel as xch;
use pendulum_hardware::{LinkError, TRIGGER_TOKEN, TcpDeviceLink};
use pendulum_traits::{DeviceLink, LinkEvent};
use rstest::rstest;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

// Far more than the loopback socket buffers hold while the peer is not reading.
const STALLING_FRAME_LEN: usize = 64 << 20;

fn listener() -> (TcpListener, u16) {
    let l = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
    let port = l.local_addr().expect("local addr").port();
    (l, port)
}

#[test]
fn frames_flow_both_ways() {
    let (server, port) = listener();
    let (tx, rx) = xch::unbounded();
    let link = TcpDeviceLink::new("station-a", "127.0.0.1", port, tx);

    link.open(Duration::from_secs(1)).expect("connect");
    let (mut peer, _) = server.accept().expect("accept");
    assert!(link.is_connected());

    peer.write_all(TRIGGER_TOKEN.as_bytes()).unwrap();
    match rx.recv_timeout(Duration::from_secs(1)).expect("frame") {
        LinkEvent::Frame(bytes) => assert_eq!(bytes, TRIGGER_TOKEN.as_bytes()),
        other => panic!("expected frame, got {other:?}"),
    }

    link.send(&[0xFE, 0x05, 0x00, 0x00]).expect("send");
    let mut buf = [0u8; 4];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(buf, [0xFE, 0x05, 0x00, 0x00]);

    link.disconnect();
    assert!(!link.is_connected());
}

fn wait_closed(rx: &xch::Receiver<LinkEvent>) {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(LinkEvent::Closed) => break,
            Ok(_) => {}
            Err(_) if Instant::now() < deadline => {}
            Err(e) => panic!("no close event: {e}"),
        }
    }
}

#[rstest]
#[case::never_opened(false)]
#[case::closed_by_controller(true)]
fn send_without_live_connection_is_not_connected(#[case] open_then_close: bool) {
    let (server, port) = listener();
    let (tx, rx) = xch::unbounded();
    let link = TcpDeviceLink::new("station-a", "127.0.0.1", port, tx);
    if open_then_close {
        link.open(Duration::from_secs(1)).expect("connect");
        let (peer, _) = server.accept().expect("accept");
        drop(peer);
        wait_closed(&rx);
    }
    assert!(!link.is_connected());
    let err = link.write_frame(b"x").unwrap_err();
    assert!(matches!(err, LinkError::NotConnected), "got {err:?}");
}

#[test]
fn remote_close_ends_read_loop() {
    let (server, port) = listener();
    let (tx, rx) = xch::unbounded();
    let link = TcpDeviceLink::new("station-a", "127.0.0.1", port, tx);
    link.open(Duration::from_secs(1)).expect("connect");
    let (peer, _) = server.accept().expect("accept");
    drop(peer);

    wait_closed(&rx);
    assert!(!link.is_connected());
    assert!(link.write_frame(b"x").is_err());
}

#[test]
fn stalled_write_times_out() {
    let (server, port) = listener();
    let (tx, _rx) = xch::unbounded();
    let link = TcpDeviceLink::new("station-a", "127.0.0.1", port, tx);
    link.open(Duration::from_millis(300)).expect("connect");
    let (_peer, _) = server.accept().expect("accept");

    let start = Instant::now();
    let res = link.write_frame(&vec![0u8; STALLING_FRAME_LEN]);
    assert!(res.is_err(), "write to a peer that never reads should fail");
    assert!(
        start.elapsed() < Duration::from_secs(3),
        "write took {:?}",
        start.elapsed()
    );
}

#[test]
fn disconnect_is_not_blocked_by_a_stalled_write() {
    let (server, port) = listener();
    let (tx, _rx) = xch::unbounded();
    let link = Arc::new(TcpDeviceLink::new("station-a", "127.0.0.1", port, tx));
    link.open(Duration::from_secs(5)).expect("connect");
    let (_peer, _) = server.accept().expect("accept");

    let writer = {
        let link = link.clone();
        thread::spawn(move || link.write_frame(&vec![0u8; STALLING_FRAME_LEN]))
    };
    thread::sleep(Duration::from_millis(300));

    let (done_tx, done_rx) = xch::bounded(1);
    {
        let link = link.clone();
        thread::spawn(move || {
            link.disconnect();
            let _ = done_tx.send(());
        });
    }
    assert!(
        done_rx.recv_timeout(Duration::from_secs(1)).is_ok(),
        "disconnect waited on the blocked write"
    );
    assert!(!link.is_connected());
    let res = writer.join().expect("writer thread");
    assert!(res.is_err());
}

#[test]
fn refused_connect_surfaces_error() {
    let (server, port) = listener();
    drop(server);
    let (tx, _rx) = xch::unbounded();
    let link = TcpDeviceLink::new("station-a", "127.0.0.1", port, tx);
    assert!(link.connect(Duration::from_millis(500)).is_err());
    assert!(!link.is_connected());
}

#[test]
fn disconnect_is_prompt_and_idempotent() {
    let (server, port) = listener();
    let (tx, _rx) = xch::unbounded();
    let link = TcpDeviceLink::new("station-a", "127.0.0.1", port, tx);
    link.open(Duration::from_secs(1)).expect("connect");
    let (_peer, _) = server.accept().expect("accept");

    let start = Instant::now();
    link.disconnect();
    link.disconnect();
    assert!(
        start.elapsed() < Duration::from_millis(500),
        "disconnect took {:?}",
        start.elapsed()
    );
}

#[test]
fn reconnect_after_disconnect() {
    let (server, port) = listener();
    let (tx, _rx) = xch::unbounded();
    let link = TcpDeviceLink::new("station-a", "127.0.0.1", port, tx);
    link.open(Duration::from_secs(1)).expect("first connect");
    let _first = server.accept().expect("accept first");
    link.disconnect();

    link.open(Duration::from_secs(1)).expect("second connect");
    let _second = server.accept().expect("accept second");
    assert!(link.is_connected());
}
