//! Integration Tests für die Pub/Sub-Bindings (Line-Protokoll und Broker)
//!
//! Socket und MQTT-Client sind Mocks; die Zeit wird explizit übergeben.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{MockBroker, MockSocket, RecordingListener};
use embassy_futures::block_on;
use esp_core::line::{ClientId, KEEPALIVE_INTERVAL_MS, RX_CAPACITY};
use esp_core::types::QoS;
use esp_core::{BrokerTransport, LineTransport, LinkError, NetEvent, PubSub};

type Log = Rc<RefCell<Vec<String>>>;

fn line_transport<'a>() -> LineTransport<'a> {
    LineTransport::new(ClientId::try_from("uid1").unwrap())
}

/// Startet das Binding und baut die Verbindung auf (t = 0)
fn connect_line(transport: &mut LineTransport<'_>, socket: &mut MockSocket) {
    transport.begin();
    transport.on_network(NetEvent::GotIp);
    block_on(transport.poll(socket, 0)).unwrap();
    assert!(transport.is_connected());
}

// ============================================================================
// Line-Protokoll: Verbindungsaufbau
// ============================================================================

#[test]
fn test_line_no_connect_before_begin_or_network() {
    let mut transport = line_transport();
    let mut socket = MockSocket::new();

    transport.on_network(NetEvent::GotIp);
    block_on(transport.poll(&mut socket, 0)).unwrap();
    assert_eq!(socket.connects, 0);

    transport.on_network(NetEvent::Disconnected);
    transport.begin();
    block_on(transport.poll(&mut socket, 0)).unwrap();
    assert_eq!(socket.connects, 0);
}

#[test]
fn test_line_connect_subscribes_then_notifies_in_order() {
    let log: Log = Rc::default();
    let first = RecordingListener::new("first", &log);
    let second = RecordingListener::new("second", &log);
    let mut transport = line_transport();
    transport.on_event("foo", &first).unwrap();
    transport.on_event("foo", &second).unwrap();

    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);

    assert_eq!(socket.sent(), "cmd=3&uid=uid1&topic=foo\r\n");
    assert_eq!(*log.borrow(), ["first:connect", "second:connect"]);
}

// ============================================================================
// Line-Protokoll: Empfang
// ============================================================================

#[test]
fn test_line_message_is_dispatched() {
    let log: Log = Rc::default();
    let listener = RecordingListener::new("a", &log);
    let mut transport = line_transport();
    transport.on_event("foo", &listener).unwrap();

    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);
    log.borrow_mut().clear();

    socket.inject(b"cmd=1&topic=foo&msg=on\r\n");
    block_on(transport.poll(&mut socket, 100)).unwrap();

    assert_eq!(*log.borrow(), ["a:message:foo:on"]);
}

#[test]
fn test_line_message_split_across_reads() {
    let log: Log = Rc::default();
    let listener = RecordingListener::new("a", &log);
    let mut transport = line_transport();
    transport.on_event("foo", &listener).unwrap();

    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);
    log.borrow_mut().clear();

    socket.inject(b"cmd=1&topic=fo");
    block_on(transport.poll(&mut socket, 100)).unwrap();
    assert!(log.borrow().is_empty());

    socket.inject(b"o&msg=off\r");
    block_on(transport.poll(&mut socket, 200)).unwrap();
    assert!(log.borrow().is_empty());

    socket.inject(b"\n");
    block_on(transport.poll(&mut socket, 300)).unwrap();
    assert_eq!(*log.borrow(), ["a:message:foo:off"]);
}

#[test]
fn test_line_without_msg_marker_is_dropped() {
    let log: Log = Rc::default();
    let listener = RecordingListener::new("a", &log);
    let mut transport = line_transport();
    transport.on_event("foo", &listener).unwrap();

    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);
    log.borrow_mut().clear();

    socket.inject(b"cmd=1&topic=foo\r\ncmd=1&msg=on\r\n");
    block_on(transport.poll(&mut socket, 100)).unwrap();

    assert!(log.borrow().is_empty());
}

#[test]
fn test_line_unknown_topic_is_dropped() {
    let log: Log = Rc::default();
    let listener = RecordingListener::new("a", &log);
    let mut transport = line_transport();
    transport.on_event("foo", &listener).unwrap();

    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);
    log.borrow_mut().clear();

    socket.inject(b"cmd=1&topic=Foo&msg=on\r\n");
    block_on(transport.poll(&mut socket, 100)).unwrap();

    assert!(log.borrow().is_empty());
}

#[test]
fn test_line_overflow_resynchronizes() {
    let log: Log = Rc::default();
    let listener = RecordingListener::new("a", &log);
    let mut transport = line_transport();
    transport.on_event("foo", &listener).unwrap();

    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);
    log.borrow_mut().clear();

    socket.inject(&[b'x'; RX_CAPACITY]);
    block_on(transport.poll(&mut socket, 100)).unwrap();
    assert_eq!(transport.framer().overflows(), 1);
    assert_eq!(transport.framer().pending(), 0);

    socket.inject(b"cmd=1&topic=foo&msg=on\r\n");
    block_on(transport.poll(&mut socket, 200)).unwrap();
    assert_eq!(*log.borrow(), ["a:message:foo:on"]);
}

// ============================================================================
// Line-Protokoll: Senden
// ============================================================================

#[test]
fn test_line_listener_reply_is_sent_as_publish() {
    let log: Log = Rc::default();
    let mut listener = RecordingListener::new("a", &log);
    listener.reply = Some(("foo/set", "on"));
    let mut transport = line_transport();
    transport.on_event("foo", &listener).unwrap();

    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);
    socket.take_sent();

    socket.inject(b"cmd=1&topic=foo&msg=on\r\n");
    block_on(transport.poll(&mut socket, 100)).unwrap();

    assert_eq!(socket.sent(), "cmd=2&uid=uid1&topic=foo/set&msg=on\r\n");
}

#[test]
fn test_line_publish_outside_callback() {
    let mut transport = line_transport();
    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);

    transport.publish("t", "off").unwrap();
    block_on(transport.poll(&mut socket, 100)).unwrap();

    assert_eq!(socket.sent(), "cmd=2&uid=uid1&topic=t&msg=off\r\n");
}

#[test]
fn test_line_keepalive_interval() {
    let mut transport = line_transport();
    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);

    block_on(transport.poll(&mut socket, KEEPALIVE_INTERVAL_MS - 1)).unwrap();
    assert_eq!(socket.sent(), "");

    block_on(transport.poll(&mut socket, KEEPALIVE_INTERVAL_MS)).unwrap();
    assert_eq!(socket.take_sent(), "ping\r\n");

    block_on(transport.poll(&mut socket, KEEPALIVE_INTERVAL_MS + 100)).unwrap();
    assert_eq!(socket.sent(), "");
}

// ============================================================================
// Line-Protokoll: Reconnect
// ============================================================================

#[test]
fn test_line_failed_connect_retries_after_delay() {
    let mut transport = line_transport();
    let mut socket = MockSocket::new();
    socket.accept_connect = false;
    transport.begin();
    transport.on_network(NetEvent::GotIp);

    assert_eq!(block_on(transport.poll(&mut socket, 0)), Err(LinkError::Io(())));
    assert!(transport.reconnect_pending());

    block_on(transport.poll(&mut socket, 1_999)).unwrap();
    assert_eq!(socket.connects, 1);

    socket.accept_connect = true;
    block_on(transport.poll(&mut socket, 2_000)).unwrap();
    assert_eq!(socket.connects, 2);
    assert!(transport.is_connected());
}

#[test]
fn test_line_peer_close_reconnects_after_delay() {
    let mut transport = line_transport();
    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);

    socket.connected = false;
    block_on(transport.poll(&mut socket, 1_000)).unwrap();
    assert!(!transport.is_connected());
    assert!(transport.reconnect_pending());

    block_on(transport.poll(&mut socket, 3_000)).unwrap();
    assert_eq!(socket.connects, 2);
    assert!(transport.is_connected());
}

#[test]
fn test_line_half_close_drains_then_reconnects() {
    let log: Log = Rc::default();
    let listener = RecordingListener::new("a", &log);
    let mut transport = line_transport();
    transport.on_event("foo", &listener).unwrap();

    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);
    log.borrow_mut().clear();

    // letzte Nachricht, dann FIN der Gegenseite
    socket.inject(b"cmd=1&topic=foo&msg=off\r\n");
    socket.peer_closed = true;
    block_on(transport.poll(&mut socket, 500)).unwrap();
    assert_eq!(*log.borrow(), ["a:message:foo:off"]);
    assert!(transport.is_connected());

    // ausgelesen: Verbindung gilt als verloren, obwohl Senden noch ginge
    block_on(transport.poll(&mut socket, 1_000)).unwrap();
    assert!(!transport.is_connected());
    assert!(transport.reconnect_pending());

    block_on(transport.poll(&mut socket, 2_999)).unwrap();
    assert_eq!(socket.connects, 1);
    block_on(transport.poll(&mut socket, 3_000)).unwrap();
    assert_eq!(socket.connects, 2);
    assert!(transport.is_connected());
}

#[test]
fn test_line_disconnect_cancels_pending_reconnect() {
    let mut transport = line_transport();
    let mut socket = MockSocket::new();
    socket.accept_connect = false;
    transport.begin();
    transport.on_network(NetEvent::GotIp);
    let _ = block_on(transport.poll(&mut socket, 0));
    assert!(transport.reconnect_pending());

    transport.on_network(NetEvent::Disconnected);
    assert!(!transport.reconnect_pending());

    // kein Versuch ohne Netz, auch nach Ablauf der alten Frist
    block_on(transport.poll(&mut socket, 5_000)).unwrap();
    assert_eq!(socket.connects, 1);

    // manueller Reconnect sofort und genau einmal
    socket.accept_connect = true;
    transport.on_network(NetEvent::GotIp);
    block_on(transport.poll(&mut socket, 5_100)).unwrap();
    block_on(transport.poll(&mut socket, 5_200)).unwrap();
    assert_eq!(socket.connects, 2);
}

#[test]
fn test_line_network_loss_closes_socket() {
    let mut transport = line_transport();
    let mut socket = MockSocket::new();
    connect_line(&mut transport, &mut socket);

    transport.on_network(NetEvent::Disconnected);
    block_on(transport.poll(&mut socket, 100)).unwrap();

    assert!(!socket.connected);
    assert!(!transport.is_connected());
}

// ============================================================================
// Broker-Binding
// ============================================================================

fn connect_broker(transport: &mut BrokerTransport<'_>, broker: &mut MockBroker) {
    transport.begin();
    transport.on_network(NetEvent::GotIp);
    block_on(transport.poll(broker, 0)).unwrap();
    assert!(transport.is_connected());
}

#[test]
fn test_broker_subscribes_all_topics_at_qos1_then_notifies() {
    let log: Log = Rc::default();
    let a = RecordingListener::new("a", &log);
    let b = RecordingListener::new("b", &log);
    let mut transport = BrokerTransport::new();
    transport.on_event("foo", &a).unwrap();
    transport.on_event("bar", &b).unwrap();
    transport.on_event("foo", &b).unwrap();

    let mut broker = MockBroker::new();
    connect_broker(&mut transport, &mut broker);

    assert_eq!(
        broker.subscriptions,
        [
            ("foo".to_string(), QoS::AtLeastOnce, 1),
            ("bar".to_string(), QoS::AtLeastOnce, 2)
        ]
    );
    assert_eq!(*log.borrow(), ["a:connect", "b:connect", "b:connect"]);
    assert_eq!(transport.pending_subscriptions(), 2);
}

#[test]
fn test_broker_suback_is_correlated_once() {
    let log: Log = Rc::default();
    let a = RecordingListener::new("a", &log);
    let mut transport = BrokerTransport::new();
    transport.on_event("foo", &a).unwrap();

    let mut broker = MockBroker::new();
    connect_broker(&mut transport, &mut broker);
    log.borrow_mut().clear();

    broker.ack(1);
    broker.ack(1);
    broker.ack(99);
    block_on(transport.poll(&mut broker, 100)).unwrap();

    assert_eq!(*log.borrow(), ["a:subscribe:foo:1"]);
    assert_eq!(transport.pending_subscriptions(), 0);
}

#[test]
fn test_broker_listener_sees_granted_qos() {
    let log: Log = Rc::default();
    let a = RecordingListener::new("a", &log);
    let mut transport = BrokerTransport::new();
    transport.on_event("foo", &a).unwrap();

    let mut broker = MockBroker::new();
    connect_broker(&mut transport, &mut broker);
    assert_eq!(broker.subscriptions[0].1, QoS::AtLeastOnce);
    log.borrow_mut().clear();

    // Broker stuft auf QoS 0 herab
    broker.grant(1, QoS::AtMostOnce);
    block_on(transport.poll(&mut broker, 100)).unwrap();

    assert_eq!(*log.borrow(), ["a:subscribe:foo:0"]);
}

#[test]
fn test_broker_message_fan_out_and_reply() {
    let log: Log = Rc::default();
    let mut a = RecordingListener::new("a", &log);
    a.reply = Some(("foo/set", "on"));
    let b = RecordingListener::new("b", &log);
    let mut transport = BrokerTransport::new();
    transport.on_event("foo", &a).unwrap();
    transport.on_event("foo", &b).unwrap();

    let mut broker = MockBroker::new();
    connect_broker(&mut transport, &mut broker);
    log.borrow_mut().clear();

    broker.deliver("foo", "on");
    broker.deliver("other", "on");
    block_on(transport.poll(&mut broker, 100)).unwrap();

    assert_eq!(*log.borrow(), ["a:message:foo:on", "b:message:foo:on"]);
    assert_eq!(broker.published, [("foo/set".to_string(), "on".to_string())]);
}

#[test]
fn test_broker_reconnects_two_seconds_after_drop() {
    let mut transport = BrokerTransport::new();
    let mut broker = MockBroker::new();
    connect_broker(&mut transport, &mut broker);

    broker.connected = false;
    block_on(transport.poll(&mut broker, 1_000)).unwrap();
    assert!(!transport.is_connected());
    assert!(transport.reconnect_pending());

    block_on(transport.poll(&mut broker, 2_999)).unwrap();
    assert_eq!(broker.connects, 1);

    block_on(transport.poll(&mut broker, 3_000)).unwrap();
    assert_eq!(broker.connects, 2);
    assert!(transport.is_connected());
}

#[test]
fn test_broker_network_loss_cancels_reconnect() {
    let mut transport = BrokerTransport::new();
    let mut broker = MockBroker::new();
    connect_broker(&mut transport, &mut broker);

    broker.connected = false;
    block_on(transport.poll(&mut broker, 1_000)).unwrap();
    transport.on_network(NetEvent::Disconnected);
    assert!(!transport.reconnect_pending());

    block_on(transport.poll(&mut broker, 10_000)).unwrap();
    assert_eq!(broker.connects, 1);

    transport.on_network(NetEvent::GotIp);
    block_on(transport.poll(&mut broker, 10_100)).unwrap();
    assert_eq!(broker.connects, 2);
}

#[test]
fn test_broker_dangling_subscriptions_are_kept() {
    let log: Log = Rc::default();
    let a = RecordingListener::new("a", &log);
    let mut transport = BrokerTransport::new();
    transport.on_event("foo", &a).unwrap();

    let mut broker = MockBroker::new();
    connect_broker(&mut transport, &mut broker);

    // zweite Sitzung ohne SUBACK der ersten
    broker.connected = false;
    block_on(transport.poll(&mut broker, 1_000)).unwrap();
    block_on(transport.poll(&mut broker, 3_000)).unwrap();

    assert_eq!(transport.pending_subscriptions(), 2);
}
