//! Gemeinsame Mocks für die Integration Tests
//!
//! Nicht jeder Test nutzt jeden Mock.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use embedded_storage::{ReadStorage, Storage};
use esp_core::persist::{self, RelayRecord, StateStore, StoreError};
use esp_core::traits::{Led, RelaySwitch, UpdateConfig, UpdateService, WifiStation};
use esp_core::types::{Payload, QoS, TopicName};
use esp_core::{BrokerClient, BrokerEvent, LineSocket, Outbox, PeerState, TopicListener};

// ============================================================================
// Mock Wi-Fi
// ============================================================================

#[derive(Default)]
pub struct MockWifi {
    pub calls: Vec<&'static str>,
    pub hostname: Option<String>,
    /// Anzahl `pairing_done()`-Aufrufe bis das Pairing fertig ist
    pub pairing_polls: u32,
}

impl WifiStation for MockWifi {
    type Error = ();

    async fn start_station(&mut self, hostname: Option<&str>) -> Result<(), ()> {
        self.calls.push("start_station");
        self.hostname = hostname.map(String::from);
        Ok(())
    }

    fn join(&mut self) -> Result<(), ()> {
        self.calls.push("join");
        Ok(())
    }

    async fn stop_pairing(&mut self) -> Result<(), ()> {
        self.calls.push("stop_pairing");
        Ok(())
    }

    async fn start_pairing(&mut self) -> Result<(), ()> {
        self.calls.push("start_pairing");
        Ok(())
    }

    fn pairing_done(&mut self) -> bool {
        self.calls.push("pairing_done");
        if self.pairing_polls == 0 {
            return true;
        }
        self.pairing_polls -= 1;
        false
    }
}

// ============================================================================
// Mock Update Service
// ============================================================================

#[derive(Default)]
pub struct MockUpdates {
    pub started: bool,
    pub hostname: Option<String>,
    pub password: Option<u32>,
}

impl UpdateService for MockUpdates {
    fn begin(&mut self, config: UpdateConfig<'_>) {
        self.started = true;
        self.hostname = config.hostname.map(String::from);
        self.password = config.password;
    }
}

// ============================================================================
// Mock Socket (Line-Protokoll)
// ============================================================================

pub struct MockSocket {
    pub connected: bool,
    /// Gegenseite hat geschlossen (FIN), ungelesene Daten bleiben lesbar
    pub peer_closed: bool,
    pub accept_connect: bool,
    pub connects: u32,
    pub rx: VecDeque<u8>,
    pub tx: Vec<u8>,
}

impl MockSocket {
    pub fn new() -> Self {
        Self {
            connected: false,
            peer_closed: false,
            accept_connect: true,
            connects: 0,
            rx: VecDeque::new(),
            tx: Vec::new(),
        }
    }

    pub fn inject(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    pub fn sent(&self) -> String {
        String::from_utf8_lossy(&self.tx).into_owned()
    }

    pub fn take_sent(&mut self) -> String {
        let sent = self.sent();
        self.tx.clear();
        sent
    }
}

impl LineSocket for MockSocket {
    type Error = ();

    async fn connect(&mut self) -> Result<(), ()> {
        self.connects += 1;
        if !self.accept_connect {
            return Err(());
        }
        self.connected = true;
        self.peer_closed = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let peer = match (self.connected, self.peer_closed) {
            (false, _) => PeerState::Closed,
            (true, true) => PeerState::HalfClosed,
            (true, false) => PeerState::Open,
        };
        peer.is_open(!self.rx.is_empty())
    }

    fn available(&self) -> bool {
        !self.rx.is_empty()
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let n = buf.len().min(self.rx.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.rx.pop_front().unwrap();
        }
        Ok(n)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), ()> {
        if !self.connected {
            return Err(());
        }
        self.tx.extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
    }
}

// ============================================================================
// Mock Broker Client
// ============================================================================

pub struct MockBroker {
    pub connected: bool,
    pub accept_connect: bool,
    pub connects: u32,
    pub next_packet_id: u16,
    pub subscriptions: Vec<(String, QoS, u16)>,
    pub published: Vec<(String, String)>,
    pub events: VecDeque<BrokerEvent>,
}

impl MockBroker {
    pub fn new() -> Self {
        Self {
            connected: false,
            accept_connect: true,
            connects: 0,
            next_packet_id: 1,
            subscriptions: Vec::new(),
            published: Vec::new(),
            events: VecDeque::new(),
        }
    }

    pub fn deliver(&mut self, topic: &str, payload: &str) {
        self.events.push_back(BrokerEvent::Message {
            topic: TopicName::try_from(topic).unwrap(),
            payload: Payload::try_from(payload).unwrap(),
        });
    }

    pub fn ack(&mut self, packet_id: u16) {
        self.grant(packet_id, QoS::AtLeastOnce);
    }

    /// SUBACK mit der vom Broker gewährten QoS
    pub fn grant(&mut self, packet_id: u16, qos: QoS) {
        self.events.push_back(BrokerEvent::SubAck { packet_id, qos });
    }
}

impl BrokerClient for MockBroker {
    type Error = ();

    async fn connect(&mut self) -> Result<bool, ()> {
        self.connects += 1;
        if !self.accept_connect {
            return Err(());
        }
        self.connected = true;
        Ok(false)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, ()> {
        let packet_id = self.next_packet_id;
        self.next_packet_id += 1;
        self.subscriptions.push((topic.to_string(), qos, packet_id));
        Ok(packet_id)
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), ()> {
        self.published.push((topic.to_string(), payload.to_string()));
        Ok(())
    }

    async fn poll(&mut self) -> Result<Option<BrokerEvent>, ()> {
        Ok(self.events.pop_front())
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

// ============================================================================
// Recording Listener
// ============================================================================

/// Schreibt jeden Callback als Zeile in ein gemeinsames Log
pub struct RecordingListener {
    pub name: &'static str,
    pub log: Rc<RefCell<Vec<String>>>,
    /// Antwort, die bei jeder Nachricht publiziert wird
    pub reply: Option<(&'static str, &'static str)>,
}

impl RecordingListener {
    pub fn new(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Self {
        Self {
            name,
            log: Rc::clone(log),
            reply: None,
        }
    }
}

impl TopicListener for RecordingListener {
    fn on_connect(&self, _out: &mut dyn Outbox, _session_present: bool) {
        self.log.borrow_mut().push(format!("{}:connect", self.name));
    }

    fn on_message(&self, out: &mut dyn Outbox, topic: &str, payload: &str) {
        self.log
            .borrow_mut()
            .push(format!("{}:message:{topic}:{payload}", self.name));
        if let Some((topic, payload)) = self.reply {
            out.publish(topic, payload).unwrap();
        }
    }

    fn on_subscribe(&self, _out: &mut dyn Outbox, topic: &str, qos: QoS) {
        self.log
            .borrow_mut()
            .push(format!("{}:subscribe:{topic}:{}", self.name, qos as u8));
    }
}

// ============================================================================
// Relais, LED, Flash
// ============================================================================

#[derive(Default)]
pub struct MockRelay {
    pub on: Cell<bool>,
    pub writes: Cell<u32>,
}

impl RelaySwitch for MockRelay {
    fn set(&self, on: bool) {
        self.on.set(on);
        self.writes.set(self.writes.get() + 1);
    }
}

#[derive(Default)]
pub struct MockLed {
    pub lit: Cell<Option<bool>>,
}

impl Led for MockLed {
    fn on(&self) {
        self.lit.set(Some(true));
    }

    fn off(&self) {
        self.lit.set(Some(false));
    }
}

/// NOR-Flash im RAM (gelöscht = 0xFF)
pub struct MemFlash {
    pub data: Vec<u8>,
    pub fail_writes: bool,
}

impl MemFlash {
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0xFF; size],
            fail_writes: false,
        }
    }
}

#[derive(Debug)]
pub struct OutOfBounds;

impl ReadStorage for MemFlash {
    type Error = OutOfBounds;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let start = offset as usize;
        let src = self
            .data
            .get(start..start + bytes.len())
            .ok_or(OutOfBounds)?;
        bytes.copy_from_slice(src);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Storage for MemFlash {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.fail_writes {
            return Err(OutOfBounds);
        }
        let start = offset as usize;
        let dst = self
            .data
            .get_mut(start..start + bytes.len())
            .ok_or(OutOfBounds)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }
}

/// `StateStore` über dem RAM-Flash an festem Offset
pub struct FlashStore {
    pub flash: RefCell<MemFlash>,
    pub offset: u32,
}

impl FlashStore {
    pub fn new(offset: u32) -> Self {
        Self {
            flash: RefCell::new(MemFlash::new(4096)),
            offset,
        }
    }
}

impl StateStore for FlashStore {
    fn load(&self) -> RelayRecord {
        persist::load(&mut *self.flash.borrow_mut(), self.offset)
    }

    fn save(&self, record: RelayRecord) -> Result<(), StoreError> {
        persist::save(&mut *self.flash.borrow_mut(), self.offset, record)
    }
}
