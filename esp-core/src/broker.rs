//! Broker Binding (MQTT)
//!
//! Pub/Sub über einen fertigen MQTT-Client. Framing, Keep-Alive und
//! Paket-IDs liefert der Client; hier liegen nur Registry, Abo-Korrelation
//! und die Reconnect-Steuerung.
//!
//! # Reconnect
//!
//! - Erster Verbindungsaufbau sobald das WLAN eine Adresse hat
//! - Nach Verbindungsverlust ein einzelner Versuch nach 2s, nur solange
//!   das WLAN noch steht
//! - WLAN weg: ausstehender Reconnect wird abgebrochen
//!
//! # Abo-Korrelation
//!
//! Jede SUBSCRIBE-Paket-ID wird bis zum SUBACK auf ihr Topic abgebildet und
//! beim SUBACK genau einmal verbraucht. Einträge ohne SUBACK verfallen nicht;
//! die Tabelle hat eine feste Kapazität, darüber hinaus werden neue Einträge
//! verworfen und gezählt.

use heapless::LinearMap;

use crate::registry::{BufferedOutbox, Outbox, OutboxError, RegistryError, TopicListener, TopicRegistry};
use crate::transport::{PubSub, ReconnectTimer};
use crate::types::{NetEvent, Payload, QoS, TopicName};

/// Maximale Anzahl offener SUBSCRIBE-Anfragen
pub const PENDING_SUBSCRIPTIONS: usize = 16;

/// Keep-Alive, den der Client mit dem Broker aushandelt
pub const KEEPALIVE_SECS: u16 = 30;

/// Eingehendes Ereignis vom Client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    SubAck { packet_id: u16, qos: QoS },
    Message { topic: TopicName, payload: Payload },
}

/// Verbundener MQTT-Client (eine Sitzung)
#[allow(async_fn_in_trait)]
pub trait BrokerClient {
    type Error;

    /// CONNECT senden und CONNACK abwarten; liefert `session_present`
    async fn connect(&mut self) -> Result<bool, Self::Error>;

    fn is_connected(&self) -> bool;

    /// SUBSCRIBE senden; liefert die Paket-ID
    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, Self::Error>;

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), Self::Error>;

    /// Nächstes eingehendes Ereignis, `None` wenn gerade nichts anliegt
    async fn poll(&mut self) -> Result<Option<BrokerEvent>, Self::Error>;

    fn disconnect(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError<E> {
    Client(E),
}

/// Pub/Sub über einen MQTT-Broker
pub struct BrokerTransport<'a> {
    registry: TopicRegistry<'a>,
    outbox: BufferedOutbox,
    pending: LinearMap<u16, TopicName, PENDING_SUBSCRIPTIONS>,
    dropped_subscriptions: u32,
    reconnect: ReconnectTimer,
    started: bool,
    net_up: bool,
    connect_requested: bool,
    connected: bool,
}

impl<'a> BrokerTransport<'a> {
    pub fn new() -> Self {
        Self {
            registry: TopicRegistry::new(),
            outbox: BufferedOutbox::new(),
            pending: LinearMap::new(),
            dropped_subscriptions: 0,
            reconnect: ReconnectTimer::new(),
            started: false,
            net_up: false,
            connect_requested: false,
            connected: false,
        }
    }

    /// Listener registrieren (wirkt ab dem nächsten Verbindungsaufbau)
    pub fn on_event(&mut self, topic: &str, listener: &'a dyn TopicListener) -> Result<(), RegistryError> {
        self.registry.register(topic, listener)
    }

    pub fn begin(&mut self) {
        self.started = true;
    }

    /// WLAN-Ereignis: Verbindung anfordern bzw. Reconnect abbrechen
    pub fn on_network(&mut self, event: NetEvent) {
        match event {
            NetEvent::GotIp => {
                self.net_up = true;
                self.connect_requested = true;
            }
            NetEvent::Disconnected => {
                self.net_up = false;
                self.connect_requested = false;
                self.reconnect.cancel();
            }
        }
    }

    /// Nachricht für den nächsten `poll()` einreihen
    pub fn publish(&mut self, topic: &str, payload: &str) -> Result<(), OutboxError> {
        self.outbox.publish(topic, payload)
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_pending()
    }

    /// Offene SUBSCRIBE-Anfragen ohne SUBACK
    pub fn pending_subscriptions(&self) -> usize {
        self.pending.len()
    }

    /// Wegen voller Tabelle nicht korrelierte SUBSCRIBE-Anfragen
    pub fn dropped_subscriptions(&self) -> u32 {
        self.dropped_subscriptions
    }

    /// `true` wenn der nächste `poll()` eine Verbindung aufbauen würde
    ///
    /// Die Firmware baut erst dann Socket und Client auf.
    pub fn wants_connection(&self, now_ms: u32) -> bool {
        self.started
            && self.net_up
            && !self.connected
            && (self.connect_requested || self.reconnect.is_due(now_ms))
    }

    /// Verbindungsaufbau unterhalb des Clients gescheitert (z.B. TCP)
    pub fn connect_failed(&mut self, now_ms: u32) {
        self.connect_requested = false;
        self.connection_lost(now_ms);
    }

    fn connection_lost(&mut self, now_ms: u32) {
        self.connected = false;
        if self.net_up {
            self.reconnect.arm(now_ms);
        }
    }

    async fn open<C: BrokerClient>(&mut self, io: &mut C) -> Result<(), C::Error> {
        let session_present = io.connect().await?;
        self.connected = true;

        for topic in self.registry.topics() {
            let packet_id = io.subscribe(topic, QoS::AtLeastOnce).await?;
            let Ok(name) = TopicName::try_from(topic) else {
                continue;
            };
            if self.pending.insert(packet_id, name).is_err() {
                self.dropped_subscriptions = self.dropped_subscriptions.wrapping_add(1);
            }
        }

        self.registry.dispatch_connect(&mut self.outbox, session_present);
        Ok(())
    }

    fn handle(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::SubAck { packet_id, qos } => {
                if let Some(topic) = self.pending.remove(&packet_id) {
                    self.registry.dispatch_subscribe(&mut self.outbox, &topic, qos);
                }
            }
            BrokerEvent::Message { topic, payload } => {
                self.registry.dispatch_message(&mut self.outbox, &topic, &payload);
            }
        }
    }

    async fn service<C: BrokerClient>(&mut self, io: &mut C) -> Result<(), C::Error> {
        while let Some(event) = io.poll().await? {
            self.handle(event);
        }

        while let Some(message) = self.outbox.pop() {
            if let Err(e) = io.publish(&message.topic, &message.payload).await {
                self.outbox.push_front(message);
                return Err(e);
            }
        }
        Ok(())
    }
}

impl Default for BrokerTransport<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox for BrokerTransport<'_> {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), OutboxError> {
        BrokerTransport::publish(self, topic, payload)
    }
}

impl<'a, C: BrokerClient> PubSub<'a, C> for BrokerTransport<'a> {
    type Error = BrokerError<C::Error>;

    fn on_event(&mut self, topic: &str, listener: &'a dyn TopicListener) -> Result<(), RegistryError> {
        BrokerTransport::on_event(self, topic, listener)
    }

    fn begin(&mut self) {
        BrokerTransport::begin(self);
    }

    fn on_network(&mut self, event: NetEvent) {
        BrokerTransport::on_network(self, event);
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), OutboxError> {
        BrokerTransport::publish(self, topic, payload)
    }

    async fn poll(&mut self, io: &mut C, now_ms: u32) -> Result<(), Self::Error> {
        if !self.started {
            return Ok(());
        }

        if self.connected && !io.is_connected() {
            self.connection_lost(now_ms);
        }

        if !self.connected {
            if !self.wants_connection(now_ms) {
                return Ok(());
            }
            self.connect_requested = false;
            self.reconnect.cancel();

            if let Err(e) = self.open(io).await {
                io.disconnect();
                self.connection_lost(now_ms);
                return Err(BrokerError::Client(e));
            }
        }

        if let Err(e) = self.service(io).await {
            io.disconnect();
            self.connection_lost(now_ms);
            return Err(BrokerError::Client(e));
        }
        Ok(())
    }
}
