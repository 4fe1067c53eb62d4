// MQTT Task - Relais-Topic über einen MQTT-Broker
//
// Registry, Abo-Korrelation und Reconnect stecken in
// `esp_core::BrokerTransport`. Dieser Task baut pro Sitzung Socket und
// rust-mqtt Client auf und reicht sie als `BrokerClient` durch.

use defmt::{Debug2Format, error, info, warn};
use embassy_net::{Stack, tcp::TcpSocket};
use embassy_time::{Duration, with_timeout};
use esp_core::broker::{KEEPALIVE_SECS, PENDING_SUBSCRIPTIONS};
use esp_core::types::{Payload, TopicName};
use esp_core::{BrokerClient, BrokerError, BrokerEvent, BrokerTransport, NetEvent, PubSub, QoS, RelayApp};
use heapless::Deque;

use rust_mqtt::client::client::MqttClient;
use rust_mqtt::client::client_config::{ClientConfig, MqttVersion};
use rust_mqtt::packet::v5::publish_packet::QualityOfService;
use rust_mqtt::packet::v5::reason_codes::ReasonCode;
use rust_mqtt::utils::rng_generator::CountingRng;
use rust_mqtt::utils::types::EncodedString;

use crate::config::{
    CLOUD_CLIENT_ID, CLOUD_HOST, CLOUD_MQTT_PORT, CLOUD_SOCKET_BUFFER_SIZE, MQTT_BUFFER_SIZE,
    MQTT_RECEIVE_WINDOW_MS,
};
use crate::tasks::net::{DnsError, resolve_hostname};
use crate::tasks::relay::{Wake, next_wake, toggle_and_report};
use crate::{NetEventSubscriber, now_ms};

type Client<'a> = MqttClient<'a, TcpSocket<'a>, 5, CountingRng>;

/// Abo-QoS für jedes SUBSCRIBE
///
/// rust-mqtt fordert immer `max_subscribe_qos` an und weist ein SUBACK mit
/// anderem Reason-Code als Fehler zurück. Ein erfolgreiches Abo wurde also
/// genau mit dieser QoS gewährt.
const SUBSCRIBE_QOS: QualityOfService = QualityOfService::QoS1;
const GRANTED_QOS: QoS = QoS::AtLeastOnce;

/// Eine Broker-Sitzung über rust-mqtt
///
/// rust-mqtt wartet in `subscribe_to_topic()` selbst auf das SUBACK. Der
/// Adapter vergibt deshalb eigene Paket-IDs und stellt das SUBACK als
/// Ereignis für den nächsten `poll()` bereit.
pub struct MqttSession<'a> {
    client: Client<'a>,
    connected: bool,
    next_packet_id: u16,
    sub_acks: Deque<BrokerEvent, PENDING_SUBSCRIPTIONS>,
    last_sent_ms: u32,
}

impl<'a> MqttSession<'a> {
    pub fn new(socket: TcpSocket<'a>, send_buffer: &'a mut [u8], recv_buffer: &'a mut [u8]) -> Self {
        let rng = CountingRng(20000);
        let mut config = ClientConfig::<5, _>::new(MqttVersion::MQTTv5, rng);
        config.client_id = EncodedString {
            string: CLOUD_CLIENT_ID,
            len: CLOUD_CLIENT_ID.len() as u16,
        };
        config.keep_alive = KEEPALIVE_SECS;
        config.max_packet_size = MQTT_BUFFER_SIZE as u32;
        config.add_max_subscribe_qos(SUBSCRIBE_QOS);

        let client = MqttClient::new(
            socket,
            send_buffer,
            MQTT_BUFFER_SIZE,
            recv_buffer,
            MQTT_BUFFER_SIZE,
            config,
        );

        Self {
            client,
            connected: false,
            next_packet_id: 1,
            sub_acks: Deque::new(),
            last_sent_ms: 0,
        }
    }

    fn packet_id(&mut self) -> u16 {
        let id = self.next_packet_id;
        // 0 ist keine gültige Paket-ID
        self.next_packet_id = self.next_packet_id.checked_add(1).unwrap_or(1);
        id
    }

    fn failed(&mut self, code: ReasonCode) -> ReasonCode {
        self.connected = false;
        code
    }

    /// PINGREQ nach halbem Keep-Alive ohne eigenes Paket
    async fn keep_alive(&mut self) -> Result<(), ReasonCode> {
        let now = now_ms();
        if now.wrapping_sub(self.last_sent_ms) < u32::from(KEEPALIVE_SECS) * 500 {
            return Ok(());
        }
        self.client.send_ping().await.map_err(|e| self.failed(e))?;
        self.last_sent_ms = now;
        Ok(())
    }
}

impl BrokerClient for MqttSession<'_> {
    type Error = ReasonCode;

    async fn connect(&mut self) -> Result<bool, ReasonCode> {
        self.client
            .connect_to_broker()
            .await
            .map_err(|e| self.failed(e))?;
        self.connected = true;
        self.last_sent_ms = now_ms();
        // rust-mqtt meldet `session_present` nicht
        Ok(false)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<u16, ReasonCode> {
        if qos != GRANTED_QOS {
            info!("MQTT: '{}' requested QoS {}, subscribing with QoS {}", topic, qos as u8, GRANTED_QOS as u8);
        }
        self.client
            .subscribe_to_topic(topic)
            .await
            .map_err(|e| self.failed(e))?;
        self.last_sent_ms = now_ms();

        let packet_id = self.packet_id();
        if self
            .sub_acks
            .push_back(BrokerEvent::SubAck {
                packet_id,
                qos: GRANTED_QOS,
            })
            .is_err()
        {
            warn!("MQTT: SUBACK queue full, '{}' not reported", topic);
        }
        Ok(packet_id)
    }

    async fn publish(&mut self, topic: &str, payload: &str) -> Result<(), ReasonCode> {
        self.client
            .send_message(topic, payload.as_bytes(), QualityOfService::QoS0, false)
            .await
            .map_err(|e| self.failed(e))?;
        self.last_sent_ms = now_ms();
        Ok(())
    }

    async fn poll(&mut self) -> Result<Option<BrokerEvent>, ReasonCode> {
        if let Some(ack) = self.sub_acks.pop_front() {
            return Ok(Some(ack));
        }

        self.keep_alive().await?;

        // Empfang nur kurz abwarten, sonst blockiert der Poll den Task
        let received = with_timeout(
            Duration::from_millis(MQTT_RECEIVE_WINDOW_MS),
            self.client.receive_message(),
        )
        .await;

        let (topic, payload) = match received {
            Err(_) => return Ok(None),
            Ok(Err(e)) => {
                self.connected = false;
                return Err(e);
            }
            Ok(Ok(message)) => message,
        };

        let (Ok(topic), Ok(text)) = (TopicName::try_from(topic), core::str::from_utf8(payload)) else {
            warn!("MQTT: Dropping oversized or binary message");
            return Ok(None);
        };
        let Ok(payload) = Payload::try_from(text) else {
            warn!("MQTT: Dropping oversized message on '{}'", topic.as_str());
            return Ok(None);
        };
        Ok(Some(BrokerEvent::Message { topic, payload }))
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }
}

/// Sitzungsfehler unterhalb des Clients
#[derive(Debug)]
enum SessionError {
    Dns(DnsError),
    TcpConnect,
    Protocol(ReasonCode),
}

impl defmt::Format for SessionError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            SessionError::Dns(e) => defmt::write!(fmt, "{}", e),
            SessionError::TcpConnect => defmt::write!(fmt, "Connection failed"),
            SessionError::Protocol(code) => {
                defmt::write!(fmt, "Protocol error: {}", Debug2Format(code))
            }
        }
    }
}

/// MQTT Task
///
/// Ohne Verbindung wartet der Task nur auf Ereignisse, Button-Drücke und
/// Ticks. Sobald der Transport eine Verbindung will, läuft eine Sitzung,
/// bis sie endet. Den Zeitpunkt des nächsten Versuchs bestimmt der Transport.
///
/// # Parameter
/// - `stack`: embassy-net Stack (Station)
/// - `transport`: Broker-Binding mit registriertem Relais-Listener
/// - `app`: Relais-Anwendung (für kurze Button-Drücke)
/// - `events`: WLAN-Ereignisse
#[embassy_executor::task]
pub async fn mqtt_task(
    stack: &'static Stack<'static>,
    transport: &'static mut BrokerTransport<'static>,
    app: &'static RelayApp<'static>,
    mut events: NetEventSubscriber,
) {
    info!("MQTT: Task started, topic '{}'", app.topic());

    loop {
        if !transport.wants_connection(now_ms()) {
            match next_wake(&mut events).await {
                Wake::Net(event) => transport.on_network(event),
                Wake::Press => toggle_and_report(app, &mut *transport),
                Wake::Tick => {}
            }
            continue;
        }

        match run_session(stack, transport, app, &mut events).await {
            Ok(()) => info!("MQTT: Session closed"),
            Err(e) => error!("MQTT: Error: {}", e),
        }
        if transport.reconnect_pending() {
            info!("MQTT: Reconnecting shortly...");
        }
    }
}

/// Eine Broker-Sitzung: DNS, TCP, dann Poll-Schleife bis zum Verbindungsende
async fn run_session(
    stack: &'static Stack<'static>,
    transport: &mut BrokerTransport<'static>,
    app: &RelayApp<'_>,
    events: &mut NetEventSubscriber,
) -> Result<(), SessionError> {
    info!("MQTT: Resolving '{}'...", CLOUD_HOST);
    let broker_ip = match resolve_hostname(*stack, CLOUD_HOST).await {
        Ok(ip) => ip,
        Err(e) => {
            transport.connect_failed(now_ms());
            return Err(SessionError::Dns(e));
        }
    };

    let mut rx_buffer = [0u8; CLOUD_SOCKET_BUFFER_SIZE];
    let mut tx_buffer = [0u8; CLOUD_SOCKET_BUFFER_SIZE];
    let mut socket = TcpSocket::new(*stack, &mut rx_buffer, &mut tx_buffer);
    socket.set_timeout(Some(Duration::from_secs(u64::from(KEEPALIVE_SECS) * 2)));

    if socket.connect((broker_ip, CLOUD_MQTT_PORT)).await.is_err() {
        transport.connect_failed(now_ms());
        return Err(SessionError::TcpConnect);
    }
    info!("MQTT: TCP connected");

    let mut send_buffer = [0u8; MQTT_BUFFER_SIZE];
    let mut recv_buffer = [0u8; MQTT_BUFFER_SIZE];
    let mut session = MqttSession::new(socket, &mut send_buffer, &mut recv_buffer);

    loop {
        let was_connected = transport.is_connected();
        match transport.poll(&mut session, now_ms()).await {
            Ok(()) => {}
            Err(BrokerError::Client(code)) => return Err(SessionError::Protocol(code)),
        }
        if !transport.is_connected() {
            return Ok(());
        }
        if !was_connected {
            info!("MQTT: Connected to broker");
        }

        match next_wake(events).await {
            Wake::Net(event) => {
                transport.on_network(event);
                if event == NetEvent::Disconnected {
                    session.disconnect();
                }
            }
            Wake::Press => toggle_and_report(app, &mut *transport),
            Wake::Tick => {}
        }
    }
}
