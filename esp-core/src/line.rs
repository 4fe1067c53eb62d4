//! Line Protocol Connection
//!
//! Textprotokoll über einen rohen TCP-Stream. Jede Nachricht ist eine
//! ASCII-Zeile mit CR LF am Ende, Felder im Format `key=value` mit `&` getrennt.
//!
//! ```text
//! Ausgehend:  cmd=2&uid=<client>&topic=<topic>&msg=<payload>\r\n   (publish)
//!             cmd=3&uid=<client>&topic=<topic>\r\n                  (subscribe)
//!             ping\r\n                                             (keep-alive)
//! Eingehend:  ...&topic=<topic>...&msg=<payload>...\r\n
//! ```
//!
//! Eingehende Zeilen ohne `&topic=` oder `&msg=` werden still verworfen.

use core::fmt::Write;

use heapless::{String, Vec};

use crate::registry::{BufferedOutbox, Outbox, OutboxError, RegistryError, TopicListener, TopicRegistry};
use crate::transport::{PubSub, ReconnectTimer};
use crate::types::NetEvent;

/// Empfangspuffer (eine Zeile inkl. CR LF)
pub const RX_CAPACITY: usize = 256;

/// Maximale Länge einer ausgehenden Zeile
pub const LINE_CAPACITY: usize = 256;

/// Maximale Länge der Client-ID
pub const CLIENT_ID_CAPACITY: usize = 48;

/// Keep-Alive-Intervall
pub const KEEPALIVE_INTERVAL_MS: u32 = 15_000;

/// Keep-Alive-Zeile
pub const PING: &[u8] = b"ping\r\n";

pub type ClientId = String<CLIENT_ID_CAPACITY>;
pub type OutgoingLine = String<LINE_CAPACITY>;

// ============================================================================
// Framing
// ============================================================================

/// Zerlegt einen Byte-Strom in CR-LF-terminierte Zeilen
///
/// Läuft der Puffer ohne Terminator voll, wird er verworfen und die
/// Synchronisation beginnt mit dem nächsten Byte neu.
#[derive(Debug, Default)]
pub struct LineFramer<const N: usize> {
    buf: Vec<u8, N>,
    overflows: u32,
}

impl<const N: usize> LineFramer<N> {
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            overflows: 0,
        }
    }

    /// Ein Byte anhängen; liefert eine vollständige Zeile ohne CR LF
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8, N>> {
        if self.buf.push(byte).is_err() {
            // N == 0
            return None;
        }

        if self.buf.ends_with(b"\r\n") {
            let mut line = core::mem::take(&mut self.buf);
            line.truncate(line.len() - 2);
            return Some(line);
        }

        if self.buf.is_full() {
            self.buf.clear();
            self.overflows = self.overflows.wrapping_add(1);
        }
        None
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Anzahl verworfener Puffer seit dem Start
    pub fn overflows(&self) -> u32 {
        self.overflows
    }

    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

// ============================================================================
// Parsing / Formatting
// ============================================================================

/// Wert eines `&key=`-Feldes bis zum nächsten `&` bzw. Zeilenende
///
/// # Beispiele
///
/// ```
/// # use esp_core::field;
/// assert_eq!(field("cmd=1&topic=foo&msg=on", "topic"), Some("foo"));
/// assert_eq!(field("cmd=1&topic=foo", "msg"), None);
/// ```
pub fn field<'l>(line: &'l str, key: &str) -> Option<&'l str> {
    line.match_indices('&').find_map(|(pos, _)| {
        let value = line[pos + 1..].strip_prefix(key)?.strip_prefix('=')?;
        Some(value.split('&').next().unwrap_or(value))
    })
}

/// Eine eingehende Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineMessage<'l> {
    pub topic: &'l str,
    pub payload: &'l str,
}

/// Parst eine Zeile (ohne CR LF); `None` wenn ein Pflichtfeld fehlt
pub fn parse_line(line: &str) -> Option<LineMessage<'_>> {
    Some(LineMessage {
        topic: field(line, "topic")?,
        payload: field(line, "msg")?,
    })
}

/// Fehler der Line-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError<E> {
    /// Socket-Fehler
    Io(E),
    /// Gegenstelle hat die Verbindung geschlossen
    Closed,
    /// Ausgehende Zeile passt nicht in den Puffer
    LineTooLong,
}

/// `cmd=2` (publish)
pub fn format_publish(uid: &str, topic: &str, payload: &str) -> Result<OutgoingLine, core::fmt::Error> {
    let mut line = OutgoingLine::new();
    write!(line, "cmd=2&uid={uid}&topic={topic}&msg={payload}\r\n")?;
    Ok(line)
}

/// `cmd=3` (subscribe)
pub fn format_subscribe(uid: &str, topic: &str) -> Result<OutgoingLine, core::fmt::Error> {
    let mut line = OutgoingLine::new();
    write!(line, "cmd=3&uid={uid}&topic={topic}\r\n")?;
    Ok(line)
}

// ============================================================================
// Socket
// ============================================================================

/// Verbindungszustand aus Sicht der Gegenseite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Verbindung steht
    Open,
    /// Gegenseite hat FIN gesendet, Senden noch möglich
    HalfClosed,
    Closed,
}

impl PeerState {
    /// Nach einem FIN gilt die Verbindung nur noch als offen, solange
    /// ungelesene Daten anstehen.
    pub fn is_open(self, pending: bool) -> bool {
        match self {
            PeerState::Open => true,
            PeerState::HalfClosed => pending,
            PeerState::Closed => false,
        }
    }
}

/// Roher Byte-Stream zum Cloud-Server
#[allow(async_fn_in_trait)]
pub trait LineSocket {
    type Error;

    /// Verbindung aufbauen
    async fn connect(&mut self) -> Result<(), Self::Error>;

    /// `false` sobald die Gegenseite geschlossen hat und nichts mehr zu lesen ist
    fn is_connected(&self) -> bool;

    /// `true` wenn `read()` sofort Daten liefert
    fn available(&self) -> bool;

    /// Liest verfügbare Bytes; `Ok(0)` = Gegenstelle hat geschlossen
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    async fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    fn close(&mut self);
}

// ============================================================================
// Transport
// ============================================================================

/// Pub/Sub über das Line-Protokoll
pub struct LineTransport<'a> {
    uid: ClientId,
    registry: TopicRegistry<'a>,
    outbox: BufferedOutbox,
    framer: LineFramer<RX_CAPACITY>,
    reconnect: ReconnectTimer,
    started: bool,
    connect_wanted: bool,
    connected: bool,
    last_ping_ms: u32,
}

impl<'a> LineTransport<'a> {
    pub fn new(uid: ClientId) -> Self {
        Self {
            uid,
            registry: TopicRegistry::new(),
            outbox: BufferedOutbox::new(),
            framer: LineFramer::new(),
            reconnect: ReconnectTimer::new(),
            started: false,
            connect_wanted: false,
            connected: false,
            last_ping_ms: 0,
        }
    }

    /// Listener registrieren (wirkt ab dem nächsten Verbindungsaufbau)
    pub fn on_event(&mut self, topic: &str, listener: &'a dyn TopicListener) -> Result<(), RegistryError> {
        self.registry.register(topic, listener)
    }

    pub fn begin(&mut self) {
        self.started = true;
    }

    /// WLAN-Ereignis: Adresse da = verbinden, WLAN weg = trennen
    pub fn on_network(&mut self, event: NetEvent) {
        self.set_connect(event == NetEvent::GotIp);
    }

    /// Nachricht für den nächsten `poll()` einreihen
    pub fn publish(&mut self, topic: &str, payload: &str) -> Result<(), OutboxError> {
        self.outbox.publish(topic, payload)
    }

    /// Dauerhafte Verbindungsabsicht setzen bzw. aufheben
    pub fn set_connect(&mut self, on: bool) {
        self.connect_wanted = on;
        if !on {
            self.reconnect.cancel();
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect.is_pending()
    }

    pub fn framer(&self) -> &LineFramer<RX_CAPACITY> {
        &self.framer
    }

    fn link_lost<S: LineSocket>(&mut self, io: &mut S, now_ms: u32) {
        io.close();
        self.connected = false;
        self.framer.clear();
        if self.connect_wanted {
            self.reconnect.arm(now_ms);
        }
    }

    async fn open<S: LineSocket>(&mut self, io: &mut S, now_ms: u32) -> Result<(), LinkError<S::Error>> {
        io.connect().await.map_err(LinkError::Io)?;
        self.connected = true;
        self.framer.clear();
        self.last_ping_ms = now_ms;

        for topic in self.registry.topics() {
            let line = format_subscribe(&self.uid, topic).map_err(|_| LinkError::LineTooLong)?;
            io.write_all(line.as_bytes()).await.map_err(LinkError::Io)?;
        }
        self.registry.dispatch_connect(&mut self.outbox, false);
        Ok(())
    }

    async fn service<S: LineSocket>(&mut self, io: &mut S, now_ms: u32) -> Result<(), LinkError<S::Error>> {
        let mut chunk = [0u8; 64];
        while io.available() {
            let n = io.read(&mut chunk).await.map_err(LinkError::Io)?;
            if n == 0 {
                return Err(LinkError::Closed);
            }
            for &byte in &chunk[..n] {
                let Some(line) = self.framer.push(byte) else {
                    continue;
                };
                let Ok(text) = core::str::from_utf8(&line) else {
                    continue;
                };
                if let Some(msg) = parse_line(text) {
                    self.registry
                        .dispatch_message(&mut self.outbox, msg.topic, msg.payload);
                }
            }
        }

        if now_ms.wrapping_sub(self.last_ping_ms) >= KEEPALIVE_INTERVAL_MS {
            io.write_all(PING).await.map_err(LinkError::Io)?;
            self.last_ping_ms = now_ms;
        }

        while let Some(message) = self.outbox.pop() {
            let line = format_publish(&self.uid, &message.topic, &message.payload)
                .map_err(|_| LinkError::LineTooLong)?;
            if let Err(e) = io.write_all(line.as_bytes()).await {
                self.outbox.push_front(message);
                return Err(LinkError::Io(e));
            }
        }
        Ok(())
    }
}

impl Outbox for LineTransport<'_> {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), OutboxError> {
        LineTransport::publish(self, topic, payload)
    }
}

impl<'a, S: LineSocket> PubSub<'a, S> for LineTransport<'a> {
    type Error = LinkError<S::Error>;

    fn on_event(&mut self, topic: &str, listener: &'a dyn TopicListener) -> Result<(), RegistryError> {
        LineTransport::on_event(self, topic, listener)
    }

    fn begin(&mut self) {
        LineTransport::begin(self);
    }

    fn on_network(&mut self, event: NetEvent) {
        LineTransport::on_network(self, event);
    }

    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), OutboxError> {
        LineTransport::publish(self, topic, payload)
    }

    async fn poll(&mut self, io: &mut S, now_ms: u32) -> Result<(), Self::Error> {
        if !self.started {
            return Ok(());
        }

        if !self.connect_wanted {
            if self.connected {
                io.close();
                self.connected = false;
                self.framer.clear();
            }
            return Ok(());
        }

        if self.connected && !io.is_connected() {
            self.link_lost(io, now_ms);
        }

        if !self.connected {
            if self.reconnect.is_pending() && !self.reconnect.fire(now_ms) {
                return Ok(());
            }
            if let Err(e) = self.open(io, now_ms).await {
                self.link_lost(io, now_ms);
                return Err(e);
            }
        }

        let result = self.service(io, now_ms).await;
        if result.is_err() {
            self.link_lost(io, now_ms);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_closed_peer_is_open_until_drained() {
        assert!(PeerState::Open.is_open(false));
        assert!(PeerState::HalfClosed.is_open(true));
        assert!(!PeerState::HalfClosed.is_open(false));
        assert!(!PeerState::Closed.is_open(true));
    }

    fn feed<const N: usize>(framer: &mut LineFramer<N>, bytes: &[u8]) -> Option<Vec<u8, N>> {
        let mut last = None;
        for &b in bytes {
            if let Some(line) = framer.push(b) {
                last = Some(line);
            }
        }
        last
    }

    #[test]
    fn test_parse_topic_and_msg() {
        let msg = parse_line("cmd=1&topic=foo&msg=on").unwrap();
        assert_eq!(msg.topic, "foo");
        assert_eq!(msg.payload, "on");
    }

    #[test]
    fn test_parse_fields_in_any_order() {
        let msg = parse_line("cmd=2&msg=off&uid=abc&topic=bar").unwrap();
        assert_eq!(msg.topic, "bar");
        assert_eq!(msg.payload, "off");
    }

    #[test]
    fn test_parse_missing_msg_is_dropped() {
        assert_eq!(parse_line("cmd=1&topic=foo"), None);
        assert_eq!(parse_line("ping"), None);
    }

    #[test]
    fn test_field_needs_ampersand_marker() {
        assert_eq!(field("topic=foo&msg=on", "topic"), None);
        assert_eq!(field("x=1&topicx=foo", "topic"), None);
    }

    #[test]
    fn test_framer_strips_terminator() {
        let mut framer = LineFramer::<32>::new();
        let line = feed(&mut framer, b"abc\r\n").unwrap();
        assert_eq!(line.as_slice(), b"abc");
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_framer_bare_lf_is_not_a_terminator() {
        let mut framer = LineFramer::<32>::new();
        assert!(feed(&mut framer, b"abc\n").is_none());
        assert_eq!(framer.pending(), 4);
    }

    #[test]
    fn test_framer_overflow_resyncs() {
        let mut framer = LineFramer::<8>::new();
        assert!(feed(&mut framer, b"garbage!").is_none());
        assert_eq!(framer.overflows(), 1);
        let line = feed(&mut framer, b"ok\r\n").unwrap();
        assert_eq!(line.as_slice(), b"ok");
    }

    #[test]
    fn test_format_lines() {
        assert_eq!(
            format_publish("uid1", "t", "on").unwrap().as_str(),
            "cmd=2&uid=uid1&topic=t&msg=on\r\n"
        );
        assert_eq!(
            format_subscribe("uid1", "t").unwrap().as_str(),
            "cmd=3&uid=uid1&topic=t\r\n"
        );
    }
}
