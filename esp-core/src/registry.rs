//! Topic Listener Registry
//!
//! Gemeinsame Grundlage beider Pub/Sub-Bindings: eine geordnete Abbildung
//! Topic → Liste von Listenern. Einfügereihenfolge = Dispatch-Reihenfolge,
//! Topics sind case-sensitiv und eindeutig.
//!
//! Listener publizieren nicht direkt auf die Verbindung, sondern über eine
//! [`Outbox`]. Das Binding leert die Outbox nach jedem Dispatch asynchron.

use heapless::{Deque, Vec};

use crate::types::{
    MAX_LISTENERS_PER_TOPIC, MAX_TOPICS, Payload, QoS, TopicName,
};

/// Anzahl gepufferter ausgehender Nachrichten
pub const OUTBOX_CAPACITY: usize = 4;

// ============================================================================
// Outbox
// ============================================================================

/// Fehler beim Einreihen einer Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxError {
    /// Warteschlange voll
    Full,
    /// Topic oder Payload zu lang
    TooLong,
}

#[cfg(feature = "defmt")]
impl defmt::Format for OutboxError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            OutboxError::Full => defmt::write!(fmt, "outbox full"),
            OutboxError::TooLong => defmt::write!(fmt, "message too long"),
        }
    }
}

/// Ausgehende Nachrichten aus Listener-Callbacks
pub trait Outbox {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), OutboxError>;
}

/// Eine ausgehende Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub topic: TopicName,
    pub payload: Payload,
}

/// FIFO-Outbox mit fester Kapazität
#[derive(Debug, Default)]
pub struct BufferedOutbox {
    queue: Deque<OutgoingMessage, OUTBOX_CAPACITY>,
}

impl BufferedOutbox {
    pub const fn new() -> Self {
        Self {
            queue: Deque::new(),
        }
    }

    /// Älteste Nachricht entnehmen
    pub fn pop(&mut self) -> Option<OutgoingMessage> {
        self.queue.pop_front()
    }

    /// Nachricht nach fehlgeschlagenem Senden wieder vorne einreihen
    pub fn push_front(&mut self, message: OutgoingMessage) {
        // Platz ist frei, die Nachricht kam gerade erst heraus
        let _ = self.queue.push_front(message);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl Outbox for BufferedOutbox {
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), OutboxError> {
        let topic = TopicName::try_from(topic).map_err(|_| OutboxError::TooLong)?;
        let payload = Payload::try_from(payload).map_err(|_| OutboxError::TooLong)?;
        self.queue
            .push_back(OutgoingMessage { topic, payload })
            .map_err(|_| OutboxError::Full)
    }
}

// ============================================================================
// Listener
// ============================================================================

/// Callback-Bündel eines Topics
///
/// Alle Methoden sind optional (Default: nichts tun).
pub trait TopicListener {
    /// Verbindung aufgebaut (nach dem Abonnieren aller Topics)
    fn on_connect(&self, out: &mut dyn Outbox, session_present: bool) {
        let _ = (out, session_present);
    }

    /// Nachricht auf einem registrierten Topic empfangen
    fn on_message(&self, out: &mut dyn Outbox, topic: &str, payload: &str) {
        let _ = (out, topic, payload);
    }

    /// Abonnement bestätigt (nur Broker-Binding)
    fn on_subscribe(&self, out: &mut dyn Outbox, topic: &str, qos: QoS) {
        let _ = (out, topic, qos);
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Fehler beim Registrieren eines Listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    TooManyTopics,
    TooManyListeners,
    TopicTooLong,
}

struct TopicEntry<'a> {
    topic: TopicName,
    listeners: Vec<&'a dyn TopicListener, MAX_LISTENERS_PER_TOPIC>,
}

/// Geordnete Abbildung Topic → Listener
pub struct TopicRegistry<'a> {
    entries: Vec<TopicEntry<'a>, MAX_TOPICS>,
}

impl<'a> TopicRegistry<'a> {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Hängt einen Listener an die Liste des Topics an
    pub fn register(&mut self, topic: &str, listener: &'a dyn TopicListener) -> Result<(), RegistryError> {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.topic == topic) {
            return entry
                .listeners
                .push(listener)
                .map_err(|_| RegistryError::TooManyListeners);
        }

        let topic = TopicName::try_from(topic).map_err(|_| RegistryError::TopicTooLong)?;
        let mut listeners = Vec::new();
        // leere Liste, Kapazität >= 1
        let _ = listeners.push(listener);
        self.entries
            .push(TopicEntry { topic, listeners })
            .map_err(|_| RegistryError::TooManyTopics)
    }

    /// Registrierte Topics in Einfügereihenfolge
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.topic.as_str())
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.entries.iter().any(|e| e.topic == topic)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn listeners(&self, topic: &str) -> Option<&[&'a dyn TopicListener]> {
        self.entries
            .iter()
            .find(|e| e.topic == topic)
            .map(|e| e.listeners.as_slice())
    }

    /// On-Connect an alle Listener aller Topics
    pub fn dispatch_connect(&self, out: &mut dyn Outbox, session_present: bool) {
        for entry in &self.entries {
            for listener in &entry.listeners {
                listener.on_connect(out, session_present);
            }
        }
    }

    /// Nachricht an die Listener des Topics (exakter Vergleich)
    ///
    /// Gibt `false` zurück, wenn niemand auf das Topic hört.
    pub fn dispatch_message(&self, out: &mut dyn Outbox, topic: &str, payload: &str) -> bool {
        let Some(listeners) = self.listeners(topic) else {
            return false;
        };
        for listener in listeners {
            listener.on_message(out, topic, payload);
        }
        true
    }

    /// Abo-Bestätigung an die Listener des Topics
    pub fn dispatch_subscribe(&self, out: &mut dyn Outbox, topic: &str, qos: QoS) -> bool {
        let Some(listeners) = self.listeners(topic) else {
            return false;
        };
        for listener in listeners {
            listener.on_subscribe(out, topic, qos);
        }
        true
    }
}

impl Default for TopicRegistry<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::Cell;

    struct Counter {
        messages: Cell<u32>,
    }

    impl TopicListener for Counter {
        fn on_message(&self, _out: &mut dyn Outbox, _topic: &str, _payload: &str) {
            self.messages.set(self.messages.get() + 1);
        }
    }

    #[test]
    fn test_register_appends_to_existing_topic() {
        let a = Counter { messages: Cell::new(0) };
        let b = Counter { messages: Cell::new(0) };
        let mut registry = TopicRegistry::new();
        registry.register("foo", &a).unwrap();
        registry.register("foo", &b).unwrap();

        assert_eq!(registry.topics().count(), 1);
        let mut out = BufferedOutbox::new();
        assert!(registry.dispatch_message(&mut out, "foo", "on"));
        assert_eq!(a.messages.get(), 1);
        assert_eq!(b.messages.get(), 1);
    }

    #[test]
    fn test_topics_are_case_sensitive() {
        let a = Counter { messages: Cell::new(0) };
        let mut registry = TopicRegistry::new();
        registry.register("foo", &a).unwrap();

        let mut out = BufferedOutbox::new();
        assert!(!registry.dispatch_message(&mut out, "FOO", "on"));
        assert_eq!(a.messages.get(), 0);
    }

    #[test]
    fn test_listener_limit() {
        let a = Counter { messages: Cell::new(0) };
        let mut registry = TopicRegistry::new();
        for _ in 0..MAX_LISTENERS_PER_TOPIC {
            registry.register("foo", &a).unwrap();
        }
        assert_eq!(registry.register("foo", &a), Err(RegistryError::TooManyListeners));
    }

    #[test]
    fn test_outbox_is_fifo_and_bounded() {
        let mut out = BufferedOutbox::new();
        for i in 0..OUTBOX_CAPACITY {
            let payload = if i % 2 == 0 { "on" } else { "off" };
            out.publish("t", payload).unwrap();
        }
        assert_eq!(out.publish("t", "on"), Err(OutboxError::Full));
        assert_eq!(out.pop().unwrap().payload.as_str(), "on");
        assert_eq!(out.pop().unwrap().payload.as_str(), "off");
    }
}
