//! Pub/Sub Transport Abstraction
//!
//! Ein gemeinsames Interface für beide Bindings (Broker und Line-Protokoll).
//! Die Bindings teilen keinen internen Zustand, nur den Registry-Vertrag.
//!
//! Ein Binding besitzt seine I/O nicht selbst: `poll()` bekommt sie pro
//! Aufruf geliehen. So kann die Firmware Socket und Client pro Verbindung
//! neu aufbauen, ohne dass das Binding selbstreferenziell wird.

use crate::registry::{OutboxError, RegistryError, TopicListener};
use crate::types::NetEvent;

/// Verzögerung bis zum erneuten Verbindungsversuch
pub const RECONNECT_DELAY_MS: u32 = 2_000;

/// Pub/Sub-Binding über einer I/O-Schicht `Io`
#[allow(async_fn_in_trait)]
pub trait PubSub<'a, Io> {
    type Error;

    /// Listener unter einem Topic registrieren (vor oder nach `begin()`)
    ///
    /// Wirkt ab dem nächsten Verbindungsaufbau.
    fn on_event(&mut self, topic: &str, listener: &'a dyn TopicListener) -> Result<(), RegistryError>;

    /// Dispatch aktivieren
    fn begin(&mut self);

    /// WLAN-Ereignis (Verbindungsabsicht setzen bzw. Reconnect abbrechen)
    fn on_network(&mut self, event: NetEvent);

    /// Nachricht außerhalb eines Callbacks einreihen (z.B. Button-Toggle)
    fn publish(&mut self, topic: &str, payload: &str) -> Result<(), OutboxError>;

    /// Ein kooperativer Schritt: verbinden, empfangen, dispatchen, senden
    async fn poll(&mut self, io: &mut Io, now_ms: u32) -> Result<(), Self::Error>;
}

/// One-Shot-Timer für den verzögerten Reconnect
///
/// Millisekunden als `u32` mit Wrapping-Arithmetik.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectTimer {
    deadline: Option<u32>,
}

impl ReconnectTimer {
    pub const fn new() -> Self {
        Self { deadline: None }
    }

    /// Startet den Timer neu (ersetzt einen laufenden)
    pub fn arm(&mut self, now_ms: u32) {
        self.deadline = Some(now_ms.wrapping_add(RECONNECT_DELAY_MS));
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    /// Frist abgelaufen, ohne den Timer zu verbrauchen
    pub fn is_due(&self, now_ms: u32) -> bool {
        // Differenz als i32: korrekt über den u32-Überlauf hinweg
        self.deadline
            .is_some_and(|deadline| now_ms.wrapping_sub(deadline) as i32 >= 0)
    }

    /// `true` genau einmal, sobald die Frist abgelaufen ist
    pub fn fire(&mut self, now_ms: u32) -> bool {
        if !self.is_due(now_ms) {
            return false;
        }
        self.deadline = None;
        true
    }
}
