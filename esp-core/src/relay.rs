//! Relais-Anwendung (Steckdose)
//!
//! Hört auf `<topic>` für `on`/`off`, meldet den Zustand auf `<topic>/set`.
//! Ein kurzer Button-Druck schaltet um. Jede Änderung wird gespiegelt
//! (Relais, Status-LED), gespeichert und gemeldet.

use core::fmt::Write;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::persist::{RelayRecord, StateStore, StoreError};
use crate::registry::{Outbox, OutboxError, TopicListener};
use crate::traits::{Led, RelaySwitch};
use crate::types::{Hostname, RelayCommand, TopicName};

/// Präfix des Hostnamens (Gerätetyp)
pub const HOSTNAME_PREFIX: &str = "so01x";

/// Geräte-Suffix des Topics
pub const TOPIC_SUFFIX: &str = "x001";

/// Suffix des Zustands-Topics
pub const SET_SUFFIX: &str = "/set";

/// Hostname aus der Chip-ID: `so01x` + Hex in Kleinbuchstaben
///
/// # Beispiele
///
/// ```
/// # use esp_core::hostname_for_chip;
/// assert_eq!(hostname_for_chip(0x00AB_12CD).as_str(), "so01xab12cd");
/// ```
pub fn hostname_for_chip(chip_id: u32) -> Hostname {
    let mut hostname = Hostname::new();
    // "so01x" + max. 8 Hex-Ziffern passt immer
    let _ = write!(hostname, "{HOSTNAME_PREFIX}{chip_id:x}");
    hostname
}

/// Fehler beim Anlegen der Anwendung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayError {
    TopicTooLong,
}

/// Relais-Anwendung als Topic-Listener
pub struct RelayApp<'a> {
    topic: TopicName,
    set_topic: TopicName,
    relay_on: AtomicBool,
    store_failures: AtomicU32,
    report_failures: AtomicU32,
    relay: &'a dyn RelaySwitch,
    led: &'a dyn Led,
    store: &'a dyn StateStore,
}

impl<'a> RelayApp<'a> {
    /// # Parameter
    /// - `topic_prefix`: meist der Hostname; das Topic wird kleingeschrieben
    pub fn new(
        topic_prefix: &str,
        relay: &'a dyn RelaySwitch,
        led: &'a dyn Led,
        store: &'a dyn StateStore,
    ) -> Result<Self, RelayError> {
        let mut topic = TopicName::new();
        topic
            .push_str(topic_prefix)
            .and_then(|_| topic.push_str(TOPIC_SUFFIX))
            .map_err(|_| RelayError::TopicTooLong)?;
        topic.make_ascii_lowercase();

        let mut set_topic = topic.clone();
        set_topic
            .push_str(SET_SUFFIX)
            .map_err(|_| RelayError::TopicTooLong)?;

        Ok(Self {
            topic,
            set_topic,
            relay_on: AtomicBool::new(false),
            store_failures: AtomicU32::new(0),
            report_failures: AtomicU32::new(0),
            relay,
            led,
            store,
        })
    }

    /// Kommando-Topic
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Zustands-Topic
    pub fn set_topic(&self) -> &str {
        &self.set_topic
    }

    pub fn is_on(&self) -> bool {
        self.relay_on.load(Ordering::Acquire)
    }

    /// Fehlgeschlagene Speichervorgänge aus Listener-Callbacks
    pub fn store_failures(&self) -> u32 {
        self.store_failures.load(Ordering::Relaxed)
    }

    /// Verworfene Zustandsmeldungen aus Listener-Callbacks
    pub fn report_failures(&self) -> u32 {
        self.report_failures.load(Ordering::Relaxed)
    }

    /// Gespeicherten Zustand laden und auf Relais und LED anwenden (Boot)
    pub fn apply_initial(&self) -> RelayRecord {
        let record = self.store.load();
        self.relay_on.store(record.relay_is_on, Ordering::Release);
        self.drive(record.relay_is_on);
        record
    }

    /// Umschalten (kurzer Button-Druck); liefert den neuen Zustand
    ///
    /// Das Melden übernimmt der Transport-Task über `report()`.
    pub fn toggle(&self) -> Result<bool, StoreError> {
        let on = !self.relay_on.fetch_xor(true, Ordering::AcqRel);
        self.drive(on);
        self.store.save(RelayRecord::new(on))?;
        Ok(on)
    }

    /// Aktuellen Zustand auf dem Zustands-Topic melden
    pub fn report(&self, out: &mut dyn Outbox) -> Result<(), OutboxError> {
        out.publish(&self.set_topic, RelayCommand::from_state(self.is_on()).as_str())
    }

    /// Meldung aus einem Callback: ein Fehler wird gezählt, das Schalten bleibt gültig
    #[cfg_attr(not(feature = "defmt"), allow(unused_variables))]
    fn report_from_callback(&self, out: &mut dyn Outbox) {
        if let Err(e) = self.report(out) {
            self.report_failures.fetch_add(1, Ordering::Relaxed);
            #[cfg(feature = "defmt")]
            defmt::warn!("Relay: Report on '{}' dropped: {}", self.set_topic.as_str(), e);
        }
    }

    fn drive(&self, on: bool) {
        self.relay.set(on);
        if on {
            self.led.on();
        } else {
            self.led.off();
        }
    }

    fn apply(&self, command: RelayCommand, out: &mut dyn Outbox) {
        let on = command.is_on();
        // nur echte Änderungen schalten, speichern und melden
        if self
            .relay_on
            .compare_exchange(!on, on, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        self.drive(on);
        if self.store.save(RelayRecord::new(on)).is_err() {
            self.store_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.report_from_callback(out);
    }
}

impl TopicListener for RelayApp<'_> {
    fn on_connect(&self, out: &mut dyn Outbox, _session_present: bool) {
        self.report_from_callback(out);
    }

    fn on_message(&self, out: &mut dyn Outbox, _topic: &str, payload: &str) {
        if let Ok(command) = RelayCommand::try_from(payload) {
            self.apply(command, out);
        }
    }
}
