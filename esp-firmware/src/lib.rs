// Library-Root: Wiederverwendbare Logik und Module
// Keine Standard-Bibliothek (Embedded System)
#![no_std]

extern crate alloc;

// Module
pub mod config;
pub mod hal;
pub mod tasks;

// Embassy Channel-Typen
use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, NoopRawMutex};
use embassy_sync::pubsub::{PubSubChannel, Publisher, Subscriber};
use embassy_sync::signal::Signal;
use embassy_time::Instant;

use esp_core::{Credentials, NetEvent};

// ============================================================================
// Channel Type Aliases
// ============================================================================

/// PubSub Channel für WLAN-Ereignisse
///
/// Broadcast-Channel: jeder Subscriber (Controller, Transport) bekommt jedes
/// Ereignis in Zustell-Reihenfolge.
///
/// # Parameter
/// - `NoopRawMutex`: Single-Core, kein Locking-Overhead
/// - `NetEvent`: Message-Typ
/// - `4`: Queue-Kapazität
/// - `2`: Max Subscribers (Controller + Transport)
/// - `1`: Max Publishers (Netz-Watcher)
pub type NetEventChannel = PubSubChannel<NoopRawMutex, NetEvent, 4, 2, 1>;

/// Publisher-Typ für WLAN-Ereignisse
pub type NetEventPublisher = Publisher<'static, NoopRawMutex, NetEvent, 4, 2, 1>;

/// Subscriber-Typ für WLAN-Ereignisse
pub type NetEventSubscriber = Subscriber<'static, NoopRawMutex, NetEvent, 4, 2, 1>;

// ============================================================================
// Signale zwischen Tasks
// ============================================================================

/// Kurzer Button-Druck (gesetzt vom Button-Listener, verbraucht vom Transport-Task)
pub static SHORT_PRESS: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Pairing-Geste erkannt (Button-Task → WiFi-Task)
pub static PAIRING_REQUEST: Signal<CriticalSectionRawMutex, ()> = Signal::new();

/// Neue Credentials aus dem Provisioning (Provisioning-Task → WiFi-Task)
pub static CREDENTIALS: Signal<CriticalSectionRawMutex, Credentials> = Signal::new();

/// Button-Listener des Controllers: meldet nur, geschaltet wird im Transport-Task
pub fn on_short_press() {
    SHORT_PRESS.signal(());
}

/// Millisekunden seit Boot (läuft nach ~49 Tagen über)
pub fn now_ms() -> u32 {
    Instant::now().as_millis() as u32
}
