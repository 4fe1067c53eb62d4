//! Core Types für die Steckdosen-Firmware
//!
//! Datenstrukturen ohne Hardware-Dependencies

use heapless::String;

// ============================================================================
// Kapazitäten (statisch, kein Heap)
// ============================================================================

/// Maximale Länge eines Topic-Namens in Bytes
pub const TOPIC_CAPACITY: usize = 64;

/// Maximale Länge eines Payloads in Bytes
pub const PAYLOAD_CAPACITY: usize = 128;

/// Maximale Anzahl registrierter Topics pro Transport
pub const MAX_TOPICS: usize = 8;

/// Maximale Anzahl Listener pro Topic
pub const MAX_LISTENERS_PER_TOPIC: usize = 4;

/// Maximale Länge des Hostnamens
pub const HOSTNAME_CAPACITY: usize = 32;

/// Topic-Name mit fester Kapazität
pub type TopicName = String<TOPIC_CAPACITY>;

/// Payload-Text mit fester Kapazität
pub type Payload = String<PAYLOAD_CAPACITY>;

/// Hostname mit fester Kapazität
pub type Hostname = String<HOSTNAME_CAPACITY>;

// ============================================================================
// Verbindungszustand
// ============================================================================

/// Zustand des Connectivity Controllers
///
/// Es gibt genau eine Instanz pro Gerät (das atomare `state`-Feld im `BootController`).
/// Als `u8` repräsentiert, damit der Zustand atomar zwischen Ticks und
/// Hauptschleife geteilt werden kann.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectivityState {
    /// Vor `begin()`
    Init = 0,
    /// WLAN-Join läuft
    Connecting = 1,
    /// IP-Adresse erhalten
    Ready = 2,
    /// Pairing-Modus (per Button-Geste)
    Pairing = 3,
}

impl ConnectivityState {
    /// Dekodiert den atomar gespeicherten Wert
    ///
    /// Unbekannte Werte werden als `Init` gelesen.
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::Pairing,
            _ => Self::Init,
        }
    }
}

/// Netzwerk-Ereignisse vom WLAN-Stack
///
/// Werden in Zustell-Reihenfolge an Controller und Transport verteilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetEvent {
    /// IP-Adresse erhalten
    GotIp,
    /// Verbindung zum Access Point verloren
    Disconnected,
}

// ============================================================================
// Pin-Konfiguration
// ============================================================================

/// Aktiver Pegel eines Pins (LED "an" bzw. Button "gedrückt")
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnLevel {
    High,
    Low,
}

impl OnLevel {
    /// Physikalischer Pin-Pegel (`true` = HIGH) für einen logischen Zustand
    pub const fn pin_level(self, active: bool) -> bool {
        match self {
            OnLevel::High => active,
            OnLevel::Low => !active,
        }
    }

    /// Logischer Zustand für einen gelesenen Pin-Pegel
    pub const fn is_active(self, pin_high: bool) -> bool {
        self.pin_level(pin_high)
    }
}

/// Pull-Widerstand für den Button-Eingang
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    Up,
    Down,
    None,
}

/// Button-Konfiguration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonConfig {
    /// Pegel im gedrückten Zustand
    pub pressed: OnLevel,
    pub pull: Pull,
}

impl Default for ButtonConfig {
    fn default() -> Self {
        Self {
            pressed: OnLevel::Low,
            pull: Pull::Up,
        }
    }
}

/// Schwellwerte für die Klassifikation der Haltedauer (Millisekunden)
///
/// Strikt geordnet: `debounce_ms < pairing_ms < reset_ms`.
/// Alle Vergleiche sind "echt größer".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoldThresholds {
    pub debounce_ms: u32,
    pub pairing_ms: u32,
    pub reset_ms: u32,
}

impl Default for HoldThresholds {
    fn default() -> Self {
        Self {
            debounce_ms: 100,
            pairing_ms: 5_000,
            reset_ms: 10_000,
        }
    }
}

/// Boot-Konfiguration (einmal im Composition Root gebaut)
#[derive(Debug, Clone, Default)]
pub struct BootConfig {
    /// Polarität der Status-LED, `None` = keine LED verbaut
    pub status_led: Option<OnLevel>,
    /// Button-Konfiguration, `None` = kein Button verbaut
    pub button: Option<ButtonConfig>,
    /// Hostname für WLAN und Update-Service
    pub hostname: Option<Hostname>,
    /// Numerisches Passwort für den Update-Service
    pub update_password: Option<u32>,
    pub thresholds: HoldThresholds,
}

// ============================================================================
// Pub/Sub Typen
// ============================================================================

/// Quality of Service für Broker-Subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
}

impl QoS {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0 => QoS::AtMostOnce,
            _ => QoS::AtLeastOnce,
        }
    }
}

/// Relais-Kommando aus einer eingehenden Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayCommand {
    On,
    Off,
}

impl RelayCommand {
    /// Payload-Text für diesen Zustand
    pub const fn as_str(self) -> &'static str {
        match self {
            RelayCommand::On => "on",
            RelayCommand::Off => "off",
        }
    }

    pub const fn from_state(is_on: bool) -> Self {
        if is_on { RelayCommand::On } else { RelayCommand::Off }
    }

    pub const fn is_on(self) -> bool {
        matches!(self, RelayCommand::On)
    }
}

impl core::convert::TryFrom<&str> for RelayCommand {
    type Error = ();

    fn try_from(payload: &str) -> Result<Self, Self::Error> {
        match payload {
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            _ => Err(()),
        }
    }
}

// ============================================================================
// defmt::Format Implementations (optional feature)
// ============================================================================

#[cfg(feature = "defmt")]
impl defmt::Format for ConnectivityState {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            ConnectivityState::Init => defmt::write!(fmt, "INIT"),
            ConnectivityState::Connecting => defmt::write!(fmt, "CONNECTING"),
            ConnectivityState::Ready => defmt::write!(fmt, "READY"),
            ConnectivityState::Pairing => defmt::write!(fmt, "PAIRING"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for NetEvent {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            NetEvent::GotIp => defmt::write!(fmt, "GotIp"),
            NetEvent::Disconnected => defmt::write!(fmt, "Disconnected"),
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for RelayCommand {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "{}", self.as_str())
    }
}
