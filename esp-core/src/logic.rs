//! Pure Business Logic Functions
//!
//! Funktionen ohne Hardware-Dependencies (testbar!)

use crate::types::{HoldThresholds, OnLevel};

// ============================================================================
// LED-Muster (32 Bit, ein Bit pro 100ms Tick)
// ============================================================================

/// Langsames Blinken während des WLAN-Joins
pub const PATTERN_CONNECTING: u32 = 0xFF00_FF00;

/// Doppel-Blitz im Pairing-Modus
pub const PATTERN_PAIRING: u32 = 0x0505_0505;

/// Sehr langsames Blinken kurz vor dem Neustart
pub const PATTERN_REBOOT: u32 = 0xFFFF_0000;

/// Dauerhaft an
pub const PATTERN_ON: u32 = 0xFFFF_FFFF;

/// Dauerhaft aus
pub const PATTERN_OFF: u32 = 0x0000_0000;

/// Rotiert den Muster-Cursor zyklisch um ein Bit nach links
///
/// Das oben herausfallende Bit wird unten wieder eingefügt.
///
/// # Beispiele
///
/// ```
/// # use esp_core::rotate_pattern;
/// assert_eq!(rotate_pattern(0x8000_0001), 0x0000_0003);
/// ```
pub fn rotate_pattern(cursor: u32) -> u32 {
    cursor.rotate_left(1)
}

/// Pin-Pegel für den aktuellen Cursor
///
/// Bit 0 bestimmt, ob die LED leuchtet; die Polarität kommt aus der Konfiguration.
pub fn output_level(cursor: u32, on_level: OnLevel) -> bool {
    on_level.pin_level(cursor & 0x01 != 0)
}

// ============================================================================
// Button-Haltedauer
// ============================================================================

/// Stufe einer Haltedauer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldStage {
    /// Unterhalb der Entprell-Schwelle
    None,
    /// Kurzer Druck
    Tap,
    /// Pairing-Geste
    Pairing,
    /// Reset-Geste
    Reset,
}

/// Klassifiziert eine Haltedauer (reine Funktion der Dauer)
///
/// Grenzen sind strikt: genau 100ms ist noch kein Tap.
pub fn classify_hold(duration_ms: u32, thresholds: &HoldThresholds) -> HoldStage {
    if duration_ms > thresholds.reset_ms {
        HoldStage::Reset
    } else if duration_ms > thresholds.pairing_ms {
        HoldStage::Pairing
    } else if duration_ms > thresholds.debounce_ms {
        HoldStage::Tap
    } else {
        HoldStage::None
    }
}
