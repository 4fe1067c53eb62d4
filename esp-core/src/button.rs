//! Button Gesture Detector
//!
//! Tastet den Button-Eingang im festen Tick-Takt (50ms) ab und klassifiziert
//! die Haltedauer in Tap / Pairing-Geste / Reset-Geste.
//!
//! ## Gesten
//!
//! | Geste    | Haltedauer       | Während des Haltens | Beim Loslassen   |
//! |----------|------------------|---------------------|------------------|
//! | Tap      | > 100ms          | -                   | `ShortPress`     |
//! | Pairing  | > 5s             | `ShowPairing`       | `EnterPairing`   |
//! | Reset    | > 10s            | `ShowReboot`        | `Restart`        |
//!
//! Pro Tick feuert höchstens ein Zweig. Ein gehaltener Button löst daher nie
//! `ShortPress` aus. Vor `arm()` liefert jeder Tick `None`.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::logic::{HoldStage, classify_hold};
use crate::types::HoldThresholds;

/// Ergebnis eines Abtast-Ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonAction {
    None,
    /// Kurzer Druck losgelassen
    ShortPress,
    /// Pairing-Schwelle überschritten, Button noch gedrückt (nur Anzeige)
    ShowPairing,
    /// Pairing-Geste losgelassen
    EnterPairing,
    /// Reset-Schwelle überschritten, Button noch gedrückt (nur Anzeige)
    ShowReboot,
    /// Reset-Geste losgelassen: Neustart
    Restart,
}

/// Gesten-Erkennung über ein einzelnes Zeitstempel-Fenster
///
/// `hold_since` wird nur vom Button-Tick geschrieben (Single Writer) und
/// speichert den letzten Zeitpunkt, an dem der Button losgelassen war.
/// Millisekunden als `u32` mit Wrapping-Arithmetik (Überlauf nach ~49 Tagen).
#[derive(Debug)]
pub struct GestureDetector {
    hold_since: AtomicU32,
    armed: AtomicBool,
    thresholds: HoldThresholds,
}

impl GestureDetector {
    pub const fn new(thresholds: HoldThresholds) -> Self {
        Self {
            hold_since: AtomicU32::new(0),
            armed: AtomicBool::new(false),
            thresholds,
        }
    }

    /// Startet das Haltefenster (beim Konfigurieren des Pins)
    pub fn arm(&self, now_ms: u32) {
        self.hold_since.store(now_ms, Ordering::Release);
        self.armed.store(true, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Aktuelle Haltedauer
    pub fn held_for(&self, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(self.hold_since.load(Ordering::Acquire))
    }

    /// Ein Abtast-Tick
    ///
    /// # Parameter
    /// - `pressed`: logischer Button-Zustand (Polarität bereits angewendet)
    /// - `now_ms`: monotone Zeit in Millisekunden
    pub fn sample(&self, pressed: bool, now_ms: u32) -> ButtonAction {
        // Haltefenster läuft erst ab arm()
        if !self.is_armed() {
            return ButtonAction::None;
        }
        let released = !pressed;
        let action = match classify_hold(self.held_for(now_ms), &self.thresholds) {
            HoldStage::Reset if released => ButtonAction::Restart,
            HoldStage::Reset => ButtonAction::ShowReboot,
            HoldStage::Pairing if released => ButtonAction::EnterPairing,
            HoldStage::Pairing => ButtonAction::ShowPairing,
            HoldStage::Tap if released => ButtonAction::ShortPress,
            HoldStage::Tap | HoldStage::None => ButtonAction::None,
        };

        if released {
            self.hold_since.store(now_ms, Ordering::Release);
        }
        action
    }
}
