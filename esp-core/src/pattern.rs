//! LED Pattern Scheduler
//!
//! Rotiert eine zyklische 32-Bit-Maske im festen Tick-Takt und leitet daraus
//! den Pegel der Status-LED ab. Unabhängig von jedem anderen Zustand.
//!
//! # Geteilter Zustand
//!
//! Der Scheduler wird als `&'static` zwischen LED-Tick und den übrigen Tasks
//! geteilt. Jedes Feld ist ein einzelnes Atomic:
//!
//! | Feld     | Schreiber                         | Leser         |
//! |----------|-----------------------------------|---------------|
//! | `mask`   | `set_pattern()` (Controller/App)  | alle          |
//! | `cursor` | `set_pattern()` (Reset), `tick()` | LED-Tick      |
//! | `armed`  | `arm()`                           | LED-Tick      |
//!
//! `cursor` hat zwei Schreiber. Ein Reset durch `set_pattern()` kann einen
//! gleichzeitigen Tick überschreiben oder umgekehrt; beides ergibt höchstens
//! einen um ein Bit verschobenen Blink-Takt. Auf Plattformen mit echter
//! Parallelität gehört das Paar (mask, cursor) hinter einen Lock.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::logic::{output_level, rotate_pattern};
use crate::types::OnLevel;

/// Zyklischer Muster-Scheduler
#[derive(Debug)]
pub struct PatternScheduler {
    mask: AtomicU32,
    cursor: AtomicU32,
    armed: AtomicBool,
}

impl PatternScheduler {
    pub const fn new() -> Self {
        Self {
            mask: AtomicU32::new(0),
            cursor: AtomicU32::new(0),
            armed: AtomicBool::new(false),
        }
    }

    /// Setzt ein neues Muster
    ///
    /// Idempotent: ist die Maske unverändert, bleibt der Cursor stehen und
    /// es wird `false` zurückgegeben. Sonst wird der Cursor auf die neue Maske
    /// gesetzt ("in Ruhe") und der Tick scharf geschaltet.
    pub fn set_pattern(&self, mask: u32) -> bool {
        if self.mask.swap(mask, Ordering::AcqRel) == mask {
            return false;
        }
        self.cursor.store(mask, Ordering::Release);
        self.arm();
        true
    }

    /// Schaltet den periodischen Tick scharf
    ///
    /// Gibt `true` zurück, wenn der Tick vorher nicht lief.
    pub fn arm(&self) -> bool {
        !self.armed.swap(true, Ordering::AcqRel)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    /// Aktuelle Maske
    pub fn mask(&self) -> u32 {
        self.mask.load(Ordering::Acquire)
    }

    /// Aktueller Rotations-Cursor
    pub fn cursor(&self) -> u32 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Ein Tick: Cursor rotieren und den neuen Pin-Pegel liefern
    ///
    /// Gibt `None` zurück, solange der Scheduler nicht scharf ist.
    pub fn tick(&self, on_level: OnLevel) -> Option<bool> {
        if !self.is_armed() {
            return None;
        }
        let next = rotate_pattern(self.cursor.load(Ordering::Acquire));
        self.cursor.store(next, Ordering::Release);
        Some(output_level(next, on_level))
    }
}

impl Default for PatternScheduler {
    fn default() -> Self {
        Self::new()
    }
}
