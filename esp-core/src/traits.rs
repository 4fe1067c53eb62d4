//! Hardware Abstraction Traits
//!
//! Diese Traits definieren Schnittstellen für Hardware-Zugriff
//! ohne konkrete Implementierung.
//!
//! # Implementierungen
//! - **Production:** esp-hal GPIO / esp-radio Treiber in `esp-firmware`
//! - **Testing:** Mocks in `esp-tests` bzw. in den `#[cfg(test)]` Modulen

/// Fehler-Typ für Pin-Operationen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    WriteFailed,
    ReadFailed,
}

/// Logische Status-LED
///
/// Die Anwendung schaltet die LED nur logisch an/aus. Ob und wann das auf
/// dem Pin sichtbar wird, entscheidet die Implementierung (z.B. erst im
/// Zustand READY, siehe `BootLed`).
pub trait Led {
    fn on(&self);
    fn off(&self);
}

/// LED-Variante für Geräte ohne Status-LED
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLed;

impl Led for NoopLed {
    fn on(&self) {}
    fn off(&self) {}
}

/// Trait für den physikalischen Status-Ausgang
///
/// Wird vom LED-Tick mit dem bereits polaritätskorrigierten Pegel aufgerufen.
pub trait StatusLineWriter: Send {
    /// Setzt den Pin-Pegel (`true` = HIGH)
    ///
    /// # Fehlerbehandlung
    /// Gibt `HalError::WriteFailed` zurück wenn Hardware-Zugriff fehlschlägt
    fn write(&mut self, high: bool) -> Result<(), HalError>;
}

/// Trait für den Button-Eingang
pub trait ButtonReader: Send {
    /// Liest den Pin-Pegel (`true` = HIGH)
    fn is_high(&mut self) -> Result<bool, HalError>;
}

/// Trait für den Relais-Ausgang
///
/// `&self`, weil der Schalter aus Listener-Callbacks heraus bedient wird.
/// Implementierungen kapseln den Pin hinter einem Mutex.
pub trait RelaySwitch {
    fn set(&self, on: bool);
}

/// WLAN im Station-Modus
///
/// Wird ausschließlich aus dem WLAN-Task heraus benutzt.
#[allow(async_fn_in_trait)]
pub trait WifiStation {
    type Error;

    /// Station-Modus konfigurieren und starten
    async fn start_station(&mut self, hostname: Option<&str>) -> Result<(), Self::Error>;

    /// Join-Sequenz anstoßen (kehrt sofort zurück)
    ///
    /// Das Ergebnis kommt asynchron als `NetEvent`.
    fn join(&mut self) -> Result<(), Self::Error>;

    /// Einen laufenden Join- oder Pairing-Versuch abbrechen
    async fn stop_pairing(&mut self) -> Result<(), Self::Error>;

    /// Pairing-Modus betreten (Credentials werden out-of-band empfangen)
    async fn start_pairing(&mut self) -> Result<(), Self::Error>;

    /// `true` sobald neue Credentials empfangen wurden
    fn pairing_done(&mut self) -> bool;
}

/// Konfiguration für den Firmware-Update-Service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateConfig<'a> {
    pub hostname: Option<&'a str>,
    pub password: Option<u32>,
}

/// Firmware-Update-Service (OTA)
///
/// Der Controller konfiguriert und startet ihn nur. Das Bedienen laufender
/// Update-Sessions passiert im eigenen Task.
pub trait UpdateService {
    fn begin(&mut self, config: UpdateConfig<'_>);
}
