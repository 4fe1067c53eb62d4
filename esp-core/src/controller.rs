//! Connectivity Controller
//!
//! Zustandsautomat INIT → CONNECTING → READY (plus PAIRING), gesteuert von
//! WLAN-Ereignissen und der Button-Gesten-Erkennung. Orchestriert dabei das
//! LED-Muster und den Start des Update-Service.
//!
//! ```text
//! INIT ──begin()──▶ CONNECTING ──GotIp──▶ READY
//!                       ▲  ◀──Disconnected──┘
//!                       │
//!  (jeder Zustand) ──Pairing-Geste──▶ PAIRING ──Pairing fertig──┘
//! ```
//!
//! Alle Methoden nehmen `&self`: der Controller wird als `&'static` zwischen
//! WLAN-Task, LED-Tick und Button-Tick geteilt. `state` und `app_pattern`
//! sind einzelne Atomics; Übergänge, die einen Vorzustand voraussetzen,
//! laufen über `compare_exchange`.

use core::future::Future;
use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

use crate::button::{ButtonAction, GestureDetector};
use crate::logic::{
    PATTERN_CONNECTING, PATTERN_OFF, PATTERN_ON, PATTERN_PAIRING, PATTERN_REBOOT,
};
use crate::pattern::PatternScheduler;
use crate::traits::{Led, NoopLed, UpdateConfig, UpdateService, WifiStation};
use crate::types::{BootConfig, ConnectivityState, NetEvent};

/// Callback für einen kurzen Button-Druck
pub type ButtonPressListener<'a> = &'a (dyn Fn() + Sync);

/// Was ein Button-Tick ausgelöst hat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonOutcome {
    Idle,
    /// Kurzer Druck an den Listener weitergegeben
    Pressed,
    /// Pairing-Modus angefordert (Zustand ist jetzt PAIRING)
    PairingRequested,
    /// Gerät muss sofort neu starten
    Restart,
}

/// Boot- und Verbindungs-Controller
pub struct BootController<'a> {
    config: BootConfig,
    state: AtomicU8,
    scheduler: PatternScheduler,
    /// Zuletzt von der Anwendung angeforderte LED (an/aus)
    app_pattern: AtomicU32,
    detector: GestureDetector,
    press_listener: Option<ButtonPressListener<'a>>,
}

impl<'a> BootController<'a> {
    pub fn new(config: BootConfig) -> Self {
        let detector = GestureDetector::new(config.thresholds);
        Self {
            config,
            state: AtomicU8::new(ConnectivityState::Init as u8),
            scheduler: PatternScheduler::new(),
            app_pattern: AtomicU32::new(PATTERN_OFF),
            detector,
            press_listener: None,
        }
    }

    /// Registriert den Listener für kurze Button-Drücke
    ///
    /// Muss vor dem Teilen des Controllers (`&'static`) gesetzt werden.
    pub fn set_button_press_listener(&mut self, listener: ButtonPressListener<'a>) {
        self.press_listener = Some(listener);
    }

    pub fn config(&self) -> &BootConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectivityState {
        ConnectivityState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn scheduler(&self) -> &PatternScheduler {
        &self.scheduler
    }

    /// Logische Status-LED für die Anwendung
    ///
    /// Ohne konfigurierte LED wird die No-op-Variante geliefert.
    pub fn status_led(&self) -> StatusLed<'_, 'a> {
        match self.config.status_led {
            Some(_) => StatusLed::Pattern(BootLed { boot: self }),
            None => StatusLed::Disabled(NoopLed),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Startet LED, Button, WLAN und Update-Service und stößt den Join an
    ///
    /// # Parameter
    /// - `wifi`: WLAN-Station (Hardware oder Mock)
    /// - `updates`: Firmware-Update-Service
    /// - `now_ms`: aktuelle Zeit für das Button-Haltefenster
    pub async fn begin<W, U>(&self, wifi: &mut W, updates: &mut U, now_ms: u32) -> Result<(), W::Error>
    where
        W: WifiStation,
        U: UpdateService,
    {
        if self.config.status_led.is_some() {
            self.scheduler.set_pattern(self.app_pattern.load(Ordering::Acquire));
            self.scheduler.arm();
        }

        if self.config.button.is_some() {
            self.detector.arm(now_ms);
        }

        let hostname = self.config.hostname.as_deref();
        wifi.start_station(hostname).await?;

        updates.begin(UpdateConfig {
            hostname,
            password: self.config.update_password,
        });

        self.connect_wifi(wifi)
    }

    /// Kooperativer Loop-Schritt
    ///
    /// Läuft der Controller im PAIRING-Zustand, wird die Pairing-Sequenz
    /// vollständig abgearbeitet (siehe `run_pairing`). Gibt `true` zurück,
    /// wenn eine Pairing-Sequenz gelaufen ist.
    pub async fn service<W, F, Fut>(&self, wifi: &mut W, pause: F) -> Result<bool, W::Error>
    where
        W: WifiStation,
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        if self.state() != ConnectivityState::Pairing {
            return Ok(false);
        }
        self.run_pairing(wifi, pause).await?;
        Ok(true)
    }

    /// Pairing-Sequenz: Join stoppen, Pairing starten, pollen bis fertig
    ///
    /// Endet erst, wenn der Benutzer das Pairing abschließt. `pause` wird
    /// zwischen zwei Polls erwartet, damit andere Tasks weiterlaufen.
    pub async fn run_pairing<W, F, Fut>(&self, wifi: &mut W, mut pause: F) -> Result<(), W::Error>
    where
        W: WifiStation,
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        wifi.stop_pairing().await?;
        wifi.start_pairing().await?;

        loop {
            if wifi.pairing_done() {
                return self.connect_wifi(wifi);
            }
            pause().await;
        }
    }

    /// Join-Sequenz (neu) starten: Zustand CONNECTING + Connecting-Muster
    fn connect_wifi<W: WifiStation>(&self, wifi: &mut W) -> Result<(), W::Error> {
        self.scheduler.set_pattern(PATTERN_CONNECTING);
        self.state
            .store(ConnectivityState::Connecting as u8, Ordering::Release);
        wifi.join()
    }

    // ========================================================================
    // Ereignisse
    // ========================================================================

    /// Verarbeitet ein WLAN-Ereignis
    ///
    /// Gibt `true` zurück, wenn sich der Zustand geändert hat.
    pub fn on_net_event(&self, event: NetEvent) -> bool {
        match event {
            NetEvent::GotIp => self.on_got_ip(),
            NetEvent::Disconnected => self.on_disconnected(),
        }
    }

    fn on_got_ip(&self) -> bool {
        // PAIRING wird nur durch die Pairing-Sequenz verlassen
        let entered = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match ConnectivityState::from_u8(raw) {
                    ConnectivityState::Pairing | ConnectivityState::Ready => None,
                    _ => Some(ConnectivityState::Ready as u8),
                }
            })
            .is_ok();

        if entered {
            // Anzeige einfrieren: zurück auf das Muster der Anwendung
            self.scheduler.set_pattern(self.app_pattern.load(Ordering::Acquire));
        }
        entered
    }

    fn on_disconnected(&self) -> bool {
        let left_ready = self
            .state
            .compare_exchange(
                ConnectivityState::Ready as u8,
                ConnectivityState::Connecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if left_ready {
            self.scheduler.set_pattern(PATTERN_CONNECTING);
        }
        left_ready
    }

    /// LED-Tick (100ms): liefert den nächsten Pin-Pegel
    pub fn led_tick(&self) -> Option<bool> {
        let on_level = self.config.status_led?;
        self.scheduler.tick(on_level)
    }

    /// Button-Tick (50ms) mit dem rohen Pin-Pegel
    pub fn button_tick(&self, pin_high: bool, now_ms: u32) -> ButtonOutcome {
        let Some(button) = self.config.button else {
            return ButtonOutcome::Idle;
        };
        let pressed = button.pressed.is_active(pin_high);
        self.on_button(self.detector.sample(pressed, now_ms))
    }

    /// Wendet eine klassifizierte Button-Aktion an
    pub fn on_button(&self, action: ButtonAction) -> ButtonOutcome {
        match action {
            ButtonAction::None => ButtonOutcome::Idle,
            ButtonAction::ShortPress => {
                if let Some(listener) = self.press_listener {
                    listener();
                }
                ButtonOutcome::Pressed
            }
            ButtonAction::ShowPairing => {
                self.scheduler.set_pattern(PATTERN_PAIRING);
                ButtonOutcome::Idle
            }
            ButtonAction::EnterPairing => {
                self.scheduler.set_pattern(PATTERN_PAIRING);
                self.state
                    .store(ConnectivityState::Pairing as u8, Ordering::Release);
                ButtonOutcome::PairingRequested
            }
            ButtonAction::ShowReboot => {
                self.scheduler.set_pattern(PATTERN_REBOOT);
                ButtonOutcome::Idle
            }
            ButtonAction::Restart => {
                self.scheduler.set_pattern(PATTERN_REBOOT);
                ButtonOutcome::Restart
            }
        }
    }

    fn set_app_pattern(&self, pattern: u32) {
        self.app_pattern.store(pattern, Ordering::Release);
        if self.state() == ConnectivityState::Ready {
            self.scheduler.set_pattern(pattern);
        }
    }
}

// ============================================================================
// Logische LED
// ============================================================================

/// Logische LED der Anwendung
///
/// Merkt sich das angeforderte Muster und zeigt es nur im Zustand READY an.
/// In allen anderen Zuständen gehört die LED dem Controller; das Muster wird
/// beim Erreichen von READY übernommen.
#[derive(Clone, Copy)]
pub struct BootLed<'c, 'a> {
    boot: &'c BootController<'a>,
}

impl Led for BootLed<'_, '_> {
    fn on(&self) {
        self.boot.set_app_pattern(PATTERN_ON);
    }

    fn off(&self) {
        self.boot.set_app_pattern(PATTERN_OFF);
    }
}

/// Status-LED, bei der Konstruktion gewählt
#[derive(Clone, Copy)]
pub enum StatusLed<'c, 'a> {
    Pattern(BootLed<'c, 'a>),
    Disabled(NoopLed),
}

impl Led for StatusLed<'_, '_> {
    fn on(&self) {
        match self {
            StatusLed::Pattern(led) => led.on(),
            StatusLed::Disabled(led) => led.on(),
        }
    }

    fn off(&self) {
        match self {
            StatusLed::Pattern(led) => led.off(),
            StatusLed::Disabled(led) => led.off(),
        }
    }
}
