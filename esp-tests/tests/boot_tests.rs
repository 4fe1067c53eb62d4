//! Integration Tests für Boot-Controller, LED-Muster und Button-Gesten
//!
//! Diese Tests laufen auf dem Host (x86_64) mit Mock-WLAN und Mock-Update-Service.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};

use common::{MockUpdates, MockWifi};
use embassy_futures::block_on;
use esp_core::logic::{PATTERN_CONNECTING, PATTERN_OFF, PATTERN_ON, PATTERN_PAIRING, PATTERN_REBOOT};
use esp_core::types::{ButtonConfig, Hostname};
use esp_core::{BootConfig, BootController, ButtonOutcome, ConnectivityState, Led, NetEvent, OnLevel, PatternScheduler};

// Pin-Pegel mit Default-Button (aktiv LOW, Pull-Up)
const PRESSED: bool = false;
const RELEASED: bool = true;

fn config() -> BootConfig {
    BootConfig {
        status_led: Some(OnLevel::Low),
        button: Some(ButtonConfig::default()),
        hostname: Some(Hostname::try_from("so01xab12cd").unwrap()),
        update_password: Some(11_211_981),
        ..BootConfig::default()
    }
}

fn started(boot: &BootController<'_>) -> MockWifi {
    let mut wifi = MockWifi::default();
    let mut updates = MockUpdates::default();
    block_on(boot.begin(&mut wifi, &mut updates, 0)).unwrap();
    wifi
}

// ============================================================================
// Tests: begin()
// ============================================================================

#[test]
fn test_begin_starts_station_updates_and_join() {
    let boot = BootController::new(config());
    let mut wifi = MockWifi::default();
    let mut updates = MockUpdates::default();

    assert_eq!(boot.state(), ConnectivityState::Init);
    block_on(boot.begin(&mut wifi, &mut updates, 0)).unwrap();

    assert_eq!(wifi.calls, ["start_station", "join"]);
    assert_eq!(wifi.hostname.as_deref(), Some("so01xab12cd"));
    assert!(updates.started);
    assert_eq!(updates.hostname.as_deref(), Some("so01xab12cd"));
    assert_eq!(updates.password, Some(11_211_981));

    assert_eq!(boot.state(), ConnectivityState::Connecting);
    assert_eq!(boot.scheduler().mask(), PATTERN_CONNECTING);
    assert!(boot.scheduler().is_armed());
}

#[test]
fn test_begin_without_led_leaves_scheduler_idle() {
    let boot = BootController::new(BootConfig::default());
    started(&boot);

    assert_eq!(boot.led_tick(), None);
    assert_eq!(boot.state(), ConnectivityState::Connecting);
}

// ============================================================================
// Tests: Zustandsübergänge
// ============================================================================

#[test]
fn test_got_ip_enters_ready_and_restores_app_pattern() {
    let boot = BootController::new(config());
    started(&boot);

    assert!(boot.on_net_event(NetEvent::GotIp));
    assert_eq!(boot.state(), ConnectivityState::Ready);
    assert_eq!(boot.scheduler().mask(), PATTERN_OFF);
}

#[test]
fn test_disconnect_returns_to_connecting() {
    let boot = BootController::new(config());
    started(&boot);
    boot.on_net_event(NetEvent::GotIp);

    assert!(boot.on_net_event(NetEvent::Disconnected));
    assert_eq!(boot.state(), ConnectivityState::Connecting);
    assert_eq!(boot.scheduler().mask(), PATTERN_CONNECTING);
}

#[test]
fn test_disconnect_while_connecting_is_noop() {
    let boot = BootController::new(config());
    started(&boot);
    boot.led_tick();
    boot.led_tick();
    let cursor = boot.scheduler().cursor();

    assert!(!boot.on_net_event(NetEvent::Disconnected));
    assert!(!boot.on_net_event(NetEvent::Disconnected));
    assert_eq!(boot.state(), ConnectivityState::Connecting);
    // Muster nicht neu gesetzt: Cursor läuft weiter
    assert_eq!(boot.scheduler().cursor(), cursor);
}

#[test]
fn test_app_led_is_deferred_until_ready() {
    let boot = BootController::new(config());
    started(&boot);

    boot.status_led().on();
    assert_eq!(boot.scheduler().mask(), PATTERN_CONNECTING);

    boot.on_net_event(NetEvent::GotIp);
    assert_eq!(boot.scheduler().mask(), PATTERN_ON);

    boot.status_led().off();
    assert_eq!(boot.scheduler().mask(), PATTERN_OFF);
}

// ============================================================================
// Tests: LED-Muster
// ============================================================================

#[test]
fn test_set_pattern_is_idempotent() {
    let scheduler = PatternScheduler::new();
    for mask in [0x0000_0001, PATTERN_CONNECTING, 0xDEAD_BEEF] {
        scheduler.set_pattern(mask);
        scheduler.tick(OnLevel::High);
        let cursor = scheduler.cursor();

        assert!(!scheduler.set_pattern(mask));
        assert_eq!(scheduler.cursor(), cursor);
    }
}

#[test]
fn test_led_tick_cycles_every_32_ticks() {
    let boot = BootController::new(config());
    started(&boot);

    let levels: Vec<bool> = (0..64).filter_map(|_| boot.led_tick()).collect();
    assert_eq!(levels.len(), 64);
    assert_eq!(levels[..32], levels[32..]);
    assert_eq!(boot.scheduler().cursor(), PATTERN_CONNECTING);
}

#[test]
fn test_led_tick_applies_active_low() {
    let boot = BootController::new(config());
    started(&boot);
    boot.on_net_event(NetEvent::GotIp);
    boot.status_led().on();

    // LED an bei aktiv LOW = Pin LOW
    assert_eq!(boot.led_tick(), Some(false));
}

// ============================================================================
// Tests: Button-Gesten
// ============================================================================

#[test]
fn test_release_before_debounce_is_ignored() {
    let presses = AtomicU32::new(0);
    let listener = || {
        presses.fetch_add(1, Ordering::Relaxed);
    };
    let mut boot = BootController::new(config());
    boot.set_button_press_listener(&listener);
    started(&boot);

    assert_eq!(boot.button_tick(RELEASED, 50), ButtonOutcome::Idle);
    assert_eq!(boot.button_tick(PRESSED, 100), ButtonOutcome::Idle);
    assert_eq!(boot.button_tick(RELEASED, 149), ButtonOutcome::Idle);
    assert_eq!(presses.load(Ordering::Relaxed), 0);
}

#[test]
fn test_short_press_fires_listener_once() {
    let presses = AtomicU32::new(0);
    let listener = || {
        presses.fetch_add(1, Ordering::Relaxed);
    };
    let mut boot = BootController::new(config());
    boot.set_button_press_listener(&listener);
    started(&boot);

    boot.button_tick(RELEASED, 50);
    boot.button_tick(PRESSED, 100);
    assert_eq!(boot.button_tick(RELEASED, 151), ButtonOutcome::Pressed);
    assert_eq!(boot.button_tick(RELEASED, 200), ButtonOutcome::Idle);
    assert_eq!(presses.load(Ordering::Relaxed), 1);
}

#[test]
fn test_button_tick_before_begin_is_idle() {
    let presses = AtomicU32::new(0);
    let listener = || {
        presses.fetch_add(1, Ordering::Relaxed);
    };
    let mut boot = BootController::new(config());
    boot.set_button_press_listener(&listener);

    // Button-Task läuft vor begin(): weder Tap noch Pairing
    assert_eq!(boot.button_tick(RELEASED, 500), ButtonOutcome::Idle);
    assert_eq!(boot.button_tick(RELEASED, 6_000), ButtonOutcome::Idle);
    assert_eq!(presses.load(Ordering::Relaxed), 0);
    assert_eq!(boot.state(), ConnectivityState::Init);

    // Fenster startet erst mit begin()
    started(&boot);
    assert_eq!(boot.button_tick(RELEASED, 50), ButtonOutcome::Idle);
    assert_eq!(presses.load(Ordering::Relaxed), 0);
}

#[test]
fn test_pairing_gesture_enters_pairing() {
    let presses = AtomicU32::new(0);
    let listener = || {
        presses.fetch_add(1, Ordering::Relaxed);
    };
    let mut boot = BootController::new(config());
    boot.set_button_press_listener(&listener);
    started(&boot);
    boot.on_net_event(NetEvent::GotIp);

    boot.button_tick(PRESSED, 4_000);
    assert_eq!(boot.button_tick(PRESSED, 5_001), ButtonOutcome::Idle);
    assert_eq!(boot.scheduler().mask(), PATTERN_PAIRING);
    // noch gedrückt: Zustand unverändert
    assert_eq!(boot.state(), ConnectivityState::Ready);

    assert_eq!(boot.button_tick(RELEASED, 5_050), ButtonOutcome::PairingRequested);
    assert_eq!(boot.state(), ConnectivityState::Pairing);
    assert_eq!(presses.load(Ordering::Relaxed), 0);
}

#[test]
fn test_reset_gesture_restarts_only_on_release() {
    let boot = BootController::new(config());
    started(&boot);

    assert_eq!(boot.button_tick(PRESSED, 10_001), ButtonOutcome::Idle);
    assert_eq!(boot.scheduler().mask(), PATTERN_REBOOT);
    assert_eq!(boot.button_tick(PRESSED, 15_000), ButtonOutcome::Idle);

    assert_eq!(boot.button_tick(RELEASED, 15_050), ButtonOutcome::Restart);
    assert_ne!(boot.state(), ConnectivityState::Pairing);
}

#[test]
fn test_button_without_config_is_ignored() {
    let boot = BootController::new(BootConfig::default());
    started(&boot);

    assert_eq!(boot.button_tick(PRESSED, 20_000), ButtonOutcome::Idle);
    assert_eq!(boot.button_tick(RELEASED, 20_050), ButtonOutcome::Idle);
}

// ============================================================================
// Tests: Pairing
// ============================================================================

#[test]
fn test_service_outside_pairing_does_nothing() {
    let boot = BootController::new(config());
    let mut wifi = started(&boot);
    wifi.calls.clear();

    let ran = block_on(boot.service(&mut wifi, || async {})).unwrap();
    assert!(!ran);
    assert!(wifi.calls.is_empty());
}

#[test]
fn test_pairing_sequence_resumes_join() {
    let boot = BootController::new(config());
    let mut wifi = started(&boot);
    boot.button_tick(PRESSED, 6_000);
    boot.button_tick(RELEASED, 6_050);
    assert_eq!(boot.state(), ConnectivityState::Pairing);

    wifi.calls.clear();
    wifi.pairing_polls = 3;
    let pauses = AtomicU32::new(0);
    let ran = block_on(boot.service(&mut wifi, || {
        pauses.fetch_add(1, Ordering::Relaxed);
        async {}
    }))
    .unwrap();

    assert!(ran);
    assert_eq!(pauses.load(Ordering::Relaxed), 3);
    assert_eq!(
        wifi.calls,
        [
            "stop_pairing",
            "start_pairing",
            "pairing_done",
            "pairing_done",
            "pairing_done",
            "pairing_done",
            "join"
        ]
    );
    assert_eq!(boot.state(), ConnectivityState::Connecting);
    assert_eq!(boot.scheduler().mask(), PATTERN_CONNECTING);
}

#[test]
fn test_got_ip_does_not_leave_pairing() {
    let boot = BootController::new(config());
    started(&boot);
    boot.button_tick(PRESSED, 6_000);
    boot.button_tick(RELEASED, 6_050);

    assert!(!boot.on_net_event(NetEvent::GotIp));
    assert_eq!(boot.state(), ConnectivityState::Pairing);
}
