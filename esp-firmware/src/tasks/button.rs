// Button Task - tastet den Button ab und setzt Gesten um
use defmt::{error, info, warn};
use embassy_time::{Duration, Ticker, Timer};
use esp_core::{BootController, ButtonOutcome, ButtonReader};

use crate::config::{BUTTON_GPIO_PIN, BUTTON_TICK_MS};
use crate::hal::GpioButton;
use crate::{PAIRING_REQUEST, now_ms};

/// Button-Logik - testbar ohne Hardware-Abhängigkeit
///
/// Liest alle 50ms den Pin und gibt ihn an den Controller. Der kurze Druck
/// läuft über den registrierten Listener, Pairing weckt den WiFi-Task.
/// Kehrt zurück, sobald ein Neustart verlangt ist.
pub async fn button_logic<B: ButtonReader>(boot: &BootController<'_>, mut button: B) {
    let mut ticker = Ticker::every(Duration::from_millis(BUTTON_TICK_MS));

    loop {
        match button.is_high() {
            Ok(high) => match boot.button_tick(high, now_ms()) {
                ButtonOutcome::Idle => {}
                ButtonOutcome::Pressed => info!("Button: Short press"),
                ButtonOutcome::PairingRequested => {
                    info!("Button: Pairing requested");
                    PAIRING_REQUEST.signal(());
                }
                ButtonOutcome::Restart => {
                    warn!("Button: Reset gesture, restarting");
                    return;
                }
            },
            Err(_) => error!("Button: Failed to read pin"),
        }
        ticker.next().await;
    }
}

/// Button Task
#[embassy_executor::task]
pub async fn button_task(boot: &'static BootController<'static>, button: GpioButton<'static>) {
    info!("Button: Watching GPIO{}", BUTTON_GPIO_PIN);
    button_logic(boot, button).await;

    // Log-Ausgabe abwarten
    Timer::after(Duration::from_millis(100)).await;
    esp_hal::system::software_reset();
}
