// Status-LED Task - gibt das 32-Bit-Muster des Controllers aus
use defmt::{error, info};
use embassy_time::{Duration, Ticker};
use esp_core::{BootController, StatusLineWriter};

use crate::config::{LED_TICK_MS, STATUS_LED_GPIO_PIN};
use crate::hal::GpioStatusLine;

/// LED-Logik - testbar ohne Hardware-Abhängigkeit
///
/// Schreibt alle 100ms den Pegel, den der Controller für den aktuellen
/// Tick liefert. Ohne konfigurierte LED bleibt der Pin unverändert.
///
/// # Parameter
/// - `boot`: geteilter Controller (Muster + Polarität)
/// - `line`: Pin-Writer (Hardware oder Mock)
pub async fn status_led_logic<W: StatusLineWriter>(boot: &BootController<'_>, mut line: W) {
    let mut ticker = Ticker::every(Duration::from_millis(LED_TICK_MS));
    let mut failed = false;

    loop {
        if let Some(high) = boot.led_tick() {
            // Fehler nur einmal melden, nicht bei jedem Tick
            match line.write(high) {
                Err(_) if !failed => {
                    error!("Boot: Failed to write status LED");
                    failed = true;
                }
                Ok(()) => failed = false,
                Err(_) => {}
            }
        }
        ticker.next().await;
    }
}

/// Status-LED Task
#[embassy_executor::task]
pub async fn status_led_task(boot: &'static BootController<'static>, line: GpioStatusLine<'static>) {
    info!("Boot: Status LED on GPIO{}", STATUS_LED_GPIO_PIN);
    status_led_logic(boot, line).await;
}
