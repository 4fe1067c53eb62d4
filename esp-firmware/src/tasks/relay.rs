// Gemeinsame Schleifen-Bausteine der Transport-Tasks
use defmt::{Debug2Format, info, warn};
use embassy_futures::select::{Either3, select3};
use embassy_time::{Duration, Timer};
use esp_core::{NetEvent, Outbox, RelayApp};

use crate::config::TRANSPORT_TICK_MS;
use crate::{NetEventSubscriber, SHORT_PRESS};

/// Grund, warum ein Transport-Task aufwacht
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Net(NetEvent),
    /// Kurzer Button-Druck
    Press,
    Tick,
}

/// Wartet auf WLAN-Ereignis, Button-Druck oder den nächsten Poll-Tick
pub async fn next_wake(events: &mut NetEventSubscriber) -> Wake {
    match select3(
        events.next_message_pure(),
        SHORT_PRESS.wait(),
        Timer::after(Duration::from_millis(TRANSPORT_TICK_MS)),
    )
    .await
    {
        Either3::First(event) => Wake::Net(event),
        Either3::Second(()) => Wake::Press,
        Either3::Third(()) => Wake::Tick,
    }
}

/// Relais umschalten und den neuen Zustand einreihen
///
/// Speicherfehler werden nur geloggt, geschaltet ist trotzdem.
pub fn toggle_and_report(app: &RelayApp<'_>, out: &mut dyn Outbox) {
    match app.toggle() {
        Ok(on) => info!("Relay: Switched {}", if on { "on" } else { "off" }),
        Err(e) => warn!("Relay: Failed to store state: {}", Debug2Format(&e)),
    }
    if let Err(e) = app.report(out) {
        warn!("Relay: State report dropped: {}", Debug2Format(&e));
    }
}
