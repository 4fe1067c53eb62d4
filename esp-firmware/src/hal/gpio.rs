// GPIO-Treiber für Status-LED, Button und Relais
//
// Dünne Adapter von esp-hal GPIO auf die Traits aus esp-core.
// Die Polarität (aktiv LOW/HIGH) behandelt der Controller, hier werden
// nur rohe Pin-Pegel geschrieben bzw. gelesen.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use esp_core::traits::{ButtonReader, HalError, RelaySwitch, StatusLineWriter};
use esp_core::types::Pull;
use esp_hal::gpio::{Input, InputConfig, InputPin, Level, Output, OutputConfig, OutputPin};

/// Pull-Modus aus der Boot-Konfiguration auf esp-hal abbilden
fn hal_pull(pull: Pull) -> esp_hal::gpio::Pull {
    match pull {
        Pull::Up => esp_hal::gpio::Pull::Up,
        Pull::Down => esp_hal::gpio::Pull::Down,
        Pull::None => esp_hal::gpio::Pull::None,
    }
}

/// Status-LED an einem Push-Pull-Ausgang
pub struct GpioStatusLine<'d> {
    pin: Output<'d>,
}

impl<'d> GpioStatusLine<'d> {
    /// # Parameter
    /// - `pin`: GPIO für die LED
    /// - `initial_high`: Pegel bis zum ersten LED-Tick (LED aus)
    pub fn new(pin: impl OutputPin + 'd, initial_high: bool) -> Self {
        let pin = Output::new(pin, Level::from(initial_high), OutputConfig::default());
        Self { pin }
    }
}

impl StatusLineWriter for GpioStatusLine<'_> {
    fn write(&mut self, high: bool) -> Result<(), HalError> {
        self.pin.set_level(Level::from(high));
        Ok(())
    }
}

/// Button an einem Eingang mit konfigurierbarem Pull
pub struct GpioButton<'d> {
    pin: Input<'d>,
}

impl<'d> GpioButton<'d> {
    pub fn new(pin: impl InputPin + 'd, pull: Pull) -> Self {
        let pin = Input::new(pin, InputConfig::default().with_pull(hal_pull(pull)));
        Self { pin }
    }
}

impl ButtonReader for GpioButton<'_> {
    fn is_high(&mut self) -> Result<bool, HalError> {
        Ok(self.pin.is_high())
    }
}

/// Relais-Ausgang (HIGH = an)
///
/// Der Pin liegt hinter einem Mutex, weil `set()` aus Listener-Callbacks
/// mit `&self` kommt.
pub struct GpioRelay<'d> {
    pin: Mutex<CriticalSectionRawMutex, RefCell<Output<'d>>>,
}

impl<'d> GpioRelay<'d> {
    /// Startet mit abgefallenem Relais, bis der gespeicherte Zustand geladen ist
    pub fn new(pin: impl OutputPin + 'd) -> Self {
        let pin = Output::new(pin, Level::Low, OutputConfig::default());
        Self {
            pin: Mutex::new(RefCell::new(pin)),
        }
    }
}

impl RelaySwitch for GpioRelay<'_> {
    fn set(&self, on: bool) {
        self.pin.lock(|pin| pin.borrow_mut().set_level(Level::from(on)));
    }
}
