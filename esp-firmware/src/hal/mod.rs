// Hardware Abstraction Layer (HAL) Module
//
// Dieses Modul bindet die Traits aus esp-core an die ESP32-C6 Peripherie.
// Die Logik dahinter wird auf dem Host gegen Mocks getestet (esp-tests).

pub mod flash;
pub mod gpio;

pub use flash::{FlashStateStore, SharedFlash};
pub use gpio::{GpioButton, GpioRelay, GpioStatusLine};
