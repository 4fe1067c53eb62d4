// Flash-Zugriff für Relais-Zustand und OTA
//
// Ein einziger `FlashStorage` wird zwischen Zustandsspeicher und OTA-Task
// geteilt. Der OTA-Task hält die Sperre über eine ganze Update-Sitzung
// (über `await` hinweg), deshalb ein async Mutex.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::mutex::Mutex;
use esp_core::persist::{self, RelayRecord, StateStore, StoreError};
use esp_storage::FlashStorage;

/// Gemeinsam genutzter Flash
pub type SharedFlash = Mutex<CriticalSectionRawMutex, FlashStorage<'static>>;

/// Relais-Zustand an festem Flash-Offset
///
/// Läuft gerade ein OTA-Update, ist der Flash gesperrt: Laden liefert den
/// Default, Speichern schlägt mit `StoreError::Write` fehl.
pub struct FlashStateStore {
    flash: &'static SharedFlash,
    offset: u32,
}

impl FlashStateStore {
    pub const fn new(flash: &'static SharedFlash, offset: u32) -> Self {
        Self { flash, offset }
    }
}

impl StateStore for FlashStateStore {
    fn load(&self) -> RelayRecord {
        match self.flash.try_lock() {
            Ok(mut flash) => persist::load(&mut *flash, self.offset),
            Err(_) => RelayRecord::default(),
        }
    }

    fn save(&self, record: RelayRecord) -> Result<(), StoreError> {
        let mut flash = self.flash.try_lock().map_err(|_| StoreError::Write)?;
        persist::save(&mut *flash, self.offset, record)
    }
}
