//! Persistierter Relais-Zustand
//!
//! Fester 5-Byte-Datensatz im Flash:
//!
//! | Offset | Länge | Inhalt                                  |
//! |--------|-------|-----------------------------------------|
//! | 0      | 4     | Magic `"so01"` als u32, Little Endian   |
//! | 4      | 1     | Relais an (`1`) / aus (`0`)             |
//!
//! Falsches Magic oder ein Lesefehler gelten als "kein gültiger Zustand"
//! und ergeben den Default (Relais aus).

use embedded_storage::{ReadStorage, Storage};

/// `'s' << 24 | 'o' << 16 | '0' << 8 | '1'`
pub const RELAY_MAGIC: u32 = u32::from_be_bytes(*b"so01");

/// Länge des Datensatzes in Bytes
pub const RECORD_LEN: usize = 5;

/// Fehler beim Zugriff auf den Speicher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    Read,
    Write,
}

/// Relais-Zustand
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayRecord {
    pub relay_is_on: bool,
}

impl RelayRecord {
    pub const fn new(relay_is_on: bool) -> Self {
        Self { relay_is_on }
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut bytes = [0u8; RECORD_LEN];
        bytes[..4].copy_from_slice(&RELAY_MAGIC.to_le_bytes());
        bytes[4] = u8::from(self.relay_is_on);
        bytes
    }

    /// `None` bei falschem Magic
    pub fn decode(bytes: &[u8; RECORD_LEN]) -> Option<Self> {
        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        (magic == RELAY_MAGIC).then(|| Self::new(bytes[4] != 0))
    }
}

/// Liest den Datensatz; `Ok(None)` bei falschem Magic
pub fn read_record<S: ReadStorage>(storage: &mut S, offset: u32) -> Result<Option<RelayRecord>, StoreError> {
    let mut bytes = [0u8; RECORD_LEN];
    storage
        .read(offset, &mut bytes)
        .map_err(|_| StoreError::Read)?;
    Ok(RelayRecord::decode(&bytes))
}

/// Liest den Datensatz, fällt bei jedem Problem auf den Default zurück
pub fn load<S: ReadStorage>(storage: &mut S, offset: u32) -> RelayRecord {
    read_record(storage, offset)
        .ok()
        .flatten()
        .unwrap_or_default()
}

/// Schreibt den vollständigen Datensatz
pub fn save<S: Storage>(storage: &mut S, offset: u32, record: RelayRecord) -> Result<(), StoreError> {
    storage
        .write(offset, &record.encode())
        .map_err(|_| StoreError::Write)
}

/// Zustandsspeicher der Relais-Anwendung
///
/// `&self`, weil aus Listener-Callbacks gespeichert wird. Firmware-
/// Implementierungen kapseln den Flash hinter einem Mutex.
pub trait StateStore {
    fn load(&self) -> RelayRecord;
    fn save(&self, record: RelayRecord) -> Result<(), StoreError>;
}
