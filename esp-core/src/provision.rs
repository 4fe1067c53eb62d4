//! Credentials-Zeile für das Pairing
//!
//! Im Pairing-Modus nimmt die Firmware genau eine Zeile
//! `&ssid=<ssid>&pass=<passwort>` entgegen (gleiche Feld-Syntax wie das
//! Line-Protokoll). Werte dürfen daher kein `&` enthalten.

use heapless::String;

use crate::line::field;

/// Maximale SSID-Länge (IEEE 802.11)
pub const SSID_CAPACITY: usize = 32;

/// Maximale Passwort-Länge (WPA2)
pub const PASSWORD_CAPACITY: usize = 64;

/// Fehler beim Lesen der Credentials-Zeile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionError {
    MissingSsid,
    SsidTooLong,
    PasswordTooLong,
}

/// Neue WLAN-Zugangsdaten (nur im RAM)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String<SSID_CAPACITY>,
    pub password: String<PASSWORD_CAPACITY>,
}

impl Credentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, ProvisionError> {
        if ssid.is_empty() {
            return Err(ProvisionError::MissingSsid);
        }
        Ok(Self {
            ssid: String::try_from(ssid).map_err(|_| ProvisionError::SsidTooLong)?,
            password: String::try_from(password).map_err(|_| ProvisionError::PasswordTooLong)?,
        })
    }

    /// Parst eine Zeile (ohne CR LF); fehlendes `pass` = offenes Netz
    pub fn parse(line: &str) -> Result<Self, ProvisionError> {
        let ssid = field(line, "ssid").ok_or(ProvisionError::MissingSsid)?;
        Self::new(ssid, field(line, "pass").unwrap_or(""))
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for ProvisionError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            ProvisionError::MissingSsid => defmt::write!(fmt, "missing ssid"),
            ProvisionError::SsidTooLong => defmt::write!(fmt, "ssid too long"),
            ProvisionError::PasswordTooLong => defmt::write!(fmt, "password too long"),
        }
    }
}
