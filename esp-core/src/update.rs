//! Firmware-Update (OTA) Handshake und Verifikation
//!
//! Ablauf einer Session auf dem Update-Port:
//!
//! ```text
//! Gerät  → nonce=<u32>\r\n
//! Client → &size=<bytes>&sha256=<64 hex>[&auth=<64 hex>]\r\n
//! Gerät  → OK\r\n            | ERR <grund>\r\n
//! Client → <size Bytes Image>
//! Gerät  → OK\r\n            | ERR <grund>\r\n   (danach Neustart)
//! ```
//!
//! Mit Passwort muss `auth` = hex(SHA-256("<passwort>:<nonce>")) sein.
//! Hier liegt nur das Protokoll; Flash-Schreiben und Neustart macht die Firmware.

use core::fmt::Write;

use heapless::String;
use sha2::{Digest, Sha256};

use crate::line::field;

/// TCP-Port des Update-Service
pub const UPDATE_PORT: u16 = 3232;

/// Länge eines SHA-256 Digests
pub const DIGEST_LEN: usize = 32;

pub type Digest32 = [u8; DIGEST_LEN];

/// Fehler einer Update-Session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateError {
    /// Pflichtfeld fehlt im Angebot
    MissingField,
    /// Ungültige Hex-Zeichenkette
    BadHex,
    /// Größe nicht lesbar, 0 oder größer als die Partition
    BadSize,
    /// Authentifizierung fehlgeschlagen
    AuthFailed,
    /// Mehr Daten als angekündigt
    TooLarge,
    /// Weniger Daten als angekündigt
    Truncated,
    /// Prüfsumme stimmt nicht
    DigestMismatch,
    /// Flash-Zugriff fehlgeschlagen
    Flash,
}

impl UpdateError {
    /// Kurzer Grund für die `ERR`-Zeile
    pub const fn reason(self) -> &'static str {
        match self {
            UpdateError::MissingField => "field",
            UpdateError::BadHex => "hex",
            UpdateError::BadSize => "size",
            UpdateError::AuthFailed => "auth",
            UpdateError::TooLarge => "too-large",
            UpdateError::Truncated => "truncated",
            UpdateError::DigestMismatch => "sha256",
            UpdateError::Flash => "flash",
        }
    }
}

/// Challenge-Zeile für den Client
pub fn challenge_line(nonce: u32) -> String<24> {
    let mut line = String::new();
    // "nonce=" + max. 10 Ziffern + CR LF passt immer
    let _ = write!(line, "nonce={nonce}\r\n");
    line
}

/// Erwartete Antwort auf die Challenge
pub fn expected_auth(password: u32, nonce: u32) -> Digest32 {
    let mut input: String<24> = String::new();
    let _ = write!(input, "{password}:{nonce}");
    Sha256::digest(input.as_bytes()).into()
}

/// 64 Hex-Zeichen → 32 Bytes (Groß- und Kleinschreibung)
pub fn decode_hex32(text: &str) -> Result<Digest32, UpdateError> {
    let bytes = text.as_bytes();
    if bytes.len() != DIGEST_LEN * 2 {
        return Err(UpdateError::BadHex);
    }

    let mut out = [0u8; DIGEST_LEN];
    for (slot, pair) in out.iter_mut().zip(bytes.chunks_exact(2)) {
        *slot = (nibble(pair[0])? << 4) | nibble(pair[1])?;
    }
    Ok(out)
}

fn nibble(c: u8) -> Result<u8, UpdateError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(UpdateError::BadHex),
    }
}

/// Update-Angebot des Clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateOffer {
    pub size: u32,
    pub sha256: Digest32,
    pub auth: Option<Digest32>,
}

impl UpdateOffer {
    /// Parst die Angebotszeile (ohne CR LF)
    pub fn parse(line: &str) -> Result<Self, UpdateError> {
        let size = field(line, "size")
            .ok_or(UpdateError::MissingField)?
            .parse::<u32>()
            .map_err(|_| UpdateError::BadSize)?;
        if size == 0 {
            return Err(UpdateError::BadSize);
        }

        let sha256 = decode_hex32(field(line, "sha256").ok_or(UpdateError::MissingField)?)?;
        let auth = field(line, "auth").map(decode_hex32).transpose()?;

        Ok(Self { size, sha256, auth })
    }

    /// Prüft das Angebot gegen Passwort und Challenge
    ///
    /// Ohne Passwort wird `auth` ignoriert.
    pub fn authorize(&self, password: Option<u32>, nonce: u32) -> Result<(), UpdateError> {
        let Some(password) = password else {
            return Ok(());
        };
        match self.auth {
            Some(auth) if auth == expected_auth(password, nonce) => Ok(()),
            _ => Err(UpdateError::AuthFailed),
        }
    }
}

/// Laufende Image-Übertragung
///
/// Zählt und hasht die empfangenen Bytes. Die Firmware schreibt jeden
/// Chunk an den von `accept()` gelieferten Offset.
pub struct UpdateSession {
    expected: Digest32,
    size: u32,
    received: u32,
    hasher: Sha256,
}

impl UpdateSession {
    /// # Parameter
    /// - `capacity`: Größe der Ziel-Partition in Bytes
    pub fn new(offer: &UpdateOffer, capacity: u32) -> Result<Self, UpdateError> {
        if offer.size > capacity {
            return Err(UpdateError::BadSize);
        }
        Ok(Self {
            expected: offer.sha256,
            size: offer.size,
            received: 0,
            hasher: Sha256::new(),
        })
    }

    /// Nimmt einen Chunk an; liefert dessen Offset im Image
    pub fn accept(&mut self, chunk: &[u8]) -> Result<u32, UpdateError> {
        let len = u32::try_from(chunk.len()).map_err(|_| UpdateError::TooLarge)?;
        let end = self
            .received
            .checked_add(len)
            .filter(|&end| end <= self.size)
            .ok_or(UpdateError::TooLarge)?;

        let offset = self.received;
        self.hasher.update(chunk);
        self.received = end;
        Ok(offset)
    }

    /// Noch ausstehende Bytes
    pub fn remaining(&self) -> u32 {
        self.size - self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received == self.size
    }

    /// Länge und Prüfsumme verifizieren
    pub fn finish(self) -> Result<(), UpdateError> {
        if !self.is_complete() {
            return Err(UpdateError::Truncated);
        }
        let digest: Digest32 = self.hasher.finalize().into();
        if digest != self.expected {
            return Err(UpdateError::DigestMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // SHA-256("abc")
    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn test_parse_offer_without_auth() {
        let line = "&size=3&sha256=BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        let offer = UpdateOffer::parse(line).unwrap();
        assert_eq!(offer.size, 3);
        assert_eq!(offer.sha256, decode_hex32(ABC).unwrap());
        assert_eq!(offer.auth, None);
    }

    #[test]
    fn test_parse_offer_rejects_short_hex() {
        assert_eq!(UpdateOffer::parse("&size=3&sha256=ba78"), Err(UpdateError::BadHex));
        assert_eq!(UpdateOffer::parse("&size=3"), Err(UpdateError::MissingField));
        assert_eq!(UpdateOffer::parse("&size=x&sha256=00"), Err(UpdateError::BadSize));
    }

    #[test]
    fn test_session_verifies_digest() {
        let offer = UpdateOffer {
            size: 3,
            sha256: decode_hex32(ABC).unwrap(),
            auth: None,
        };
        let mut session = UpdateSession::new(&offer, 1024).unwrap();
        assert_eq!(session.accept(b"ab"), Ok(0));
        assert_eq!(session.accept(b"c"), Ok(2));
        assert_eq!(session.finish(), Ok(()));
    }

    #[test]
    fn test_session_rejects_overrun_and_truncation() {
        let offer = UpdateOffer {
            size: 3,
            sha256: decode_hex32(ABC).unwrap(),
            auth: None,
        };
        let mut session = UpdateSession::new(&offer, 1024).unwrap();
        assert_eq!(session.accept(b"abcd"), Err(UpdateError::TooLarge));
        session.accept(b"ab").unwrap();
        assert_eq!(session.finish(), Err(UpdateError::Truncated));
    }

    #[test]
    fn test_authorize_with_password() {
        let mut offer = UpdateOffer {
            size: 1,
            sha256: [0; DIGEST_LEN],
            auth: None,
        };
        assert_eq!(offer.authorize(None, 7), Ok(()));
        assert_eq!(offer.authorize(Some(42), 7), Err(UpdateError::AuthFailed));

        offer.auth = Some(expected_auth(42, 7));
        assert_eq!(offer.authorize(Some(42), 7), Ok(()));
        assert_eq!(offer.authorize(Some(42), 8), Err(UpdateError::AuthFailed));
    }
}
