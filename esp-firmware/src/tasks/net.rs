// Gemeinsame Netzwerk-Helfer für die Tasks
use embassy_net::tcp::TcpSocket;
use embassy_net::{IpAddress, Ipv4Address, Stack, dns::DnsQueryType};
use embassy_time::{Duration, Timer, with_timeout};
use esp_core::LineFramer;
use heapless::Vec;

use crate::config::DNS_TIMEOUT_SECS;

/// Wartet bis Netzwerk-Verbindung verfügbar ist
///
/// Prüft kontinuierlich Link-Status und DHCP-Konfiguration.
pub async fn wait_for_network(stack: &'static Stack<'static>) {
    loop {
        if stack.is_link_up() && stack.config_v4().is_some() {
            break;
        }
        Timer::after(Duration::from_millis(500)).await;
    }
}

/// Fehler bei der Namensauflösung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsError {
    ResolutionFailed,
    Timeout,
}

impl defmt::Format for DnsError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            DnsError::ResolutionFailed => defmt::write!(fmt, "DNS failed"),
            DnsError::Timeout => defmt::write!(fmt, "DNS timeout"),
        }
    }
}

/// Löst Hostname zu IPv4-Adresse auf
///
/// Nutzt embassy-net DNS-Stack mit konfigurierbarem Timeout.
pub async fn resolve_hostname(stack: Stack<'static>, hostname: &str) -> Result<Ipv4Address, DnsError> {
    let result = with_timeout(
        Duration::from_secs(DNS_TIMEOUT_SECS),
        stack.dns_query(hostname, DnsQueryType::A),
    )
    .await;

    match result {
        Ok(Ok(addrs)) => addrs
            .iter()
            .find_map(|addr| match addr {
                IpAddress::Ipv4(ipv4) => Some(*ipv4),
                #[allow(unreachable_patterns)]
                _ => None,
            })
            .ok_or(DnsError::ResolutionFailed),
        Ok(Err(_)) => Err(DnsError::ResolutionFailed),
        Err(_) => Err(DnsError::Timeout),
    }
}

/// Fehler beim Lesen einer Zeile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineReadError {
    /// Gegenseite hat geschlossen
    Closed,
    Socket,
    /// Zeile länger als der Puffer
    TooLong,
    NotUtf8,
}

/// Liest genau eine CR LF-terminierte Zeile
///
/// Liest byteweise, damit nach der Zeile folgende Daten (z.B. ein
/// Firmware-Image) im Socket bleiben.
pub async fn read_line<const N: usize>(socket: &mut TcpSocket<'_>) -> Result<Vec<u8, N>, LineReadError> {
    let mut framer = LineFramer::<N>::new();
    let mut byte = [0u8; 1];
    loop {
        match socket.read(&mut byte).await {
            Ok(0) => return Err(LineReadError::Closed),
            Ok(_) => {}
            Err(_) => return Err(LineReadError::Socket),
        }
        if let Some(line) = framer.push(byte[0]) {
            return Ok(line);
        }
        if framer.overflows() > 0 {
            return Err(LineReadError::TooLong);
        }
    }
}

/// Zeile als `&str`
pub fn line_str(line: &[u8]) -> Result<&str, LineReadError> {
    core::str::from_utf8(line).map_err(|_| LineReadError::NotUtf8)
}
