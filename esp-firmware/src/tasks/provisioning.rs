// Provisioning Tasks - DHCP und Credentials-Empfang am Pairing-AP
//
// Beide Tasks laufen dauerhaft auf dem AP-Stack. Solange kein Pairing läuft,
// ist das AP-Interface aus und `accept()` / `recv_from()` warten einfach.

use core::net::Ipv4Addr;

use defmt::{Debug2Format, info, warn};
use edge_dhcp::server::{Server as DhcpServer, ServerOptions as DhcpServerOptions};
use edge_dhcp::{Options as DhcpOptions, Packet as DhcpPacket};
use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_net::udp::{PacketMetadata, UdpSocket};
use embassy_time::Duration;
use embedded_io_async::Write;
use esp_core::Credentials;
use esp_core::provision::{PASSWORD_CAPACITY, SSID_CAPACITY};

use crate::CREDENTIALS;
use crate::config::{
    PAIRING_AP_ADDR, PAIRING_DHCP_RANGE, PAIRING_PORT, PAIRING_SOCKET_TIMEOUT_SECS,
};
use crate::tasks::net::{line_str, read_line};

/// Längste gültige Zeile: `&ssid=` + SSID + `&pass=` + Passwort + CR LF
const CREDENTIALS_LINE_CAPACITY: usize = 6 + SSID_CAPACITY + 6 + PASSWORD_CAPACITY + 2;

/// Provisioning Task - nimmt eine Credentials-Zeile pro Verbindung an
///
/// Protokoll (TCP Port `PAIRING_PORT`):
/// ```text
/// Client → &ssid=<ssid>&pass=<passwort>\r\n
/// Gerät  → OK\r\n | ERR\r\n
/// ```
/// Gültige Credentials werden an den WiFi-Task signalisiert, der damit das
/// Pairing abschließt.
#[embassy_executor::task]
pub async fn provisioning_task(ap_stack: Stack<'static>) {
    let mut rx_buffer = [0u8; 256];
    let mut tx_buffer = [0u8; 64];

    loop {
        let mut socket = TcpSocket::new(ap_stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(PAIRING_SOCKET_TIMEOUT_SECS)));

        if socket.accept(PAIRING_PORT).await.is_err() {
            warn!("WiFi: Provisioning accept error");
            continue;
        }
        info!("WiFi: Provisioning client connected");

        let reply: &[u8] = match read_line::<CREDENTIALS_LINE_CAPACITY>(&mut socket).await {
            Ok(line) => match line_str(&line).map(Credentials::parse) {
                Ok(Ok(credentials)) => {
                    CREDENTIALS.signal(credentials);
                    b"OK\r\n"
                }
                Ok(Err(e)) => {
                    warn!("WiFi: Rejected credentials: {}", e);
                    b"ERR\r\n"
                }
                Err(e) => {
                    warn!("WiFi: Provisioning line error: {}", Debug2Format(&e));
                    b"ERR\r\n"
                }
            },
            Err(e) => {
                warn!("WiFi: Provisioning line error: {}", Debug2Format(&e));
                b"ERR\r\n"
            }
        };

        let _ = socket.write_all(reply).await;
        let _ = socket.flush().await;
        socket.close();
    }
}

/// DHCP-Server Task - vergibt Adressen an Clients am Pairing-AP
#[embassy_executor::task]
pub async fn pairing_dhcp_task(ap_stack: Stack<'static>) {
    let mut rx_meta = [PacketMetadata::EMPTY; 2];
    let mut rx_buffer = [0u8; 600];
    let mut tx_meta = [PacketMetadata::EMPTY; 2];
    let mut tx_buffer = [0u8; 600];

    let mut socket = UdpSocket::new(ap_stack, &mut rx_meta, &mut rx_buffer, &mut tx_meta, &mut tx_buffer);
    if let Err(e) = socket.bind(67) {
        warn!("WiFi: DHCP server bind failed: {}", Debug2Format(&e));
        return;
    }

    let server_ip = Ipv4Addr::from(PAIRING_AP_ADDR);
    let mut gw_buf = [Ipv4Addr::UNSPECIFIED; 1];
    let server_options = DhcpServerOptions::new(server_ip, Some(&mut gw_buf));

    let mut server = DhcpServer::<_, 8>::new_with_et(server_ip);
    server.range_start = Ipv4Addr::from(PAIRING_DHCP_RANGE.0);
    server.range_end = Ipv4Addr::from(PAIRING_DHCP_RANGE.1);

    let mut buf = [0u8; 600];

    loop {
        let Ok((len, _meta)) = socket.recv_from(&mut buf).await else {
            continue;
        };

        let request = match DhcpPacket::decode(&buf[..len]) {
            Ok(packet) => packet,
            Err(e) => {
                warn!("WiFi: DHCP decode error: {}", Debug2Format(&e));
                continue;
            }
        };

        let mut opt_buf = DhcpOptions::buf();
        let Some(reply) = server.handle_request(&mut opt_buf, &server_options, &request) else {
            continue;
        };

        match reply.encode(&mut buf) {
            Ok(encoded) => {
                // Antworten gehen per Broadcast an Port 68
                let dest = (Ipv4Addr::BROADCAST, 68);
                if let Err(e) = socket.send_to(encoded, dest).await {
                    warn!("WiFi: DHCP send error: {}", Debug2Format(&e));
                }
            }
            Err(e) => warn!("WiFi: DHCP encode error: {}", Debug2Format(&e)),
        }
    }
}
