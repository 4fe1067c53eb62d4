// mDNS Responder Task - Advertised Hostname via Multicast DNS
//
// Macht das Gerät unter `<hostname>.local` erreichbar, u.a. für OTA-Clients.
//
// Technische Details:
// - Protokoll: mDNS (RFC 6762), nur A-Records
// - Transport: UDP Multicast auf 224.0.0.251:5353
// - Library: edge-mdns (no_std), Adapter edge-nal-embassy

use core::net::{Ipv4Addr, SocketAddr};
use core::sync::atomic::{AtomicU32, Ordering};

use defmt::{Debug2Format, error, info, warn};
use edge_mdns::{HostAnswersMdnsHandler, buf::VecBufAccess, domain::base::Ttl, host::Host, io};
use edge_nal::{MulticastV4, UdpBind, UdpSplit};
use edge_nal_embassy::{Udp, UdpBuffers};
use embassy_futures::select::{Either, select};
use embassy_net::Stack;
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use static_cell::StaticCell;

use crate::config::{
    MDNS_MULTICAST_ADDR, MDNS_PACKET_BUFFER_SIZE, MDNS_PORT, MDNS_RECONNECT_DELAY_SECS,
    MDNS_TTL_SECS, MDNS_UDP_BUFFER_SIZE,
};

type MdnsUdpBuffers = UdpBuffers<1, MDNS_UDP_BUFFER_SIZE, MDNS_UDP_BUFFER_SIZE>;

/// UDP-Buffer, einmal initialisiert und über alle Responder-Neustarts geteilt
static UDP_BUFFERS: StaticCell<MdnsUdpBuffers> = StaticCell::new();

static RNG_COUNTER: AtomicU32 = AtomicU32::new(0);

/// Zähler statt Zufall: mDNS braucht nur eindeutige Transaction IDs
fn mdns_rng(buf: &mut [u8]) {
    let mut counter = RNG_COUNTER.fetch_add(1, Ordering::Relaxed);
    for chunk in buf.chunks_mut(4) {
        let bytes = counter.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
        counter = counter.wrapping_add(1);
    }
}

/// mDNS Responder Task
///
/// Läuft je DHCP-Lease: sobald eine Adresse da ist, beantwortet der
/// Responder A-Record-Anfragen für `<hostname>.local`. Geht die Adresse
/// verloren, wird er beendet und mit der nächsten Adresse neu gestartet.
///
/// # Parameter
/// - `stack`: embassy-net Stack (shared mit allen Tasks)
/// - `hostname`: Hostname ohne `.local` Suffix
#[embassy_executor::task]
pub async fn mdns_responder_task(stack: &'static Stack<'static>, hostname: &'static str) {
    let udp_buffers: &'static MdnsUdpBuffers = UDP_BUFFERS.init(UdpBuffers::new());

    loop {
        stack.wait_config_up().await;
        let Some(config) = stack.config_v4() else {
            continue;
        };
        let our_ip = config.address.address();

        match select(
            run_mdns_responder(stack, udp_buffers, hostname, our_ip),
            stack.wait_config_down(),
        )
        .await
        {
            Either::First(Ok(())) => warn!("mDNS: Responder stopped normally"),
            Either::First(Err(e)) => {
                error!("mDNS: Error: {}", e);
                info!("mDNS: Restarting in {}s...", MDNS_RECONNECT_DELAY_SECS);
                Timer::after(Duration::from_secs(MDNS_RECONNECT_DELAY_SECS)).await;
            }
            Either::Second(()) => info!("mDNS: Address lost, responder paused"),
        }
    }
}

/// Führt mDNS Responder Loop für eine Adresse aus
async fn run_mdns_responder(
    stack: &'static Stack<'static>,
    udp_buffers: &'static MdnsUdpBuffers,
    hostname: &str,
    our_ip: Ipv4Addr,
) -> Result<(), MdnsError> {
    info!("mDNS: Using IP {}", Debug2Format(&our_ip));
    let udp_stack = Udp::new(*stack, udp_buffers);

    let mut socket = udp_stack
        .bind(SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), MDNS_PORT))
        .await
        .map_err(|_| MdnsError::SocketBindFailed)?;

    socket
        .join_v4(Ipv4Addr::from(MDNS_MULTICAST_ADDR), Ipv4Addr::UNSPECIFIED)
        .await
        .map_err(|_| MdnsError::MulticastJoinFailed)?;

    let (recv, send) = socket.split();

    let host = Host {
        hostname,
        ipv4: our_ip,
        // kein proto-ipv6 in smoltcp
        ipv6: [0u8; 16].into(),
        ttl: Ttl::from_secs(MDNS_TTL_SECS),
    };

    let recv_buf = VecBufAccess::<NoopRawMutex, MDNS_PACKET_BUFFER_SIZE>::new();
    let send_buf = VecBufAccess::<NoopRawMutex, MDNS_PACKET_BUFFER_SIZE>::new();

    // Broadcast-Signal wird von der API verlangt, hier nie ausgelöst
    let signal = Signal::<NoopRawMutex, ()>::new();

    let mdns = io::Mdns::new(
        Some(our_ip),
        None,
        recv,
        send,
        recv_buf,
        send_buf,
        mdns_rng,
        &signal,
    );

    info!("mDNS: Responder running, advertising '{}.local'", hostname);

    mdns.run(HostAnswersMdnsHandler::new(&host))
        .await
        .map_err(|_| MdnsError::ResponderFailed)
}

/// mDNS Fehler-Typen
///
/// Jeder Fehler führt zu einem Neustart des Responders.
#[derive(Debug)]
enum MdnsError {
    /// UDP Socket konnte nicht auf Port MDNS_PORT gebunden werden
    SocketBindFailed,
    /// Multicast-Gruppe konnte nicht gejoint werden
    MulticastJoinFailed,
    /// mDNS Responder Loop ist fehlgeschlagen
    ResponderFailed,
}

impl defmt::Format for MdnsError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            MdnsError::SocketBindFailed => defmt::write!(fmt, "Socket bind failed"),
            MdnsError::MulticastJoinFailed => defmt::write!(fmt, "Multicast join failed"),
            MdnsError::ResponderFailed => defmt::write!(fmt, "Responder failed"),
        }
    }
}
