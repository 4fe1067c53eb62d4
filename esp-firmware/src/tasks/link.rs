// Link Task - Line-Protokoll über einen rohen TCP-Socket
//
// Protokoll, Keep-Alive und Reconnect stecken in `esp_core::LineTransport`.
// Hier liegt nur der Socket-Adapter und die Task-Schleife.

use defmt::{Debug2Format, info, warn};
use embassy_net::Stack;
use embassy_net::tcp::{ConnectError, Error as TcpError, State, TcpSocket};
use embassy_time::Duration;
use embedded_io_async::Write;
use esp_core::{LineSocket, LineTransport, PeerState, PubSub, RelayApp};

use crate::config::{CLOUD_HOST, CLOUD_SOCKET_BUFFER_SIZE, CLOUD_TCP_PORT};
use crate::tasks::net::{DnsError, resolve_hostname};
use crate::tasks::relay::{Wake, next_wake, toggle_and_report};
use crate::{NetEventSubscriber, now_ms};

/// Fehler des TCP-Adapters
#[derive(Debug)]
pub enum TcpLineError {
    Dns(DnsError),
    Connect(ConnectError),
    Socket(TcpError),
}

/// `LineSocket` über embassy-net
///
/// Der Socket wird über alle Verbindungen wiederverwendet; `close()` bricht
/// die Verbindung hart ab, danach ist ein neues `connect()` möglich.
pub struct TcpLine<'a> {
    stack: Stack<'static>,
    socket: TcpSocket<'a>,
}

impl<'a> TcpLine<'a> {
    pub fn new(stack: Stack<'static>, rx_buffer: &'a mut [u8], tx_buffer: &'a mut [u8]) -> Self {
        let mut socket = TcpSocket::new(stack, rx_buffer, tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(30)));
        Self { stack, socket }
    }
}

impl LineSocket for TcpLine<'_> {
    type Error = TcpLineError;

    async fn connect(&mut self) -> Result<(), TcpLineError> {
        self.socket.abort();
        info!("Link: Resolving '{}'...", CLOUD_HOST);
        let server_ip = resolve_hostname(self.stack, CLOUD_HOST)
            .await
            .map_err(TcpLineError::Dns)?;

        self.socket
            .connect((server_ip, CLOUD_TCP_PORT))
            .await
            .map_err(TcpLineError::Connect)?;
        info!("Link: TCP connected to {}:{}", CLOUD_HOST, CLOUD_TCP_PORT);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        let peer = match self.socket.state() {
            State::Established => PeerState::Open,
            // FIN empfangen: Rest lesen, dann gilt die Verbindung als verloren
            State::CloseWait => PeerState::HalfClosed,
            _ => PeerState::Closed,
        };
        peer.is_open(self.socket.can_recv())
    }

    fn available(&self) -> bool {
        self.socket.can_recv()
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, TcpLineError> {
        self.socket.read(buf).await.map_err(TcpLineError::Socket)
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), TcpLineError> {
        Write::write_all(&mut self.socket, data)
            .await
            .map_err(TcpLineError::Socket)
    }

    fn close(&mut self) {
        self.socket.abort();
    }
}

/// Link Task
///
/// Wacht bei WLAN-Ereignissen, Button-Drücken und alle `TRANSPORT_TICK_MS`
/// auf und lässt den Transport einen Schritt machen.
#[embassy_executor::task]
pub async fn link_task(
    stack: &'static Stack<'static>,
    transport: &'static mut LineTransport<'static>,
    app: &'static RelayApp<'static>,
    mut events: NetEventSubscriber,
) {
    let mut rx_buffer = [0u8; CLOUD_SOCKET_BUFFER_SIZE];
    let mut tx_buffer = [0u8; CLOUD_SOCKET_BUFFER_SIZE];
    let mut link = TcpLine::new(*stack, &mut rx_buffer, &mut tx_buffer);
    info!("Link: Task started, topic '{}'", app.topic());

    loop {
        match next_wake(&mut events).await {
            Wake::Net(event) => transport.on_network(event),
            Wake::Press => toggle_and_report(app, &mut *transport),
            Wake::Tick => {}
        }

        let was_connected = transport.is_connected();
        if let Err(e) = transport.poll(&mut link, now_ms()).await {
            warn!("Link: {}", Debug2Format(&e));
        }

        match (was_connected, transport.is_connected()) {
            (false, true) => info!("Link: Connected"),
            (true, false) if transport.reconnect_pending() => {
                warn!("Link: Connection lost, retrying shortly")
            }
            (true, false) => info!("Link: Disconnected"),
            _ => {}
        }
    }
}
