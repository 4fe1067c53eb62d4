// OTA Task - Firmware-Update über TCP
//
// Handshake und Prüfsummen liegen in `esp_core::update`; hier passiert nur
// Socket, Flash (nächste OTA-Partition) und Neustart.

use defmt::{Debug2Format, error, info, warn};
use embassy_net::Stack;
use embassy_net::tcp::TcpSocket;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};
use embedded_io_async::Write;
use embedded_storage::{ReadStorage, Storage};
use esp_bootloader_esp_idf::ota::OtaImageState;
use esp_bootloader_esp_idf::ota_updater::OtaUpdater;
use esp_bootloader_esp_idf::partitions::PARTITION_TABLE_MAX_LEN;
use esp_core::line::LINE_CAPACITY;
use esp_core::traits::{UpdateConfig, UpdateService};
use esp_core::update::{UPDATE_PORT, challenge_line};
use esp_core::{UpdateError, UpdateOffer, UpdateSession};
use esp_hal::rng::Rng;
use heapless::String;

use crate::config::{OTA_RX_BUFFER_SIZE, OTA_SOCKET_TIMEOUT_SECS};
use crate::hal::SharedFlash;
use crate::tasks::net::{line_str, read_line, wait_for_network};

/// Einstellungen aus `UpdateService::begin()`
#[derive(Debug, Clone, Copy)]
pub struct OtaSettings {
    pub password: Option<u32>,
}

/// Start-Signal für den OTA-Task
static OTA_SETTINGS: Signal<CriticalSectionRawMutex, OtaSettings> = Signal::new();

/// Update-Service für den Controller: gibt den OTA-Task frei
pub struct OtaService;

impl UpdateService for OtaService {
    fn begin(&mut self, config: UpdateConfig<'_>) {
        OTA_SETTINGS.signal(OtaSettings {
            password: config.password,
        });
    }
}

/// OTA Task
///
/// Wartet auf `begin()` und das Netzwerk, bestätigt das laufende Image und
/// bedient dann Update-Sitzungen auf `UPDATE_PORT`, eine nach der anderen.
/// Nach einem erfolgreichen Update startet das Gerät neu.
#[embassy_executor::task]
pub async fn ota_task(stack: &'static Stack<'static>, flash: &'static SharedFlash) {
    let settings = OTA_SETTINGS.wait().await;
    if settings.password.is_none() {
        warn!("OTA: No password configured, updates are unauthenticated");
    }

    confirm_running_image(flash).await;

    wait_for_network(stack).await;
    info!("OTA: Listening on port {}", UPDATE_PORT);

    let rng = Rng::new();
    let mut rx_buffer = [0u8; OTA_RX_BUFFER_SIZE];
    let mut tx_buffer = [0u8; 128];

    loop {
        let mut socket = TcpSocket::new(*stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(OTA_SOCKET_TIMEOUT_SECS)));

        if socket.accept(UPDATE_PORT).await.is_err() {
            warn!("OTA: Accept error");
            continue;
        }
        info!("OTA: Client connected");

        let result = run_session(&mut socket, flash, settings.password, rng.random()).await;
        let reply = session_reply(result);
        let _ = socket.write_all(reply.as_bytes()).await;
        let _ = socket.flush().await;
        socket.close();

        match result {
            Ok(()) => {
                info!("OTA: Update written, restarting");
                Timer::after(Duration::from_millis(500)).await;
                esp_hal::system::software_reset();
            }
            Err(e) => error!("OTA: Update aborted: {}", e.reason()),
        }
    }
}

/// `OK` bzw. `ERR <grund>` als Abschluss-Zeile
fn session_reply(result: Result<(), UpdateError>) -> String<32> {
    let mut reply = String::new();
    let _ = match result {
        Ok(()) => reply.push_str("OK\r\n"),
        Err(e) => reply
            .push_str("ERR ")
            .and_then(|_| reply.push_str(e.reason()))
            .and_then(|_| reply.push_str("\r\n")),
    };
    reply
}

/// Eine Update-Sitzung: Challenge, Angebot, Image, Aktivierung
async fn run_session(
    socket: &mut TcpSocket<'_>,
    flash: &'static SharedFlash,
    password: Option<u32>,
    nonce: u32,
) -> Result<(), UpdateError> {
    socket
        .write_all(challenge_line(nonce).as_bytes())
        .await
        .map_err(|_| UpdateError::Truncated)?;

    let line = read_line::<LINE_CAPACITY>(socket)
        .await
        .map_err(|_| UpdateError::MissingField)?;
    let offer = UpdateOffer::parse(line_str(&line).map_err(|_| UpdateError::MissingField)?)?;
    offer.authorize(password, nonce)?;
    info!("OTA: Accepted offer for {} bytes", offer.size);

    // Flash für die ganze Sitzung sperren (Relais-Zustand wartet)
    let mut flash = flash.lock().await;
    let mut table = [0u8; PARTITION_TABLE_MAX_LEN];
    let mut ota = OtaUpdater::new(&mut *flash, &mut table).map_err(flash_error)?;

    {
        let (mut partition, _) = ota.next_partition().map_err(flash_error)?;
        let mut session = UpdateSession::new(&offer, partition.capacity() as u32)?;

        socket
            .write_all(b"OK\r\n")
            .await
            .map_err(|_| UpdateError::Truncated)?;

        let mut chunk = [0u8; 1024];
        while !session.is_complete() {
            let want = chunk.len().min(session.remaining() as usize);
            let n = match socket.read(&mut chunk[..want]).await {
                Ok(0) | Err(_) => return Err(UpdateError::Truncated),
                Ok(n) => n,
            };
            let offset = session.accept(&chunk[..n])?;
            partition
                .write(offset, &chunk[..n])
                .map_err(flash_error)?;
        }
        session.finish()?;
    }

    ota.activate_next_partition().map_err(flash_error)?;
    ota.set_current_ota_state(OtaImageState::New)
        .map_err(flash_error)?;
    Ok(())
}

fn flash_error<E: core::fmt::Debug>(e: E) -> UpdateError {
    error!("OTA: Flash error: {}", Debug2Format(&e));
    UpdateError::Flash
}

/// Frisch aktiviertes Image als gültig markieren (sonst Rollback beim nächsten Boot)
async fn confirm_running_image(flash: &'static SharedFlash) {
    let mut flash = flash.lock().await;
    let mut table = [0u8; PARTITION_TABLE_MAX_LEN];
    let mut ota = match OtaUpdater::new(&mut *flash, &mut table) {
        Ok(ota) => ota,
        Err(e) => {
            warn!("OTA: No OTA partitions: {}", Debug2Format(&e));
            return;
        }
    };

    if matches!(
        ota.current_ota_state(),
        Ok(OtaImageState::New | OtaImageState::PendingVerify)
    ) {
        match ota.set_current_ota_state(OtaImageState::Valid) {
            Ok(()) => info!("OTA: Running image confirmed"),
            Err(e) => error!("OTA: Failed to confirm image: {}", Debug2Format(&e)),
        }
    }
}
