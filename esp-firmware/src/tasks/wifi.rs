// WiFi Tasks - Station, Pairing-AP und WLAN-Ereignisse
use alloc::string::String;

use defmt::{Debug2Format, error, info, warn};
use embassy_futures::select::{Either, select};
use embassy_net::{Runner, Stack};
use embassy_time::{Duration, Timer};
use esp_core::types::Hostname;
use esp_core::{BootController, Credentials, WifiStation};
use esp_radio::wifi::{
    AccessPointConfig, ClientConfig, ModeConfig, WifiController, WifiDevice, WifiError, WifiEvent,
};

use crate::config::{PAIRING_AP_SUFFIX, PAIRING_POLL_MS, WIFI_RETRY_DELAY_SECS};
use crate::tasks::ota::OtaService;
use crate::{CREDENTIALS, NetEventPublisher, NetEventSubscriber, PAIRING_REQUEST, now_ms};

/// WLAN-Station über esp-radio
///
/// `join()` merkt sich nur den Auftrag; den eigentlichen Verbindungsaufbau
/// macht `wifi_task`, damit der Controller nicht blockiert.
pub struct RadioStation {
    controller: WifiController<'static>,
    credentials: Credentials,
    hostname: Option<Hostname>,
    join_pending: bool,
    /// Modus muss vor dem nächsten Join neu gesetzt werden (nach Pairing)
    reconfigure: bool,
}

impl RadioStation {
    pub fn new(controller: WifiController<'static>, credentials: Credentials) -> Self {
        Self {
            controller,
            credentials,
            hostname: None,
            join_pending: false,
            reconfigure: false,
        }
    }

    pub fn ssid(&self) -> &str {
        &self.credentials.ssid
    }

    fn client_config(&self) -> ModeConfig {
        ModeConfig::Client(
            ClientConfig::default()
                .with_ssid(self.credentials.ssid.as_str().into())
                .with_password(self.credentials.password.as_str().into()),
        )
    }

    fn pairing_ssid(&self) -> String {
        let mut ssid = String::from(self.hostname.as_deref().unwrap_or("esp-steckdose"));
        ssid.push_str(PAIRING_AP_SUFFIX);
        ssid
    }

    /// Station (neu) konfigurieren und starten, falls nötig
    async fn restart_station(&mut self) -> Result<(), WifiError> {
        if matches!(self.controller.is_started(), Ok(true)) {
            self.controller.stop_async().await?;
        }
        self.controller.set_config(&self.client_config())?;
        self.controller.start_async().await
    }

    /// Ausstehenden Join-Auftrag übernehmen
    pub fn take_join_request(&mut self) -> bool {
        core::mem::take(&mut self.join_pending)
    }

    /// Join beim nächsten Durchlauf wiederholen
    pub fn request_join(&mut self) {
        self.join_pending = true;
    }

    pub async fn connect(&mut self) -> Result<(), WifiError> {
        if self.reconfigure || !matches!(self.controller.is_started(), Ok(true)) {
            self.restart_station().await?;
            self.reconfigure = false;
        }
        self.controller.connect_async().await
    }

    pub async fn wait_disconnected(&mut self) {
        self.controller
            .wait_for_event(WifiEvent::StaDisconnected)
            .await;
    }
}

impl WifiStation for RadioStation {
    type Error = WifiError;

    async fn start_station(&mut self, hostname: Option<&str>) -> Result<(), WifiError> {
        self.hostname = hostname.and_then(|name| Hostname::try_from(name).ok());
        info!("WiFi: Configuring and starting...");
        self.restart_station().await?;
        info!("WiFi: Started successfully");
        Ok(())
    }

    fn join(&mut self) -> Result<(), WifiError> {
        self.join_pending = true;
        Ok(())
    }

    async fn stop_pairing(&mut self) -> Result<(), WifiError> {
        self.join_pending = false;
        if matches!(self.controller.is_connected(), Ok(true)) {
            self.controller.disconnect_async().await?;
        }
        Ok(())
    }

    async fn start_pairing(&mut self) -> Result<(), WifiError> {
        // alte Credentials aus einem abgebrochenen Pairing verwerfen
        CREDENTIALS.reset();

        let ssid = self.pairing_ssid();
        let ap = AccessPointConfig::default().with_ssid(ssid.clone());
        let client = ClientConfig::default()
            .with_ssid(self.credentials.ssid.as_str().into())
            .with_password(self.credentials.password.as_str().into());

        if matches!(self.controller.is_started(), Ok(true)) {
            self.controller.stop_async().await?;
        }
        self.controller.set_config(&ModeConfig::ApSta(client, ap))?;
        self.controller.start_async().await?;
        self.reconfigure = true;

        info!("WiFi: Pairing AP '{}' is up", ssid.as_str());
        Ok(())
    }

    fn pairing_done(&mut self) -> bool {
        let Some(credentials) = CREDENTIALS.try_take() else {
            return false;
        };
        info!("WiFi: Received credentials for '{}'", credentials.ssid.as_str());
        self.credentials = credentials;
        true
    }
}

/// WiFi Task - treibt Controller-Lifecycle, Join und Pairing
///
/// Ablauf:
/// 1. `begin()` startet Station und Update-Service und fordert den Join an
/// 2. Join ausführen; bei Fehler nach `WIFI_RETRY_DELAY_SECS` erneut
/// 3. Auf Disconnect oder Pairing-Geste warten
/// 4. Im Zustand PAIRING die Pairing-Sequenz des Controllers abarbeiten
#[embassy_executor::task]
pub async fn wifi_task(
    boot: &'static BootController<'static>,
    controller: WifiController<'static>,
    credentials: Credentials,
) {
    info!("WiFi: Starting connection task");
    let mut station = RadioStation::new(controller, credentials);
    let mut updates = OtaService;

    if let Err(e) = boot.begin(&mut station, &mut updates, now_ms()).await {
        error!("WiFi: Failed to start: {}", Debug2Format(&e));
        station.request_join();
    }

    loop {
        let pause = || Timer::after(Duration::from_millis(PAIRING_POLL_MS));
        match boot.service(&mut station, pause).await {
            Ok(true) => info!("WiFi: Pairing finished"),
            Ok(false) => {}
            Err(e) => {
                error!("WiFi: Pairing failed: {}", Debug2Format(&e));
                Timer::after(Duration::from_secs(WIFI_RETRY_DELAY_SECS)).await;
                continue;
            }
        }

        if station.take_join_request() {
            info!("WiFi: Connecting to '{}'...", station.ssid());
            if let Err(e) = station.connect().await {
                error!("WiFi: Connection failed: {}", Debug2Format(&e));
                station.request_join();
                // Pairing-Geste unterbricht die Wartezeit
                select(
                    Timer::after(Duration::from_secs(WIFI_RETRY_DELAY_SECS)),
                    PAIRING_REQUEST.wait(),
                )
                .await;
                continue;
            }
            info!("WiFi: Connected successfully!");
        }

        info!("WiFi: Waiting for disconnect event...");
        match select(station.wait_disconnected(), PAIRING_REQUEST.wait()).await {
            Either::First(()) => {
                warn!("WiFi: Disconnected from AP, will retry...");
                station.request_join();
                Timer::after(Duration::from_secs(2)).await;
            }
            Either::Second(()) => info!("WiFi: Leaving station mode for pairing"),
        }
    }
}

/// Netzwerk-Stack Task - verarbeitet Pakete eines Interfaces
///
/// Läuft zweimal: Station und Pairing-AP.
#[embassy_executor::task(pool_size = 2)]
pub async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) -> ! {
    runner.run().await
}

/// DHCP Task - meldet Adresse erhalten / verloren als `NetEvent`
///
/// Einziger Publisher des Ereignis-Channels.
#[embassy_executor::task]
pub async fn dhcp_task(stack: &'static Stack<'static>, publisher: NetEventPublisher) {
    loop {
        stack.wait_config_up().await;
        if let Some(config) = stack.config_v4() {
            info!("WiFi: Got IP address!");
            info!("  IP:      {}", Debug2Format(&config.address.address()));
            info!("  Gateway: {}", Debug2Format(&config.gateway));
        }
        publisher.publish(esp_core::NetEvent::GotIp).await;

        stack.wait_config_down().await;
        warn!("WiFi: Lost IP address");
        publisher.publish(esp_core::NetEvent::Disconnected).await;
    }
}

/// Connectivity Task - leitet WLAN-Ereignisse an den Controller
#[embassy_executor::task]
pub async fn connectivity_task(boot: &'static BootController<'static>, mut events: NetEventSubscriber) {
    loop {
        let event = events.next_message_pure().await;
        if boot.on_net_event(event) {
            info!("Boot: {} -> {}", event, boot.state());
        }
    }
}
