// Keine Standard-Bibliothek verwenden (Embedded System)
#![no_std]
// Kein normaler main() Einstiegspunkt (wird von esp_rtos bereitgestellt)
#![no_main]
// Verbiete mem::forget - gefährlich bei ESP HAL Types mit DMA-Buffern
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
// Verbiete große Stack-Frames (Stack ist auf Embedded Systemen begrenzt)
#![deny(clippy::large_stack_frames)]

// Heap Allocator (WiFi benötigt dynamischen Speicher)
extern crate alloc;

// Embassy Async Runtime
use embassy_executor::Spawner;
use embassy_net::{
    Config as NetConfig, Ipv4Address, Ipv4Cidr, Stack, StackResources, StaticConfigV4,
};
use embassy_time::{Duration, Timer};
use static_cell::StaticCell;

// ESP32-C6 HAL
use esp_hal::clock::CpuClock;
use esp_hal::efuse::Efuse;
use esp_hal::rng::Rng;
use esp_hal::timer::timg::TimerGroup;
use esp_storage::FlashStorage;

// Backtrace bei Panic und println!() Support
use {esp_backtrace as _, esp_println as _};

use defmt::info;
use esp_core::types::Hostname;
use esp_core::{BootConfig, BootController, Credentials, RelayApp, StatusLed, hostname_for_chip};

// Projekt-Module und Konfiguration
use esp_steckdose::config::{
    BUTTON, EXTRA_HEAP_SIZE, PAIRING_AP_ADDR, RELAY_RECORD_OFFSET, STATUS_LED_ON_LEVEL,
    WIFI_HEAP_SIZE, WIFI_PASSWORD, WIFI_SSID,
};
use esp_steckdose::hal::{FlashStateStore, GpioButton, GpioRelay, GpioStatusLine, SharedFlash};
use esp_steckdose::tasks::{
    button_task, connectivity_task, dhcp_task, mdns_responder_task, net_task, ota_task,
    pairing_dhcp_task, provisioning_task, status_led_task, wifi_task,
};
use esp_steckdose::{NetEventChannel, on_short_press};

#[cfg(feature = "transport-line")]
use esp_core::LineTransport;
#[cfg(feature = "transport-line")]
use esp_steckdose::config::CLOUD_CLIENT_ID;
#[cfg(feature = "transport-line")]
use esp_steckdose::tasks::link_task;

#[cfg(feature = "transport-mqtt")]
use esp_core::BrokerTransport;
#[cfg(feature = "transport-mqtt")]
use esp_steckdose::tasks::mqtt_task;

// ESP-IDF App Descriptor - erforderlich für den Bootloader!
// Ohne diesen schlägt das Flashen mit "ESP-IDF App Descriptor missing" fehl
esp_bootloader_esp_idf::esp_app_desc!();

/// Main Entry Point
///
/// Initialisiert Hardware, WiFi, baut Controller, Relais-Anwendung und
/// Transport auf und spawnt die Tasks. Danach schläft main() - alle Arbeit
/// läuft in Tasks.
#[esp_rtos::main]
async fn main(spawner: Spawner) -> ! {
    // ESP32-C6 Konfiguration: CPU auf maximale Taktfrequenz (160 MHz)
    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // Heap Allocator initialisieren (WiFi braucht dynamischen Speicher!)
    esp_alloc::heap_allocator!(
        #[esp_hal::ram(reclaimed)]
        size: WIFI_HEAP_SIZE
    );
    esp_alloc::heap_allocator!(size: EXTRA_HEAP_SIZE);

    // Embassy Runtime initialisieren (Timer + Software Interrupt)
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_interrupt =
        esp_hal::interrupt::software::SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_interrupt.software_interrupt0);

    // Geräte-Identität: Chip-ID = letzte drei Bytes der MAC
    let mac = Efuse::mac_address();
    let chip_id = u32::from_be_bytes([0, mac[3], mac[4], mac[5]]);
    static HOSTNAME: StaticCell<Hostname> = StaticCell::new();
    let hostname: &'static str = HOSTNAME.init(hostname_for_chip(chip_id)).as_str();
    info!("Boot: Device '{}' (chip id {})", hostname, chip_id);

    // WiFi Hardware initialisieren
    static RADIO_INIT: StaticCell<esp_radio::Controller> = StaticCell::new();
    let radio_init =
        RADIO_INIT.init(esp_radio::init().expect("Failed to initialize Wi-Fi/BLE controller"));

    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio_init, peripherals.WIFI, Default::default())
            .expect("Failed to initialize Wi-Fi");

    // Random seed für TCP/IP Stack (von Hardware RNG)
    let rng = Rng::new();
    let seed = (rng.random() as u64) << 32 | rng.random() as u64;

    // Station: DHCP, DNS, Cloud-Verbindung, OTA und mDNS
    static RESOURCES: StaticCell<StackResources<6>> = StaticCell::new();
    let (stack, runner) = embassy_net::new(
        interfaces.sta,
        NetConfig::dhcpv4(Default::default()),
        RESOURCES.init(StackResources::new()),
        seed,
    );
    static STACK: StaticCell<Stack<'static>> = StaticCell::new();
    let stack = &*STACK.init(stack);

    // Pairing-AP: statische Adresse, eigener DHCP-Server
    static AP_RESOURCES: StaticCell<StackResources<3>> = StaticCell::new();
    let ap_config = NetConfig::ipv4_static(StaticConfigV4 {
        address: Ipv4Cidr::new(Ipv4Address::from(PAIRING_AP_ADDR), 24),
        gateway: None,
        dns_servers: Default::default(),
    });
    let (ap_stack, ap_runner) = embassy_net::new(
        interfaces.ap,
        ap_config,
        AP_RESOURCES.init(StackResources::new()),
        seed.rotate_left(17),
    );

    // Controller: einmal konfigurieren, dann nur noch geteilt
    let boot_config = BootConfig {
        status_led: Some(STATUS_LED_ON_LEVEL),
        button: Some(BUTTON),
        hostname: Some(Hostname::try_from(hostname).expect("Hostname too long")),
        update_password: Some(chip_id),
        ..Default::default()
    };
    static BOOT: StaticCell<BootController<'static>> = StaticCell::new();
    let boot = BOOT.init(BootController::new(boot_config));
    boot.set_button_press_listener(&on_short_press);
    let boot: &'static BootController<'static> = boot;

    // Flash: geteilt zwischen Relais-Zustand und OTA
    static FLASH: StaticCell<SharedFlash> = StaticCell::new();
    let flash = &*FLASH.init(SharedFlash::new(FlashStorage::new(peripherals.FLASH)));

    // Relais-Anwendung
    static RELAY: StaticCell<GpioRelay<'static>> = StaticCell::new();
    let relay = &*RELAY.init(GpioRelay::new(peripherals.GPIO4));
    static STORE: StaticCell<FlashStateStore> = StaticCell::new();
    let store = &*STORE.init(FlashStateStore::new(flash, RELAY_RECORD_OFFSET));
    static LED: StaticCell<StatusLed<'static, 'static>> = StaticCell::new();
    let led = &*LED.init(boot.status_led());

    static APP: StaticCell<RelayApp<'static>> = StaticCell::new();
    let app = &*APP.init(RelayApp::new(hostname, relay, led, store).expect("Topic too long"));
    let record = app.apply_initial();
    info!("Relay: Restored state on={}", record.relay_is_on);

    // WLAN-Ereignisse: DHCP-Task → Controller + Transport
    static NET_EVENTS: StaticCell<NetEventChannel> = StaticCell::new();
    let net_events = &*NET_EVENTS.init(NetEventChannel::new());
    let publisher = net_events.publisher().expect("No free publisher slot");
    let controller_events = net_events.subscriber().expect("No free subscriber slot");
    let transport_events = net_events.subscriber().expect("No free subscriber slot");

    // Startwerte für die Station (durch Pairing ersetzbar)
    let credentials = Credentials::new(WIFI_SSID, WIFI_PASSWORD).expect("Invalid Wi-Fi credentials");

    // Status-LED startet aus, Button mit Pull aus der Konfiguration
    let status_line = GpioStatusLine::new(peripherals.GPIO15, STATUS_LED_ON_LEVEL.pin_level(false));
    let button = GpioButton::new(peripherals.GPIO9, BUTTON.pull);

    // Spawn Controller-Tasks
    spawner.spawn(status_led_task(boot, status_line)).unwrap();
    spawner.spawn(button_task(boot, button)).unwrap();

    // Spawn WiFi Tasks
    spawner
        .spawn(wifi_task(boot, wifi_controller, credentials))
        .unwrap();
    spawner.spawn(net_task(runner)).unwrap();
    spawner.spawn(net_task(ap_runner)).unwrap();
    spawner.spawn(dhcp_task(stack, publisher)).unwrap();
    spawner
        .spawn(connectivity_task(boot, controller_events))
        .unwrap();

    // Spawn Pairing Tasks (warten, solange der AP aus ist)
    spawner.spawn(pairing_dhcp_task(ap_stack)).unwrap();
    spawner.spawn(provisioning_task(ap_stack)).unwrap();

    // Spawn Transport Task
    #[cfg(feature = "transport-line")]
    {
        static TRANSPORT: StaticCell<LineTransport<'static>> = StaticCell::new();
        let uid = esp_core::line::ClientId::try_from(CLOUD_CLIENT_ID).expect("Client ID too long");
        let transport = TRANSPORT.init(LineTransport::new(uid));
        transport
            .on_event(app.topic(), app)
            .expect("Failed to register relay topic");
        transport.begin();
        spawner
            .spawn(link_task(stack, transport, app, transport_events))
            .unwrap();
    }
    #[cfg(feature = "transport-mqtt")]
    {
        static TRANSPORT: StaticCell<BrokerTransport<'static>> = StaticCell::new();
        let transport = TRANSPORT.init(BrokerTransport::new());
        transport
            .on_event(app.topic(), app)
            .expect("Failed to register relay topic");
        transport.begin();
        spawner
            .spawn(mqtt_task(stack, transport, app, transport_events))
            .unwrap();
    }

    // Spawn OTA und mDNS (für <hostname>.local)
    spawner.spawn(ota_task(stack, flash)).unwrap();
    spawner.spawn(mdns_responder_task(stack, hostname)).unwrap();

    // Main-Loop: schläft (alle Arbeit läuft in Tasks)
    loop {
        Timer::after(Duration::from_secs(3600)).await;
    }
}
