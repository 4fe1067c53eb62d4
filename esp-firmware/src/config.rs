// Projekt-Konfiguration: Konstanten und Hardware-Zuordnungen

use esp_core::types::{ButtonConfig, OnLevel, Pull};

// ============================================================================
// Pin-Belegung
// ============================================================================

/// GPIO-Pin der Status-LED (XIAO ESP32-C6 User-LED)
pub const STATUS_LED_GPIO_PIN: u8 = 15;

/// Status-LED leuchtet bei LOW
pub const STATUS_LED_ON_LEVEL: OnLevel = OnLevel::Low;

/// GPIO-Pin des Buttons (BOOT-Taster)
pub const BUTTON_GPIO_PIN: u8 = 9;

/// Button zieht gegen GND, interner Pull-Up
pub const BUTTON: ButtonConfig = ButtonConfig {
    pressed: OnLevel::Low,
    pull: Pull::Up,
};

/// GPIO-Pin des Relais (HIGH = Relais an)
pub const RELAY_GPIO_PIN: u8 = 4;

// ============================================================================
// Tick-Intervalle
// ============================================================================

/// LED-Muster: ein Bit pro Tick, 32 Ticks pro Zyklus
pub const LED_TICK_MS: u64 = 100;

/// Button-Abtastung
pub const BUTTON_TICK_MS: u64 = 50;

/// Poll-Intervall während des Pairings
pub const PAIRING_POLL_MS: u64 = 100;

/// Poll-Intervall des Transport-Tasks
pub const TRANSPORT_TICK_MS: u64 = 50;

// ============================================================================
// WiFi Konfiguration
// ============================================================================

/// WiFi SSID (Netzwerk-Name)
/// Wird zur Build-Zeit aus der Environment Variable WIFI_SSID geladen
/// Setze diese in .env file (siehe .env.example)
pub const WIFI_SSID: &str = env!(
    "WIFI_SSID",
    "WiFi SSID nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// WiFi Passwort
/// Wird zur Build-Zeit aus der Environment Variable WIFI_PASSWORD geladen
pub const WIFI_PASSWORD: &str = env!(
    "WIFI_PASSWORD",
    "WiFi Password nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// Wartezeit nach fehlgeschlagenem Join
pub const WIFI_RETRY_DELAY_SECS: u64 = 5;

/// Heap-Größe für WiFi (Bytes)
/// WiFi benötigt dynamischen Speicher für Pakete
pub const WIFI_HEAP_SIZE: usize = 65536; // 64 KB

/// Zusätzliche Heap-Größe (Bytes)
pub const EXTRA_HEAP_SIZE: usize = 36864; // 36 KB

// ============================================================================
// Pairing (Provisioning-AP)
// ============================================================================

/// SSID-Suffix des Provisioning-AP (`<hostname>-setup`)
pub const PAIRING_AP_SUFFIX: &str = "-setup";

/// Statische Adresse des Geräts im Provisioning-Netz
pub const PAIRING_AP_ADDR: [u8; 4] = [192, 168, 4, 1];

/// DHCP-Bereich für Clients am Provisioning-AP
pub const PAIRING_DHCP_RANGE: ([u8; 4], [u8; 4]) = ([192, 168, 4, 50], [192, 168, 4, 99]);

/// TCP-Port für die Credentials-Zeile
pub const PAIRING_PORT: u16 = 8266;

/// Timeout für eine Provisioning-Verbindung
pub const PAIRING_SOCKET_TIMEOUT_SECS: u64 = 30;

// ============================================================================
// Cloud Konfiguration
// ============================================================================

/// Hostname des Cloud-Dienstes
/// Wird zur Build-Zeit aus der Environment Variable CLOUD_HOST geladen
pub const CLOUD_HOST: &str = env!(
    "CLOUD_HOST",
    "Cloud Host nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// Client-ID (Line-Protokoll `uid` bzw. MQTT Client ID)
pub const CLOUD_CLIENT_ID: &str = env!(
    "CLOUD_CLIENT_ID",
    "Cloud Client ID nicht gesetzt! Erstelle .env file (siehe .env.example)"
);

/// Port des MQTT-Brokers (optional, Standard 9501)
pub const CLOUD_MQTT_PORT: u16 = parse_port(option_env!("CLOUD_MQTT_PORT"), 9501);

/// Port des Line-Protokolls (optional, Standard 8344)
pub const CLOUD_TCP_PORT: u16 = parse_port(option_env!("CLOUD_TCP_PORT"), 8344);

/// Timeout für DNS-Auflösung
pub const DNS_TIMEOUT_SECS: u64 = 10;

/// TCP RX/TX Buffer-Größe für die Cloud-Verbindung
pub const CLOUD_SOCKET_BUFFER_SIZE: usize = 1024;

/// MQTT Paket-Buffer
pub const MQTT_BUFFER_SIZE: usize = 1024;

/// Maximale Wartezeit auf ein eingehendes MQTT-Paket pro Poll
pub const MQTT_RECEIVE_WINDOW_MS: u64 = 20;

// ============================================================================
// Persistenz & OTA
// ============================================================================

/// Flash-Offset des Relais-Zustands (Partition `relay`, siehe partitions.csv)
pub const RELAY_RECORD_OFFSET: u32 = 0x10000;

/// Timeout für eine OTA-Sitzung ohne Daten
pub const OTA_SOCKET_TIMEOUT_SECS: u64 = 10;

/// TCP RX-Buffer für den Image-Stream
pub const OTA_RX_BUFFER_SIZE: usize = 4096;

// ============================================================================
// mDNS Konfiguration
// ============================================================================

/// TTL für mDNS-Antworten in Sekunden
pub const MDNS_TTL_SECS: u32 = 120;

/// Wartezeit vor Reconnect nach Fehler
pub const MDNS_RECONNECT_DELAY_SECS: u64 = 5;

/// mDNS Standard-Port (RFC 6762)
pub const MDNS_PORT: u16 = 5353;

/// mDNS IPv4 Multicast-Adresse (RFC 6762)
pub const MDNS_MULTICAST_ADDR: [u8; 4] = [224, 0, 0, 251];

/// UDP Buffer-Größe für mDNS Socket
pub const MDNS_UDP_BUFFER_SIZE: usize = 512;

/// mDNS Packet Buffer-Größe
pub const MDNS_PACKET_BUFFER_SIZE: usize = 1500;

/// Port aus optionaler Build-Variable, sonst `default`
const fn parse_port(value: Option<&str>, default: u16) -> u16 {
    let Some(text) = value else {
        return default;
    };
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return default;
    }
    let mut port: u32 = 0;
    let mut i = 0;
    while i < bytes.len() {
        let digit = bytes[i];
        if !digit.is_ascii_digit() {
            return default;
        }
        port = port * 10 + (digit - b'0') as u32;
        if port > u16::MAX as u32 {
            return default;
        }
        i += 1;
    }
    port as u16
}
