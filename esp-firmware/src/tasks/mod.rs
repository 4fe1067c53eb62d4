// Task-Modul: Enthält alle Embassy Tasks
//
// Jeder Task läuft asynchron und unabhängig.
// Tasks kommunizieren über Signale und den WLAN-Ereignis-Channel
// (Button → WiFi/Transport, Provisioning → WiFi, DHCP → Controller + Transport).

pub mod button;
#[cfg(feature = "transport-line")]
pub mod link;
pub mod mdns;
#[cfg(feature = "transport-mqtt")]
pub mod mqtt;
pub mod net;
pub mod ota;
pub mod provisioning;
pub mod relay;
pub mod status_led;
pub mod wifi;

#[cfg(all(feature = "transport-line", feature = "transport-mqtt"))]
compile_error!("Features `transport-line` und `transport-mqtt` schließen sich aus");

// Re-export Tasks für einfachen Import
pub use button::button_task;
#[cfg(feature = "transport-line")]
pub use link::link_task;
pub use mdns::mdns_responder_task;
#[cfg(feature = "transport-mqtt")]
pub use mqtt::mqtt_task;
pub use ota::ota_task;
pub use provisioning::{pairing_dhcp_task, provisioning_task};
pub use status_led::status_led_task;
pub use wifi::{connectivity_task, dhcp_task, net_task, wifi_task};
