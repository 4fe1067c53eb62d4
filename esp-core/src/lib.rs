//! ESP Core - Platform-agnostic Logic and Traits
//!
//! Diese Crate enthält KEINE Hardware-Dependencies.
//! Sie definiert Traits, Zustandsautomaten und Protokolle, die
//! Firmware (`esp-steckdose`) und Host-Tests (`esp-tests`) gemeinsam nutzen.

#![no_std]

pub mod broker;
pub mod button;
pub mod controller;
pub mod line;
pub mod logic;
pub mod pattern;
pub mod persist;
pub mod provision;
pub mod registry;
pub mod relay;
pub mod traits;
pub mod transport;
pub mod types;
pub mod update;

// Re-exports für einfachen Zugriff
pub use broker::{BrokerClient, BrokerError, BrokerEvent, BrokerTransport};
pub use button::{ButtonAction, GestureDetector};
pub use controller::{BootController, BootLed, ButtonOutcome, StatusLed};
pub use line::{LineFramer, LineSocket, LineTransport, LinkError, PeerState, field, parse_line};
pub use logic::{HoldStage, classify_hold, rotate_pattern};
pub use pattern::PatternScheduler;
pub use persist::{RelayRecord, StateStore, StoreError};
pub use provision::{Credentials, ProvisionError};
pub use registry::{BufferedOutbox, Outbox, OutboxError, RegistryError, TopicListener, TopicRegistry};
pub use relay::{RelayApp, hostname_for_chip};
pub use traits::{ButtonReader, HalError, Led, NoopLed, RelaySwitch, StatusLineWriter, UpdateService, WifiStation};
pub use transport::{PubSub, ReconnectTimer};
pub use types::{BootConfig, ConnectivityState, NetEvent, OnLevel, QoS, RelayCommand};
pub use update::{UpdateError, UpdateOffer, UpdateSession};
