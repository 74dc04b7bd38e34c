//! The radio capability surface.
//!
//! This module defines the seam between the session core and the
//! platform's BLE stack: the [`Radio`] trait, the asynchronous
//! [`RadioEvent`] feed, and the device identity type
//! [`PeripheralHandle`]. The btleplug-backed implementation lives in
//! [`adapter`].

pub mod adapter;

use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;

pub use adapter::BleRadio;

/// Opaque identifier for a physical peripheral.
///
/// Equality and hashing are address-based: two handles with the same
/// address refer to the same device even if one was sighted before the
/// device advertised its name.
#[derive(Debug, Clone, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PeripheralHandle {
    address: String,
    name: Option<String>,
}

impl PeripheralHandle {
    /// Create a handle from a platform address and optional display name.
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// The platform address (or platform peripheral id) of the device.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The advertised display name, if the device reported one.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl PartialEq for PeripheralHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Hash for PeripheralHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl std::fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}

/// Asynchronous hardware event reported by the radio.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// A peripheral was sighted during a scan.
    DeviceFound {
        /// The sighted peripheral.
        handle: PeripheralHandle,
        /// Signal strength in dBm at sighting time.
        rssi: i16,
    },
    /// The link to a peripheral went up or down.
    ConnectionStateChanged {
        /// The peripheral whose link changed.
        handle: PeripheralHandle,
        /// `true` on link-up, `false` on link-down or connect failure.
        connected: bool,
    },
    /// GATT service discovery finished.
    ServicesDiscovered {
        /// The peripheral that was interrogated.
        handle: PeripheralHandle,
        /// `false` if discovery failed.
        ok: bool,
    },
    /// A subscribed characteristic pushed a notification.
    CharacteristicChanged {
        /// The peripheral that sent the notification.
        handle: PeripheralHandle,
        /// The raw notification payload.
        payload: Bytes,
    },
}

/// Tuning knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a scan runs before it stops on its own.
    pub scan_window: Duration,
    /// How long to wait for a connection before giving up.
    pub connect_timeout: Duration,
    /// Characteristics to subscribe to once services are discovered.
    /// Empty means every notify-capable characteristic on the peripheral.
    pub notify_characteristics: Vec<Uuid>,
}

impl SessionConfig {
    /// Default scan window (10 seconds).
    pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(10);
    /// Default connect timeout (10 seconds).
    pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scan_window: Self::DEFAULT_SCAN_WINDOW,
            connect_timeout: Self::DEFAULT_CONNECT_TIMEOUT,
            notify_characteristics: Vec::new(),
        }
    }
}

/// The capability surface the session core drives.
///
/// Operations are fire-and-forget: their outcome arrives later on the
/// [`Radio::events`] feed (`ConnectionStateChanged`, `ServicesDiscovered`,
/// ...). A returned `Err` signals only an immediately detectable failure,
/// such as an unknown peripheral or a vanished adapter; the session
/// manager folds those into the same failure events, so callers see
/// exactly one failure path.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Radio: Send + Sync {
    /// Start scanning for peripherals.
    async fn start_scan(&self) -> Result<()>;

    /// Stop an active scan. A no-op when not scanning.
    async fn stop_scan(&self) -> Result<()>;

    /// Open a connection to a peripheral.
    async fn connect(&self, handle: &PeripheralHandle) -> Result<()>;

    /// Close the connection to a peripheral.
    async fn disconnect(&self, handle: &PeripheralHandle) -> Result<()>;

    /// Discover the GATT service/characteristic topology.
    async fn discover_services(&self, handle: &PeripheralHandle) -> Result<()>;

    /// Subscribe to notifications from one characteristic.
    async fn subscribe(&self, handle: &PeripheralHandle, characteristic: Uuid) -> Result<()>;

    /// Enumerate the notify-capable characteristics discovered on the
    /// peripheral.
    async fn notify_characteristics(&self, handle: &PeripheralHandle) -> Result<Vec<Uuid>>;

    /// Subscribe to the radio's asynchronous event feed.
    fn events(&self) -> broadcast::Receiver<RadioEvent>;
}
