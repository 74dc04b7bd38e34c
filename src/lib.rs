//! # ble-session
//!
//! A cross-platform Rust library for discovering Bluetooth Low Energy
//! peripherals, connecting to one of them, negotiating its GATT
//! topology, and streaming notification data back to consumers.
//!
//! The heart of the crate is the [`SessionManager`]: a state machine
//! that owns one peripheral session at a time, serializes the
//! scan→connect→discover→stream→teardown sequence onto a single owner
//! task, enforces the scan and connect deadlines, and translates raw
//! hardware callbacks into a small set of ordered [`LifecycleEvent`]s.
//! Late or duplicate hardware callbacks are discarded by rule rather
//! than corrupting session state.
//!
//! ## Features
//!
//! - **Scanning**: deduplicated, first-seen-ordered device registry
//!   with live signal-strength updates
//! - **Single-session lifecycle**: one connection at a time, with a
//!   fixed scan window and a connect deadline
//! - **Notification streaming**: subscribe to notify-capable
//!   characteristics and receive payloads as lifecycle events
//! - **Pluggable radio**: the platform stack sits behind the [`Radio`]
//!   trait, so the session core is testable without hardware
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ble_session::{LifecycleEvent, Result, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = SessionManager::new().await?;
//!
//!     let _events = manager.on_event(|event| {
//!         if let LifecycleEvent::DataReceived(payload) = event {
//!             println!("data: {}", ble_session::to_hex_string(payload));
//!         }
//!     });
//!
//!     manager.start_scan()?;
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!
//!     // Connect to the first device the scan found.
//!     if let Some(entry) = manager.snapshot().first() {
//!         manager.connect(entry.handle.clone())?;
//!     }
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for public value types

// Public modules
pub mod error;
pub mod events;
pub mod manager;
pub mod radio;
pub mod registry;
pub mod session;
pub mod utils;

// Re-exports for convenience
pub use error::{Error, Result};
pub use events::{EventBroadcaster, LifecycleEvent, SubscriberHandle};
pub use manager::SessionManager;
pub use radio::{BleRadio, PeripheralHandle, Radio, RadioEvent, SessionConfig};
pub use registry::{DeviceRegistry, ScanEntry};
pub use session::{Command, SessionState};
pub use utils::to_hex_string;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<SessionManager>();
        let _ = std::any::TypeId::of::<SessionState>();
        let _ = std::any::TypeId::of::<LifecycleEvent>();
        let _ = std::any::TypeId::of::<ScanEntry>();
        let _ = std::any::TypeId::of::<PeripheralHandle>();
        let _ = std::any::TypeId::of::<Error>();
    }

    #[test]
    fn test_hex_helper() {
        assert_eq!(to_hex_string(&[0x12, 0x34]), "1234");
    }
}
