//! Error types for the ble-session crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// No Bluetooth radio is available or the radio is disabled.
    #[error("Bluetooth radio not available or disabled")]
    RadioUnavailable,

    /// The radio was asked to act on a peripheral it has never seen.
    #[error("Peripheral not found: {address}")]
    PeripheralNotFound {
        /// The address that was searched for.
        address: String,
    },

    /// Characteristic not found on the peripheral.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// The session manager has been shut down and accepts no more commands.
    #[error("Session closed")]
    SessionClosed,
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
