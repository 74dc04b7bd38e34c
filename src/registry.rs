//! Registry of peripherals discovered during a scan.
//!
//! The registry is a deduplicated, first-seen-ordered collection of scan
//! results. It is reset at the start of every scan session and mutated
//! only by the session manager's owner task; outside readers get
//! point-in-time copies via [`DeviceRegistry::snapshot`].

use tracing::trace;

use crate::radio::PeripheralHandle;

/// One discovered peripheral with its most recently reported signal
/// strength.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanEntry {
    /// The discovered peripheral.
    pub handle: PeripheralHandle,
    /// Signal strength in dBm from the latest sighting.
    pub last_rssi: i16,
}

/// Deduplicated, order-preserving collection of scan results.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    entries: Vec<ScanEntry>,
    scan_active: bool,
}

impl DeviceRegistry {
    /// Create an empty registry with no scan session open.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all entries and open a new scan session.
    ///
    /// Called exactly once when a scan begins, so results never
    /// accumulate across unrelated scan runs.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.scan_active = true;
    }

    /// Record a sighting of `handle` at signal strength `rssi`.
    ///
    /// Unseen handles are appended, preserving first-seen order; repeat
    /// sightings overwrite `last_rssi` in place without reordering.
    /// Sightings outside an active scan session are ignored.
    pub fn observe(&mut self, handle: PeripheralHandle, rssi: i16) {
        if !self.scan_active {
            trace!("Ignoring sighting of {} outside active scan", handle);
            return;
        }

        match self.entries.iter_mut().find(|e| e.handle == handle) {
            Some(entry) => entry.last_rssi = rssi,
            None => self.entries.push(ScanEntry {
                handle,
                last_rssi: rssi,
            }),
        }
    }

    /// Close the scan session. Entries remain readable until the next
    /// [`reset`](Self::reset), but further sightings are ignored.
    pub(crate) fn end_scan(&mut self) {
        self.scan_active = false;
    }

    /// Whether a scan session is currently open.
    pub fn is_scan_active(&self) -> bool {
        self.scan_active
    }

    /// A point-in-time copy of the entries, in first-seen order.
    pub fn snapshot(&self) -> Vec<ScanEntry> {
        self.entries.clone()
    }

    /// Number of distinct peripherals seen in this scan session.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no peripherals have been seen yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
