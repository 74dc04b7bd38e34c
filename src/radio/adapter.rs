//! btleplug-backed implementation of the radio capability surface.
//!
//! Wraps the platform adapter once, pumps its central events into the
//! [`RadioEvent`] feed, and keeps an address→peripheral map so session
//! commands can address devices by handle.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{Central, CharPropFlags, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::radio::{PeripheralHandle, Radio, RadioEvent};

/// The platform Bluetooth radio.
pub struct BleRadio {
    adapter: Adapter,
    /// Peripherals sighted since construction, by address.
    peripherals: Arc<RwLock<HashMap<String, Peripheral>>>,
    event_tx: broadcast::Sender<RadioEvent>,
    is_scanning: Arc<RwLock<bool>>,
    /// Central event pump, started once at construction.
    pump_handle: RwLock<Option<JoinHandle<()>>>,
    /// Per-peripheral notification pumps, by address.
    notify_handles: Arc<RwLock<HashMap<String, JoinHandle<()>>>>,
}

impl BleRadio {
    /// Acquire the first Bluetooth adapter and start pumping its events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RadioUnavailable`] if no adapter is present.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::RadioUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::RadioUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        let (event_tx, _) = broadcast::channel(128);

        let radio = Self {
            adapter,
            peripherals: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            is_scanning: Arc::new(RwLock::new(false)),
            pump_handle: RwLock::new(None),
            notify_handles: Arc::new(RwLock::new(HashMap::new())),
        };

        radio.start_event_pump();

        Ok(radio)
    }

    /// Spawn the one-time central event pump.
    fn start_event_pump(&self) {
        let adapter = self.adapter.clone();
        let peripherals = self.peripherals.clone();
        let event_tx = self.event_tx.clone();
        let notify_handles = self.notify_handles.clone();

        let handle = tokio::spawn(async move {
            let mut events = match adapter.events().await {
                Ok(events) => events,
                Err(e) => {
                    error!("Failed to get adapter events: {}", e);
                    return;
                }
            };

            while let Some(event) = events.next().await {
                use btleplug::api::CentralEvent;

                match event {
                    CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => {
                        Self::process_sighting(&adapter, id, &peripherals, &event_tx).await;
                    }
                    CentralEvent::DeviceConnected(id) => {
                        // The connect call reports the verdict itself.
                        debug!("Device connected: {:?}", id);
                    }
                    CentralEvent::DeviceDisconnected(id) => {
                        debug!("Device disconnected: {:?}", id);
                        let address = id.to_string();
                        if let Some(pump) = notify_handles.write().remove(&address) {
                            pump.abort();
                        }
                        let _ = event_tx.send(RadioEvent::ConnectionStateChanged {
                            handle: PeripheralHandle::new(address, None),
                            connected: false,
                        });
                    }
                    CentralEvent::ManufacturerDataAdvertisement { .. } => {}
                    CentralEvent::ServiceDataAdvertisement { .. } => {}
                    CentralEvent::ServicesAdvertisement { .. } => {}
                    CentralEvent::StateUpdate(state) => {
                        trace!("Adapter state update: {:?}", state);
                    }
                }
            }

            debug!("Central event pump ended");
        });

        *self.pump_handle.write() = Some(handle);
    }

    /// Record a sighted peripheral and report it on the event feed.
    async fn process_sighting(
        adapter: &Adapter,
        id: PeripheralId,
        peripherals: &Arc<RwLock<HashMap<String, Peripheral>>>,
        event_tx: &broadcast::Sender<RadioEvent>,
    ) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral {:?}: {}", id, e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let address = id.to_string();
        peripherals.write().insert(address.clone(), peripheral);

        // Sightings without a signal reading are kept in the map but not
        // reported; a DeviceUpdated with RSSI follows shortly.
        let rssi = match properties.rssi {
            Some(rssi) => rssi,
            None => return,
        };

        let handle = PeripheralHandle::new(address, properties.local_name);
        trace!("Sighted {} at {} dBm", handle, rssi);

        let _ = event_tx.send(RadioEvent::DeviceFound { handle, rssi });
    }

    fn peripheral(&self, handle: &PeripheralHandle) -> Result<Peripheral> {
        self.peripherals
            .read()
            .get(handle.address())
            .cloned()
            .ok_or_else(|| Error::PeripheralNotFound {
                address: handle.address().to_string(),
            })
    }

    /// Start the notification pump for a peripheral, once.
    fn ensure_notification_pump(&self, handle: &PeripheralHandle, peripheral: &Peripheral) {
        let mut pumps = self.notify_handles.write();
        if pumps.contains_key(handle.address()) {
            return;
        }

        let peripheral = peripheral.clone();
        let handle = handle.clone();
        let event_tx = self.event_tx.clone();
        let pump_key = handle.address().to_string();

        let task = tokio::spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to get notification stream for {}: {}", handle, e);
                    return;
                }
            };

            while let Some(notification) = notifications.next().await {
                trace!(
                    "Notification from {} ({}): {} bytes",
                    handle,
                    notification.uuid,
                    notification.value.len()
                );
                let _ = event_tx.send(RadioEvent::CharacteristicChanged {
                    handle: handle.clone(),
                    payload: Bytes::from(notification.value),
                });
            }

            debug!("Notification pump for {} ended", handle);
        });

        pumps.insert(pump_key, task);
    }
}

#[async_trait]
impl Radio for BleRadio {
    async fn start_scan(&self) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, restarting the platform scan");
        }

        info!("Starting BLE scan");
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        *self.is_scanning.write() = true;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");
        *self.is_scanning.write() = false;
        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;
        Ok(())
    }

    async fn connect(&self, handle: &PeripheralHandle) -> Result<()> {
        let peripheral = self.peripheral(handle)?;
        let handle = handle.clone();
        let event_tx = self.event_tx.clone();

        info!("Connecting to {}", handle);
        tokio::spawn(async move {
            let connected = match peripheral.connect().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Connect to {} failed: {}", handle, e);
                    false
                }
            };
            let _ = event_tx.send(RadioEvent::ConnectionStateChanged { handle, connected });
        });

        Ok(())
    }

    async fn disconnect(&self, handle: &PeripheralHandle) -> Result<()> {
        let peripheral = self.peripheral(handle)?;

        if let Some(pump) = self.notify_handles.write().remove(handle.address()) {
            pump.abort();
        }

        let handle = handle.clone();
        let event_tx = self.event_tx.clone();

        info!("Disconnecting from {}", handle);
        tokio::spawn(async move {
            if let Err(e) = peripheral.disconnect().await {
                debug!("Disconnect from {} reported: {}", handle, e);
            }
            // Confirm teardown even when the platform considered the
            // link already gone; the session discards duplicates.
            let _ = event_tx.send(RadioEvent::ConnectionStateChanged {
                handle,
                connected: false,
            });
        });

        Ok(())
    }

    async fn discover_services(&self, handle: &PeripheralHandle) -> Result<()> {
        let peripheral = self.peripheral(handle)?;
        let handle = handle.clone();
        let event_tx = self.event_tx.clone();

        debug!("Discovering services on {}", handle);
        tokio::spawn(async move {
            let ok = match peripheral.discover_services().await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Service discovery on {} failed: {}", handle, e);
                    false
                }
            };
            let _ = event_tx.send(RadioEvent::ServicesDiscovered { handle, ok });
        });

        Ok(())
    }

    async fn subscribe(&self, handle: &PeripheralHandle, characteristic: Uuid) -> Result<()> {
        let peripheral = self.peripheral(handle)?;

        let target = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: characteristic.to_string(),
            })?;

        peripheral
            .subscribe(&target)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Subscribed to {} on {}", characteristic, handle);
        self.ensure_notification_pump(handle, &peripheral);

        Ok(())
    }

    async fn notify_characteristics(&self, handle: &PeripheralHandle) -> Result<Vec<Uuid>> {
        let peripheral = self.peripheral(handle)?;

        Ok(peripheral
            .characteristics()
            .into_iter()
            .filter(|c| {
                c.properties
                    .intersects(CharPropFlags::NOTIFY | CharPropFlags::INDICATE)
            })
            .map(|c| c.uuid)
            .collect())
    }

    fn events(&self) -> broadcast::Receiver<RadioEvent> {
        self.event_tx.subscribe()
    }
}

impl Drop for BleRadio {
    fn drop(&mut self) {
        if let Some(handle) = self.pump_handle.write().take() {
            handle.abort();
        }
        for (_, handle) in self.notify_handles.write().drain() {
            handle.abort();
        }
    }
}
