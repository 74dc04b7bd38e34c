//! Session manager: the single owner of the session, the registry and
//! the timers.
//!
//! All hardware callbacks, timer firings and consumer commands are
//! serialized onto one unbounded queue and consumed by one owner task,
//! which processes each message to completion before the next. That
//! single consumption point is what makes "a device was just found" and
//! "the user just clicked connect" race-free without fine-grained
//! locking.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::events::{EventBroadcaster, LifecycleEvent, SubscriberHandle};
use crate::radio::{BleRadio, PeripheralHandle, Radio, RadioEvent, SessionConfig};
use crate::registry::{DeviceRegistry, ScanEntry};
use crate::session::{Action, Command, Input, Session, SessionState, TimerKind};

/// Owns one peripheral session and drives it through the radio.
///
/// Commands are asynchronous triggers, not blocking calls: they enqueue
/// and return, and the outcome arrives later as a [`LifecycleEvent`].
/// The only synchronously surfaced failure is a missing radio at
/// construction time ([`Error::RadioUnavailable`]).
pub struct SessionManager {
    tx: mpsc::UnboundedSender<Input>,
    registry: Arc<RwLock<DeviceRegistry>>,
    broadcaster: Arc<EventBroadcaster>,
    state: Arc<RwLock<SessionState>>,
    owner_handle: RwLock<Option<JoinHandle<()>>>,
    forwarder_handle: RwLock<Option<JoinHandle<()>>>,
}

impl SessionManager {
    /// Create a manager driving the platform Bluetooth radio.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RadioUnavailable`] if no Bluetooth adapter is
    /// present or the radio is disabled.
    pub async fn new() -> Result<Self> {
        Self::with_config(SessionConfig::default()).await
    }

    /// Create a manager driving the platform radio with custom tuning.
    pub async fn with_config(config: SessionConfig) -> Result<Self> {
        let radio = BleRadio::new().await?;
        Ok(Self::with_radio(Arc::new(radio), config))
    }

    /// Create a manager on top of an arbitrary [`Radio`] implementation.
    ///
    /// Radio event wiring happens exactly once, here; issuing
    /// `start_scan` repeatedly never re-registers anything.
    pub fn with_radio(radio: Arc<dyn Radio>, config: SessionConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let registry = Arc::new(RwLock::new(DeviceRegistry::new()));
        let broadcaster = Arc::new(EventBroadcaster::new());
        let state = Arc::new(RwLock::new(SessionState::Idle));

        let forwarder_handle = Self::spawn_event_forwarder(radio.events(), tx.clone());

        let owner = OwnerTask {
            rx,
            tx: tx.clone(),
            radio,
            registry: registry.clone(),
            broadcaster: broadcaster.clone(),
            state: state.clone(),
            config,
        };
        let owner_handle = tokio::spawn(owner.run());

        Self {
            tx,
            registry,
            broadcaster,
            state,
            owner_handle: RwLock::new(Some(owner_handle)),
            forwarder_handle: RwLock::new(Some(forwarder_handle)),
        }
    }

    /// Reset the registry and open a fresh scan window.
    pub fn start_scan(&self) -> Result<()> {
        self.send(Command::StartScan)
    }

    /// Connect to a peripheral. Stops any active scan first; issued while
    /// already engaged it tears the current link down and then connects.
    pub fn connect(&self, handle: PeripheralHandle) -> Result<()> {
        self.send(Command::Connect(handle))
    }

    /// Tear down the current connection attempt or active link.
    pub fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect)
    }

    /// Unconditional teardown: disarm timers, drop any link, return to
    /// Idle. Emits no events.
    pub fn release(&self) -> Result<()> {
        self.send(Command::Release)
    }

    /// A point-in-time copy of the scan results, in first-seen order.
    pub fn snapshot(&self) -> Vec<ScanEntry> {
        self.registry.read().snapshot()
    }

    /// The session state as of the most recently processed message.
    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    /// Get a channel receiver for lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.broadcaster.subscribe()
    }

    /// Register a callback invoked for every lifecycle event. Dropping
    /// the returned handle unregisters it.
    pub fn on_event<F>(&self, handler: F) -> SubscriberHandle
    where
        F: Fn(&LifecycleEvent) + Send + Sync + 'static,
    {
        self.broadcaster.on_event(handler)
    }

    /// Clean shutdown: release the session and stop the owner task.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down session manager");

        let _ = self.tx.send(Input::Shutdown);

        let owner = self.owner_handle.write().take();
        if let Some(handle) = owner {
            let _ = handle.await;
        }
        let forwarder = self.forwarder_handle.write().take();
        if let Some(handle) = forwarder {
            handle.abort();
        }

        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(Input::Command(command))
            .map_err(|_| Error::SessionClosed)
    }

    fn spawn_event_forwarder(
        mut events: broadcast::Receiver<RadioEvent>,
        tx: mpsc::UnboundedSender<Input>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if tx.send(Input::Radio(event)).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Radio event feed lagged, {} events dropped", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("Radio event forwarder ended");
        })
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        let _ = self.tx.send(Input::Shutdown);
    }
}

/// The single consumption point: owns the `Session` and executes the
/// actions its transitions request.
struct OwnerTask {
    rx: mpsc::UnboundedReceiver<Input>,
    tx: mpsc::UnboundedSender<Input>,
    radio: Arc<dyn Radio>,
    registry: Arc<RwLock<DeviceRegistry>>,
    broadcaster: Arc<EventBroadcaster>,
    state: Arc<RwLock<SessionState>>,
    config: SessionConfig,
}

impl OwnerTask {
    async fn run(mut self) {
        let mut session = Session::new();
        let mut timer: Option<JoinHandle<()>> = None;

        while let Some(input) = self.rx.recv().await {
            let shutting_down = matches!(input, Input::Shutdown);

            let actions = session.handle(input);
            *self.state.write() = session.state();

            for action in actions {
                self.execute(action, &mut timer);
            }

            if shutting_down {
                break;
            }
        }

        if let Some(handle) = timer.take() {
            handle.abort();
        }
        debug!("Session owner task ended");
    }

    /// Execute one action. Radio calls are spawned fire-and-forget; a
    /// synchronously failing call is folded into the corresponding
    /// negative radio event so the state machine sees one failure path.
    fn execute(&self, action: Action, timer: &mut Option<JoinHandle<()>>) {
        match action {
            Action::ResetRegistry => self.registry.write().reset(),
            Action::EndRegistryScan => self.registry.write().end_scan(),
            Action::Observe(handle, rssi) => self.registry.write().observe(handle, rssi),
            Action::RadioStartScan => {
                let radio = self.radio.clone();
                tokio::spawn(async move {
                    if let Err(e) = radio.start_scan().await {
                        warn!("Failed to start scan: {}", e);
                    }
                });
            }
            Action::RadioStopScan => {
                let radio = self.radio.clone();
                tokio::spawn(async move {
                    if let Err(e) = radio.stop_scan().await {
                        warn!("Failed to stop scan: {}", e);
                    }
                });
            }
            Action::RadioConnect(handle) => {
                let radio = self.radio.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = radio.connect(&handle).await {
                        warn!("Connect to {} failed at the radio: {}", handle, e);
                        let _ = tx.send(Input::Radio(RadioEvent::ConnectionStateChanged {
                            handle,
                            connected: false,
                        }));
                    }
                });
            }
            Action::RadioDisconnect(handle) => {
                let radio = self.radio.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = radio.disconnect(&handle).await {
                        // The link may already be gone; confirm teardown
                        // so Disconnecting cannot wedge.
                        debug!("Disconnect from {} failed at the radio: {}", handle, e);
                        let _ = tx.send(Input::Radio(RadioEvent::ConnectionStateChanged {
                            handle,
                            connected: false,
                        }));
                    }
                });
            }
            Action::RadioDiscoverServices(handle) => {
                let radio = self.radio.clone();
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = radio.discover_services(&handle).await {
                        warn!("Service discovery on {} failed at the radio: {}", handle, e);
                        let _ = tx.send(Input::Radio(RadioEvent::ServicesDiscovered {
                            handle,
                            ok: false,
                        }));
                    }
                });
            }
            Action::SubscribeCharacteristics(handle) => {
                let radio = self.radio.clone();
                let wanted = self.config.notify_characteristics.clone();
                tokio::spawn(async move {
                    let characteristics = if wanted.is_empty() {
                        match radio.notify_characteristics(&handle).await {
                            Ok(uuids) => uuids,
                            Err(e) => {
                                warn!("Could not enumerate characteristics on {}: {}", handle, e);
                                return;
                            }
                        }
                    } else {
                        wanted
                    };

                    for uuid in characteristics {
                        if let Err(e) = radio.subscribe(&handle, uuid).await {
                            warn!("Subscribe to {} on {} failed: {}", uuid, handle, e);
                        }
                    }
                });
            }
            Action::ArmTimer { kind, generation } => {
                if let Some(handle) = timer.take() {
                    handle.abort();
                }
                let duration = match kind {
                    TimerKind::Scan => self.config.scan_window,
                    TimerKind::Connect => self.config.connect_timeout,
                };
                *timer = Some(self.spawn_timer(kind, generation, duration));
            }
            Action::CancelTimer => {
                if let Some(handle) = timer.take() {
                    handle.abort();
                }
            }
            Action::Emit(event) => self.broadcaster.publish(&event),
        }
    }

    fn spawn_timer(&self, kind: TimerKind, generation: u64, duration: Duration) -> JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = tx.send(Input::Timer { kind, generation });
        })
    }
}
