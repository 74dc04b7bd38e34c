//! The session state machine.
//!
//! A single-consumer state machine that serializes inherently
//! asynchronous, unordered hardware events into a deterministic
//! lifecycle. Transition logic is pure: [`Session::handle`] maps one
//! [`Input`] to the [`Action`]s it requires, and the manager executes
//! them. Any input not valid for the current state is discarded with a
//! debug log; that discard rule is what absorbs late, duplicate, or
//! out-of-order hardware callbacks.

use tracing::debug;

use crate::events::LifecycleEvent;
use crate::radio::{PeripheralHandle, RadioEvent};

/// Lifecycle state of the peripheral session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionState {
    /// No scan and no connection.
    #[default]
    Idle,
    /// A scan window is open and sightings feed the registry.
    Scanning,
    /// A connection attempt is in flight.
    Connecting,
    /// The link is up and GATT discovery is in flight.
    ServicesDiscovering,
    /// Notifications are streaming.
    Active,
    /// A disconnect was requested and its confirmation is pending.
    Disconnecting,
    /// The last connection attempt failed. A rest state, not terminal.
    Failed,
}

impl SessionState {
    /// Whether the session holds a target peripheral in this state.
    pub fn is_engaged(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::ServicesDiscovering | Self::Active | Self::Disconnecting
        )
    }

    /// Whether this is a rest state from which new commands start work.
    pub fn is_rest(&self) -> bool {
        matches!(self, Self::Idle | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::ServicesDiscovering => write!(f, "ServicesDiscovering"),
            Self::Active => write!(f, "Active"),
            Self::Disconnecting => write!(f, "Disconnecting"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Command accepted from the consumer.
#[derive(Debug, Clone)]
pub enum Command {
    /// Reset the registry and open a scan window.
    StartScan,
    /// Connect to a peripheral, stopping any active scan.
    Connect(PeripheralHandle),
    /// Tear down the current connection attempt or link.
    Disconnect,
    /// Unconditional teardown back to Idle.
    Release,
}

/// Which deadline timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TimerKind {
    Scan,
    Connect,
}

/// One message serialized onto the session's owner task.
#[derive(Debug)]
pub(crate) enum Input {
    Command(Command),
    Radio(RadioEvent),
    Timer { kind: TimerKind, generation: u64 },
    /// Final teardown; the owner task exits after processing it.
    Shutdown,
}

/// Side effect requested by a transition, executed by the manager.
#[derive(Debug, PartialEq)]
pub(crate) enum Action {
    ResetRegistry,
    EndRegistryScan,
    Observe(PeripheralHandle, i16),
    RadioStartScan,
    RadioStopScan,
    RadioConnect(PeripheralHandle),
    RadioDisconnect(PeripheralHandle),
    RadioDiscoverServices(PeripheralHandle),
    SubscribeCharacteristics(PeripheralHandle),
    ArmTimer { kind: TimerKind, generation: u64 },
    CancelTimer,
    Emit(LifecycleEvent),
}

/// The single mutable session entity.
///
/// Invariants: `target` is non-`None` exactly in the engaged states;
/// at most one timer is armed at a time, and every arm or disarm bumps
/// `timer_generation` so a late firing carrying an old generation can
/// never be applied.
pub(crate) struct Session {
    state: SessionState,
    target: Option<PeripheralHandle>,
    /// Target queued by a `connect` issued while engaged; picked up once
    /// the current link confirms teardown.
    pending: Option<PeripheralHandle>,
    timer_generation: u64,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            state: SessionState::Idle,
            target: None,
            pending: None,
            timer_generation: 0,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        self.state
    }

    #[cfg(test)]
    pub(crate) fn target(&self) -> Option<&PeripheralHandle> {
        self.target.as_ref()
    }

    /// Apply one input atomically against the current state.
    pub(crate) fn handle(&mut self, input: Input) -> Vec<Action> {
        match input {
            Input::Command(command) => self.handle_command(command),
            Input::Radio(event) => self.handle_radio(event),
            Input::Timer { kind, generation } => self.handle_timer(kind, generation),
            Input::Shutdown => self.release(),
        }
    }

    fn handle_command(&mut self, command: Command) -> Vec<Action> {
        use SessionState::*;

        match command {
            Command::StartScan => match self.state {
                Idle | Failed => self.enter_scanning(false),
                // Restart: the scan button always begins a fresh session.
                Scanning => self.enter_scanning(true),
                state => self.discard_command("startScan", state),
            },
            Command::Connect(handle) => match self.state {
                Idle | Failed => self.enter_connecting(handle, Vec::new()),
                Scanning => {
                    let actions = vec![Action::RadioStopScan, Action::EndRegistryScan];
                    self.enter_connecting(handle, actions)
                }
                // Engaged: implicit disconnect-then-connect. The new
                // target waits out the teardown of the current link.
                Connecting | ServicesDiscovering | Active => {
                    debug!(
                        "connect({}) while {}: tearing down current link first",
                        handle, self.state
                    );
                    self.pending = Some(handle);
                    self.begin_disconnect()
                }
                // Latest wins while a teardown is already in flight.
                Disconnecting => {
                    self.pending = Some(handle);
                    Vec::new()
                }
            },
            Command::Disconnect => match self.state {
                Connecting | ServicesDiscovering | Active => self.begin_disconnect(),
                state => self.discard_command("disconnect", state),
            },
            Command::Release => self.release(),
        }
    }

    fn handle_radio(&mut self, event: RadioEvent) -> Vec<Action> {
        use SessionState::*;

        match event {
            RadioEvent::DeviceFound { handle, rssi } => {
                if self.state == Scanning {
                    vec![Action::Observe(handle, rssi)]
                } else {
                    debug!("Discarding deviceFound({}) in {}", handle, self.state);
                    Vec::new()
                }
            }
            RadioEvent::ConnectionStateChanged { handle, connected } => {
                if !self.is_target(&handle) {
                    debug!(
                        "Discarding connectionStateChanged({}, {}) in {}: not the target",
                        handle, connected, self.state
                    );
                    return Vec::new();
                }

                match (self.state, connected) {
                    (Connecting, true) => {
                        self.state = ServicesDiscovering;
                        vec![
                            self.disarm(),
                            Action::Emit(LifecycleEvent::Connected),
                            Action::RadioDiscoverServices(handle),
                        ]
                    }
                    (Connecting, false) | (ServicesDiscovering, false) => self.fail(),
                    (Active, false) => {
                        self.state = Idle;
                        self.target = None;
                        vec![Action::Emit(LifecycleEvent::Disconnected)]
                    }
                    (Disconnecting, false) => {
                        self.target = None;
                        let mut actions = vec![Action::Emit(LifecycleEvent::Disconnected)];
                        match self.pending.take() {
                            Some(next) => actions = self.enter_connecting(next, actions),
                            None => self.state = Idle,
                        }
                        actions
                    }
                    (state, connected) => {
                        debug!(
                            "Discarding connectionStateChanged({}) in {}",
                            connected, state
                        );
                        Vec::new()
                    }
                }
            }
            RadioEvent::ServicesDiscovered { handle, ok } => {
                if !self.is_target(&handle) || self.state != ServicesDiscovering {
                    debug!("Discarding servicesDiscovered(ok={}) in {}", ok, self.state);
                    return Vec::new();
                }

                if ok {
                    self.state = Active;
                    vec![
                        Action::SubscribeCharacteristics(handle),
                        Action::Emit(LifecycleEvent::ServicesReady),
                    ]
                } else {
                    self.fail()
                }
            }
            RadioEvent::CharacteristicChanged { handle, payload } => {
                if self.state == Active && self.is_target(&handle) {
                    vec![Action::Emit(LifecycleEvent::DataReceived(payload))]
                } else {
                    debug!("Discarding characteristicChanged in {}", self.state);
                    Vec::new()
                }
            }
        }
    }

    fn handle_timer(&mut self, kind: TimerKind, generation: u64) -> Vec<Action> {
        if generation != self.timer_generation {
            debug!("Discarding stale {:?} timer (generation {})", kind, generation);
            return Vec::new();
        }

        match (kind, self.state) {
            (TimerKind::Scan, SessionState::Scanning) => {
                self.timer_generation += 1;
                self.state = SessionState::Idle;
                vec![Action::RadioStopScan, Action::EndRegistryScan]
            }
            (TimerKind::Connect, SessionState::Connecting) => {
                self.timer_generation += 1;
                self.fail()
            }
            (kind, state) => {
                debug!("Discarding {:?} timer in {}", kind, state);
                Vec::new()
            }
        }
    }

    /// Unconditional teardown back to Idle. Emits nothing; calling it
    /// again from a settled Idle session is a no-op.
    fn release(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();

        if self.state == SessionState::Scanning {
            actions.push(Action::RadioStopScan);
            actions.push(Action::EndRegistryScan);
        }
        if let Some(target) = self.target.take() {
            actions.push(Action::RadioDisconnect(target));
        }
        self.pending = None;

        if self.state != SessionState::Idle {
            actions.insert(0, self.disarm());
            self.state = SessionState::Idle;
        }

        actions
    }

    fn enter_scanning(&mut self, restart: bool) -> Vec<Action> {
        self.state = SessionState::Scanning;

        let mut actions = Vec::new();
        if restart {
            actions.push(Action::RadioStopScan);
        }
        actions.push(Action::ResetRegistry);
        actions.push(self.arm(TimerKind::Scan));
        actions.push(Action::RadioStartScan);
        actions
    }

    fn enter_connecting(
        &mut self,
        handle: PeripheralHandle,
        mut actions: Vec<Action>,
    ) -> Vec<Action> {
        self.state = SessionState::Connecting;
        self.target = Some(handle.clone());
        actions.push(self.arm(TimerKind::Connect));
        actions.push(Action::RadioConnect(handle));
        actions
    }

    fn begin_disconnect(&mut self) -> Vec<Action> {
        let Some(target) = self.target.clone() else {
            debug!("No target to disconnect in {}", self.state);
            return Vec::new();
        };

        let mut actions = Vec::new();
        if self.state == SessionState::Connecting {
            actions.push(self.disarm());
        }
        self.state = SessionState::Disconnecting;
        actions.push(Action::RadioDisconnect(target));
        actions
    }

    fn fail(&mut self) -> Vec<Action> {
        self.state = SessionState::Failed;
        self.target = None;
        self.pending = None;
        vec![self.disarm(), Action::Emit(LifecycleEvent::ConnectFailed)]
    }

    fn arm(&mut self, kind: TimerKind) -> Action {
        self.timer_generation += 1;
        Action::ArmTimer {
            kind,
            generation: self.timer_generation,
        }
    }

    fn disarm(&mut self) -> Action {
        self.timer_generation += 1;
        Action::CancelTimer
    }

    fn is_target(&self, handle: &PeripheralHandle) -> bool {
        self.target.as_ref() == Some(handle)
    }

    fn discard_command(&self, name: &str, state: SessionState) -> Vec<Action> {
        debug!("Discarding command {} in {}", name, state);
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn handle(addr: &str) -> PeripheralHandle {
        PeripheralHandle::new(addr, None)
    }

    fn emitted(actions: &[Action]) -> Vec<&LifecycleEvent> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Emit(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    /// Drive a fresh session into Connecting toward `target`, returning
    /// the armed connect-timer generation.
    fn connecting_session(target: &PeripheralHandle) -> (Session, u64) {
        let mut session = Session::new();
        let actions = session.handle(Input::Command(Command::Connect(target.clone())));

        let generation = actions
            .iter()
            .find_map(|a| match a {
                Action::ArmTimer {
                    kind: TimerKind::Connect,
                    generation,
                } => Some(*generation),
                _ => None,
            })
            .expect("connect arms the connection timer");

        (session, generation)
    }

    /// Drive a fresh session all the way into Active streaming state.
    fn active_session(target: &PeripheralHandle) -> Session {
        let (mut session, _) = connecting_session(target);
        session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: target.clone(),
            connected: true,
        }));
        session.handle(Input::Radio(RadioEvent::ServicesDiscovered {
            handle: target.clone(),
            ok: true,
        }));
        assert_eq!(session.state(), SessionState::Active);
        session
    }

    #[test]
    fn test_start_scan_from_idle() {
        let mut session = Session::new();
        let actions = session.handle(Input::Command(Command::StartScan));

        assert_eq!(
            actions,
            vec![
                Action::ResetRegistry,
                Action::ArmTimer {
                    kind: TimerKind::Scan,
                    generation: 1,
                },
                Action::RadioStartScan,
            ]
        );
        assert_eq!(session.state(), SessionState::Scanning);
    }

    #[test]
    fn test_start_scan_while_scanning_restarts() {
        let mut session = Session::new();
        session.handle(Input::Command(Command::StartScan));
        let actions = session.handle(Input::Command(Command::StartScan));

        // The scan window is replaced, never stacked.
        assert_eq!(
            actions,
            vec![
                Action::RadioStopScan,
                Action::ResetRegistry,
                Action::ArmTimer {
                    kind: TimerKind::Scan,
                    generation: 2,
                },
                Action::RadioStartScan,
            ]
        );
        assert_eq!(session.state(), SessionState::Scanning);
    }

    #[test]
    fn test_device_found_only_observed_while_scanning() {
        let mut session = Session::new();

        let ignored = session.handle(Input::Radio(RadioEvent::DeviceFound {
            handle: handle("A"),
            rssi: -60,
        }));
        assert!(ignored.is_empty());

        session.handle(Input::Command(Command::StartScan));
        let actions = session.handle(Input::Radio(RadioEvent::DeviceFound {
            handle: handle("A"),
            rssi: -60,
        }));
        assert_eq!(actions, vec![Action::Observe(handle("A"), -60)]);
    }

    #[test]
    fn test_scan_timer_expiry_returns_to_idle() {
        let mut session = Session::new();
        session.handle(Input::Command(Command::StartScan));

        let actions = session.handle(Input::Timer {
            kind: TimerKind::Scan,
            generation: 1,
        });

        assert_eq!(actions, vec![Action::RadioStopScan, Action::EndRegistryScan]);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_stale_scan_timer_is_discarded() {
        let mut session = Session::new();
        session.handle(Input::Command(Command::StartScan));
        // Connecting replaces the scan timer; the old firing is stale.
        session.handle(Input::Command(Command::Connect(handle("A"))));

        let actions = session.handle(Input::Timer {
            kind: TimerKind::Scan,
            generation: 1,
        });
        assert!(actions.is_empty());
        assert_eq!(session.state(), SessionState::Connecting);
    }

    #[test]
    fn test_connect_from_scanning_stops_scan_first() {
        let mut session = Session::new();
        session.handle(Input::Command(Command::StartScan));

        let actions = session.handle(Input::Command(Command::Connect(handle("A"))));

        assert_eq!(
            actions,
            vec![
                Action::RadioStopScan,
                Action::EndRegistryScan,
                Action::ArmTimer {
                    kind: TimerKind::Connect,
                    generation: 2,
                },
                Action::RadioConnect(handle("A")),
            ]
        );
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.target(), Some(&handle("A")));
    }

    #[test]
    fn test_link_up_moves_to_service_discovery() {
        let target = handle("A");
        let (mut session, _) = connecting_session(&target);

        let actions = session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: target.clone(),
            connected: true,
        }));

        assert_eq!(
            actions,
            vec![
                Action::CancelTimer,
                Action::Emit(LifecycleEvent::Connected),
                Action::RadioDiscoverServices(target),
            ]
        );
        assert_eq!(session.state(), SessionState::ServicesDiscovering);
    }

    #[test]
    fn test_services_ok_subscribes_then_emits_ready() {
        let target = handle("A");
        let (mut session, _) = connecting_session(&target);
        session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: target.clone(),
            connected: true,
        }));

        let actions = session.handle(Input::Radio(RadioEvent::ServicesDiscovered {
            handle: target.clone(),
            ok: true,
        }));

        assert_eq!(
            actions,
            vec![
                Action::SubscribeCharacteristics(target),
                Action::Emit(LifecycleEvent::ServicesReady),
            ]
        );
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn test_notification_streams_while_active() {
        let target = handle("A");
        let mut session = active_session(&target);

        let payload = Bytes::from_static(&[0x01, 0x02]);
        let actions = session.handle(Input::Radio(RadioEvent::CharacteristicChanged {
            handle: target,
            payload: payload.clone(),
        }));

        assert_eq!(
            actions,
            vec![Action::Emit(LifecycleEvent::DataReceived(payload))]
        );
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn test_remote_disconnect_while_active() {
        let target = handle("A");
        let mut session = active_session(&target);

        let actions = session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: target,
            connected: false,
        }));

        assert_eq!(actions, vec![Action::Emit(LifecycleEvent::Disconnected)]);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.target(), None);
    }

    #[test]
    fn test_connect_timeout_fails_exactly_once() {
        let target = handle("A");
        let (mut session, generation) = connecting_session(&target);

        let actions = session.handle(Input::Timer {
            kind: TimerKind::Connect,
            generation,
        });
        assert_eq!(emitted(&actions), vec![&LifecycleEvent::ConnectFailed]);
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.target(), None);

        // A late radio verdict for the abandoned attempt changes nothing.
        let late = session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: handle("A"),
            connected: false,
        }));
        assert!(late.is_empty());
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_rejected_connection_fails() {
        let target = handle("A");
        let (mut session, _) = connecting_session(&target);

        let actions = session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: target,
            connected: false,
        }));

        assert_eq!(emitted(&actions), vec![&LifecycleEvent::ConnectFailed]);
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[test]
    fn test_service_discovery_failure_fails() {
        let target = handle("A");
        let (mut session, _) = connecting_session(&target);
        session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: target.clone(),
            connected: true,
        }));

        let actions = session.handle(Input::Radio(RadioEvent::ServicesDiscovered {
            handle: target,
            ok: false,
        }));

        assert_eq!(emitted(&actions), vec![&LifecycleEvent::ConnectFailed]);
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(session.target(), None);
    }

    #[test]
    fn test_failed_is_recoverable() {
        let target = handle("A");
        let (mut session, generation) = connecting_session(&target);
        session.handle(Input::Timer {
            kind: TimerKind::Connect,
            generation,
        });
        assert_eq!(session.state(), SessionState::Failed);

        let actions = session.handle(Input::Command(Command::Connect(handle("B"))));
        assert!(actions.contains(&Action::RadioConnect(handle("B"))));
        assert_eq!(session.state(), SessionState::Connecting);

        session.handle(Input::Command(Command::Release));
        session.handle(Input::Command(Command::StartScan));
        assert_eq!(session.state(), SessionState::Scanning);
    }

    #[test]
    fn test_disconnect_command_from_connecting() {
        let target = handle("A");
        let (mut session, _) = connecting_session(&target);

        let actions = session.handle(Input::Command(Command::Disconnect));
        assert_eq!(
            actions,
            vec![Action::CancelTimer, Action::RadioDisconnect(handle("A"))]
        );
        assert_eq!(session.state(), SessionState::Disconnecting);
    }

    #[test]
    fn test_requested_disconnect_completes_to_idle() {
        let target = handle("A");
        let mut session = active_session(&target);
        session.handle(Input::Command(Command::Disconnect));

        let actions = session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: target,
            connected: false,
        }));

        assert_eq!(actions, vec![Action::Emit(LifecycleEvent::Disconnected)]);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.target(), None);
    }

    #[test]
    fn test_connect_while_active_reconnects_after_teardown() {
        let old = handle("A");
        let new = handle("B");
        let mut session = active_session(&old);

        let actions = session.handle(Input::Command(Command::Connect(new.clone())));
        assert_eq!(actions, vec![Action::RadioDisconnect(old.clone())]);
        assert_eq!(session.state(), SessionState::Disconnecting);

        let actions = session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: old,
            connected: false,
        }));
        assert_eq!(emitted(&actions), vec![&LifecycleEvent::Disconnected]);
        assert!(actions.contains(&Action::RadioConnect(new.clone())));
        assert_eq!(session.state(), SessionState::Connecting);
        assert_eq!(session.target(), Some(&new));
    }

    #[test]
    fn test_connect_while_disconnecting_latest_wins() {
        let old = handle("A");
        let mut session = active_session(&old);
        session.handle(Input::Command(Command::Connect(handle("B"))));
        session.handle(Input::Command(Command::Connect(handle("C"))));

        let actions = session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: old,
            connected: false,
        }));
        assert!(actions.contains(&Action::RadioConnect(handle("C"))));
        assert_eq!(session.target(), Some(&handle("C")));
    }

    #[test]
    fn test_duplicate_link_up_is_discarded() {
        let target = handle("A");
        let (mut session, _) = connecting_session(&target);
        session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: target.clone(),
            connected: true,
        }));

        let actions = session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: target,
            connected: true,
        }));
        assert!(actions.is_empty());
        assert_eq!(session.state(), SessionState::ServicesDiscovering);
    }

    #[test]
    fn test_events_for_other_peripherals_are_discarded() {
        let target = handle("A");
        let mut session = active_session(&target);

        let actions = session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: handle("B"),
            connected: false,
        }));
        assert!(actions.is_empty());

        let actions = session.handle(Input::Radio(RadioEvent::CharacteristicChanged {
            handle: handle("B"),
            payload: Bytes::from_static(&[0xFF]),
        }));
        assert!(actions.is_empty());
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn test_release_from_any_state_returns_to_idle() {
        let target = handle("A");

        let mut scanning = Session::new();
        scanning.handle(Input::Command(Command::StartScan));
        let actions = scanning.handle(Input::Command(Command::Release));
        assert_eq!(
            actions,
            vec![
                Action::CancelTimer,
                Action::RadioStopScan,
                Action::EndRegistryScan,
            ]
        );
        assert_eq!(scanning.state(), SessionState::Idle);

        let (mut connecting, _) = connecting_session(&target);
        let actions = connecting.handle(Input::Command(Command::Release));
        assert_eq!(
            actions,
            vec![Action::CancelTimer, Action::RadioDisconnect(target.clone())]
        );
        assert_eq!(connecting.state(), SessionState::Idle);

        let mut active = active_session(&target);
        let actions = active.handle(Input::Command(Command::Release));
        assert_eq!(
            actions,
            vec![Action::CancelTimer, Action::RadioDisconnect(target.clone())]
        );
        assert_eq!(active.state(), SessionState::Idle);
        assert_eq!(active.target(), None);
    }

    #[test]
    fn test_release_emits_nothing_and_second_release_is_noop() {
        let target = handle("A");
        let mut session = active_session(&target);

        let first = session.handle(Input::Command(Command::Release));
        assert!(emitted(&first).is_empty());

        let second = session.handle(Input::Command(Command::Release));
        assert!(second.is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_stale_callback_after_release_is_noop() {
        let target = handle("A");
        let mut session = active_session(&target);
        session.handle(Input::Command(Command::Release));

        let actions = session.handle(Input::Radio(RadioEvent::ConnectionStateChanged {
            handle: target,
            connected: false,
        }));

        assert!(actions.is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_state_helpers() {
        assert!(SessionState::Connecting.is_engaged());
        assert!(SessionState::Active.is_engaged());
        assert!(!SessionState::Idle.is_engaged());
        assert!(SessionState::Idle.is_rest());
        assert!(SessionState::Failed.is_rest());
        assert!(!SessionState::Scanning.is_rest());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Active.to_string(), "Active");
        assert_eq!(
            SessionState::ServicesDiscovering.to_string(),
            "ServicesDiscovering"
        );
    }
}
