use super::{ConnectionState, DropReason, ReconnectPolicy, SendOutcome, SupervisorStats};
use crate::config::FramecastConfig;
use crate::error::TransportError;
use crate::events::{EventBus, StreamEvent};
use crate::transport::{Endpoint, StreamTransport, TransportConnector};
use bytes::Bytes;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Owns the live transport and keeps it alive across failures.
///
/// At most one transport is installed at a time and at most one reconnect worker runs per
/// session. Payloads offered while no transport is installed are dropped, never queued.
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

struct SupervisorInner {
    connector: Arc<dyn TransportConnector>,
    ping_interval: Duration,
    event_bus: Arc<EventBus>,
    slot: RwLock<Option<ActiveTransport>>,
    state: watch::Sender<ConnectionState>,
    policy: Mutex<ReconnectPolicy>,
    endpoint: Mutex<Option<Endpoint>>,
    session: Mutex<Arc<Session>>,
    next_generation: AtomicU64,
    wake: Notify,
    stats: Mutex<SupervisorStats>,
}

struct ActiveTransport {
    transport: Arc<dyn StreamTransport>,
    /// Keepalive and receive loop of this generation
    tasks: CancellationToken,
}

/// One `start` .. `disconnect` span
struct Session {
    token: CancellationToken,
    reconnecting: AtomicBool,
}

impl Session {
    fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            reconnecting: AtomicBool::new(false),
        }
    }

    fn ended() -> Self {
        let session = Self::new();
        session.token.cancel();
        session
    }
}

impl ConnectionSupervisor {
    pub fn new(
        connector: Arc<dyn TransportConnector>,
        policy: ReconnectPolicy,
        ping_interval: Duration,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(SupervisorInner {
                connector,
                ping_interval: ping_interval.max(Duration::from_millis(1)),
                event_bus,
                slot: RwLock::new(None),
                state,
                policy: Mutex::new(policy),
                endpoint: Mutex::new(None),
                session: Mutex::new(Arc::new(Session::ended())),
                next_generation: AtomicU64::new(1),
                wake: Notify::new(),
                stats: Mutex::new(SupervisorStats::default()),
            }),
        }
    }

    pub fn from_config(
        config: &FramecastConfig,
        connector: Arc<dyn TransportConnector>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self::new(
            connector,
            ReconnectPolicy::from_config(&config.reconnect),
            config.keepalive.ping_interval(),
            event_bus,
        )
    }

    /// Connect to `url`, replacing any previous session.
    ///
    /// An invalid endpoint fails immediately. A transient connect failure returns `Ok` with
    /// the supervisor left in `Reconnecting`.
    pub async fn start(&self, url: &str) -> Result<(), TransportError> {
        let endpoint = Endpoint::parse(url)?;

        self.disconnect().await;

        let session = Arc::new(Session::new());
        *self.inner.session.lock() = Arc::clone(&session);
        *self.inner.endpoint.lock() = Some(endpoint.clone());
        self.inner.drain_wake();

        {
            let _slot = self.inner.slot.write();
            self.inner.transition(ConnectionState::Connecting);
        }

        let generation = self.inner.allocate_generation();
        info!("Connecting to {} (generation {})", endpoint, generation);

        let result = tokio::select! {
            _ = session.token.cancelled() => return Ok(()),
            result = self.inner.connector.connect(&endpoint, generation) => result,
        };

        match result {
            Ok(transport) => {
                self.inner.install(&session, transport);
                Ok(())
            }
            Err(e) if !e.is_recoverable() => {
                {
                    let _slot = self.inner.slot.write();
                    if !session.token.is_cancelled() {
                        self.inner.transition(ConnectionState::Disconnected);
                    }
                }
                Err(e)
            }
            Err(e) => {
                warn!("Initial connection to {} failed: {}", endpoint, e);
                self.inner.stats.lock().transport_failures += 1;
                {
                    let _slot = self.inner.slot.write();
                    if !session.token.is_cancelled() {
                        self.inner.transition(ConnectionState::Reconnecting);
                    }
                }
                self.inner.ensure_reconnect();
                Ok(())
            }
        }
    }

    /// Offer one payload; it is sent on the current transport or dropped
    pub async fn send(&self, payload: Bytes) -> SendOutcome {
        let Some(transport) = self.inner.current_transport() else {
            self.inner.stats.lock().record_dropped();
            self.inner.ensure_reconnect();
            return SendOutcome::Dropped(DropReason::NotConnected);
        };

        let size = payload.len();
        match transport.send_binary(payload).await {
            Ok(()) => {
                self.inner.stats.lock().record_sent(size);
                SendOutcome::Sent
            }
            Err(e) => {
                self.inner.stats.lock().record_dropped();
                self.inner.handle_failure(transport.generation(), e);
                SendOutcome::Dropped(DropReason::SendFailed)
            }
        }
    }

    /// Send a text control token with the same drop-if-disconnected rules as `send`
    pub async fn send_control(&self, token: &str) -> SendOutcome {
        let Some(transport) = self.inner.current_transport() else {
            debug!("Control token {} dropped: not connected", token);
            self.inner.ensure_reconnect();
            return SendOutcome::Dropped(DropReason::NotConnected);
        };

        match transport.send_text(token).await {
            Ok(()) => {
                self.inner.stats.lock().control_messages_sent += 1;
                let _ = self.inner.event_bus.publish(StreamEvent::ControlSent {
                    token: token.to_string(),
                });
                SendOutcome::Sent
            }
            Err(e) => {
                warn!("Control token {} failed: {}", token, e);
                self.inner.handle_failure(transport.generation(), e);
                SendOutcome::Dropped(DropReason::SendFailed)
            }
        }
    }

    /// End the session: stop reconnecting, close the transport and reset the backoff
    pub async fn disconnect(&self) {
        let session = self.inner.session.lock().clone();
        session.token.cancel();

        let removed = {
            let mut slot = self.inner.slot.write();
            let removed = slot.take();
            self.inner.transition(ConnectionState::Disconnected);
            removed
        };
        self.inner.policy.lock().reset();

        if let Some(active) = removed {
            active.tasks.cancel();
            active.transport.close().await;
            debug!("Closed transport generation {}", active.transport.generation());
        }
    }

    /// Reachability hint from the host platform
    pub fn network_path_changed(&self, satisfied: bool) {
        if !satisfied {
            info!("Network path unsatisfied");
            return;
        }

        let session = self.inner.session.lock().clone();
        let spawn = {
            // Install drains the wake permit under the write lock, so a permit stored here
            // can never outlive the reconnect cycle it was meant for
            let _slot = self.inner.slot.read();
            let state = *self.inner.state.borrow();
            match state {
                ConnectionState::Reconnecting if session.reconnecting.load(Ordering::SeqCst) => {
                    info!("Network path available, retrying immediately");
                    self.inner.wake.notify_one();
                    false
                }
                ConnectionState::Reconnecting => true,
                other => {
                    debug!("Network path available while {}, ignoring", other);
                    false
                }
            }
        };

        if spawn {
            self.inner.ensure_reconnect();
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Generation of the installed transport, if any
    pub fn active_generation(&self) -> Option<u64> {
        self.inner
            .slot
            .read()
            .as_ref()
            .map(|active| active.transport.generation())
    }

    pub fn endpoint(&self) -> Option<Endpoint> {
        self.inner.endpoint.lock().clone()
    }

    pub fn stats(&self) -> SupervisorStats {
        self.inner.stats.lock().clone()
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.inner.event_bus
    }
}

impl Drop for ConnectionSupervisor {
    fn drop(&mut self) {
        self.inner.session.lock().token.cancel();
        if let Some(active) = self.inner.slot.write().take() {
            active.tasks.cancel();
        }
    }
}

impl SupervisorInner {
    fn allocate_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    fn current_transport(&self) -> Option<Arc<dyn StreamTransport>> {
        self.slot
            .read()
            .as_ref()
            .map(|active| Arc::clone(&active.transport))
    }

    /// Caller holds the slot write lock
    fn transition(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            let _ = self
                .event_bus
                .publish(StreamEvent::ConnectionStateChanged { state: next });
        }
    }

    /// Discard a wake-up left over from a hint nobody consumed
    fn drain_wake(&self) {
        let _ = self.wake.notified().now_or_never();
    }

    /// Install a freshly connected transport unless the session has ended
    fn install(self: &Arc<Self>, session: &Arc<Session>, transport: Arc<dyn StreamTransport>) -> bool {
        let tasks = session.token.child_token();
        let generation = transport.generation();

        let previous = {
            let mut slot = self.slot.write();
            if session.token.is_cancelled() {
                drop(slot);
                debug!("Session ended during connect, discarding generation {}", generation);
                tokio::spawn(async move { transport.close().await });
                return false;
            }

            let previous = slot.replace(ActiveTransport {
                transport: Arc::clone(&transport),
                tasks: tasks.clone(),
            });
            self.policy.lock().reset();
            session.reconnecting.store(false, Ordering::SeqCst);
            self.transition(ConnectionState::Connected);
            self.drain_wake();
            previous
        };

        if let Some(previous) = previous {
            previous.tasks.cancel();
            tokio::spawn(async move { previous.transport.close().await });
        }

        self.stats.lock().record_connected();
        info!("Transport generation {} installed", generation);

        self.spawn_monitor(transport, tasks);
        true
    }

    /// Keepalive pings and the receive loop for one generation
    fn spawn_monitor(self: &Arc<Self>, transport: Arc<dyn StreamTransport>, tasks: CancellationToken) {
        let inner = Arc::clone(self);
        let ping_interval = self.ping_interval;

        tokio::spawn(async move {
            let generation = transport.generation();
            let mut keepalive = interval_at(Instant::now() + ping_interval, ping_interval);
            keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Runs beside the receive loop, which is what reads the pong a ping waits for
            let pinger = async {
                loop {
                    keepalive.tick().await;
                    if let Err(e) = transport.ping().await {
                        break e;
                    }
                    inner.stats.lock().pings_sent += 1;
                }
            };

            let error = tokio::select! {
                _ = tasks.cancelled() => {
                    debug!("Monitor for generation {} cancelled", generation);
                    return;
                }
                error = transport.receive_loop() => error,
                error = pinger => error,
            };

            inner.handle_failure(generation, error);
        });
    }

    /// Failure path for a transport generation; stale generations are ignored
    fn handle_failure(self: &Arc<Self>, generation: u64, error: TransportError) {
        let removed = {
            let mut slot = self.slot.write();
            let is_current = matches!(
                slot.as_ref(),
                Some(active) if active.transport.generation() == generation
            );
            if !is_current {
                debug!("Ignoring failure of stale generation {}: {}", generation, error);
                return;
            }
            let removed = slot.take();
            self.transition(ConnectionState::Reconnecting);
            removed
        };

        warn!("Transport generation {} failed: {}", generation, error);
        self.stats.lock().transport_failures += 1;

        if let Some(active) = removed {
            active.tasks.cancel();
            tokio::spawn(async move { active.transport.close().await });
        }

        self.ensure_reconnect();
    }

    /// Spawn the reconnect worker unless one is already running for this session
    fn ensure_reconnect(self: &Arc<Self>) {
        let session = self.session.lock().clone();
        {
            let _slot = self.slot.write();
            if session.token.is_cancelled() || *self.state.borrow() != ConnectionState::Reconnecting
            {
                return;
            }
            if session.reconnecting.swap(true, Ordering::SeqCst) {
                debug!("Reconnect already in flight");
                return;
            }
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.reconnect_worker(session).await });
    }

    async fn reconnect_worker(self: Arc<Self>, session: Arc<Session>) {
        loop {
            let next = {
                let mut policy = self.policy.lock();
                policy
                    .next_delay()
                    .map(|delay| (delay, policy.attempt(), policy.max_attempts()))
            };

            let Some((delay, attempt, max_attempts)) = next else {
                self.give_up(&session);
                return;
            };

            let _ = self.event_bus.publish(StreamEvent::ReconnectScheduled {
                attempt,
                max_attempts,
                delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            });

            tokio::select! {
                _ = session.token.cancelled() => return,
                _ = sleep(delay) => {}
                _ = self.wake.notified() => {
                    debug!("Reconnect delay cut short by reachability hint");
                }
            }

            let Some(endpoint) = self.endpoint.lock().clone() else {
                return;
            };
            let generation = self.allocate_generation();
            self.stats.lock().reconnect_attempts += 1;
            info!(
                "Reconnect attempt {}/{} to {} (generation {})",
                attempt, max_attempts, endpoint, generation
            );

            let result = tokio::select! {
                _ = session.token.cancelled() => return,
                result = self.connector.connect(&endpoint, generation) => result,
            };

            match result {
                Ok(transport) => {
                    self.install(&session, transport);
                    return;
                }
                Err(e) => {
                    warn!("Reconnect attempt {}/{} failed: {}", attempt, max_attempts, e);
                    self.stats.lock().transport_failures += 1;
                }
            }
        }
    }

    fn give_up(&self, session: &Session) {
        let attempts = {
            let _slot = self.slot.write();
            if session.token.is_cancelled() {
                return;
            }
            session.reconnecting.store(false, Ordering::SeqCst);
            self.transition(ConnectionState::GivenUp);
            self.policy.lock().attempt()
        };

        let _ = self
            .event_bus
            .publish(StreamEvent::ConnectionGivenUp { attempts });
    }
}
