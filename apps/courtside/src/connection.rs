//! Push-channel lifecycle.
//!
//! `ConnectionMachine` is the pure state machine: it consumes lifecycle events
//! and returns the side effects to run. `ConnectionManager` is the async
//! driver that dials, reads frames, sleeps between attempts and executes those
//! effects. Socket failures only ever become machine events.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics;
use crate::router::EventRouter;
use crate::status::{status_channel, StatusObserver, StatusPublisher};
use crate::subscription::SubscriptionRegistry;
use crate::transport::{Connector, Link, OutboundSlot};

/// `delay = min(base * 2^attempt, cap)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base: Duration,
    pub cap: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self { base, cap }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting { attempt: u32 },
    Connected,
    ReconnectScheduled { attempt: u32, delay: Duration },
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Start,
    Opened,
    Failed,
    Closed,
    TimerFired,
    Dispose,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    MarkConnected,
    MarkDisconnected,
    /// Re-announce every desired subscription.
    Replay,
    ArmTimer(Duration),
    /// Drop the channel and anything still waiting on it.
    Release,
}

#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
    attempt: u32,
    backoff: BackoffPolicy,
}

impl ConnectionMachine {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            backoff,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn handle(&mut self, event: ConnectionEvent) -> Vec<Effect> {
        match (&self.state, event) {
            (ConnectionState::Disposed, _) => Vec::new(),
            (state, ConnectionEvent::Dispose) => {
                let was_connected = matches!(state, ConnectionState::Connected);
                self.state = ConnectionState::Disposed;
                if was_connected {
                    vec![Effect::MarkDisconnected, Effect::Release]
                } else {
                    vec![Effect::Release]
                }
            }
            (ConnectionState::Disconnected, ConnectionEvent::Start) => {
                self.state = ConnectionState::Connecting {
                    attempt: self.attempt,
                };
                Vec::new()
            }
            (ConnectionState::Connecting { .. }, ConnectionEvent::Opened) => {
                self.attempt = 0;
                self.state = ConnectionState::Connected;
                vec![Effect::MarkConnected, Effect::Replay]
            }
            (ConnectionState::Connecting { .. }, ConnectionEvent::Failed) => self.schedule(Vec::new()),
            (ConnectionState::Connected, ConnectionEvent::Closed) => {
                self.schedule(vec![Effect::MarkDisconnected])
            }
            (ConnectionState::ReconnectScheduled { .. }, ConnectionEvent::TimerFired) => {
                self.state = ConnectionState::Connecting {
                    attempt: self.attempt,
                };
                Vec::new()
            }
            (state, event) => {
                debug!(target = "courtside::connection", state = ?state, event = ?event, "ignored lifecycle event");
                Vec::new()
            }
        }
    }

    fn schedule(&mut self, mut effects: Vec<Effect>) -> Vec<Effect> {
        let delay = self.backoff.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.state = ConnectionState::ReconnectScheduled {
            attempt: self.attempt,
            delay,
        };
        effects.push(Effect::ArmTimer(delay));
        effects
    }
}

/// Owns the single push channel of a session.
pub struct ConnectionManager {
    uri: String,
    backoff: BackoffPolicy,
    connector: Arc<dyn Connector>,
    registry: Arc<SubscriptionRegistry>,
    outbound: Arc<OutboundSlot>,
    router: Arc<EventRouter>,
    status: StatusPublisher,
    observer: StatusObserver,
    disposed: AtomicBool,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        uri: String,
        backoff: BackoffPolicy,
        connector: Arc<dyn Connector>,
        registry: Arc<SubscriptionRegistry>,
        outbound: Arc<OutboundSlot>,
        router: Arc<EventRouter>,
    ) -> Arc<Self> {
        let (status, observer) = status_channel();
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            uri,
            backoff,
            connector,
            registry,
            outbound,
            router,
            status,
            observer,
            disposed: AtomicBool::new(false),
            shutdown,
            task: Mutex::new(None),
        })
    }

    pub fn status(&self) -> StatusObserver {
        self.observer.clone()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Starts the connection driver. Returns false when already started or
    /// disposed.
    pub fn connect(self: &Arc<Self>) -> bool {
        if self.is_disposed() {
            return false;
        }
        let mut task = self.task.lock();
        if task.is_some() {
            return false;
        }
        let shutdown = self.shutdown.subscribe();
        *task = Some(tokio::spawn(Arc::clone(self).run(shutdown)));
        true
    }

    /// Terminal: stops reconnecting, closes the channel and turns every later
    /// call into a no-op.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.send_replace(true);
        let task = self.task.lock().take();
        match task {
            Some(task) => {
                if let Err(err) = task.await {
                    warn!(target = "courtside::connection", error = %err, "connection driver ended abnormally");
                }
            }
            None => {
                self.outbound.detach();
                self.status.set_state(ConnectionState::Disposed);
            }
        }
        info!(target = "courtside::connection", "push channel disposed");
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut machine = ConnectionMachine::new(self.backoff);
        let mut link: Option<Link> = None;
        self.step(&mut machine, ConnectionEvent::Start);

        loop {
            if *shutdown.borrow() {
                self.step(&mut machine, ConnectionEvent::Dispose);
            }
            match machine.state().clone() {
                ConnectionState::Disposed => break,
                ConnectionState::Disconnected => self.step(&mut machine, ConnectionEvent::Start),
                ConnectionState::Connecting { attempt } => {
                    debug!(target = "courtside::connection", attempt, "dialing push channel");
                    let dialed = tokio::select! {
                        biased;
                        _ = shutdown.changed() => None,
                        result = self.connector.connect(&self.uri) => Some(result),
                    };
                    match dialed {
                        None => self.step(&mut machine, ConnectionEvent::Dispose),
                        Some(Ok(opened)) => {
                            self.outbound.attach(opened.outbound.clone());
                            link = Some(opened);
                            self.step(&mut machine, ConnectionEvent::Opened);
                        }
                        Some(Err(err)) => {
                            warn!(target = "courtside::connection", attempt, error = %err, "push channel dial failed");
                            self.step(&mut machine, ConnectionEvent::Failed);
                        }
                    }
                }
                ConnectionState::Connected => {
                    let Some(active) = link.as_mut() else {
                        self.step(&mut machine, ConnectionEvent::Closed);
                        continue;
                    };
                    let frame = tokio::select! {
                        biased;
                        _ = shutdown.changed() => {
                            self.step(&mut machine, ConnectionEvent::Dispose);
                            continue;
                        }
                        frame = active.inbound.recv() => frame,
                    };
                    match frame {
                        Some(text) => {
                            self.router.route(&text);
                        }
                        None => {
                            self.outbound.detach();
                            if let Some(closed) = link.take() {
                                closed.close();
                            }
                            info!(target = "courtside::connection", "push channel closed");
                            self.step(&mut machine, ConnectionEvent::Closed);
                        }
                    }
                }
                ConnectionState::ReconnectScheduled { delay, .. } => {
                    tokio::select! {
                        biased;
                        _ = shutdown.changed() => self.step(&mut machine, ConnectionEvent::Dispose),
                        _ = tokio::time::sleep(delay) => self.step(&mut machine, ConnectionEvent::TimerFired),
                    }
                }
            }
        }

        self.outbound.detach();
        if let Some(active) = link.take() {
            active.close();
        }
    }

    fn step(&self, machine: &mut ConnectionMachine, event: ConnectionEvent) {
        let effects = machine.handle(event);
        self.status.set_state(machine.state().clone());
        for effect in effects {
            match effect {
                Effect::MarkConnected => {
                    info!(target = "courtside::connection", "push channel open");
                    self.status.set_connected(true);
                }
                Effect::MarkDisconnected => self.status.set_connected(false),
                Effect::Replay => {
                    self.registry.replay();
                }
                Effect::ArmTimer(delay) => {
                    metrics::RECONNECTS_SCHEDULED.inc();
                    info!(
                        target = "courtside::connection",
                        delay_ms = delay.as_millis() as u64,
                        attempt = machine.attempt(),
                        "reconnect scheduled"
                    );
                }
                Effect::Release => self.outbound.detach(),
            }
        }
    }
}
