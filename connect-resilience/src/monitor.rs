//! Connection monitor
//!
//! Owns the connectivity state machine and the probe/drain loop. A single
//! driver task services a command channel and the probe timer through
//! `tokio::select!`, which makes "at most one probe in flight" structural
//! rather than lock-enforced. External signals (platform online/offline,
//! visibility changes, manual reconnect) arrive as commands; the periodic
//! heartbeat and backoff retries arrive as timer ticks.
//!
//! ## State machine
//!
//! - `start()` moves `Disconnected` to `Probing` and issues a probe.
//! - Probe success: `Connected`, quality from latency, failure counter and
//!   backoff reset, both queues drained in FIFO order.
//! - Heartbeat probes from a healthy connection are silent: listeners see
//!   the `Probing` hop only when the connection was not already `Connected`,
//!   and a repeat of the last delivered event is not re-delivered.
//! - Probe failure: counter incremented; below the retry budget the next
//!   probe is scheduled after a backoff delay, at the budget the state
//!   escalates to `Offline` and probing is suspended until an external
//!   trigger.
//! - Platform offline: immediate `Offline`, pending timer cancelled.
//! - Platform online / `force_reconnect()`: counter reset, immediate probe
//!   from any state.
//! - Backgrounded: probing suspended; foreground regained issues an
//!   immediate probe if none is pending.

use crate::{
    BackoffController, BoundedQueue, ConnectionQuality, ConnectionState, ConnectionStatus,
    DeviceProfile, ListenerRegistry, MonitorConfig, PersistedState, PowerAdaptationPolicy,
    ProbeOutcome, ResilienceError, Result, SnapshotWriter, StateChange, SubscriptionId,
    TuningParameters,
};
use crate::{BackendSync, CapabilityProvider, HealthProbe, NotificationPresenter, SnapshotStore};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Client visibility reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Client is in the foreground; probing allowed
    Foreground,
    /// Client is backgrounded; probing suspended to conserve battery and
    /// bandwidth
    Background,
}

/// Commands serviced by the driver task
enum MonitorCommand {
    /// Probe now; optionally reset the failure counter and backoff first
    Probe { reset_failures: bool, forced: bool },
    /// Platform reported connectivity regained
    PlatformOnline,
    /// Platform reported connectivity lost
    PlatformOffline,
    /// Host visibility changed
    Visibility(Visibility),
    /// A queue mutated; flush the snapshot if coalescing allows
    QueuesChanged,
    /// Stop the driver
    Shutdown,
}

/// State shared between the public handle and the driver task
struct Shared {
    config: MonitorConfig,
    profile: DeviceProfile,
    status: RwLock<ConnectionStatus>,
    tuning: RwLock<TuningParameters>,
    registry: ListenerRegistry,
    notifications: Mutex<BoundedQueue<Value>>,
    offline_actions: Mutex<BoundedQueue<Value>>,
    probe: Arc<dyn HealthProbe>,
    capabilities: Arc<dyn CapabilityProvider>,
    presenter: Arc<dyn NotificationPresenter>,
    backend: Arc<dyn BackendSync>,
    snapshots: SnapshotWriter,
    /// Last event delivered to listeners, for repeat suppression
    last_notified: std::sync::Mutex<Option<StateChange>>,
}

impl Shared {
    /// Deliver an event to listeners unless it repeats the last one
    fn emit(&self, change: StateChange) -> bool {
        {
            let mut last = self
                .last_notified
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            if *last == Some(change) {
                return false;
            }
            *last = Some(change);
        }
        self.registry.notify(&change);
        true
    }

    /// Transition the state machine, notifying listeners on change
    ///
    /// The `Connected` to `Probing` hop of a routine heartbeat is not an
    /// observable change; listeners hear about the heartbeat only if it
    /// fails.
    async fn transition(&self, state: ConnectionState) {
        let change = {
            let mut status = self.status.write().await;
            if status.state == state {
                None
            } else {
                let prior = status.state;
                status.state = state;
                if prior == ConnectionState::Connected && state == ConnectionState::Probing {
                    None
                } else {
                    Some(StateChange {
                        state,
                        quality: status.quality,
                    })
                }
            }
        };

        if let Some(change) = change {
            if self.emit(change) {
                info!("Connection state changed to {}", change.state);
            }
        }
    }

    /// Record a successful probe: reset counters, derive quality, notify
    /// unless the connection was already healthy at the same quality
    async fn record_success(&self, latency: std::time::Duration) {
        let quality = ConnectionQuality::from_latency(latency);
        {
            let mut status = self.status.write().await;
            status.state = ConnectionState::Connected;
            status.quality = quality;
            status.consecutive_failures = 0;
            status.last_latency_ms = Some(latency.as_millis() as u64);
        }

        let change = StateChange {
            state: ConnectionState::Connected,
            quality,
        };
        if self.emit(change) {
            info!(
                "Connected ({}ms round trip, quality {})",
                latency.as_millis(),
                quality
            );
        }
    }

    /// Record a failed probe; returns the new consecutive-failure count
    async fn record_failure(&self) -> u32 {
        let mut status = self.status.write().await;
        status.consecutive_failures += 1;
        status.consecutive_failures
    }

    /// Reset the consecutive-failure counter
    async fn reset_failures(&self) {
        let mut status = self.status.write().await;
        status.consecutive_failures = 0;
    }

    /// Re-sample the battery and recompute tuning; resizes queues and
    /// retunes backoff when parameters changed
    async fn resample_and_retune(&self, backoff: &mut BackoffController) -> TuningParameters {
        let battery = self.capabilities.sample_battery();
        let tuning = PowerAdaptationPolicy::tune(&self.profile, battery.as_ref(), &self.config);

        {
            let mut status = self.status.write().await;
            status.battery_level = battery.map(|b| b.level);
        }

        let changed = {
            let mut current = self.tuning.write().await;
            if *current == tuning {
                false
            } else {
                *current = tuning;
                true
            }
        };

        if changed {
            info!(
                "Tuning changed: heartbeat {:?}, queue capacity {}, retry budget {}",
                tuning.heartbeat_interval, tuning.max_queue_size, tuning.max_retries
            );
            backoff.retune(&tuning);
            self.notifications.lock().await.resize(tuning.max_queue_size);
            self.offline_actions.lock().await.resize(tuning.max_queue_size);
        }

        tuning
    }

    /// Drain both queues in FIFO order: notifications first, then offline
    /// actions replayed to the backend
    async fn drain_queues(&self, max_retries: u32) {
        let presenter = Arc::clone(&self.presenter);
        let report = {
            let mut queue = self.notifications.lock().await;
            queue
                .drain(max_retries, |item| {
                    let presenter = Arc::clone(&presenter);
                    async move { presenter.present(&item).await }
                })
                .await
        };
        if report.delivered > 0 || report.dropped > 0 {
            info!(
                "Notification drain: {} delivered, {} dropped, {} pending",
                report.delivered, report.dropped, report.retained
            );
        }

        let backend = Arc::clone(&self.backend);
        let report = {
            let mut queue = self.offline_actions.lock().await;
            queue
                .drain(max_retries, |item| {
                    let backend = Arc::clone(&backend);
                    async move { backend.replay(&item).await }
                })
                .await
        };
        if report.delivered > 0 || report.dropped > 0 {
            info!(
                "Offline action replay: {} acknowledged, {} dropped, {} pending",
                report.delivered, report.dropped, report.retained
            );
        }
    }

    /// Flush the queue snapshot through the coalescing writer
    async fn flush_queues(&self, force: bool) {
        let state = PersistedState {
            notifications: self.notifications.lock().await.snapshot(),
            offline_actions: self.offline_actions.lock().await.snapshot(),
        };
        self.snapshots.flush(&state, force).await;
    }
}

/// Connection resilience monitor
///
/// Constructed once per application session. All external effects go
/// through the injected collaborator traits; see the module docs for the
/// state machine.
pub struct ConnectionMonitor {
    shared: Arc<Shared>,
    command_tx: mpsc::UnboundedSender<MonitorCommand>,
    /// Receiver parked here until `start()` hands it to the driver
    command_rx: std::sync::Mutex<Option<mpsc::UnboundedReceiver<MonitorCommand>>>,
    driver: std::sync::Mutex<Option<JoinHandle<()>>>,
    started: AtomicBool,
    destroyed: AtomicBool,
}

impl ConnectionMonitor {
    /// Create a monitor with the given configuration and collaborators
    ///
    /// Samples the device profile once; it is immutable for the session.
    /// Returns `ResilienceError::Configuration` for invalid configuration.
    pub fn new(
        config: MonitorConfig,
        probe: Arc<dyn HealthProbe>,
        capabilities: Arc<dyn CapabilityProvider>,
        presenter: Arc<dyn NotificationPresenter>,
        backend: Arc<dyn BackendSync>,
        store: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        config.validate()?;

        let profile = capabilities.device_profile();
        let battery = capabilities.sample_battery();
        let tuning = PowerAdaptationPolicy::tune(&profile, battery.as_ref(), &config);

        info!(
            "Connection monitor created (tier {:?}, heartbeat {:?}, queue capacity {})",
            profile.tier, tuning.heartbeat_interval, tuning.max_queue_size
        );

        let status = ConnectionStatus {
            state: ConnectionState::Disconnected,
            quality: ConnectionQuality::Unknown,
            device_tier: profile.tier,
            battery_level: battery.map(|b| b.level),
            consecutive_failures: 0,
            last_latency_ms: None,
        };

        let snapshots = SnapshotWriter::new(store, config.snapshot_flush_interval);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                profile,
                status: RwLock::new(status),
                tuning: RwLock::new(tuning),
                registry: ListenerRegistry::new(),
                notifications: Mutex::new(BoundedQueue::new(
                    "notification",
                    tuning.max_queue_size,
                )),
                offline_actions: Mutex::new(BoundedQueue::new(
                    "offline-action",
                    tuning.max_queue_size,
                )),
                probe,
                capabilities,
                presenter,
                backend,
                snapshots,
                last_notified: std::sync::Mutex::new(None),
            }),
            command_tx,
            command_rx: std::sync::Mutex::new(Some(command_rx)),
            driver: std::sync::Mutex::new(None),
            started: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Start the monitor: restore persisted queues and begin probing
    pub async fn start(&self) -> Result<()> {
        self.ensure_alive()?;
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(ResilienceError::invalid_state("monitor already started"));
        }

        // Restore queued items from a previous session, trimming to the
        // current capacities
        if let Some(persisted) = self.shared.snapshots.load().await {
            self.shared
                .notifications
                .lock()
                .await
                .restore(persisted.notifications);
            self.shared
                .offline_actions
                .lock()
                .await
                .restore(persisted.offline_actions);
        }

        let rx = self
            .command_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| ResilienceError::invalid_state("command channel already taken"))?;

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(run_driver(shared, rx));
        *self.driver.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);

        info!("Connection monitor started");
        Ok(())
    }

    /// Tear the monitor down: cancel timers, abort in-flight work, clear
    /// queues and listeners
    ///
    /// Idempotent; after the first call returns, no probe is ever issued
    /// again and no timer fires.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.command_tx.send(MonitorCommand::Shutdown);
        if let Some(handle) = self.driver.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        // Drop the parked receiver (if never started) so signal sends fail
        // silently from here on
        self.command_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        self.shared.notifications.lock().await.clear();
        self.shared.offline_actions.lock().await.clear();
        self.shared.registry.clear();

        info!("Connection monitor destroyed");
    }

    /// Reset the failure counter and backoff, then probe immediately from
    /// any state
    pub fn force_reconnect(&self) {
        debug!("Manual reconnect requested");
        let _ = self.command_tx.send(MonitorCommand::Probe {
            reset_failures: true,
            forced: true,
        });
    }

    /// Platform reported connectivity regained
    pub fn notify_platform_online(&self) {
        let _ = self.command_tx.send(MonitorCommand::PlatformOnline);
    }

    /// Platform reported connectivity lost
    pub fn notify_platform_offline(&self) {
        let _ = self.command_tx.send(MonitorCommand::PlatformOffline);
    }

    /// Host visibility changed (foreground/background)
    pub fn notify_visibility(&self, visibility: Visibility) {
        let _ = self
            .command_tx
            .send(MonitorCommand::Visibility(visibility));
    }

    /// Enqueue a notification for presentation
    ///
    /// Queued while disconnected and delivered on the next drain. At
    /// capacity the oldest item is evicted; this never fails for a full
    /// queue.
    pub async fn queue_notification(&self, payload: Value) -> Result<Uuid> {
        self.ensure_alive()?;
        let id = self.shared.notifications.lock().await.enqueue(payload);
        let _ = self.command_tx.send(MonitorCommand::QueuesChanged);
        Ok(id)
    }

    /// Capture a user action taken while disconnected, for ordered replay
    /// to the backend once connectivity returns
    pub async fn queue_offline_action(&self, payload: Value) -> Result<Uuid> {
        self.ensure_alive()?;
        let id = self.shared.offline_actions.lock().await.enqueue(payload);
        let _ = self.command_tx.send(MonitorCommand::QueuesChanged);
        Ok(id)
    }

    /// Snapshot of the current state, quality, tier, and battery level
    pub async fn connection_state(&self) -> ConnectionStatus {
        *self.shared.status.read().await
    }

    /// Subscribe to state-change events; handlers run in registration order
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChange) -> Result<()> + Send + Sync + 'static,
    {
        self.shared.registry.subscribe(handler)
    }

    /// Remove a previously registered handler
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.shared.registry.unsubscribe(id)
    }

    /// Number of notifications currently queued
    pub async fn pending_notifications(&self) -> usize {
        self.shared.notifications.lock().await.len()
    }

    /// Number of offline actions awaiting replay
    pub async fn pending_offline_actions(&self) -> usize {
        self.shared.offline_actions.lock().await.len()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ResilienceError::Destroyed);
        }
        Ok(())
    }
}

/// Driver loop: services commands and the probe timer
///
/// `next_probe == None` means probing is suspended (offline, backgrounded,
/// or awaiting an external trigger).
async fn run_driver(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<MonitorCommand>) {
    let initial_tuning = *shared.tuning.read().await;
    let mut backoff = BackoffController::new(&initial_tuning, shared.config.jitter_max);
    let mut foreground = true;
    let mut force_next = false;
    let mut next_probe: Option<Instant> = Some(Instant::now());

    loop {
        let deadline = next_probe;
        tokio::select! {
            cmd = rx.recv() => {
                match cmd {
                    None | Some(MonitorCommand::Shutdown) => break,
                    Some(MonitorCommand::Probe { reset_failures, forced }) => {
                        if reset_failures {
                            shared.reset_failures().await;
                        }
                        force_next = forced;
                        next_probe = Some(Instant::now());
                    }
                    Some(MonitorCommand::PlatformOnline) => {
                        debug!("Platform reports online, probing immediately");
                        shared.reset_failures().await;
                        next_probe = Some(Instant::now());
                    }
                    Some(MonitorCommand::PlatformOffline) => {
                        debug!("Platform reports offline, suspending probes");
                        next_probe = None;
                        shared.transition(ConnectionState::Offline).await;
                        shared.flush_queues(true).await;
                    }
                    Some(MonitorCommand::Visibility(Visibility::Background)) => {
                        debug!("Client backgrounded, suspending probes");
                        foreground = false;
                        next_probe = None;
                    }
                    Some(MonitorCommand::Visibility(Visibility::Foreground)) => {
                        foreground = true;
                        if next_probe.is_none() {
                            debug!("Foreground regained, probing immediately");
                            next_probe = Some(Instant::now());
                        }
                    }
                    Some(MonitorCommand::QueuesChanged) => {
                        // Deliver promptly when already connected instead of
                        // waiting for the next heartbeat
                        let connected = shared.status.read().await.state.is_connected();
                        if connected {
                            let tuning = *shared.tuning.read().await;
                            shared.drain_queues(tuning.max_retries).await;
                        }
                        shared.flush_queues(false).await;
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                if deadline.is_some() =>
            {
                next_probe = None;
                if foreground || force_next {
                    force_next = false;
                    next_probe = probe_cycle(&shared, &mut backoff).await;
                }
            }
        }
    }

    debug!("Connection monitor driver stopped");
}

/// One probe cycle: retune, probe, transition, drain; returns the next
/// probe deadline, or `None` when probing is suspended
async fn probe_cycle(shared: &Arc<Shared>, backoff: &mut BackoffController) -> Option<Instant> {
    let tuning = shared.resample_and_retune(backoff).await;

    shared.transition(ConnectionState::Probing).await;

    let failures_so_far = shared.status.read().await.consecutive_failures;
    let probe_timeout = shared.config.probe_timeout(failures_so_far);

    // The timeout is enforced here as well as passed down, so a misbehaving
    // probe implementation cannot hold the loop
    let outcome = match tokio::time::timeout(probe_timeout, shared.probe.check(probe_timeout)).await
    {
        Ok(outcome) => outcome,
        Err(_) => ProbeOutcome::Failure,
    };

    match outcome {
        ProbeOutcome::Success { latency } => {
            shared.record_success(latency).await;
            shared.drain_queues(tuning.max_retries).await;
            shared.flush_queues(false).await;
            Some(Instant::now() + tuning.heartbeat_interval)
        }
        ProbeOutcome::Failure => {
            let failures = shared.record_failure().await;
            if failures >= tuning.max_retries {
                warn!(
                    "Probe failed {} times, going offline until an external trigger",
                    failures
                );
                shared.transition(ConnectionState::Offline).await;
                shared.flush_queues(true).await;
                None
            } else {
                shared.transition(ConnectionState::Disconnected).await;
                let delay = backoff.delay(failures - 1);
                info!(
                    "Probe failed ({}/{}), next attempt in {:?}",
                    failures, tuning.max_retries, delay
                );
                Some(Instant::now() + delay)
            }
        }
    }
}
