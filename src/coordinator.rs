use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::client::DeviceClient;
use crate::config::DEFAULT_UPDATE_INTERVAL_SECS;
use crate::diff::diff_json;
use crate::types::{Command, Credentials, Event, PanelView, Snapshot};
use crate::{Error, Result};

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
type InFlight = Shared<BoxFuture<'static, Result<Arc<Snapshot>>>>;

/// Refresh bookkeeping. `started` counts every flight ever spawned, so a
/// flight's generation orders it against commands.
#[derive(Default)]
struct FlightSlot {
    started: u64,
    current: Option<(u64, InFlight)>,
}

enum Pending {
    Join(InFlight),
    Wait(InFlight),
}

pub struct CoordinatorBuilder {
    client: DeviceClient,
    credentials: Credentials,
    device_id: String,
    interval: Duration,
    event_callbacks: Vec<EventCallback>,
}

impl CoordinatorBuilder {
    pub fn new(client: DeviceClient, credentials: Credentials, device_id: impl Into<String>) -> Self {
        Self {
            client,
            credentials,
            device_id: device_id.into(),
            interval: Duration::from_secs(DEFAULT_UPDATE_INTERVAL_SECS),
            event_callbacks: Vec::new(),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    /// Run the first refresh and, only if it succeeds, start the poll loop.
    pub async fn start(self) -> Result<Coordinator> {
        if self.interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".into()));
        }

        let (snapshot, _) = watch::channel(Arc::new(Snapshot::default()));
        let (interval, _) = watch::channel(self.interval);
        let coordinator = Coordinator {
            inner: Arc::new(Inner {
                client: self.client,
                credentials: self.credentials,
                device_id: self.device_id,
                snapshot,
                interval,
                flights: Mutex::new(FlightSlot::default()),
                event_callbacks: self.event_callbacks,
                cancel: CancellationToken::new(),
            }),
        };

        coordinator.refresh().await?;
        info!(device = %coordinator.device_id(), interval = ?self.interval, "first refresh complete, polling started");

        tokio::spawn(poll_task(
            Arc::downgrade(&coordinator.inner),
            coordinator.inner.interval.subscribe(),
            coordinator.inner.cancel.clone(),
        ));
        Ok(coordinator)
    }
}

/// Owns the poll cadence and the published [`Snapshot`] for one device.
///
/// Cheap to clone; all clones drive the same device. At most one status
/// fetch is in flight per device, and callers arriving while one runs share
/// its result.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

struct Inner {
    client: DeviceClient,
    credentials: Credentials,
    device_id: String,
    snapshot: watch::Sender<Arc<Snapshot>>,
    interval: watch::Sender<Duration>,
    flights: Mutex<FlightSlot>,
    event_callbacks: Vec<EventCallback>,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn builder(client: DeviceClient, credentials: Credentials, device_id: impl Into<String>) -> CoordinatorBuilder {
        CoordinatorBuilder::new(client, credentials, device_id)
    }

    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    pub fn interval(&self) -> Duration {
        *self.inner.interval.borrow()
    }

    /// Latest published snapshot. Never performs I/O.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshot.subscribe()
    }

    pub fn view(&self) -> PanelView {
        PanelView::from_snapshot(self.device_id(), &self.current_snapshot())
    }

    /// Fetch the status now, or join the fetch already running.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>> {
        self.ensure_running()?;
        self.inner.refresh_newer_than(None).await
    }

    /// Out-of-band refresh whose failure is recorded in the snapshot rather
    /// than returned. After shutdown this returns the last snapshot without
    /// fetching.
    pub async fn request_refresh(&self) -> Arc<Snapshot> {
        self.request_refresh_newer_than(None).await
    }

    async fn request_refresh_newer_than(&self, newer_than: Option<u64>) -> Arc<Snapshot> {
        if self.is_shut_down() {
            return self.current_snapshot();
        }
        match self.inner.refresh_newer_than(newer_than).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(device = %self.device_id(), error = %e, "requested refresh failed");
                self.current_snapshot()
            }
        }
    }

    // -- Command methods --

    /// Send a command, then force a refresh. The snapshot only changes once
    /// that refresh reports the new level. A fetch already running when the
    /// command returns predates it, so the refresh waits it out and fetches
    /// again.
    pub async fn send_command(&self, command: Command) -> Result<Value> {
        self.ensure_running()?;
        let result = self
            .inner
            .client
            .send_command(&self.inner.credentials, &self.inner.device_id, command)
            .await;
        if let Err(e) = &result {
            warn!(device = %self.device_id(), command = command.as_str(), error = %e, "command failed");
        }
        let issued = self.inner.started_flights();
        self.request_refresh_newer_than(Some(issued)).await;
        result
    }

    pub async fn disarm(&self) -> Result<Value> {
        self.send_command(Command::Disarm).await
    }

    pub async fn arm_away(&self) -> Result<Value> {
        self.send_command(Command::ArmAway).await
    }

    pub async fn arm_home(&self) -> Result<Value> {
        self.send_command(Command::ArmHome).await
    }

    /// Pass a write code straight through. Only 1, 2 and 3 are accepted.
    pub async fn set_raw_state(&self, code: i64) -> Result<Value> {
        let command = Command::try_from(code)?;
        self.send_command(command).await
    }

    // -- Lifecycle --

    /// Apply a new poll interval and refresh immediately.
    pub async fn update_interval(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(Error::Config("poll interval must be non-zero".into()));
        }
        self.ensure_running()?;
        self.inner.interval.send_replace(interval);
        info!(device = %self.device_id(), interval = ?interval, "poll interval updated");
        self.request_refresh().await;
        Ok(())
    }

    /// Stop polling. A request already on the wire is left to finish.
    pub fn shutdown(&self) {
        if !self.inner.cancel.is_cancelled() {
            info!(device = %self.device_id(), "coordinator shutting down");
            self.inner.cancel.cancel();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.inner.cancel.is_cancelled() {
            return Err(Error::Shutdown);
        }
        Ok(())
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("device_id", &self.inner.device_id)
            .field("interval", &self.interval())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl Inner {
    fn lock_flights(&self) -> MutexGuard<'_, FlightSlot> {
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn started_flights(&self) -> u64 {
        self.lock_flights().started
    }

    /// Join the running flight, or start one. With `newer_than`, a flight of
    /// that generation or older is awaited and then superseded by a new one.
    async fn refresh_newer_than(self: &Arc<Self>, newer_than: Option<u64>) -> Result<Arc<Snapshot>> {
        loop {
            let pending = {
                let mut slot = self.lock_flights();
                let running = slot
                    .current
                    .as_ref()
                    .filter(|(_, flight)| flight.peek().is_none())
                    .map(|(generation, flight)| (*generation, flight.clone()));
                match running {
                    Some((generation, flight)) if newer_than.is_none_or(|n| generation > n) => {
                        trace!(device = %self.device_id, generation, "joining in-flight refresh");
                        Pending::Join(flight)
                    }
                    Some((generation, flight)) => {
                        trace!(device = %self.device_id, generation, "waiting out stale refresh");
                        Pending::Wait(flight)
                    }
                    None => Pending::Join(self.start_flight(&mut slot)),
                }
            };
            match pending {
                Pending::Join(flight) => return flight.await,
                Pending::Wait(flight) => {
                    let _ = flight.await;
                }
            }
        }
    }

    fn start_flight(self: &Arc<Self>, slot: &mut FlightSlot) -> InFlight {
        slot.started += 1;
        let generation = slot.started;

        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let outcome = AssertUnwindSafe(inner.fetch_and_publish())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(Error::RefreshAborted(panic_message(&*panic))));
            inner.finish_flight(generation);
            outcome
        });
        let flight = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(Error::RefreshAborted(e.to_string())))
        }
        .boxed()
        .shared();
        slot.current = Some((generation, flight.clone()));
        flight
    }

    fn finish_flight(&self, generation: u64) {
        let mut slot = self.lock_flights();
        if slot.current.as_ref().is_some_and(|(g, _)| *g == generation) {
            slot.current = None;
        }
    }

    async fn fetch_and_publish(&self) -> Result<Arc<Snapshot>> {
        let result = self
            .client
            .get_status(&self.credentials, &self.device_id)
            .await;
        let previous = self.snapshot.borrow().clone();

        match result {
            Ok(status) => {
                let snapshot = Arc::new(Snapshot {
                    status: Some(status),
                    last_update: Some(Utc::now()),
                    last_error: None,
                });
                self.snapshot.send_replace(Arc::clone(&snapshot));
                debug!(device = %self.device_id, state = %snapshot.state(), "refresh succeeded");
                self.emit_changes(&previous, &snapshot);
                Ok(snapshot)
            }
            Err(error) => {
                // Keep the last good status; only the error is new.
                let snapshot = Arc::new(Snapshot {
                    status: previous.status.clone(),
                    last_update: previous.last_update,
                    last_error: Some(error.clone()),
                });
                self.snapshot.send_replace(snapshot);
                debug!(device = %self.device_id, error = %error, "refresh failed");
                self.emit(&Event::RefreshFailed {
                    error: error.clone(),
                });
                Err(error)
            }
        }
    }

    fn emit_changes(&self, previous: &Snapshot, current: &Snapshot) {
        if self.event_callbacks.is_empty() {
            return;
        }

        if previous.last_error.is_some() {
            self.emit(&Event::Recovered);
        }

        if previous.state() != current.state() {
            self.emit(&Event::StateChanged {
                previous: previous.state(),
                current: current.state(),
            });
        }

        if let (Some(prev), Some(curr)) = (&previous.status, &current.status) {
            let mut changes = Vec::new();
            diff_json(prev.as_value(), curr.as_value(), "", &mut changes);
            for (path, previous, current) in changes {
                self.emit(&Event::FieldChanged {
                    path,
                    previous,
                    current,
                });
            }
        }
    }

    fn emit(&self, event: &Event) {
        for cb in &self.event_callbacks {
            cb(event);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "refresh panicked".to_string())
}

async fn poll_task(inner: Weak<Inner>, mut interval_rx: watch::Receiver<Duration>, cancel: CancellationToken) {
    loop {
        let period = *interval_rx.borrow_and_update();
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            () = tokio::time::sleep(period) => {
                let Some(inner) = inner.upgrade() else { break };
                let coordinator = Coordinator { inner };
                if let Err(e) = coordinator.refresh().await {
                    warn!(device = %coordinator.device_id(), error = %e, "scheduled refresh failed");
                }
            }
        }
    }
    debug!("poll loop stopped");
}
