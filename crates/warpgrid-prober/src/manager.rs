//! Probing manager: per-target sessions with background endpoint loops.
//!
//! Each `probe` call resolves the target's endpoints and either reuses
//! the session already covering them or replaces it. A session runs one
//! task per endpoint plus one aggregator task; endpoint loops report
//! over a channel and the aggregator publishes snapshots through a
//! `watch` channel. When the aggregate reaches the expected status the
//! session settles and the enqueue callback fires once.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use http::Uri;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::backoff::Backoff;
use crate::client::{BoxFuture, HyperClient};
use crate::config::ProberConfig;
use crate::error::ProberResult;
use crate::lister::IpsLister;
use crate::prober::{http_prober, Prober};
use crate::status::{aggregate, Status};
use crate::types::{check_scheme, Addressable, ResourceKey};

/// Callback invoked with a resource key when its probing session settles.
///
/// Runs on a background task and must not block.
pub type EnqueueFunc = Arc<dyn Fn(ResourceKey) + Send + Sync>;

/// Lifecycle phase of a probing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Endpoint loops are running.
    Probing,
    /// The aggregate reached the expected status.
    Settled(Status),
    /// Superseded, deleted, or the caller's context was canceled.
    Canceled,
}

/// Last observation for one endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointState {
    pub status: Status,
    /// Probe results received so far.
    pub attempts: u32,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub aggregate: Status,
    pub endpoints: BTreeMap<String, EndpointState>,
    pub settled_at: Option<Instant>,
}

struct Session {
    key: ResourceKey,
    address: Uri,
    endpoints: BTreeSet<String>,
    expected: Status,
    created_at: Instant,
    /// Canceled on supersession, deletion, or by the caller's context.
    cancel: CancellationToken,
    /// Child of `cancel`; also canceled when the session settles.
    loops: CancellationToken,
    state: watch::Sender<SessionSnapshot>,
}

impl Session {
    fn serves(&self, addressable: &Addressable, endpoints: &BTreeSet<String>, expected: Status) -> bool {
        self.address == addressable.address && &self.endpoints == endpoints && self.expected == expected
    }

    fn is_stale(&self, settled_ttl: Option<Duration>) -> bool {
        let snapshot = self.state.borrow();
        match snapshot.phase {
            SessionPhase::Probing => self.cancel.is_cancelled(),
            SessionPhase::Settled(_) => match (settled_ttl, snapshot.settled_at) {
                (Some(ttl), Some(at)) => at.elapsed() >= ttl,
                _ => false,
            },
            SessionPhase::Canceled => true,
        }
    }

    fn current_status(&self) -> Status {
        let snapshot = self.state.borrow();
        match snapshot.phase {
            SessionPhase::Settled(status) => status,
            _ => snapshot.aggregate,
        }
    }

    /// Move a probing session to `Canceled`. Returns false if it already
    /// settled or was canceled.
    fn mark_canceled(&self) -> bool {
        self.state.send_if_modified(|snapshot| {
            if snapshot.phase != SessionPhase::Probing {
                return false;
            }
            snapshot.phase = SessionPhase::Canceled;
            true
        })
    }

    fn cancel(&self) {
        self.mark_canceled();
        self.cancel.cancel();
    }
}

/// Owns probing sessions for all resource keys.
///
/// Must be driven from within a Tokio runtime; sessions run on spawned
/// tasks. Dropping the manager cancels every session.
pub struct Manager {
    prober: Arc<dyn Prober>,
    lister: Arc<dyn IpsLister>,
    enqueue: EnqueueFunc,
    config: ProberConfig,
    sessions: Mutex<HashMap<ResourceKey, Arc<Session>>>,
}

impl Manager {
    /// Create a manager that checks endpoints with `prober`.
    ///
    /// Fails if `config` does not validate.
    pub fn new(
        prober: Arc<dyn Prober>,
        lister: Arc<dyn IpsLister>,
        enqueue: EnqueueFunc,
        config: ProberConfig,
    ) -> ProberResult<Self> {
        config.validate()?;
        Ok(Self {
            prober,
            lister,
            enqueue,
            config,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    /// Create a manager that checks endpoints over HTTP with hyper.
    pub fn with_http(
        lister: Arc<dyn IpsLister>,
        enqueue: EnqueueFunc,
        config: ProberConfig,
    ) -> ProberResult<Self> {
        let client = Arc::new(HyperClient::new(config.request_timeout()));
        Self::new(Arc::new(http_prober(client)), lister, enqueue, config)
    }

    /// Cancel the session for `key`, e.g. because the resource was deleted.
    ///
    /// No enqueue follows for a canceled session.
    pub fn cancel(&self, key: &ResourceKey) -> bool {
        let mut sessions = self.sessions.lock().expect("sessions lock");
        match sessions.remove(key) {
            Some(session) => {
                session.cancel();
                info!(%key, "probing session canceled");
                true
            }
            None => false,
        }
    }

    /// Cancel every session (for graceful shutdown).
    pub fn cancel_all(&self) {
        let mut sessions = self.sessions.lock().expect("sessions lock");
        for (key, session) in sessions.drain() {
            session.cancel();
            debug!(%key, "probing session canceled");
        }
        info!("all probing sessions canceled");
    }

    /// Current status of the session for `key`, if one is tracked.
    pub fn status(&self, key: &ResourceKey) -> Option<Status> {
        let sessions = self.sessions.lock().expect("sessions lock");
        sessions.get(key).map(|s| s.current_status())
    }

    pub fn snapshot(&self, key: &ResourceKey) -> Option<SessionSnapshot> {
        let sessions = self.sessions.lock().expect("sessions lock");
        sessions.get(key).map(|s| s.state.borrow().clone())
    }

    /// Watch snapshots of the session currently tracked for `key`.
    ///
    /// The receiver stays bound to that session even if it is superseded.
    pub fn subscribe(&self, key: &ResourceKey) -> Option<watch::Receiver<SessionSnapshot>> {
        let sessions = self.sessions.lock().expect("sessions lock");
        sessions.get(key).map(|s| s.state.subscribe())
    }

    /// Keys with a tracked session, in any phase.
    pub fn sessions(&self) -> Vec<ResourceKey> {
        let sessions = self.sessions.lock().expect("sessions lock");
        sessions.keys().cloned().collect()
    }

    /// Whether `key` has a session with endpoint loops still running.
    pub fn is_probing(&self, key: &ResourceKey) -> bool {
        let sessions = self.sessions.lock().expect("sessions lock");
        sessions
            .get(key)
            .is_some_and(|s| s.state.borrow().phase == SessionPhase::Probing)
    }

    fn evaluate(&self, ctx: &CancellationToken, addressable: &Addressable, expected: Status) -> Status {
        let key = &addressable.resource_key;
        if ctx.is_cancelled() {
            return Status::Unknown;
        }
        if let Err(e) = check_scheme(&addressable.address) {
            error!(%key, error = %e, "cannot probe address");
            return Status::Unknown;
        }

        let endpoints: BTreeSet<String> = match self.lister.list(addressable) {
            Ok(list) => list.into_iter().collect(),
            Err(e) => {
                warn!(%key, error = %e, "failed to list endpoints");
                return Status::Unknown;
            }
        };
        if endpoints.is_empty() {
            debug!(%key, "no endpoints to probe");
            return Status::Unknown;
        }

        let mut sessions = self.sessions.lock().expect("sessions lock");
        if let Some(existing) = sessions.get(key) {
            if existing.serves(addressable, &endpoints, expected)
                && !existing.is_stale(self.config.settled_ttl())
            {
                return existing.current_status();
            }
        }

        if let Some(old) = sessions.remove(key) {
            old.cancel();
            debug!(%key, "superseded probing session");
        }

        let session = self.start_session(ctx, addressable, endpoints, expected);
        let status = session.current_status();
        sessions.insert(key.clone(), session);
        status
    }

    fn start_session(
        &self,
        ctx: &CancellationToken,
        addressable: &Addressable,
        endpoints: BTreeSet<String>,
        expected: Status,
    ) -> Arc<Session> {
        let key = addressable.resource_key.clone();
        let cancel = ctx.child_token();
        let loops = cancel.child_token();
        let table = endpoints
            .iter()
            .map(|ep| (ep.clone(), EndpointState::default()))
            .collect();
        let (state, _) = watch::channel(SessionSnapshot {
            phase: SessionPhase::Probing,
            aggregate: Status::Unknown,
            endpoints: table,
            settled_at: None,
        });

        let session = Arc::new(Session {
            key: key.clone(),
            address: addressable.address.clone(),
            endpoints,
            expected,
            created_at: Instant::now(),
            cancel,
            loops,
            state,
        });

        let (tx, rx) = mpsc::unbounded_channel();
        for endpoint in &session.endpoints {
            let endpoint_loop = EndpointLoop {
                prober: self.prober.clone(),
                cancel: session.loops.clone(),
                target: addressable.for_endpoint(endpoint),
                endpoint: endpoint.clone(),
                expected,
                backoff: Backoff::from_config(&self.config),
                updates: tx.clone(),
            };
            let span = tracing::debug_span!("endpoint_probe", %key, %endpoint);
            tokio::spawn(endpoint_loop.run().instrument(span));
        }
        drop(tx);

        let span = tracing::info_span!("probing_session", %key);
        tokio::spawn(run_aggregator(session.clone(), rx, self.enqueue.clone()).instrument(span));

        info!(%key, endpoints = session.endpoints.len(), %expected, "probing session started");
        session
    }
}

impl Prober for Manager {
    /// Report the best known status for `addressable` without waiting on
    /// the network, starting or replacing its session as needed.
    fn probe<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        addressable: &'a Addressable,
        expected: Status,
    ) -> BoxFuture<'a, Status> {
        Box::pin(async move { self.evaluate(ctx, addressable, expected) })
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        let sessions = match self.sessions.get_mut() {
            Ok(sessions) => sessions,
            Err(poisoned) => poisoned.into_inner(),
        };
        for (_, session) in sessions.drain() {
            session.cancel();
        }
    }
}

struct EndpointUpdate {
    endpoint: String,
    status: Status,
}

/// Probe loop for one endpoint of one session.
struct EndpointLoop {
    prober: Arc<dyn Prober>,
    cancel: CancellationToken,
    target: ProberResult<Addressable>,
    endpoint: String,
    expected: Status,
    backoff: Backoff,
    updates: mpsc::UnboundedSender<EndpointUpdate>,
}

impl EndpointLoop {
    async fn run(mut self) {
        loop {
            let status = match &self.target {
                Ok(target) => tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return,
                    status = self.prober.probe(&self.cancel, target, self.expected) => status,
                },
                Err(e) => {
                    error!(error = %e, "cannot address endpoint");
                    Status::Unknown
                }
            };

            if self.cancel.is_cancelled() {
                return;
            }

            let update = EndpointUpdate {
                endpoint: self.endpoint.clone(),
                status,
            };
            if self.updates.send(update).is_err() {
                return;
            }

            if status == self.expected {
                debug!(%status, "endpoint reached expected status");
                return;
            }

            let delay = self.backoff.next_delay();
            debug!(%status, ?delay, attempt = self.backoff.attempts(), "retrying endpoint probe");
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Fold endpoint results into the session snapshot until it settles or
/// is canceled.
async fn run_aggregator(
    session: Arc<Session>,
    mut updates: mpsc::UnboundedReceiver<EndpointUpdate>,
    enqueue: EnqueueFunc,
) {
    let mut table = session.state.borrow().endpoints.clone();

    loop {
        let update = tokio::select! {
            biased;
            _ = session.cancel.cancelled() => {
                if session.mark_canceled() {
                    debug!("probing session canceled");
                }
                return;
            }
            update = updates.recv() => match update {
                Some(update) => update,
                None => return,
            },
        };

        let entry = table.entry(update.endpoint).or_default();
        entry.status = update.status;
        entry.attempts += 1;

        let current = aggregate(table.values().map(|e| e.status));
        let settles = current == session.expected;

        // Settling and cancellation both go through the watch lock, so a
        // session canceled first can never enqueue.
        let published = session.state.send_if_modified(|snapshot| {
            if snapshot.phase != SessionPhase::Probing {
                return false;
            }
            snapshot.endpoints = table.clone();
            snapshot.aggregate = current;
            if settles {
                snapshot.phase = SessionPhase::Settled(current);
                snapshot.settled_at = Some(Instant::now());
            }
            true
        });
        if !published {
            return;
        }

        if settles {
            session.loops.cancel();
            info!(
                status = %current,
                elapsed = ?session.created_at.elapsed(),
                "probing session settled"
            );
            enqueue(session.key.clone());
            return;
        }
    }
}
