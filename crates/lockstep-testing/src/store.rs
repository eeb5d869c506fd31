//! In-memory coordination store with lease-anchored mutexes and elections.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use async_trait::async_trait;
use lockstep_core::CoordinationStore;
use lockstep_core::GrantedLease;
use lockstep_core::LeaderObserver;
use lockstep_core::LeaderUpdate;
use lockstep_core::LeaseId;
use lockstep_core::StoreError;
use lockstep_core::DEFAULT_SESSION_TTL_SECONDS;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How often the sweeper checks for expired leases.
const SWEEP_INTERVAL: Duration = Duration::from_millis(25);

struct Lease {
    deadline: Instant,
    ttl: Duration,
}

struct MutexWaiter {
    lease: LeaseId,
    grant: oneshot::Sender<Result<(), StoreError>>,
}

#[derive(Default)]
struct MutexState {
    holder: Option<LeaseId>,
    waiters: VecDeque<MutexWaiter>,
}

struct Candidate {
    lease: LeaseId,
    value: String,
    grant: oneshot::Sender<Result<(), StoreError>>,
}

#[derive(Default)]
struct ElectionState {
    leader: Option<(LeaseId, String)>,
    candidates: VecDeque<Candidate>,
    observers: Vec<mpsc::UnboundedSender<LeaderUpdate>>,
}

#[derive(Default)]
struct State {
    leases: HashMap<LeaseId, Lease>,
    mutexes: HashMap<String, MutexState>,
    elections: HashMap<String, ElectionState>,
}

struct Shared {
    state: Mutex<State>,
    next_lease: AtomicU64,
    shutdown: CancellationToken,
}

/// Shared in-memory coordination store hub.
///
/// One hub plays the role of the external store cluster; each simulated
/// process connects through [`DeterministicCoordinationStore::handle`] (or a
/// [`crate::DeterministicConnector`]) and receives its own closable handle.
pub struct DeterministicCoordinationStore {
    shared: Arc<Shared>,
}

impl DeterministicCoordinationStore {
    /// Create a new hub wrapped in Arc and start its expiry sweeper.
    pub fn new() -> Arc<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            next_lease: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(sweep_expired_leases(Arc::downgrade(&shared)));
        Arc::new(Self { shared })
    }

    /// Open a new connection-scoped handle to this hub.
    pub fn handle(&self) -> Arc<StoreHandle> {
        Arc::new(StoreHandle {
            shared: self.shared.clone(),
            closed: CancellationToken::new(),
        })
    }

    /// Simulate whole-store failure: every pending and subsequent call on any
    /// handle fails with [`StoreError::ConnectionClosed`], and observers end.
    pub async fn shut_down(&self) {
        self.shared.shutdown.cancel();
        let mut state = self.shared.state.lock().await;
        drain_with_error(&mut state, StoreError::ConnectionClosed);
    }
}

/// One logical connection to a [`DeterministicCoordinationStore`] hub.
///
/// Closing a handle fails that connection's in-flight blocking calls without
/// disturbing other handles. Leases granted through a closed handle are not
/// revoked; they expire naturally, which is what a dropped network client
/// would look like to the server.
pub struct StoreHandle {
    shared: Arc<Shared>,
    closed: CancellationToken,
}

impl StoreHandle {
    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.is_cancelled() || self.shared.shutdown.is_cancelled() {
            return Err(StoreError::ConnectionClosed);
        }
        Ok(())
    }

    async fn wait_for_grant(&self, rx: oneshot::Receiver<Result<(), StoreError>>) -> Result<(), StoreError> {
        tokio::select! {
            _ = self.closed.cancelled() => Err(StoreError::ConnectionClosed),
            _ = self.shared.shutdown.cancelled() => Err(StoreError::ConnectionClosed),
            granted = rx => granted.unwrap_or(Err(StoreError::ConnectionClosed)),
        }
    }
}

enum Admission {
    Granted,
    Queued(oneshot::Receiver<Result<(), StoreError>>),
}

#[async_trait]
impl CoordinationStore for StoreHandle {
    async fn grant_lease(&self, ttl_seconds: Option<u32>) -> Result<GrantedLease, StoreError> {
        self.check_open()?;
        if ttl_seconds == Some(0) {
            return Err(StoreError::InvalidTtl { ttl_seconds: 0 });
        }
        let ttl_seconds = ttl_seconds.unwrap_or(DEFAULT_SESSION_TTL_SECONDS);
        let ttl = Duration::from_secs(u64::from(ttl_seconds));
        let id = LeaseId(self.shared.next_lease.fetch_add(1, Ordering::Relaxed));

        let mut state = self.shared.state.lock().await;
        state.leases.insert(id, Lease {
            deadline: Instant::now() + ttl,
            ttl,
        });
        debug!(lease = %id, ttl_seconds, "lease granted");
        Ok(GrantedLease { id, ttl_seconds })
    }

    async fn keepalive(&self, lease: LeaseId) -> Result<u32, StoreError> {
        self.check_open()?;
        let mut state = self.shared.state.lock().await;
        match state.leases.get_mut(&lease) {
            Some(entry) => {
                entry.deadline = Instant::now() + entry.ttl;
                Ok(entry.ttl.as_secs() as u32)
            }
            None => Err(StoreError::LeaseNotFound { lease }),
        }
    }

    async fn revoke_lease(&self, lease: LeaseId) -> Result<(), StoreError> {
        self.check_open()?;
        let mut state = self.shared.state.lock().await;
        if state.leases.remove(&lease).is_none() {
            return Err(StoreError::LeaseNotFound { lease });
        }
        release_lease_resources(&mut state, lease);
        debug!(lease = %lease, "lease revoked");
        Ok(())
    }

    async fn acquire(&self, path: &str, lease: LeaseId) -> Result<(), StoreError> {
        let admission = {
            self.check_open()?;
            let mut state = self.shared.state.lock().await;
            if !state.leases.contains_key(&lease) {
                return Err(StoreError::LeaseNotFound { lease });
            }
            let mutex = state.mutexes.entry(path.to_string()).or_default();
            match mutex.holder {
                None => {
                    mutex.holder = Some(lease);
                    Admission::Granted
                }
                Some(holder) if holder == lease => Admission::Granted,
                Some(_) => {
                    let (tx, rx) = oneshot::channel();
                    mutex.waiters.push_back(MutexWaiter { lease, grant: tx });
                    Admission::Queued(rx)
                }
            }
        };

        match admission {
            Admission::Granted => Ok(()),
            Admission::Queued(rx) => self.wait_for_grant(rx).await,
        }
    }

    async fn release(&self, path: &str, lease: LeaseId) -> Result<(), StoreError> {
        self.check_open()?;
        let mut state = self.shared.state.lock().await;
        let State { leases, mutexes, .. } = &mut *state;
        match mutexes.get_mut(path) {
            Some(mutex) if mutex.holder == Some(lease) => {
                promote_next_waiter(mutex, leases);
                Ok(())
            }
            _ => Err(StoreError::NotHeld {
                path: path.to_string(),
                lease,
            }),
        }
    }

    async fn campaign(&self, path: &str, lease: LeaseId, value: &str) -> Result<(), StoreError> {
        let admission = {
            self.check_open()?;
            let mut state = self.shared.state.lock().await;
            if !state.leases.contains_key(&lease) {
                return Err(StoreError::LeaseNotFound { lease });
            }
            let election = state.elections.entry(path.to_string()).or_default();
            match &election.leader {
                None => {
                    election.leader = Some((lease, value.to_string()));
                    publish(election, value);
                    Admission::Granted
                }
                Some((leader_lease, leader_value)) if *leader_lease == lease && leader_value.as_str() == value => {
                    Admission::Granted
                }
                Some(_) => {
                    let (tx, rx) = oneshot::channel();
                    election.candidates.push_back(Candidate {
                        lease,
                        value: value.to_string(),
                        grant: tx,
                    });
                    Admission::Queued(rx)
                }
            }
        };

        match admission {
            Admission::Granted => Ok(()),
            Admission::Queued(rx) => self.wait_for_grant(rx).await,
        }
    }

    async fn resign(&self, path: &str, lease: LeaseId, value: &str) -> Result<(), StoreError> {
        self.check_open()?;
        let mut state = self.shared.state.lock().await;
        let State { leases, elections, .. } = &mut *state;
        if let Some(election) = elections.get_mut(path) {
            if matches!(&election.leader, Some((l, v)) if *l == lease && v.as_str() == value) {
                promote_next_candidate(election, leases);
            }
        }
        Ok(())
    }

    async fn observe(&self, path: &str) -> Result<LeaderObserver, StoreError> {
        self.check_open()?;
        let mut state = self.shared.state.lock().await;
        let election = state.elections.entry(path.to_string()).or_default();
        let (tx, rx) = mpsc::unbounded_channel();
        if let Some((_, value)) = &election.leader {
            // New observers see the current value first.
            let _ = tx.send(LeaderUpdate { value: value.clone() });
        }
        election.observers.push(tx);
        Ok(rx)
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

/// Hand the mutex to the first queued waiter whose lease is still live and
/// whose acquire call is still pending.
fn promote_next_waiter(mutex: &mut MutexState, leases: &HashMap<LeaseId, Lease>) {
    mutex.holder = None;
    while let Some(waiter) = mutex.waiters.pop_front() {
        if !leases.contains_key(&waiter.lease) {
            let _ = waiter.grant.send(Err(StoreError::LeaseExpired { lease: waiter.lease }));
            continue;
        }
        // A failed send means the waiter cancelled; skip it.
        let lease = waiter.lease;
        if waiter.grant.send(Ok(())).is_ok() {
            mutex.holder = Some(lease);
            return;
        }
    }
}

/// Vacate the leadership and hand it to the next live candidate, publishing
/// the new value to observers.
fn promote_next_candidate(election: &mut ElectionState, leases: &HashMap<LeaseId, Lease>) {
    election.leader = None;
    while let Some(candidate) = election.candidates.pop_front() {
        if !leases.contains_key(&candidate.lease) {
            let _ = candidate.grant.send(Err(StoreError::LeaseExpired { lease: candidate.lease }));
            continue;
        }
        let lease = candidate.lease;
        let value = candidate.value.clone();
        if candidate.grant.send(Ok(())).is_ok() {
            election.leader = Some((lease, value.clone()));
            publish(election, &value);
            return;
        }
    }
}

/// Deliver a newly published value, dropping observers that went away.
fn publish(election: &mut ElectionState, value: &str) {
    election.observers.retain(|observer| {
        observer
            .send(LeaderUpdate {
                value: value.to_string(),
            })
            .is_ok()
    });
}

/// Release everything anchored to a lease that expired or was revoked.
fn release_lease_resources(state: &mut State, lease: LeaseId) {
    let State {
        leases,
        mutexes,
        elections,
    } = state;

    for mutex in mutexes.values_mut() {
        let mut kept = VecDeque::with_capacity(mutex.waiters.len());
        for waiter in mutex.waiters.drain(..) {
            if waiter.lease == lease {
                let _ = waiter.grant.send(Err(StoreError::LeaseExpired { lease }));
            } else {
                kept.push_back(waiter);
            }
        }
        mutex.waiters = kept;
        if mutex.holder == Some(lease) {
            promote_next_waiter(mutex, leases);
        }
    }

    for election in elections.values_mut() {
        let mut kept = VecDeque::with_capacity(election.candidates.len());
        for candidate in election.candidates.drain(..) {
            if candidate.lease == lease {
                let _ = candidate.grant.send(Err(StoreError::LeaseExpired { lease }));
            } else {
                kept.push_back(candidate);
            }
        }
        election.candidates = kept;
        if matches!(&election.leader, Some((leader_lease, _)) if *leader_lease == lease) {
            promote_next_candidate(election, leases);
        }
    }
}

/// Fail every pending blocking call and end all observer streams.
fn drain_with_error(state: &mut State, error: StoreError) {
    for mutex in state.mutexes.values_mut() {
        for waiter in mutex.waiters.drain(..) {
            let _ = waiter.grant.send(Err(error.clone()));
        }
    }
    for election in state.elections.values_mut() {
        for candidate in election.candidates.drain(..) {
            let _ = candidate.grant.send(Err(error.clone()));
        }
        election.observers.clear();
    }
    state.leases.clear();
}

/// Background loop expiring overdue leases, standing in for the server-side
/// reclamation a real store performs.
async fn sweep_expired_leases(shared: Weak<Shared>) {
    let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if shared.shutdown.is_cancelled() {
            return;
        }
        let mut state = shared.state.lock().await;
        let now = Instant::now();
        let expired: Vec<LeaseId> =
            state.leases.iter().filter(|(_, lease)| lease.deadline <= now).map(|(id, _)| *id).collect();
        for id in expired {
            state.leases.remove(&id);
            release_lease_resources(&mut state, id);
            debug!(lease = %id, "lease expired");
        }
    }
}
