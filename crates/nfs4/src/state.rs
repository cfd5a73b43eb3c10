//! Client and open state shared by all requests.
//!
//! The [`StateHandler`] is the process-wide registry of clients. Each
//! [`Client`] owns its lease and the open states issued to it.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use log::{debug, info};
use tokio::sync::{Mutex, RwLock};

use crate::{
    config::ServerConfig,
    nfs_err,
    proto::{NFS4_OTHER_SIZE, StateId, Verifier},
    utils::Result,
};

/// State created by a successful OPEN
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpenState {
    stateid: StateId,
    sequence: u32,
    owner_seqid: u32,
}

impl OpenState {
    /// The state-id handed to the client
    pub fn stateid(&self) -> StateId {
        self.stateid
    }

    /// Per-client issue order of this state
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Open-owner sequence id of the OPEN that created this state
    pub fn owner_seqid(&self) -> u32 {
        self.owner_seqid
    }
}

#[derive(Debug, Default)]
struct ClientStates {
    last_sequence: u32,
    opens: BTreeMap<u32, OpenState>,
}

/// A client known to the server
#[derive(Debug)]
pub struct Client {
    id: u64,
    owner: Vec<u8>,
    verifier: Verifier,
    confirmed: AtomicBool,
    needs_reclaim: AtomicBool,
    lease: Mutex<Instant>,
    states: Mutex<ClientStates>,
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{:016x} ({})",
            self.id,
            String::from_utf8_lossy(&self.owner)
        )
    }
}

impl Client {
    /// A new, unconfirmed client.
    ///
    /// `needs_reclaim` marks a client that held state before the server restarted.
    pub fn new(id: u64, owner: impl Into<Vec<u8>>, verifier: Verifier, needs_reclaim: bool) -> Client {
        Client {
            id,
            owner: owner.into(),
            verifier,
            confirmed: AtomicBool::new(false),
            needs_reclaim: AtomicBool::new(needs_reclaim),
            lease: Mutex::new(Instant::now()),
            states: Mutex::new(ClientStates::default()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn owner(&self) -> &[u8] {
        &self.owner
    }

    pub fn verifier(&self) -> Verifier {
        self.verifier
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed.load(Ordering::Acquire)
    }

    pub fn confirm(&self) {
        self.confirmed.store(true, Ordering::Release);
    }

    /// The client held state before the restart and has not finished reclaiming it
    pub fn needs_reclaim(&self) -> bool {
        self.needs_reclaim.load(Ordering::Acquire)
    }

    /// The client is done reclaiming, RECLAIM_COMPLETE
    pub fn reclaim_complete(&self) {
        self.needs_reclaim.store(false, Ordering::Release);
    }

    /// Renew the lease
    pub async fn update_lease_time(&self) {
        *self.lease.lock().await = Instant::now();
    }

    pub async fn lease_expired(&self, lease_time: Duration) -> bool {
        self.lease.lock().await.elapsed() >= lease_time
    }

    /// Allocate a new open state.
    ///
    /// Sequence values of one client are strictly increasing in issue order.
    /// Fails once the sequence space of the client is used up.
    pub async fn create_state(&self, owner_seqid: u32) -> Result<OpenState> {
        let mut states = self.states.lock().await;
        let sequence = states
            .last_sequence
            .checked_add(1)
            .ok_or_else(|| nfs_err!(Nfs4errServerfault, "client {} out of open states", self))?;
        states.last_sequence = sequence;

        let mut other = [0u8; NFS4_OTHER_SIZE];
        other[..8].copy_from_slice(&self.id.to_be_bytes());
        other[8..].copy_from_slice(&sequence.to_be_bytes());

        let state = OpenState {
            stateid: StateId { seqid: 1, other },
            sequence,
            owner_seqid,
        };
        states.opens.insert(sequence, state);
        Ok(state)
    }

    /// Find a state issued to this client
    pub async fn state(&self, stateid: &StateId) -> Option<OpenState> {
        if stateid.other[..8] != self.id.to_be_bytes() {
            return None;
        }
        let mut sequence = [0u8; 4];
        sequence.copy_from_slice(&stateid.other[8..]);

        let states = self.states.lock().await;
        states.opens.get(&u32::from_be_bytes(sequence)).copied()
    }

    /// All open states of this client, in issue order
    pub async fn states(&self) -> Vec<OpenState> {
        self.states.lock().await.opens.values().copied().collect()
    }
}

/// Process-wide client registry and grace period
#[derive(Debug)]
pub struct StateHandler {
    clients: RwLock<HashMap<u64, Arc<Client>>>,
    epoch: u32,
    client_seq: AtomicU32,
    lease_time: Duration,
    grace_ends: Instant,
    grace_over: AtomicBool,
}

impl StateHandler {
    pub fn new(config: &ServerConfig) -> StateHandler {
        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        info!(
            "state handler started, lease: {:?}, grace period: {:?}",
            config.lease_time, config.grace_period
        );

        StateHandler {
            clients: RwLock::new(HashMap::new()),
            epoch,
            client_seq: AtomicU32::new(0),
            lease_time: config.lease_time,
            grace_ends: Instant::now() + config.grace_period,
            grace_over: AtomicBool::new(false),
        }
    }

    pub fn lease_time(&self) -> Duration {
        self.lease_time
    }

    /// Whether the grace period is over, read fresh on every call
    pub fn has_grace_period_expired(&self) -> bool {
        self.grace_over.load(Ordering::Acquire) || Instant::now() >= self.grace_ends
    }

    /// Administratively end the grace period
    pub fn end_grace_period(&self) {
        if !self.grace_over.swap(true, Ordering::AcqRel) {
            info!("grace period ended");
        }
    }

    /// Register a new client with a server generated id
    pub async fn create_client(
        &self,
        owner: impl Into<Vec<u8>>,
        verifier: Verifier,
        needs_reclaim: bool,
    ) -> Arc<Client> {
        let seq = self.client_seq.fetch_add(1, Ordering::SeqCst).wrapping_add(1);
        let id = ((self.epoch as u64) << 32) | seq as u64;
        self.add_client(Client::new(id, owner, verifier, needs_reclaim))
            .await
    }

    /// Register `client`, replacing any client with the same id
    pub async fn add_client(&self, client: Client) -> Arc<Client> {
        let client = Arc::new(client);
        debug!("new client: {}", client);
        self.clients
            .write()
            .await
            .insert(client.id(), client.clone());
        client
    }

    pub async fn client_by_id(&self, id: u64) -> Option<Arc<Client>> {
        self.clients.read().await.get(&id).cloned()
    }

    pub async fn remove_client(&self, id: u64) -> Option<Arc<Client>> {
        self.clients.write().await.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;

    fn handler(grace: Duration) -> StateHandler {
        StateHandler::new(&ServerConfig::default().with_grace_period(grace))
    }

    #[tokio::test]
    async fn states_are_strictly_increasing() {
        let client = Client::new(42, "owner", Verifier::default(), false);

        let mut last = 0;
        for seqid in 0..16 {
            let state = client.create_state(seqid).await.unwrap();
            assert!(state.sequence() > last);
            assert_eq!(state.owner_seqid(), seqid);
            assert_eq!(client.state(&state.stateid()).await, Some(state));
            last = state.sequence();
        }
        assert_eq!(client.states().await.len(), 16);
    }

    #[tokio::test]
    async fn concurrent_states_are_unique() {
        let client = Arc::new(Client::new(7, "owner", Verifier::default(), false));

        let states = join_all((0..64).map(|seqid| {
            let client = client.clone();
            async move { client.create_state(seqid).await.unwrap() }
        }))
        .await;

        let mut sequences: Vec<_> = states.iter().map(|s| s.sequence()).collect();
        sequences.sort_unstable();
        sequences.dedup();
        assert_eq!(sequences.len(), 64);
    }

    #[tokio::test]
    async fn stateid_is_client_scoped() {
        let a = Client::new(1, "a", Verifier::default(), false);
        let b = Client::new(2, "b", Verifier::default(), false);

        let state = a.create_state(0).await.unwrap();
        assert_eq!(b.state(&state.stateid()).await, None);
        assert_ne!(state.stateid(), b.create_state(0).await.unwrap().stateid());
    }

    #[tokio::test]
    async fn grace_period() {
        let state = handler(Duration::from_secs(3600));
        assert!(!state.has_grace_period_expired());
        state.end_grace_period();
        assert!(state.has_grace_period_expired());

        assert!(handler(Duration::ZERO).has_grace_period_expired());
    }

    #[tokio::test]
    async fn client_registry() {
        let state = handler(Duration::ZERO);
        let client = state
            .create_client("linux", Verifier([1; 8]), false)
            .await;
        assert!(!client.is_confirmed());
        client.confirm();

        let found = state.client_by_id(client.id()).await.unwrap();
        assert!(found.is_confirmed());

        let other = state.create_client("bsd", Verifier([2; 8]), true).await;
        assert_ne!(other.id(), client.id());
        assert!(other.needs_reclaim());
        other.reclaim_complete();
        assert!(!other.needs_reclaim());

        assert!(state.remove_client(client.id()).await.is_some());
        assert!(state.client_by_id(client.id()).await.is_none());
    }

    #[tokio::test]
    async fn sequence_space_exhausted() {
        let client = Client::new(5, "c", Verifier::default(), false);
        client.states.lock().await.last_sequence = u32::MAX - 1;

        let last = client.create_state(0).await.unwrap();
        assert_eq!(last.sequence(), u32::MAX);

        let err = client.create_state(1).await.unwrap_err();
        assert_eq!(err.status(), crate::proto::NfsStat4::Nfs4errServerfault);
        assert_eq!(client.states().await, vec![last]);
    }

    #[tokio::test]
    async fn lease() {
        let client = Client::new(3, "c", Verifier::default(), false);
        client.update_lease_time().await;
        assert!(!client.lease_expired(Duration::from_secs(90)).await);
        assert!(client.lease_expired(Duration::ZERO).await);
    }
}
