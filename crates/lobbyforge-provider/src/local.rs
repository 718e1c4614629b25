//! The offline provider: sessions on an in-process LAN.
//!
//! [`LocalProvider`] is what you get when no online service is configured.
//! It identifies itself as [`OFFLINE_PROVIDER_NAME`], so the orchestrator
//! creates LAN matches and issues LAN queries against it.
//!
//! Hosts advertise their sessions by putting an encoded [`LanBeacon`] on a
//! shared [`LanNetwork`]; searchers scan and decode the beacons. Several
//! providers (one per simulated machine) share one network.
//!
//! ```text
//!  host LocalProvider ──advertise──→ LanNetwork ←──scan── client LocalProvider
//!                                        ↑
//!                            join: claim a slot in the beacon
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lobbyforge_protocol::{
    Codec, DEFAULT_BUILD_ID, JoinResult, JsonCodec, LanBeacon, NetId,
    SessionDescriptor, SessionName, SessionSettings,
};
use rand::Rng;

use crate::{
    CompletionSink, ListenerHandle, ListenerRegistry, OFFLINE_PROVIDER_NAME,
    OperationKind, ProviderCompletion, ProviderError, SearchState,
    SessionProvider,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// LanNetwork
// ---------------------------------------------------------------------------

/// An in-process stand-in for a local network segment.
///
/// Cloning is cheap and every clone refers to the same network.
#[derive(Debug, Clone, Default)]
pub struct LanNetwork {
    inner: Arc<Mutex<LanState>>,
}

#[derive(Debug, Default)]
struct LanState {
    /// Host addresses currently claimed by a provider.
    bound: HashSet<String>,
    /// Advertised beacons keyed by session id.
    beacons: BTreeMap<String, AdvertisedBeacon>,
}

#[derive(Debug)]
struct AdvertisedBeacon {
    host_address: String,
    bytes: Vec<u8>,
}

impl LanNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently advertised.
    pub fn beacon_count(&self) -> usize {
        lock(&self.inner).beacons.len()
    }

    fn bind(&self, address: &str) -> Result<(), ProviderError> {
        let mut state = lock(&self.inner);
        if !state.bound.insert(address.to_string()) {
            return Err(ProviderError::AddressInUse(address.to_string()));
        }
        Ok(())
    }

    fn unbind(&self, address: &str) {
        let mut state = lock(&self.inner);
        state.bound.remove(address);
        state.beacons.retain(|_, b| b.host_address != address);
    }

    fn advertise(&self, session_id: &str, host_address: &str, bytes: Vec<u8>) {
        lock(&self.inner).beacons.insert(
            session_id.to_string(),
            AdvertisedBeacon {
                host_address: host_address.to_string(),
                bytes,
            },
        );
    }

    fn withdraw(&self, session_id: &str) -> bool {
        lock(&self.inner).beacons.remove(session_id).is_some()
    }

    /// Every beacon not sent from `own_address`.
    fn scan(&self, own_address: &str) -> Vec<Vec<u8>> {
        lock(&self.inner)
            .beacons
            .values()
            .filter(|b| b.host_address != own_address)
            .map(|b| b.bytes.clone())
            .collect()
    }

    /// Runs `f` on the encoded beacon for `session_id` while the network
    /// is locked, so slot updates from two clients cannot interleave.
    fn with_beacon<R>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Vec<u8>) -> R,
    ) -> Option<R> {
        let mut state = lock(&self.inner);
        state.beacons.get_mut(session_id).map(|b| f(&mut b.bytes))
    }
}

// ---------------------------------------------------------------------------
// LocalProviderConfig
// ---------------------------------------------------------------------------

/// Settings for one [`LocalProvider`].
#[derive(Debug, Clone)]
pub struct LocalProviderConfig {
    /// The address this machine is reachable at. Unique per network.
    pub host_address: String,

    /// Beacons carrying a different build id are invisible to searches.
    pub build_unique_id: u32,

    /// Delay before completions are delivered. Zero delivers them before
    /// the request method returns. Non-zero delays need a tokio runtime;
    /// without one the completion is delivered immediately.
    pub latency: Duration,
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self {
            host_address: "127.0.0.1:7777".to_string(),
            build_unique_id: DEFAULT_BUILD_ID,
            latency: Duration::ZERO,
        }
    }
}

// ---------------------------------------------------------------------------
// LocalProvider
// ---------------------------------------------------------------------------

/// A named session this provider is hosting or has joined.
#[derive(Debug)]
struct LocalSession {
    session_id: String,
    host_address: String,
    hosting: bool,
    started: bool,
}

#[derive(Debug, Default)]
struct LocalState {
    sessions: HashMap<SessionName, LocalSession>,
    listeners: ListenerRegistry,
}

/// Offline session provider backed by a [`LanNetwork`].
///
/// Dropping the provider releases its address and withdraws everything it
/// advertised.
#[derive(Debug)]
pub struct LocalProvider {
    config: LocalProviderConfig,
    network: LanNetwork,
    codec: JsonCodec,
    state: Arc<Mutex<LocalState>>,
}

impl LocalProvider {
    /// Attaches a provider to `network` at `config.host_address`.
    ///
    /// # Errors
    /// Returns [`ProviderError::AddressInUse`] if another provider on the
    /// network already claimed the address.
    pub fn new(
        network: LanNetwork,
        config: LocalProviderConfig,
    ) -> Result<Self, ProviderError> {
        network.bind(&config.host_address)?;
        tracing::debug!(address = %config.host_address, "local provider attached");
        Ok(Self {
            config,
            network,
            codec: JsonCodec,
            state: Arc::new(Mutex::new(LocalState::default())),
        })
    }

    pub fn host_address(&self) -> &str {
        &self.config.host_address
    }

    /// Number of live listener registrations for `kind`.
    pub fn listener_count(&self, kind: OperationKind) -> usize {
        lock(&self.state).listeners.count(kind)
    }

    /// `true` once [`start_session`](SessionProvider::start_session)
    /// succeeded for `name`.
    pub fn is_started(&self, name: &SessionName) -> bool {
        lock(&self.state)
            .sessions
            .get(name)
            .is_some_and(|s| s.started)
    }

    /// Delivers `completion` now, or after the configured latency.
    ///
    /// Must not be called with `self.state` locked.
    fn complete(&self, completion: ProviderCompletion) {
        let delay = self.config.latency;
        if delay.is_zero() {
            lock(&self.state).listeners.notify(completion);
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let state = Arc::clone(&self.state);
                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    lock(&state).listeners.notify(completion);
                });
            }
            Err(_) => {
                tracing::debug!("no tokio runtime, completing without latency");
                lock(&self.state).listeners.notify(completion);
            }
        }
    }

    fn encode_beacon(
        &self,
        requester: &NetId,
        session_id: &str,
        settings: &SessionSettings,
    ) -> Result<Vec<u8>, ProviderError> {
        let beacon = LanBeacon {
            build_unique_id: settings.build_unique_id,
            descriptor: SessionDescriptor {
                session_id: session_id.to_string(),
                owning_user: requester.clone(),
                host_address: self.config.host_address.clone(),
                settings: settings.advertised(),
                open_public_connections: settings.num_public_connections,
                ping_ms: 0,
            },
        };
        Ok(self.codec.encode(&beacon)?)
    }

    /// Takes one open slot from an encoded beacon.
    fn claim_slot(
        &self,
        bytes: &mut Vec<u8>,
    ) -> Result<Result<String, JoinResult>, ProviderError> {
        let mut beacon: LanBeacon = self.codec.decode(bytes)?;
        if beacon.descriptor.is_full() {
            return Ok(Err(JoinResult::SessionIsFull));
        }
        beacon.descriptor.open_public_connections -= 1;
        *bytes = self.codec.encode(&beacon)?;
        Ok(Ok(beacon.descriptor.host_address))
    }

    /// Gives a slot back to an encoded beacon.
    fn release_slot(&self, bytes: &mut Vec<u8>) -> Result<(), ProviderError> {
        let mut beacon: LanBeacon = self.codec.decode(bytes)?;
        let descriptor = &mut beacon.descriptor;
        if descriptor.open_public_connections
            < descriptor.settings.num_public_connections
        {
            descriptor.open_public_connections += 1;
        }
        *bytes = self.codec.encode(&beacon)?;
        Ok(())
    }

    fn scan_beacons(&self, search: &SearchState) -> Vec<SessionDescriptor> {
        let params = search.params();
        self.network
            .scan(&self.config.host_address)
            .iter()
            .filter_map(|bytes| match self.codec.decode::<LanBeacon>(bytes) {
                Ok(beacon) => Some(beacon),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable beacon");
                    None
                }
            })
            .filter(|b| b.build_unique_id == self.config.build_unique_id)
            .map(|b| b.descriptor)
            .filter(|d| !d.is_full() && params.accepts(&d.settings))
            .take(params.max_results as usize)
            .collect()
    }
}

impl Drop for LocalProvider {
    fn drop(&mut self) {
        self.network.unbind(&self.config.host_address);
    }
}

impl SessionProvider for LocalProvider {
    fn provider_name(&self) -> &str {
        OFFLINE_PROVIDER_NAME
    }

    fn session_exists(&self, name: &SessionName) -> bool {
        lock(&self.state).sessions.contains_key(name)
    }

    fn add_listener(
        &self,
        kind: OperationKind,
        sink: CompletionSink,
    ) -> ListenerHandle {
        lock(&self.state).listeners.add(kind, sink)
    }

    fn clear_listener(
        &self,
        kind: OperationKind,
        handle: ListenerHandle,
    ) -> bool {
        lock(&self.state).listeners.clear(kind, handle)
    }

    fn create_session(
        &self,
        requester: &NetId,
        name: &SessionName,
        settings: &SessionSettings,
    ) -> bool {
        if self.session_exists(name) {
            tracing::warn!(%name, "create rejected, session already exists");
            return false;
        }

        let session_id = generate_session_id();
        if settings.should_advertise {
            match self.encode_beacon(requester, &session_id, settings) {
                Ok(bytes) => self.network.advertise(
                    &session_id,
                    &self.config.host_address,
                    bytes,
                ),
                Err(e) => {
                    tracing::warn!(%name, error = %e, "create rejected, beacon encode failed");
                    return false;
                }
            }
        }

        lock(&self.state).sessions.insert(
            name.clone(),
            LocalSession {
                session_id: session_id.clone(),
                host_address: self.config.host_address.clone(),
                hosting: true,
                started: false,
            },
        );
        tracing::info!(%name, %session_id, "LAN session hosted");

        self.complete(ProviderCompletion::Create {
            name: name.clone(),
            success: true,
        });
        true
    }

    fn find_sessions(
        &self,
        requester: &NetId,
        search: Arc<SearchState>,
    ) -> bool {
        if !search.params().is_lan_query {
            tracing::warn!(%requester, "find rejected, only LAN queries are supported");
            return false;
        }

        let found = self.scan_beacons(&search);
        tracing::info!(%requester, found = found.len(), "LAN search finished");
        search.set_results(found);

        self.complete(ProviderCompletion::Find { success: true });
        true
    }

    fn join_session(
        &self,
        requester: &NetId,
        name: &SessionName,
        result: &SessionDescriptor,
    ) -> bool {
        if self.session_exists(name) {
            tracing::warn!(%name, "join rejected, session name already in use");
            return false;
        }

        let claimed = self
            .network
            .with_beacon(&result.session_id, |bytes| self.claim_slot(bytes));

        let outcome = match claimed {
            None => JoinResult::SessionDoesNotExist,
            Some(Err(e)) => {
                tracing::warn!(session_id = %result.session_id, error = %e, "join failed reading beacon");
                JoinResult::CouldNotRetrieveAddress
            }
            Some(Ok(Err(code))) => code,
            Some(Ok(Ok(host_address))) => {
                lock(&self.state).sessions.insert(
                    name.clone(),
                    LocalSession {
                        session_id: result.session_id.clone(),
                        host_address,
                        hosting: false,
                        started: false,
                    },
                );
                JoinResult::Success
            }
        };
        tracing::info!(%requester, %name, result = %outcome, "LAN join finished");

        self.complete(ProviderCompletion::Join {
            name: name.clone(),
            result: outcome,
        });
        true
    }

    fn destroy_session(&self, name: &SessionName) -> bool {
        let Some(session) = lock(&self.state).sessions.remove(name) else {
            tracing::warn!(%name, "destroy rejected, no such session");
            return false;
        };

        if session.hosting {
            self.network.withdraw(&session.session_id);
        } else if let Some(Err(e)) = self
            .network
            .with_beacon(&session.session_id, |bytes| self.release_slot(bytes))
        {
            tracing::warn!(%name, error = %e, "could not release slot");
        }
        tracing::info!(%name, hosting = session.hosting, "LAN session destroyed");

        self.complete(ProviderCompletion::Destroy {
            name: name.clone(),
            success: true,
        });
        true
    }

    fn start_session(&self, name: &SessionName) -> bool {
        let started = {
            let mut state = lock(&self.state);
            match state.sessions.get_mut(name) {
                None => None,
                Some(session) => {
                    let first = !session.started;
                    session.started = true;
                    Some(first)
                }
            }
        };

        let Some(first_start) = started else {
            tracing::warn!(%name, "start rejected, no such session");
            return false;
        };

        self.complete(ProviderCompletion::Start {
            name: name.clone(),
            success: first_start,
        });
        true
    }

    fn resolve_connect_string(&self, name: &SessionName) -> Option<String> {
        lock(&self.state)
            .sessions
            .get(name)
            .map(|s| s.host_address.clone())
    }
}

/// 128 random bits as 32 lowercase hex characters.
fn generate_session_id() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
