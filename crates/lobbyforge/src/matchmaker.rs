//! Caller-level matchmaking on top of the orchestrator.
//!
//! [`Matchmaker`] turns the orchestrator's request-then-event protocol into
//! `async` calls that end in a travel target: hosts get a listen URL for
//! the lobby map, clients get the address of the session they joined.
//!
//! ```text
//! host()          create ──→ CreateSessionComplete ──→ Travel::Listen
//! find_and_join() find ──→ pick by match type ──→ join ──→ resolve ──→ Travel::Client
//! leave()         destroy ──→ DestroySessionComplete
//! ```

use std::fmt;
use std::time::Duration;

use lobbyforge_protocol::{JoinResult, SessionDescriptor};
use lobbyforge_provider::OperationKind;
use lobbyforge_session::{SessionError, SessionEvent, SessionOrchestrator};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// What to host, what to look for, and how long to wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchmakerConfig {
    /// Public slots on a hosted session.
    pub num_public_connections: u32,

    /// Hosted sessions advertise it; joins only pick sessions that match.
    pub match_type: String,

    pub max_search_results: u32,

    /// Map a host travels to once its session exists.
    pub lobby_map: String,

    /// Upper bound on each wait for a completion. `None` waits forever.
    ///
    /// A request that times out stays pending until its completion
    /// arrives; the next flow handles it before issuing anything new.
    pub timeout: Option<Duration>,
}

impl Default for MatchmakerConfig {
    fn default() -> Self {
        Self {
            num_public_connections: 4,
            match_type: "FreeForAll".to_string(),
            max_search_results: 10_000,
            lobby_map: "/Game/ThirdPerson/Maps/Lobby".to_string(),
            timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Travel
// ---------------------------------------------------------------------------

/// Where the game should go after a successful host or join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Travel {
    /// Load `url` as a listen server.
    Listen { url: String },
    /// Connect to the host at `address`.
    Client { address: String },
}

impl fmt::Display for Travel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listen { url } => write!(f, "listen {url}"),
            Self::Client { address } => write!(f, "connect {address}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a matchmaking flow stopped short.
#[derive(Debug, thiserror::Error)]
pub enum MatchmakerError {
    #[error("session could not be created")]
    CreateFailed,

    #[error("no sessions found")]
    NoSessionFound,

    #[error("no session with match type {match_type:?}")]
    NoMatchingSession { match_type: String },

    #[error("join failed: {0}")]
    JoinFailed(JoinResult),

    #[error("joined session has no connect address")]
    NoConnectAddress,

    #[error("session could not be destroyed")]
    DestroyFailed,

    #[error("session could not be started")]
    StartFailed,

    #[error("no completion within {0:?}")]
    TimedOut(Duration),

    /// The orchestrator stopped delivering completions.
    #[error("completion stream closed")]
    Closed,

    #[error(transparent)]
    Session(#[from] SessionError),
}

// ---------------------------------------------------------------------------
// Matchmaker
// ---------------------------------------------------------------------------

/// Host / find-and-join / leave flows over one [`SessionOrchestrator`].
///
/// Each flow drives the orchestrator's completions itself, so nothing
/// else should be calling `dispatch_completions` on it meanwhile.
#[derive(Debug)]
pub struct Matchmaker {
    orchestrator: SessionOrchestrator,
    config: MatchmakerConfig,
}

impl Matchmaker {
    pub fn new(orchestrator: SessionOrchestrator, config: MatchmakerConfig) -> Self {
        Self {
            orchestrator,
            config,
        }
    }

    pub fn config(&self) -> &MatchmakerConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut MatchmakerConfig {
        &mut self.config
    }

    pub fn orchestrator(&self) -> &SessionOrchestrator {
        &self.orchestrator
    }

    pub fn orchestrator_mut(&mut self) -> &mut SessionOrchestrator {
        &mut self.orchestrator
    }

    pub fn into_inner(self) -> SessionOrchestrator {
        self.orchestrator
    }

    /// Creates a session and returns the lobby to listen on.
    ///
    /// An existing session under the same name is replaced.
    pub async fn host(&mut self) -> Result<Travel, MatchmakerError> {
        self.catch_up();
        let mut created = self.orchestrator.subscribe_channel(OperationKind::Create);
        self.orchestrator
            .create_session(self.config.num_public_connections, &self.config.match_type)?;

        match self.await_event(&mut created).await? {
            SessionEvent::CreateSessionComplete { success: true } => {
                let url = format!("{}?listen", self.config.lobby_map);
                tracing::info!(%url, match_type = %self.config.match_type, "hosting");
                Ok(Travel::Listen { url })
            }
            _ => Err(MatchmakerError::CreateFailed),
        }
    }

    /// Finds sessions, joins the first one of the configured match type,
    /// and returns the address to connect to.
    pub async fn find_and_join(&mut self) -> Result<Travel, MatchmakerError> {
        self.catch_up();
        let results = self.find().await?;
        let Some(chosen) = self.pick(results) else {
            return Err(MatchmakerError::NoMatchingSession {
                match_type: self.config.match_type.clone(),
            });
        };

        let mut joined = self.orchestrator.subscribe_channel(OperationKind::Join);
        self.orchestrator.join_session(&chosen)?;
        match self.await_event(&mut joined).await? {
            SessionEvent::JoinSessionComplete {
                result: JoinResult::Success,
            } => {}
            SessionEvent::JoinSessionComplete { result } => {
                return Err(MatchmakerError::JoinFailed(result));
            }
            _ => return Err(MatchmakerError::JoinFailed(JoinResult::UnknownError)),
        }

        let address = self
            .orchestrator
            .resolve_connect_string()
            .ok_or(MatchmakerError::NoConnectAddress)?;
        tracing::info!(%address, session_id = %chosen.session_id, "joined");
        Ok(Travel::Client { address })
    }

    /// Marks the hosted session as in progress.
    pub async fn start_match(&mut self) -> Result<(), MatchmakerError> {
        self.catch_up();
        let mut started = self.orchestrator.subscribe_channel(OperationKind::Start);
        self.orchestrator.start_session()?;
        match self.await_event(&mut started).await? {
            SessionEvent::StartSessionComplete { success: true } => Ok(()),
            _ => Err(MatchmakerError::StartFailed),
        }
    }

    /// Destroys the current session, hosted or joined.
    pub async fn leave(&mut self) -> Result<(), MatchmakerError> {
        self.catch_up();
        let mut destroyed = self.orchestrator.subscribe_channel(OperationKind::Destroy);
        self.orchestrator.destroy_session()?;
        match self.await_event(&mut destroyed).await? {
            SessionEvent::DestroySessionComplete { success: true } => {
                tracing::info!("left session");
                Ok(())
            }
            _ => Err(MatchmakerError::DestroyFailed),
        }
    }

    async fn find(&mut self) -> Result<Vec<SessionDescriptor>, MatchmakerError> {
        let mut found = self.orchestrator.subscribe_channel(OperationKind::Find);
        self.orchestrator.find_sessions(self.config.max_search_results)?;
        match self.await_event(&mut found).await? {
            SessionEvent::FindSessionsComplete {
                results,
                success: true,
            } => Ok(results),
            _ => Err(MatchmakerError::NoSessionFound),
        }
    }

    /// Handles completions that arrived after an earlier flow timed out,
    /// so their kinds are no longer pending.
    fn catch_up(&mut self) {
        let late = self.orchestrator.dispatch_completions();
        if late > 0 {
            tracing::debug!(late, "handled late completions");
        }
    }

    fn pick(&self, results: Vec<SessionDescriptor>) -> Option<SessionDescriptor> {
        let wanted = self.config.match_type.as_str();
        results.into_iter().find(|result| {
            tracing::debug!(
                session_id = %result.session_id,
                owner = %result.owning_user,
                match_type = result.match_type().unwrap_or(""),
                "search result"
            );
            result.match_type() == Some(wanted)
        })
    }

    /// Handles completions until `events` yields, bounded by the
    /// configured timeout.
    ///
    /// Events emitted synchronously by the request call are already
    /// queued and are returned without waiting.
    async fn await_event(
        &mut self,
        events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Result<SessionEvent, MatchmakerError> {
        let limit = self.config.timeout;
        let orchestrator = &mut self.orchestrator;
        let wait = async move {
            loop {
                if let Ok(event) = events.try_recv() {
                    return Ok(event);
                }
                if orchestrator.next_completion().await.is_none() {
                    return Err(MatchmakerError::Closed);
                }
            }
        };

        match limit {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| MatchmakerError::TimedOut(limit))?,
            None => wait.await,
        }
    }
}
