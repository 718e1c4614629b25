//! # Lobbyforge
//!
//! Online session lifecycle management for multiplayer games.
//!
//! Lobbyforge sits between game code and an online session backend. Game
//! code asks to host, find, join, start or leave a session; a
//! [`SessionProvider`](lobbyforge_provider::SessionProvider) does the
//! network work; the [`SessionOrchestrator`](lobbyforge_session::SessionOrchestrator)
//! in between keeps one request of each kind in flight and turns provider
//! completions into [`SessionEvent`](lobbyforge_session::SessionEvent)s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lobbyforge::prelude::*;
//!
//! # async fn run() -> Result<(), LobbyforgeError> {
//! let network = LanNetwork::new();
//! let provider = Arc::new(LocalProvider::new(network, LocalProviderConfig::default())?);
//! let orchestrator = SessionOrchestrator::builder().provider(&provider).build();
//!
//! let mut matchmaker = Matchmaker::new(orchestrator, MatchmakerConfig::default());
//! let travel = matchmaker.host().await?;
//! println!("travel to {travel}");
//! # Ok(())
//! # }
//! ```

mod error;
pub mod matchmaker;
pub mod telemetry;

pub use error::LobbyforgeError;
pub use matchmaker::{Matchmaker, MatchmakerConfig, MatchmakerError, Travel};

pub mod prelude {
    pub use crate::{
        LobbyforgeError, Matchmaker, MatchmakerConfig, MatchmakerError, Travel,
    };
    pub use lobbyforge_protocol::{
        JoinResult, NetId, ProtocolError, SessionDescriptor, SessionName,
        SessionSearchParams, SessionSettings,
    };
    pub use lobbyforge_provider::{
        LanNetwork, LocalProvider, LocalProviderConfig, OperationKind,
        ProviderError, SessionProvider,
    };
    pub use lobbyforge_session::{
        EventBus, OrchestratorConfig, SessionError, SessionEvent,
        SessionOrchestrator,
    };
}
