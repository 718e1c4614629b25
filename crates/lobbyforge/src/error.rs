//! Unified error type for Lobbyforge.

use lobbyforge_protocol::ProtocolError;
use lobbyforge_provider::ProviderError;
use lobbyforge_session::SessionError;

use crate::MatchmakerError;

/// Top-level error that wraps all crate-specific errors.
///
/// Every variant converts with `?`, so applications built on the
/// `lobbyforge` meta crate only need this one type.
#[derive(Debug, thiserror::Error)]
pub enum LobbyforgeError {
    /// Invalid request parameters or a malformed beacon.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A provider could not be set up.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// An orchestrator call was misused (overlapping request).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A host / join / leave flow did not reach its goal.
    #[error(transparent)]
    Matchmaker(#[from] MatchmakerError),
}
