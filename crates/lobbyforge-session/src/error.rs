//! Error types for the session layer.

use lobbyforge_protocol::ProtocolError;
use lobbyforge_provider::OperationKind;

/// Errors returned directly by orchestrator operations.
///
/// These only cover caller mistakes. Anything the backend reports, and an
/// unavailable backend, arrives as a
/// [`SessionEvent`](crate::SessionEvent) instead.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A request of this kind is still waiting for its completion.
    ///
    /// The in-flight request is left untouched and will still produce its
    /// event.
    #[error("a {0} request is already in flight")]
    OperationInFlight(OperationKind),

    /// The request parameters were rejected before reaching the provider.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
