//! Error types for the provider layer.

use lobbyforge_protocol::ProtocolError;

/// Errors raised while setting up or running a provider.
///
/// Request outcomes are never reported through this type; they travel as
/// [`ProviderCompletion`](crate::ProviderCompletion)s.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Another provider on the same LAN already uses this host address.
    #[error("address {0} is already bound on this network")]
    AddressInUse(String),

    /// A beacon could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
