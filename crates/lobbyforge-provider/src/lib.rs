//! Online session provider abstraction for Lobbyforge.
//!
//! A provider is the backend that actually creates, advertises, finds, and
//! joins sessions: a platform's online service, a dedicated matchmaking
//! API, or the offline [`LocalProvider`] shipped here. The orchestrator only
//! ever talks to it through the [`SessionProvider`] trait.
//!
//! # Completion model
//!
//! Every request returns a `bool` immediately (`false` = rejected on the
//! spot). Accepted requests finish later: the provider sends a
//! [`ProviderCompletion`] to every listener registered for that
//! [`OperationKind`]. Listeners are tokio channels, so the caller decides
//! when completions are handled.
//!
//! ```text
//! add_listener(kind) ──→ request() ──→ ... ──→ ProviderCompletion ──→ clear_listener(kind)
//! ```

mod error;
mod listener;
mod local;
mod provider;
mod search;

pub use error::ProviderError;
pub use listener::{
    CompletionSink, ListenerHandle, ListenerRegistry, OperationKind,
    ProviderCompletion,
};
pub use local::{LanNetwork, LocalProvider, LocalProviderConfig};
pub use provider::{OFFLINE_PROVIDER_NAME, SessionProvider};
pub use search::SearchState;
