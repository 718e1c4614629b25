//! The [`SessionProvider`] trait.

use std::sync::Arc;

use lobbyforge_protocol::{NetId, SessionDescriptor, SessionName, SessionSettings};

use crate::{CompletionSink, ListenerHandle, OperationKind, SearchState};

/// Name an offline (LAN-only) provider reports from
/// [`SessionProvider::provider_name`].
pub const OFFLINE_PROVIDER_NAME: &str = "NULL";

/// An online session backend.
///
/// Request methods return `false` when the request is rejected outright;
/// nothing will be delivered for it. When they return `true` the provider
/// owes exactly one [`ProviderCompletion`](crate::ProviderCompletion) of
/// the matching kind, sent to every listener registered for that kind when
/// it fires. A provider may send it before the request method returns.
///
/// The trait is object safe; the orchestrator holds a
/// `Weak<dyn SessionProvider>` and never owns the provider.
///
/// # Contract on the caller
///
/// At most one request of each kind should be in flight. Providers are not
/// required to cope with overlapping requests of the same kind.
pub trait SessionProvider: Send + Sync {
    /// Identifies the backend, e.g. `"Steam"`, `"EOS"`, or
    /// [`OFFLINE_PROVIDER_NAME`].
    fn provider_name(&self) -> &str;

    /// `true` if this provider only works on the local network.
    fn is_offline(&self) -> bool {
        self.provider_name() == OFFLINE_PROVIDER_NAME
    }

    /// `true` if a session is registered locally under `name`.
    fn session_exists(&self, name: &SessionName) -> bool;

    /// Registers a completion listener for `kind`.
    fn add_listener(
        &self,
        kind: OperationKind,
        sink: CompletionSink,
    ) -> ListenerHandle;

    /// Removes a listener. Returns `false` if the handle was unknown.
    fn clear_listener(&self, kind: OperationKind, handle: ListenerHandle)
    -> bool;

    fn create_session(
        &self,
        requester: &NetId,
        name: &SessionName,
        settings: &SessionSettings,
    ) -> bool;

    /// Starts a search. Results are written into `search` before the
    /// completion fires.
    fn find_sessions(&self, requester: &NetId, search: Arc<SearchState>)
    -> bool;

    fn join_session(
        &self,
        requester: &NetId,
        name: &SessionName,
        result: &SessionDescriptor,
    ) -> bool;

    fn destroy_session(&self, name: &SessionName) -> bool;

    fn start_session(&self, name: &SessionName) -> bool;

    /// The address to travel to for the session registered under `name`.
    fn resolve_connect_string(&self, name: &SessionName) -> Option<String>;
}
