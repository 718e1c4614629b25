//! The session orchestrator.
//!
//! Owns one named session on one provider and drives it through
//! create / find / join / destroy / start, one in-flight request per kind.
//!
//! # Completion flow
//!
//! Every request registers a listener on the provider *before* it is
//! submitted, so a provider that completes synchronously is still heard.
//! Completions land in a channel owned by the orchestrator and are handled
//! when the host loop calls [`SessionOrchestrator::dispatch_completions`]
//! or awaits [`SessionOrchestrator::next_completion`]. Handling a
//! completion unregisters its listener, then emits the matching
//! [`SessionEvent`].
//!
//! # Replacing a stale session
//!
//! ```text
//! create_session() ──[session exists]──→ arm RecreateIntent ──→ destroy_session()
//!                                                                   │
//!        CreateSessionComplete ←── create (no exists check) ←──[destroy ok]
//!                                                                   │
//!                                             DestroySessionComplete(true)
//! ```
//!
//! # Losing the provider
//!
//! Requests in flight on a provider that is dropped, detached, or replaced
//! by [`SessionOrchestrator::attach`] never complete. They are settled with
//! their failure events by `detach`/`attach`, or by the next request that
//! finds the provider gone, so no kind stays pending forever.
//!
//! # Concurrency note
//!
//! Not thread-safe by itself and never spawns work. It lives on the task
//! that runs the game loop; the provider does its I/O elsewhere and only
//! talks back through the completion channel.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};

use lobbyforge_protocol::{
    JoinResult, NetId, ProtocolError, SessionDescriptor, SessionSearchParams,
    SessionSettings,
};
use lobbyforge_provider::{
    OperationKind, ProviderCompletion, SearchState, SessionProvider,
};
use tokio::sync::mpsc;

use crate::{
    EventBus, OrchestratorConfig, PendingOps, RecreateIntent, SessionError,
    SessionEvent, SubscriptionId,
};

/// Drives the lifecycle of the well-known session against a provider.
///
/// Caller mistakes (zero-sized requests, overlapping requests of one kind)
/// come back as `Err`. Everything else, including a missing provider, is
/// reported as exactly one [`SessionEvent`] per call.
pub struct SessionOrchestrator {
    /// Non-owning: the host process decides when the provider goes away.
    provider: Option<Weak<dyn SessionProvider>>,

    local_player: NetId,
    config: OrchestratorConfig,
    pending: PendingOps,
    recreate: RecreateIntent,

    /// The search the pending find request writes into.
    last_search: Option<Arc<SearchState>>,

    events: EventBus,

    /// Cloned into every listener registration.
    completion_tx: mpsc::UnboundedSender<ProviderCompletion>,
    completion_rx: mpsc::UnboundedReceiver<ProviderCompletion>,
}

impl SessionOrchestrator {
    pub fn builder() -> SessionOrchestratorBuilder {
        SessionOrchestratorBuilder::new()
    }

    // =====================================================================
    // Provider attachment
    // =====================================================================

    /// Points the orchestrator at `provider` without taking ownership.
    ///
    /// Requests still in flight on the previous provider are settled as
    /// in [`detach`](Self::detach).
    pub fn attach<P: SessionProvider + 'static>(&mut self, provider: &Arc<P>) {
        self.detach();
        let weak: Weak<P> = Arc::downgrade(provider);
        let weak: Weak<dyn SessionProvider> = weak;
        self.provider = Some(weak);
    }

    /// Forgets the provider.
    ///
    /// Completions already delivered are handled first. Every request
    /// still in flight then gets its failure event, and a parked recreate
    /// is abandoned.
    pub fn detach(&mut self) {
        let previous = self.provider.take().and_then(|weak| weak.upgrade());
        self.settle_in_flight(previous);
    }

    /// `true` while an attached provider is still alive.
    pub fn provider_available(&self) -> bool {
        self.provider().is_some()
    }

    fn provider(&self) -> Option<Arc<dyn SessionProvider>> {
        self.provider.as_ref().and_then(Weak::upgrade)
    }

    /// The live provider, or `None` after settling whatever the lost one
    /// left in flight.
    fn provider_or_settle(&mut self) -> Option<Arc<dyn SessionProvider>> {
        let provider = self.provider();
        if provider.is_none() {
            self.settle_in_flight(None);
        }
        provider
    }

    // =====================================================================
    // Operations
    // =====================================================================

    /// Hosts a new session with `max_connections` public slots, advertised
    /// under `match_type`.
    ///
    /// If a session is already registered under the configured name, it is
    /// destroyed first and the create is re-issued, with the same
    /// parameters, once that destroy succeeds. The caller sees
    /// `DestroySessionComplete` followed by `CreateSessionComplete`.
    ///
    /// # Errors
    /// - [`SessionError::Protocol`] if `max_connections` is zero.
    /// - [`SessionError::OperationInFlight`] if a create (or a destroy
    ///   needed to replace the current session) is already pending.
    pub fn create_session(
        &mut self,
        max_connections: u32,
        match_type: &str,
    ) -> Result<(), SessionError> {
        if max_connections == 0 {
            return Err(ProtocolError::InvalidParams(
                "a session needs at least one public connection".into(),
            )
            .into());
        }
        let Some(provider) = self.provider_or_settle() else {
            tracing::warn!("create requested with no provider available");
            self.emit(SessionEvent::CreateSessionComplete { success: false });
            return Ok(());
        };
        self.ensure_idle(OperationKind::Create)?;

        let name = &self.config.session_name;
        if provider.session_exists(name) {
            self.ensure_idle(OperationKind::Destroy)?;
            tracing::info!(
                %name,
                max_connections,
                match_type,
                "session already exists, destroying before create"
            );
            self.recreate.arm(max_connections, match_type);
            return self.destroy_session();
        }

        self.submit_create(provider.as_ref(), max_connections, match_type);
        Ok(())
    }

    /// Searches for joinable sessions, returning at most `max_results`.
    ///
    /// Results are not filtered here; picking one (e.g. by match type) is
    /// the caller's job.
    ///
    /// # Errors
    /// - [`SessionError::Protocol`] if `max_results` is zero.
    /// - [`SessionError::OperationInFlight`] if a find is already pending.
    pub fn find_sessions(&mut self, max_results: u32) -> Result<(), SessionError> {
        let mut params = SessionSearchParams::new(max_results, false)?;
        let Some(provider) = self.provider_or_settle() else {
            tracing::warn!("find requested with no provider available");
            self.emit_find_failure();
            return Ok(());
        };
        self.ensure_idle(OperationKind::Find)?;
        params.is_lan_query = provider.is_offline();

        let search = Arc::new(SearchState::new(params));
        self.listen(provider.as_ref(), OperationKind::Find);
        self.last_search = Some(Arc::clone(&search));

        if !provider.find_sessions(&self.local_player, search) {
            tracing::warn!(max_results, "find rejected by provider");
            self.abandon(provider.as_ref(), OperationKind::Find);
            self.last_search = None;
            self.emit_find_failure();
            return Ok(());
        }

        tracing::info!(max_results, lan = params.is_lan_query, "find submitted");
        Ok(())
    }

    /// Joins the session described by `result` under the configured name.
    ///
    /// Reports `JoinResult::UnknownError` if there is no provider or it
    /// rejects the request outright.
    ///
    /// # Errors
    /// Returns [`SessionError::OperationInFlight`] if a join is already
    /// pending.
    pub fn join_session(
        &mut self,
        result: &SessionDescriptor,
    ) -> Result<(), SessionError> {
        let Some(provider) = self.provider_or_settle() else {
            tracing::warn!("join requested with no provider available");
            self.emit(SessionEvent::JoinSessionComplete {
                result: JoinResult::UnknownError,
            });
            return Ok(());
        };
        self.ensure_idle(OperationKind::Join)?;

        self.listen(provider.as_ref(), OperationKind::Join);
        let name = &self.config.session_name;
        if !provider.join_session(&self.local_player, name, result) {
            tracing::warn!(%name, session_id = %result.session_id, "join rejected by provider");
            self.abandon(provider.as_ref(), OperationKind::Join);
            self.emit(SessionEvent::JoinSessionComplete {
                result: JoinResult::UnknownError,
            });
            return Ok(());
        }

        tracing::info!(%name, session_id = %result.session_id, "join submitted");
        Ok(())
    }

    /// Tears down the session registered under the configured name.
    ///
    /// # Errors
    /// Returns [`SessionError::OperationInFlight`] if a destroy is already
    /// pending.
    pub fn destroy_session(&mut self) -> Result<(), SessionError> {
        let Some(provider) = self.provider_or_settle() else {
            tracing::warn!("destroy requested with no provider available");
            self.emit_destroy_failure();
            return Ok(());
        };
        self.ensure_idle(OperationKind::Destroy)?;

        self.listen(provider.as_ref(), OperationKind::Destroy);
        let name = &self.config.session_name;
        if !provider.destroy_session(name) {
            tracing::warn!(%name, "destroy rejected by provider");
            self.abandon(provider.as_ref(), OperationKind::Destroy);
            self.emit_destroy_failure();
            return Ok(());
        }

        tracing::info!(%name, "destroy submitted");
        Ok(())
    }

    /// Marks the session as started (match in progress).
    ///
    /// # Errors
    /// Returns [`SessionError::OperationInFlight`] if a start is already
    /// pending.
    pub fn start_session(&mut self) -> Result<(), SessionError> {
        let Some(provider) = self.provider_or_settle() else {
            tracing::warn!("start requested with no provider available");
            self.emit(SessionEvent::StartSessionComplete { success: false });
            return Ok(());
        };
        self.ensure_idle(OperationKind::Start)?;

        self.listen(provider.as_ref(), OperationKind::Start);
        let name = &self.config.session_name;
        if !provider.start_session(name) {
            tracing::warn!(%name, "start rejected by provider");
            self.abandon(provider.as_ref(), OperationKind::Start);
            self.emit(SessionEvent::StartSessionComplete { success: false });
            return Ok(());
        }

        tracing::info!(%name, "start submitted");
        Ok(())
    }

    /// The address to travel to for the current session, if the provider
    /// can resolve one.
    pub fn resolve_connect_string(&self) -> Option<String> {
        self.provider()?
            .resolve_connect_string(&self.config.session_name)
    }

    // =====================================================================
    // Completion handling
    // =====================================================================

    /// Handles every completion delivered so far. Never blocks.
    ///
    /// Returns the number of completions handled.
    pub fn dispatch_completions(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            self.handle_completion(completion);
            handled += 1;
        }
        handled
    }

    /// Waits for the next completion and handles it.
    ///
    /// Returns the kind of the completion handled. Completions are
    /// provider-driven; wrap this in `tokio::time::timeout` for a bound.
    pub async fn next_completion(&mut self) -> Option<OperationKind> {
        let completion = self.completion_rx.recv().await?;
        let kind = completion.kind();
        self.handle_completion(completion);
        Some(kind)
    }

    fn handle_completion(&mut self, completion: ProviderCompletion) {
        let kind = completion.kind();
        let Some(handle) = self.pending.finish(kind) else {
            tracing::debug!(%kind, "dropping completion with no pending request");
            return;
        };
        if let Some(provider) = self.provider() {
            if !provider.clear_listener(kind, handle) {
                tracing::debug!(%kind, %handle, "listener was already gone");
            }
        }

        match completion {
            ProviderCompletion::Create { name, success } => {
                tracing::info!(%name, success, "create completed");
                self.emit(SessionEvent::CreateSessionComplete { success });
            }
            ProviderCompletion::Find { success } => {
                let results = self
                    .last_search
                    .take()
                    .map(|search| search.results())
                    .unwrap_or_default();
                tracing::info!(success, found = results.len(), "find completed");
                if results.is_empty() {
                    self.emit_find_failure();
                } else {
                    self.emit(SessionEvent::FindSessionsComplete { results, success });
                }
            }
            ProviderCompletion::Join { name, result } => {
                tracing::info!(%name, %result, "join completed");
                self.emit(SessionEvent::JoinSessionComplete { result });
            }
            ProviderCompletion::Destroy { name, success } => {
                tracing::info!(%name, success, "destroy completed");
                let intent = self.recreate.take();
                if success {
                    if let Some((connections, match_type)) = &intent {
                        self.recreate_session(*connections, match_type);
                    }
                }
                self.emit(SessionEvent::DestroySessionComplete { success });
                if !success && intent.is_some() {
                    tracing::warn!(%name, "destroy failed, abandoning recreate");
                    self.emit(SessionEvent::CreateSessionComplete { success: false });
                }
            }
            ProviderCompletion::Start { name, success } => {
                tracing::info!(%name, success, "start completed");
                self.emit(SessionEvent::StartSessionComplete { success });
            }
        }
    }

    // =====================================================================
    // Events and state
    // =====================================================================

    /// Subscribes `handler` to events of `kind`. See [`EventBus::subscribe`].
    pub fn subscribe<F>(&mut self, kind: OperationKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&SessionEvent) -> ControlFlow<()> + Send + 'static,
    {
        self.events.subscribe(kind, handler)
    }

    /// Forwards events of `kind` into a channel.
    pub fn subscribe_channel(
        &mut self,
        kind: OperationKind,
    ) -> mpsc::UnboundedReceiver<SessionEvent> {
        self.events.subscribe_channel(kind)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    /// `true` while a request of `kind` awaits its completion. A create
    /// parked behind a destroy counts as pending.
    pub fn is_pending(&self, kind: OperationKind) -> bool {
        self.pending.is_pending(kind)
            || (kind == OperationKind::Create && self.recreate.is_pending())
    }

    pub fn pending(&self) -> &PendingOps {
        &self.pending
    }

    pub fn recreate_intent(&self) -> &RecreateIntent {
        &self.recreate
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn local_player(&self) -> &NetId {
        &self.local_player
    }

    // =====================================================================
    // Internals
    // =====================================================================

    fn ensure_idle(&self, kind: OperationKind) -> Result<(), SessionError> {
        if self.is_pending(kind) {
            tracing::warn!(%kind, "rejecting overlapping request");
            return Err(SessionError::OperationInFlight(kind));
        }
        Ok(())
    }

    /// Registers this orchestrator's listener for `kind` and marks the
    /// kind pending.
    fn listen(&mut self, provider: &dyn SessionProvider, kind: OperationKind) {
        let handle = provider.add_listener(kind, self.completion_tx.clone());
        self.pending.begin(kind, handle);
    }

    /// Undoes [`listen`](Self::listen) after a synchronous rejection.
    fn abandon(&mut self, provider: &dyn SessionProvider, kind: OperationKind) {
        if let Some(handle) = self.pending.finish(kind) {
            provider.clear_listener(kind, handle);
        }
    }

    fn submit_create(
        &mut self,
        provider: &dyn SessionProvider,
        max_connections: u32,
        match_type: &str,
    ) {
        let lan = provider.is_offline();
        let settings = match SessionSettings::for_match(
            max_connections,
            match_type,
            lan,
            self.config.build_unique_id,
        ) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "create settings rejected");
                self.emit(SessionEvent::CreateSessionComplete { success: false });
                return;
            }
        };

        self.listen(provider, OperationKind::Create);
        let name = &self.config.session_name;
        if !provider.create_session(&self.local_player, name, &settings) {
            tracing::warn!(%name, "create rejected by provider");
            self.abandon(provider, OperationKind::Create);
            self.emit(SessionEvent::CreateSessionComplete { success: false });
            return;
        }

        tracing::info!(%name, max_connections, match_type, lan, "create submitted");
    }

    /// Re-issues a parked create. The stale session is known to be gone,
    /// so the exists check is skipped.
    fn recreate_session(&mut self, max_connections: u32, match_type: &str) {
        let Some(provider) = self.provider() else {
            self.emit(SessionEvent::CreateSessionComplete { success: false });
            return;
        };
        tracing::info!(max_connections, match_type, "recreating session");
        self.submit_create(provider.as_ref(), max_connections, match_type);
    }

    fn emit_find_failure(&mut self) {
        self.emit(SessionEvent::FindSessionsComplete {
            results: Vec::new(),
            success: false,
        });
    }

    /// Reports a destroy that never reached the provider, and abandons a
    /// parked create if there was one.
    fn emit_destroy_failure(&mut self) {
        let intent = self.recreate.take();
        self.emit(SessionEvent::DestroySessionComplete { success: false });
        if intent.is_some() {
            self.emit(SessionEvent::CreateSessionComplete { success: false });
        }
    }

    /// Ends every request left behind by a provider that is gone or being
    /// replaced.
    ///
    /// Queued completions are handled first. Each request still pending
    /// then gets its failure event, and a parked recreate gets
    /// `CreateSessionComplete(false)` after them. The completion channel is
    /// replaced so late sends from `previous` go nowhere.
    fn settle_in_flight(&mut self, previous: Option<Arc<dyn SessionProvider>>) {
        self.dispatch_completions();

        let mut abandoned = Vec::new();
        for kind in OperationKind::ALL {
            if let Some(handle) = self.pending.finish(kind) {
                if let Some(provider) = &previous {
                    provider.clear_listener(kind, handle);
                }
                abandoned.push(kind);
            }
        }
        let recreate = self.recreate.take().is_some();
        self.last_search = None;
        (self.completion_tx, self.completion_rx) = mpsc::unbounded_channel();

        if abandoned.is_empty() && !recreate {
            return;
        }
        tracing::warn!(?abandoned, recreate, "provider lost with requests in flight");
        for kind in abandoned {
            self.emit(failure_event(kind));
        }
        if recreate {
            self.emit(SessionEvent::CreateSessionComplete { success: false });
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        let delivered = self.events.emit(&event);
        tracing::debug!(kind = %event.kind(), success = event.is_success(), delivered, "event emitted");
    }
}

/// The event reported for a request of `kind` that never completed.
fn failure_event(kind: OperationKind) -> SessionEvent {
    match kind {
        OperationKind::Create => SessionEvent::CreateSessionComplete { success: false },
        OperationKind::Find => SessionEvent::FindSessionsComplete {
            results: Vec::new(),
            success: false,
        },
        OperationKind::Join => SessionEvent::JoinSessionComplete {
            result: JoinResult::UnknownError,
        },
        OperationKind::Destroy => SessionEvent::DestroySessionComplete { success: false },
        OperationKind::Start => SessionEvent::StartSessionComplete { success: false },
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("provider_available", &self.provider_available())
            .field("local_player", &self.local_player)
            .field("config", &self.config)
            .field("pending", &self.pending)
            .field("recreate", &self.recreate)
            .field("events", &self.events)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`SessionOrchestrator`].
///
/// ```rust
/// use std::sync::Arc;
/// use lobbyforge_protocol::NetId;
/// use lobbyforge_provider::{LanNetwork, LocalProvider, LocalProviderConfig};
/// use lobbyforge_session::SessionOrchestrator;
///
/// let provider = Arc::new(
///     LocalProvider::new(LanNetwork::new(), LocalProviderConfig::default()).unwrap(),
/// );
/// let orchestrator = SessionOrchestrator::builder()
///     .local_player(NetId::new("player-1"))
///     .provider(&provider)
///     .build();
/// assert!(orchestrator.provider_available());
/// ```
pub struct SessionOrchestratorBuilder {
    provider: Option<Weak<dyn SessionProvider>>,
    local_player: NetId,
    config: OrchestratorConfig,
}

impl SessionOrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            local_player: NetId::new("local-player"),
            config: OrchestratorConfig::default(),
        }
    }

    /// Sets the provider. Only a weak reference is kept.
    pub fn provider<P: SessionProvider + 'static>(mut self, provider: &Arc<P>) -> Self {
        let weak: Weak<P> = Arc::downgrade(provider);
        let weak: Weak<dyn SessionProvider> = weak;
        self.provider = Some(weak);
        self
    }

    /// Sets the player requests are issued on behalf of.
    pub fn local_player(mut self, id: NetId) -> Self {
        self.local_player = id;
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> SessionOrchestrator {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        SessionOrchestrator {
            provider: self.provider,
            local_player: self.local_player,
            config: self.config,
            pending: PendingOps::new(),
            recreate: RecreateIntent::default(),
            last_search: None,
            events: EventBus::new(),
            completion_tx,
            completion_rx,
        }
    }
}

impl Default for SessionOrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
