//! Integration tests for the session orchestrator using a recording provider.
//!
//! `MockProvider` never completes anything on its own: tests decide when
//! and how each request finishes by calling `fire()`, then run
//! `dispatch_completions()` the way a game loop would. Every provider call
//! is appended to a log that outlives the provider, so tests can also
//! check what happened after the provider was dropped.

use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, MutexGuard};

use lobbyforge_protocol::{
    JoinResult, NetId, ProtocolError, SessionDescriptor, SessionName,
    SessionSearchParams, SessionSettings,
};
use lobbyforge_provider::{
    CompletionSink, ListenerHandle, ListenerRegistry, OperationKind,
    ProviderCompletion, SearchState, SessionProvider,
};
use lobbyforge_session::{SessionError, SessionEvent, SessionOrchestrator};

// =========================================================================
// Mock provider
// =========================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Exists,
    AddListener(OperationKind),
    ClearListener(OperationKind),
    Create { connections: u32, match_type: String, lan: bool, build: u32 },
    Find(SessionSearchParams),
    Join(String),
    Destroy,
    Start,
}

#[derive(Debug, Default)]
struct Log {
    calls: Vec<Call>,
}

impl Log {
    fn count(&self, wanted: &Call) -> usize {
        self.calls.iter().filter(|c| *c == wanted).count()
    }

    fn creates(&self) -> Vec<Call> {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Create { .. }))
            .cloned()
            .collect()
    }
}

struct MockProvider {
    name: &'static str,
    log: Arc<Mutex<Log>>,
    exists: Mutex<bool>,
    accept: Mutex<bool>,
    /// Results written into the search on `find_sessions`.
    results: Vec<SessionDescriptor>,
    /// When set, `create_session` fires its completion before returning.
    complete_create_inline: bool,
    listeners: Mutex<ListenerRegistry>,
    last_search: Mutex<Option<Arc<SearchState>>>,
}

impl MockProvider {
    fn new() -> Self {
        Self {
            name: "NULL",
            log: Arc::new(Mutex::new(Log::default())),
            exists: Mutex::new(false),
            accept: Mutex::new(true),
            results: Vec::new(),
            complete_create_inline: false,
            listeners: Mutex::new(ListenerRegistry::new()),
            last_search: Mutex::new(None),
        }
    }

    fn online() -> Self {
        Self { name: "Steam", ..Self::new() }
    }

    fn with_results(results: Vec<SessionDescriptor>) -> Self {
        Self { results, ..Self::new() }
    }

    fn set_exists(&self, exists: bool) {
        *self.exists.lock().unwrap() = exists;
    }

    fn set_accept(&self, accept: bool) {
        *self.accept.lock().unwrap() = accept;
    }

    fn log(&self) -> MutexGuard<'_, Log> {
        self.log.lock().unwrap()
    }

    fn record(&self, call: Call) {
        self.log.lock().unwrap().calls.push(call);
    }

    /// Delivers a completion to whoever is listening for its kind.
    fn fire(&self, completion: ProviderCompletion) -> usize {
        self.listeners.lock().unwrap().notify(completion)
    }

    fn listener_count(&self, kind: OperationKind) -> usize {
        self.listeners.lock().unwrap().count(kind)
    }
}

impl SessionProvider for MockProvider {
    fn provider_name(&self) -> &str {
        self.name
    }

    fn session_exists(&self, _name: &SessionName) -> bool {
        self.record(Call::Exists);
        *self.exists.lock().unwrap()
    }

    fn add_listener(&self, kind: OperationKind, sink: CompletionSink) -> ListenerHandle {
        self.record(Call::AddListener(kind));
        self.listeners.lock().unwrap().add(kind, sink)
    }

    fn clear_listener(&self, kind: OperationKind, handle: ListenerHandle) -> bool {
        self.record(Call::ClearListener(kind));
        self.listeners.lock().unwrap().clear(kind, handle)
    }

    fn create_session(
        &self,
        _requester: &NetId,
        _name: &SessionName,
        settings: &SessionSettings,
    ) -> bool {
        self.record(Call::Create {
            connections: settings.num_public_connections,
            match_type: settings.match_type().unwrap_or_default().to_string(),
            lan: settings.is_lan_match,
            build: settings.build_unique_id,
        });
        let accepted = *self.accept.lock().unwrap();
        if accepted && self.complete_create_inline {
            self.fire(created(true));
        }
        accepted
    }

    fn find_sessions(&self, _requester: &NetId, search: Arc<SearchState>) -> bool {
        self.record(Call::Find(*search.params()));
        search.set_results(self.results.clone());
        *self.last_search.lock().unwrap() = Some(search);
        *self.accept.lock().unwrap()
    }

    fn join_session(
        &self,
        _requester: &NetId,
        _name: &SessionName,
        result: &SessionDescriptor,
    ) -> bool {
        self.record(Call::Join(result.session_id.clone()));
        *self.accept.lock().unwrap()
    }

    fn destroy_session(&self, _name: &SessionName) -> bool {
        self.record(Call::Destroy);
        *self.accept.lock().unwrap()
    }

    fn start_session(&self, _name: &SessionName) -> bool {
        self.record(Call::Start);
        *self.accept.lock().unwrap()
    }

    fn resolve_connect_string(&self, _name: &SessionName) -> Option<String> {
        Some("10.0.0.1:7777".to_string())
    }
}

// =========================================================================
// Helpers
// =========================================================================

fn created(success: bool) -> ProviderCompletion {
    ProviderCompletion::Create { name: SessionName::game(), success }
}

fn destroyed(success: bool) -> ProviderCompletion {
    ProviderCompletion::Destroy { name: SessionName::game(), success }
}

fn started(success: bool) -> ProviderCompletion {
    ProviderCompletion::Start { name: SessionName::game(), success }
}

fn joined(result: JoinResult) -> ProviderCompletion {
    ProviderCompletion::Join { name: SessionName::game(), result }
}

fn descriptor(id: &str, match_type: &str) -> SessionDescriptor {
    SessionDescriptor {
        session_id: id.into(),
        owning_user: NetId::new("host"),
        host_address: "10.0.0.1:7777".into(),
        settings: SessionSettings::for_match(4, match_type, true, 1).unwrap(),
        open_public_connections: 4,
        ping_ms: 0,
    }
}

fn orchestrator_for(provider: &Arc<MockProvider>) -> SessionOrchestrator {
    SessionOrchestrator::builder()
        .local_player(NetId::new("player-1"))
        .provider(provider)
        .build()
}

/// Subscribes to every event kind and returns the shared record.
fn record_events(orch: &mut SessionOrchestrator) -> Arc<Mutex<Vec<SessionEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    for kind in OperationKind::ALL {
        let sink = Arc::clone(&seen);
        orch.subscribe(kind, move |event| {
            sink.lock().unwrap().push(event.clone());
            ControlFlow::Continue(())
        });
    }
    seen
}

fn events(seen: &Arc<Mutex<Vec<SessionEvent>>>) -> Vec<SessionEvent> {
    seen.lock().unwrap().clone()
}

// =========================================================================
// create_session()
// =========================================================================

#[test]
fn test_create_session_success_emits_single_create_event() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.create_session(4, "Team").unwrap();
    assert!(events(&seen).is_empty(), "nothing before the provider replies");
    assert!(orch.is_pending(OperationKind::Create));

    provider.fire(created(true));
    orch.dispatch_completions();

    assert_eq!(events(&seen), vec![SessionEvent::CreateSessionComplete { success: true }]);
    assert!(!orch.is_pending(OperationKind::Create));
}

#[test]
fn test_create_session_stamps_settings() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);

    orch.create_session(4, "Team").unwrap();

    assert_eq!(
        provider.log().creates(),
        vec![Call::Create {
            connections: 4,
            match_type: "Team".into(),
            lan: true,
            build: 1
        }]
    );
}

#[test]
fn test_create_session_online_provider_is_not_lan() {
    let provider = Arc::new(MockProvider::online());
    let mut orch = orchestrator_for(&provider);

    orch.create_session(2, "Duel").unwrap();

    assert!(matches!(
        provider.log().creates().as_slice(),
        [Call::Create { lan: false, .. }]
    ));
}

#[test]
fn test_create_session_registers_listener_before_submitting() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);

    orch.create_session(4, "Team").unwrap();

    let calls = provider.log().calls.clone();
    let listen_at = calls
        .iter()
        .position(|c| *c == Call::AddListener(OperationKind::Create))
        .expect("listener registered");
    let create_at = calls
        .iter()
        .position(|c| matches!(c, Call::Create { .. }))
        .expect("create submitted");
    assert!(listen_at < create_at);
}

#[test]
fn test_create_session_inline_completion_is_not_missed() {
    let provider = Arc::new(MockProvider {
        complete_create_inline: true,
        ..MockProvider::new()
    });
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.create_session(4, "Team").unwrap();
    orch.dispatch_completions();

    assert_eq!(events(&seen), vec![SessionEvent::CreateSessionComplete { success: true }]);
}

#[test]
fn test_create_session_sync_rejection_emits_failure_without_roundtrip() {
    let provider = Arc::new(MockProvider::new());
    provider.set_accept(false);
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.create_session(4, "Team").unwrap();

    assert_eq!(events(&seen), vec![SessionEvent::CreateSessionComplete { success: false }]);
    assert_eq!(provider.listener_count(OperationKind::Create), 0);
    assert_eq!(provider.log().count(&Call::ClearListener(OperationKind::Create)), 1);
    assert!(!orch.is_pending(OperationKind::Create));
}

#[test]
fn test_create_session_async_failure_is_passed_through() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.create_session(4, "Team").unwrap();
    provider.fire(created(false));
    orch.dispatch_completions();

    assert_eq!(events(&seen), vec![SessionEvent::CreateSessionComplete { success: false }]);
}

#[test]
fn test_create_session_zero_connections_returns_error() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    let result = orch.create_session(0, "Team");

    assert!(matches!(
        result,
        Err(SessionError::Protocol(ProtocolError::InvalidParams(_)))
    ));
    assert!(events(&seen).is_empty());
    assert!(provider.log().calls.is_empty());
}

#[test]
fn test_create_session_while_pending_returns_in_flight() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    orch.create_session(4, "Team").unwrap();

    let second = orch.create_session(8, "FreeForAll");

    assert!(matches!(
        second,
        Err(SessionError::OperationInFlight(OperationKind::Create))
    ));
    assert_eq!(provider.log().creates().len(), 1);
    assert_eq!(provider.listener_count(OperationKind::Create), 1);
}

// =========================================================================
// destroy-then-recreate
// =========================================================================

#[test]
fn test_create_session_existing_destroys_first() {
    let provider = Arc::new(MockProvider::new());
    provider.set_exists(true);
    let mut orch = orchestrator_for(&provider);

    orch.create_session(4, "Team").unwrap();

    assert!(provider.log().creates().is_empty(), "no create before destroy");
    assert_eq!(provider.log().count(&Call::Destroy), 1);
    assert!(orch.recreate_intent().is_pending());
    assert!(orch.is_pending(OperationKind::Create));
}

#[test]
fn test_recreate_sequence_destroy_then_create() {
    let provider = Arc::new(MockProvider::new());
    provider.set_exists(true);
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.create_session(4, "Team").unwrap();
    provider.set_exists(false);
    provider.fire(destroyed(true));
    orch.dispatch_completions();

    assert_eq!(
        provider.log().creates(),
        vec![Call::Create {
            connections: 4,
            match_type: "Team".into(),
            lan: true,
            build: 1
        }],
        "recreate reuses the original parameters"
    );
    assert!(!orch.recreate_intent().is_pending());

    provider.fire(created(true));
    orch.dispatch_completions();

    assert_eq!(
        events(&seen),
        vec![
            SessionEvent::DestroySessionComplete { success: true },
            SessionEvent::CreateSessionComplete { success: true },
        ]
    );
    assert_eq!(
        provider.log().count(&Call::Exists),
        1,
        "recreate path skips the exists check"
    );
}

#[test]
fn test_recreate_intent_consumed_exactly_once() {
    let provider = Arc::new(MockProvider::new());
    provider.set_exists(true);
    let mut orch = orchestrator_for(&provider);
    orch.create_session(4, "Team").unwrap();
    provider.fire(destroyed(true));
    orch.dispatch_completions();
    provider.fire(created(true));
    orch.dispatch_completions();

    orch.destroy_session().unwrap();
    provider.fire(destroyed(true));
    orch.dispatch_completions();

    assert_eq!(provider.log().creates().len(), 1);
}

#[test]
fn test_recreate_destroy_failure_abandons_create() {
    let provider = Arc::new(MockProvider::new());
    provider.set_exists(true);
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.create_session(4, "Team").unwrap();
    provider.fire(destroyed(false));
    orch.dispatch_completions();

    assert_eq!(
        events(&seen),
        vec![
            SessionEvent::DestroySessionComplete { success: false },
            SessionEvent::CreateSessionComplete { success: false },
        ]
    );
    assert!(provider.log().creates().is_empty());
    assert!(!orch.recreate_intent().is_pending());
    assert!(!orch.is_pending(OperationKind::Create));
}

#[test]
fn test_recreate_destroy_sync_rejection_abandons_create() {
    let provider = Arc::new(MockProvider::new());
    provider.set_exists(true);
    provider.set_accept(false);
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.create_session(4, "Team").unwrap();

    assert_eq!(
        events(&seen),
        vec![
            SessionEvent::DestroySessionComplete { success: false },
            SessionEvent::CreateSessionComplete { success: false },
        ]
    );
    assert!(!orch.recreate_intent().is_pending());
}

#[test]
fn test_create_while_recreate_armed_returns_in_flight() {
    let provider = Arc::new(MockProvider::new());
    provider.set_exists(true);
    let mut orch = orchestrator_for(&provider);
    orch.create_session(4, "Team").unwrap();

    let result = orch.create_session(4, "Team");

    assert!(matches!(
        result,
        Err(SessionError::OperationInFlight(OperationKind::Create))
    ));
    assert_eq!(provider.log().count(&Call::Destroy), 1);
}

#[test]
fn test_create_existing_with_destroy_pending_keeps_intent_unarmed() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    orch.destroy_session().unwrap();
    provider.set_exists(true);

    let result = orch.create_session(4, "Team");

    assert!(matches!(
        result,
        Err(SessionError::OperationInFlight(OperationKind::Destroy))
    ));
    assert!(!orch.recreate_intent().is_pending());
}

// =========================================================================
// find_sessions()
// =========================================================================

#[test]
fn test_find_sessions_empty_results_always_fail() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.find_sessions(10).unwrap();
    provider.fire(ProviderCompletion::Find { success: true });
    orch.dispatch_completions();

    assert_eq!(
        events(&seen),
        vec![SessionEvent::FindSessionsComplete { results: vec![], success: false }]
    );
}

#[test]
fn test_find_sessions_returns_results_unfiltered() {
    let results = vec![descriptor("a", "FreeForAll"), descriptor("b", "Team")];
    let provider = Arc::new(MockProvider::with_results(results.clone()));
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.find_sessions(10000).unwrap();
    provider.fire(ProviderCompletion::Find { success: true });
    orch.dispatch_completions();

    assert_eq!(
        events(&seen),
        vec![SessionEvent::FindSessionsComplete { results, success: true }]
    );
}

#[test]
fn test_find_sessions_provider_failure_with_results_passes_flag() {
    let results = vec![descriptor("a", "Team")];
    let provider = Arc::new(MockProvider::with_results(results.clone()));
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.find_sessions(5).unwrap();
    provider.fire(ProviderCompletion::Find { success: false });
    orch.dispatch_completions();

    assert_eq!(
        events(&seen),
        vec![SessionEvent::FindSessionsComplete { results, success: false }]
    );
}

#[test]
fn test_find_sessions_builds_presence_lan_query() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);

    orch.find_sessions(25).unwrap();

    assert_eq!(
        provider.log().count(&Call::Find(SessionSearchParams {
            max_results: 25,
            is_lan_query: true,
            presence_filter: true,
        })),
        1
    );
}

#[test]
fn test_find_sessions_sync_rejection_emits_empty_failure() {
    let provider = Arc::new(MockProvider::new());
    provider.set_accept(false);
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.find_sessions(10).unwrap();

    assert_eq!(
        events(&seen),
        vec![SessionEvent::FindSessionsComplete { results: vec![], success: false }]
    );
    assert_eq!(provider.listener_count(OperationKind::Find), 0);
}

#[test]
fn test_find_sessions_overlap_is_rejected_and_first_completes() {
    let provider = Arc::new(MockProvider::with_results(vec![descriptor("a", "Team")]));
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.find_sessions(10).unwrap();
    let second = orch.find_sessions(10);
    provider.fire(ProviderCompletion::Find { success: true });
    orch.dispatch_completions();

    assert!(matches!(
        second,
        Err(SessionError::OperationInFlight(OperationKind::Find))
    ));
    assert_eq!(events(&seen).len(), 1);
    assert_eq!(provider.log().count(&Call::AddListener(OperationKind::Find)), 1);
    assert_eq!(provider.log().count(&Call::ClearListener(OperationKind::Find)), 1);
}

#[test]
fn test_find_sessions_zero_results_returns_error() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);

    assert!(matches!(
        orch.find_sessions(0),
        Err(SessionError::Protocol(ProtocolError::InvalidParams(_)))
    ));
}

// =========================================================================
// join_session()
// =========================================================================

#[test]
fn test_join_session_passes_result_code_through() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.join_session(&descriptor("abc", "Team")).unwrap();
    provider.fire(joined(JoinResult::SessionIsFull));
    orch.dispatch_completions();

    assert_eq!(provider.log().count(&Call::Join("abc".into())), 1);
    assert_eq!(
        events(&seen),
        vec![SessionEvent::JoinSessionComplete { result: JoinResult::SessionIsFull }]
    );
}

#[test]
fn test_join_session_sync_rejection_emits_unknown_error() {
    let provider = Arc::new(MockProvider::new());
    provider.set_accept(false);
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.join_session(&descriptor("abc", "Team")).unwrap();

    assert_eq!(
        events(&seen),
        vec![SessionEvent::JoinSessionComplete { result: JoinResult::UnknownError }]
    );
    assert_eq!(provider.listener_count(OperationKind::Join), 0);
}

#[test]
fn test_join_session_dropped_provider_emits_unknown_error_without_listener() {
    let provider = Arc::new(MockProvider::new());
    let log = Arc::clone(&provider.log);
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);
    drop(provider);

    orch.join_session(&descriptor("abc", "Team")).unwrap();

    assert_eq!(
        events(&seen),
        vec![SessionEvent::JoinSessionComplete { result: JoinResult::UnknownError }]
    );
    assert!(log.lock().unwrap().calls.is_empty(), "no listener registered");
    assert!(!orch.is_pending(OperationKind::Join));
}

// =========================================================================
// destroy_session() / start_session()
// =========================================================================

#[test]
fn test_destroy_session_success_without_intent_only_emits_destroy() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.destroy_session().unwrap();
    provider.fire(destroyed(true));
    orch.dispatch_completions();

    assert_eq!(events(&seen), vec![SessionEvent::DestroySessionComplete { success: true }]);
    assert!(provider.log().creates().is_empty());
}

#[test]
fn test_start_session_completion_is_passed_through() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.start_session().unwrap();
    provider.fire(started(true));
    orch.dispatch_completions();

    assert_eq!(provider.log().count(&Call::Start), 1);
    assert_eq!(events(&seen), vec![SessionEvent::StartSessionComplete { success: true }]);
}

#[test]
fn test_start_session_sync_rejection_emits_failure() {
    let provider = Arc::new(MockProvider::new());
    provider.set_accept(false);
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);

    orch.start_session().unwrap();

    assert_eq!(events(&seen), vec![SessionEvent::StartSessionComplete { success: false }]);
}

// =========================================================================
// No provider
// =========================================================================

#[test]
fn test_no_provider_every_operation_emits_failure() {
    let mut orch = SessionOrchestrator::builder().build();
    let seen = record_events(&mut orch);
    assert!(!orch.provider_available());

    orch.create_session(4, "Team").unwrap();
    orch.find_sessions(10).unwrap();
    orch.join_session(&descriptor("abc", "Team")).unwrap();
    orch.destroy_session().unwrap();
    orch.start_session().unwrap();

    assert_eq!(
        events(&seen),
        vec![
            SessionEvent::CreateSessionComplete { success: false },
            SessionEvent::FindSessionsComplete { results: vec![], success: false },
            SessionEvent::JoinSessionComplete { result: JoinResult::UnknownError },
            SessionEvent::DestroySessionComplete { success: false },
            SessionEvent::StartSessionComplete { success: false },
        ]
    );
    assert_eq!(orch.resolve_connect_string(), None);
}

#[test]
fn test_detach_makes_provider_unavailable() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    assert!(orch.provider_available());

    orch.detach();
    assert!(!orch.provider_available());

    orch.attach(&provider);
    assert!(orch.provider_available());
}

// =========================================================================
// Provider loss while requests are in flight
// =========================================================================

#[test]
fn test_create_after_provider_dropped_settles_pending_create() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);
    orch.create_session(4, "Team").unwrap();
    drop(provider);

    let result = orch.create_session(4, "Team");

    assert!(result.is_ok());
    assert_eq!(
        events(&seen),
        vec![
            SessionEvent::CreateSessionComplete { success: false },
            SessionEvent::CreateSessionComplete { success: false },
        ],
        "one failure for the lost request, one for the new call"
    );
    assert!(!orch.is_pending(OperationKind::Create));
}

#[test]
fn test_attach_fresh_provider_after_drop_allows_create() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);
    orch.create_session(4, "Team").unwrap();
    drop(provider);

    let fresh = Arc::new(MockProvider::new());
    orch.attach(&fresh);
    orch.create_session(4, "Team").unwrap();
    fresh.fire(created(true));
    orch.dispatch_completions();

    assert_eq!(fresh.log().count(&Call::AddListener(OperationKind::Create)), 1);
    assert_eq!(
        events(&seen),
        vec![
            SessionEvent::CreateSessionComplete { success: false },
            SessionEvent::CreateSessionComplete { success: true },
        ]
    );
}

#[test]
fn test_detach_with_find_pending_clears_listener_and_fails_find() {
    let provider = Arc::new(MockProvider::with_results(vec![descriptor("a", "Team")]));
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);
    orch.find_sessions(10).unwrap();

    orch.detach();

    assert_eq!(
        events(&seen),
        vec![SessionEvent::FindSessionsComplete { results: vec![], success: false }]
    );
    assert_eq!(provider.listener_count(OperationKind::Find), 0);
    assert_eq!(provider.fire(ProviderCompletion::Find { success: true }), 0);
    assert_eq!(orch.dispatch_completions(), 0);
}

#[test]
fn test_detach_handles_already_delivered_completion_first() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);
    orch.create_session(4, "Team").unwrap();
    provider.fire(created(true));

    orch.detach();

    assert_eq!(events(&seen), vec![SessionEvent::CreateSessionComplete { success: true }]);
}

#[test]
fn test_provider_dropped_with_recreate_armed_abandons_create() {
    let provider = Arc::new(MockProvider::new());
    provider.set_exists(true);
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);
    orch.create_session(4, "Team").unwrap();
    drop(provider);

    orch.start_session().unwrap();

    assert_eq!(
        events(&seen),
        vec![
            SessionEvent::DestroySessionComplete { success: false },
            SessionEvent::CreateSessionComplete { success: false },
            SessionEvent::StartSessionComplete { success: false },
        ]
    );
    assert!(!orch.recreate_intent().is_pending());
    assert!(!orch.is_pending(OperationKind::Destroy));
}

#[test]
fn test_attach_replacing_live_provider_clears_old_listeners() {
    let old = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&old);
    orch.join_session(&descriptor("abc", "Team")).unwrap();

    let fresh = Arc::new(MockProvider::new());
    orch.attach(&fresh);
    orch.join_session(&descriptor("abc", "Team")).unwrap();

    assert_eq!(old.listener_count(OperationKind::Join), 0);
    assert_eq!(fresh.listener_count(OperationKind::Join), 1);
}

// =========================================================================
// Listener hygiene
// =========================================================================

#[test]
fn test_each_listener_cleared_exactly_once_per_request() {
    let provider = Arc::new(MockProvider::with_results(vec![descriptor("a", "Team")]));
    let mut orch = orchestrator_for(&provider);

    orch.create_session(4, "Team").unwrap();
    orch.find_sessions(10).unwrap();
    orch.join_session(&descriptor("a", "Team")).unwrap();
    orch.start_session().unwrap();
    orch.destroy_session().unwrap();
    provider.fire(created(true));
    provider.fire(ProviderCompletion::Find { success: true });
    provider.fire(joined(JoinResult::Success));
    provider.fire(started(true));
    provider.fire(destroyed(true));
    assert_eq!(orch.dispatch_completions(), 5);

    let log = provider.log();
    for kind in OperationKind::ALL {
        assert_eq!(log.count(&Call::AddListener(kind)), 1, "{kind} added once");
        assert_eq!(log.count(&Call::ClearListener(kind)), 1, "{kind} cleared once");
        assert_eq!(provider.listener_count(kind), 0, "{kind} leaked");
    }
}

#[test]
fn test_duplicate_completion_is_ignored() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let seen = record_events(&mut orch);
    orch.create_session(4, "Team").unwrap();

    // Both are queued before the orchestrator clears its listener.
    provider.fire(created(true));
    provider.fire(created(true));
    orch.dispatch_completions();

    assert_eq!(events(&seen), vec![SessionEvent::CreateSessionComplete { success: true }]);
    assert_eq!(provider.log().count(&Call::ClearListener(OperationKind::Create)), 1);
}

#[test]
fn test_resolve_connect_string_uses_provider() {
    let provider = Arc::new(MockProvider::new());
    let orch = orchestrator_for(&provider);

    assert_eq!(orch.resolve_connect_string().as_deref(), Some("10.0.0.1:7777"));
}

#[tokio::test]
async fn test_next_completion_handles_one_completion() {
    let provider = Arc::new(MockProvider::new());
    let mut orch = orchestrator_for(&provider);
    let mut created_rx = orch.subscribe_channel(OperationKind::Create);

    orch.create_session(4, "Team").unwrap();
    provider.fire(created(true));

    assert_eq!(orch.next_completion().await, Some(OperationKind::Create));
    assert_eq!(
        created_rx.recv().await,
        Some(SessionEvent::CreateSessionComplete { success: true })
    );
}
