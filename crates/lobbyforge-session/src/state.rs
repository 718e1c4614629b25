//! Orchestrator bookkeeping: in-flight requests and the recreate intent.

use lobbyforge_provider::{ListenerHandle, OperationKind};

// ---------------------------------------------------------------------------
// PendingOps
// ---------------------------------------------------------------------------

/// The listener registration of each in-flight request, per kind.
///
/// A kind is pending exactly while its slot holds a handle:
///
/// ```text
/// Idle ──begin(handle)──→ Pending ──finish()──→ Idle
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PendingOps {
    create: Option<ListenerHandle>,
    find: Option<ListenerHandle>,
    join: Option<ListenerHandle>,
    destroy: Option<ListenerHandle>,
    start: Option<ListenerHandle>,
}

impl PendingOps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, kind: OperationKind) -> bool {
        self.handle(kind).is_some()
    }

    /// The listener handle of the in-flight request of `kind`, if any.
    pub fn handle(&self, kind: OperationKind) -> Option<ListenerHandle> {
        match kind {
            OperationKind::Create => self.create,
            OperationKind::Find => self.find,
            OperationKind::Join => self.join,
            OperationKind::Destroy => self.destroy,
            OperationKind::Start => self.start,
        }
    }

    /// Records a newly registered listener. The kind must be idle.
    pub(crate) fn begin(&mut self, kind: OperationKind, handle: ListenerHandle) {
        let slot = self.slot_mut(kind);
        debug_assert!(slot.is_none(), "{kind} already pending");
        *slot = Some(handle);
    }

    /// Returns the kind to idle, handing back the handle to unregister.
    pub(crate) fn finish(&mut self, kind: OperationKind) -> Option<ListenerHandle> {
        self.slot_mut(kind).take()
    }

    fn slot_mut(&mut self, kind: OperationKind) -> &mut Option<ListenerHandle> {
        match kind {
            OperationKind::Create => &mut self.create,
            OperationKind::Find => &mut self.find,
            OperationKind::Join => &mut self.join,
            OperationKind::Destroy => &mut self.destroy,
            OperationKind::Start => &mut self.start,
        }
    }
}

// ---------------------------------------------------------------------------
// RecreateIntent
// ---------------------------------------------------------------------------

/// A create request parked behind the destroy of a stale session.
///
/// Armed when `create_session` finds a session already registered, and
/// consumed exactly once by the following destroy completion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecreateIntent {
    pending: bool,
    saved_connection_count: u32,
    saved_match_type: String,
}

impl RecreateIntent {
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub(crate) fn arm(&mut self, connection_count: u32, match_type: &str) {
        self.pending = true;
        self.saved_connection_count = connection_count;
        self.saved_match_type = match_type.to_string();
    }

    /// Clears the intent, returning the saved parameters if it was armed.
    pub(crate) fn take(&mut self) -> Option<(u32, String)> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        Some((
            self.saved_connection_count,
            std::mem::take(&mut self.saved_match_type),
        ))
    }
}
