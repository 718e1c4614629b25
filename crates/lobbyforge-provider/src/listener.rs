//! Completion listeners: how a provider reports finished requests.

use std::collections::HashMap;
use std::fmt;

use lobbyforge_protocol::{JoinResult, SessionName};
use tokio::sync::mpsc;

/// The five request kinds a provider accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Create,
    Find,
    Join,
    Destroy,
    Start,
}

impl OperationKind {
    pub const ALL: [Self; 5] = [
        Self::Create,
        Self::Find,
        Self::Join,
        Self::Destroy,
        Self::Start,
    ];
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Find => "find",
            Self::Join => "join",
            Self::Destroy => "destroy",
            Self::Start => "start",
        };
        f.write_str(s)
    }
}

/// The asynchronous outcome of an accepted request.
///
/// Find carries no results: they are written into the request's
/// [`SearchState`](crate::SearchState) before the completion fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCompletion {
    Create { name: SessionName, success: bool },
    Find { success: bool },
    Join { name: SessionName, result: JoinResult },
    Destroy { name: SessionName, success: bool },
    Start { name: SessionName, success: bool },
}

impl ProviderCompletion {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Create { .. } => OperationKind::Create,
            Self::Find { .. } => OperationKind::Find,
            Self::Join { .. } => OperationKind::Join,
            Self::Destroy { .. } => OperationKind::Destroy,
            Self::Start { .. } => OperationKind::Start,
        }
    }
}

/// Where a provider delivers completions.
pub type CompletionSink = mpsc::UnboundedSender<ProviderCompletion>;

/// Identifies one listener registration so it can be cleared later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub u64);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L-{}", self.0)
    }
}

/// Per-kind listener bookkeeping for provider implementations.
///
/// Not thread-safe on its own; providers keep it behind their own lock.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    next_handle: u64,
    listeners: HashMap<OperationKind, Vec<(ListenerHandle, CompletionSink)>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `sink` for completions of `kind`.
    pub fn add(
        &mut self,
        kind: OperationKind,
        sink: CompletionSink,
    ) -> ListenerHandle {
        self.next_handle += 1;
        let handle = ListenerHandle(self.next_handle);
        self.listeners.entry(kind).or_default().push((handle, sink));
        handle
    }

    /// Removes a registration. Returns `false` if it was not present.
    pub fn clear(&mut self, kind: OperationKind, handle: ListenerHandle) -> bool {
        let Some(list) = self.listeners.get_mut(&kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != handle);
        before != list.len()
    }

    /// Sends `completion` to every listener of its kind.
    ///
    /// Sinks whose receiver is gone are pruned. Returns the number of
    /// listeners that received the completion.
    pub fn notify(&mut self, completion: ProviderCompletion) -> usize {
        let Some(list) = self.listeners.get_mut(&completion.kind()) else {
            return 0;
        };
        list.retain(|(_, sink)| !sink.is_closed());
        let mut delivered = 0;
        for (_, sink) in list.iter() {
            if sink.send(completion.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of live registrations for `kind`.
    pub fn count(&self, kind: OperationKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }
}
