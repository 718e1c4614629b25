//! Completion events and the bus that delivers them.
//!
//! Subscribers register a handler for one [`OperationKind`] and get every
//! event of that kind until they unsubscribe. A handler can unsubscribe
//! itself by returning [`ControlFlow::Break`], which is how one-shot
//! listeners are written:
//!
//! ```rust
//! use std::ops::ControlFlow;
//! use lobbyforge_session::{EventBus, OperationKind, SessionEvent};
//!
//! let mut bus = EventBus::new();
//! bus.subscribe(OperationKind::Create, |event| {
//!     println!("first create finished: {event:?}");
//!     ControlFlow::Break(())
//! });
//!
//! bus.emit(&SessionEvent::CreateSessionComplete { success: true });
//! assert_eq!(bus.subscriber_count(OperationKind::Create), 0);
//! ```

use std::fmt;
use std::ops::ControlFlow;

use lobbyforge_protocol::{JoinResult, SessionDescriptor};
use lobbyforge_provider::OperationKind;
use tokio::sync::mpsc;

/// A normalized completion, emitted once per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    CreateSessionComplete { success: bool },

    /// An empty search is always reported as a failure. Otherwise the
    /// provider's results and flag are passed through unchanged.
    FindSessionsComplete {
        results: Vec<SessionDescriptor>,
        success: bool,
    },

    /// The provider's join code, passed through unchanged.
    JoinSessionComplete { result: JoinResult },

    DestroySessionComplete { success: bool },

    StartSessionComplete { success: bool },
}

impl SessionEvent {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::CreateSessionComplete { .. } => OperationKind::Create,
            Self::FindSessionsComplete { .. } => OperationKind::Find,
            Self::JoinSessionComplete { .. } => OperationKind::Join,
            Self::DestroySessionComplete { .. } => OperationKind::Destroy,
            Self::StartSessionComplete { .. } => OperationKind::Start,
        }
    }

    /// `true` for successful completions (`JoinResult::Success` for joins).
    pub fn is_success(&self) -> bool {
        match self {
            Self::CreateSessionComplete { success }
            | Self::FindSessionsComplete { success, .. }
            | Self::DestroySessionComplete { success }
            | Self::StartSessionComplete { success } => *success,
            Self::JoinSessionComplete { result } => result.is_success(),
        }
    }
}

/// Identifies a subscription for [`EventBus::unsubscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

type Handler = Box<dyn FnMut(&SessionEvent) -> ControlFlow<()> + Send>;

struct Subscriber {
    id: SubscriptionId,
    kind: OperationKind,
    handler: Handler,
}

/// Multicast delivery of [`SessionEvent`]s.
///
/// Handlers run synchronously, in subscription order, inside
/// [`emit`](Self::emit).
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    subscribers: Vec<Subscriber>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for events of `kind`.
    ///
    /// Return `ControlFlow::Continue(())` to stay subscribed, or
    /// `ControlFlow::Break(())` to be removed after this call.
    pub fn subscribe<F>(&mut self, kind: OperationKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&SessionEvent) -> ControlFlow<()> + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push(Subscriber {
            id,
            kind,
            handler: Box::new(handler),
        });
        tracing::trace!(%id, %kind, "event subscriber added");
        id
    }

    /// Forwards events of `kind` into a channel.
    ///
    /// The subscription removes itself the first time it finds the
    /// receiver dropped.
    pub fn subscribe_channel(
        &mut self,
        kind: OperationKind,
    ) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(kind, move |event| match tx.send(event.clone()) {
            Ok(()) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        });
        rx
    }

    /// Removes a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        before != self.subscribers.len()
    }

    /// Delivers `event` to every subscriber of its kind.
    ///
    /// Returns the number of handlers invoked.
    pub fn emit(&mut self, event: &SessionEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;
        self.subscribers.retain_mut(|sub| {
            if sub.kind != kind {
                return true;
            }
            delivered += 1;
            match (sub.handler)(event) {
                ControlFlow::Continue(()) => true,
                ControlFlow::Break(()) => {
                    tracing::trace!(id = %sub.id, %kind, "event subscriber finished");
                    false
                }
            }
        });
        delivered
    }

    pub fn subscriber_count(&self, kind: OperationKind) -> usize {
        self.subscribers.iter().filter(|s| s.kind == kind).count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("next_id", &self.next_id)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
