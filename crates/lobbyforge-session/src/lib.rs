//! Session lifecycle orchestration for Lobbyforge.
//!
//! This crate sits between game code (menus, lobby logic) and a
//! [`SessionProvider`](lobbyforge_provider::SessionProvider). It turns the
//! provider's listener-and-completion protocol into five normalized
//! events, one per request:
//!
//! | Operation | Event |
//! |-----------|-------|
//! | [`create_session`](SessionOrchestrator::create_session) | [`SessionEvent::CreateSessionComplete`] |
//! | [`find_sessions`](SessionOrchestrator::find_sessions) | [`SessionEvent::FindSessionsComplete`] |
//! | [`join_session`](SessionOrchestrator::join_session) | [`SessionEvent::JoinSessionComplete`] |
//! | [`destroy_session`](SessionOrchestrator::destroy_session) | [`SessionEvent::DestroySessionComplete`] |
//! | [`start_session`](SessionOrchestrator::start_session) | [`SessionEvent::StartSessionComplete`] |
//!
//! # How it fits in the stack
//!
//! ```text
//! Matchmaker / UI (above)  ← subscribes to SessionEvents
//!     ↕
//! Session Layer (this crate)  ← one in-flight request per kind
//!     ↕
//! Provider Layer (below)  ← does the actual network work
//! ```

mod config;
mod error;
mod event;
mod orchestrator;
mod state;

pub use config::OrchestratorConfig;
pub use error::SessionError;
pub use event::{EventBus, SessionEvent, SubscriptionId};
pub use lobbyforge_provider::OperationKind;
pub use orchestrator::{SessionOrchestrator, SessionOrchestratorBuilder};
pub use state::{PendingOps, RecreateIntent};
