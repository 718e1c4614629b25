//! Session data model for Lobbyforge.
//!
//! This crate defines the values that flow between a game client, the
//! session orchestrator, and whatever online backend sits underneath:
//!
//! - **Identity** ([`NetId`], [`SessionName`]): who is asking, and which
//!   named session they are asking about.
//! - **Requests** ([`SessionSettings`], [`SessionSearchParams`]): the
//!   immutable parameter blocks handed to the backend.
//! - **Results** ([`SessionDescriptor`], [`JoinResult`]): what comes back.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how descriptors are turned
//!   into bytes when a backend advertises them (see [`LanBeacon`]).
//!
//! # Architecture
//!
//! ```text
//! Matchmaker (caller) → Orchestrator (session) → Provider (backend)
//!                 ↘            ↓            ↙
//!                   Protocol (this crate)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Advertisement, AttributeValue, DEFAULT_BUILD_ID, DEFAULT_SESSION_NAME,
    JoinResult, LanBeacon, MATCH_TYPE_KEY, NetId, SessionAttribute,
    SessionDescriptor, SessionName, SessionSearchParams, SessionSettings,
};
