//! Core session types.
//!
//! Everything here is plain data: the orchestrator builds these blocks,
//! hands them to a provider, and never mutates them afterwards. The serde
//! derives exist because providers advertise descriptors over the network
//! (or, for the offline provider, over an in-process LAN).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// Attribute key under which the match type is advertised.
pub const MATCH_TYPE_KEY: &str = "MatchType";

/// The single name this system creates, joins, and destroys sessions under.
pub const DEFAULT_SESSION_NAME: &str = "GameSession";

/// Build compatibility identifier stamped on every created session.
///
/// Searches only return sessions whose build id matches the searcher's.
pub const DEFAULT_BUILD_ID: u32 = 1;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// The backend-specific unique id of a local player.
///
/// Every create/find/join request is issued on behalf of a player, so the
/// orchestrator carries one of these for the player that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetId(pub String);

impl NetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for NetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The local name a session is registered under on the provider.
///
/// A provider can hold several named sessions at once (game, party,
/// voice...). This system only ever touches one, [`SessionName::game`].
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionName(pub String);

impl SessionName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The well-known game session name.
    pub fn game() -> Self {
        Self(DEFAULT_SESSION_NAME.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionName {
    fn default() -> Self {
        Self::game()
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Attributes
// ---------------------------------------------------------------------------

/// A value stored in a session's attribute map.
///
/// `#[serde(untagged)]` keeps the JSON shape natural: `"Team"`, `4`, `true`
/// rather than `{ "Str": "Team" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl AttributeValue {
    /// Returns the string payload, or `None` for non-string values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Where an attribute is visible to other players.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "PascalCase")]
pub enum Advertisement {
    /// Kept on the host only.
    #[default]
    DontAdvertise,
    /// Only visible in LAN ping/beacon replies.
    ViaPingOnly,
    /// Only visible through the online service's search.
    ViaOnlineService,
    /// Visible everywhere. Used for the match type so both LAN and online
    /// searches can filter on it.
    ViaOnlineServiceAndPing,
}

impl Advertisement {
    /// Returns `true` if searchers can see attributes with this setting.
    pub fn is_advertised(self) -> bool {
        !matches!(self, Self::DontAdvertise)
    }
}

/// One entry of a session's attribute map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAttribute {
    pub value: AttributeValue,
    pub advertisement: Advertisement,
}

// ---------------------------------------------------------------------------
// SessionSettings
// ---------------------------------------------------------------------------

/// The parameter block submitted with a create request.
///
/// Built fresh for every create call and never touched again once it has
/// been handed to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// `true` when the session lives on the local network only.
    pub is_lan_match: bool,

    /// Number of publicly joinable slots. Always ≥ 1.
    pub num_public_connections: u32,

    pub allow_join_in_progress: bool,
    pub allow_join_via_presence: bool,
    pub uses_presence: bool,
    pub should_advertise: bool,
    pub use_lobbies_if_available: bool,

    /// Build compatibility id. Searches skip sessions from other builds.
    pub build_unique_id: u32,

    /// Custom attributes, keyed by name. `BTreeMap` keeps the encoded
    /// order stable.
    pub attributes: BTreeMap<String, SessionAttribute>,
}

impl SessionSettings {
    /// Builds the settings a host advertises for a public match.
    ///
    /// Join-in-progress, presence joins, presence, advertising, and lobbies
    /// are all switched on, and `match_type` is stamped under
    /// [`MATCH_TYPE_KEY`] so searchers can filter on it.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidParams`] if `num_public_connections`
    /// is zero.
    pub fn for_match(
        num_public_connections: u32,
        match_type: &str,
        is_lan_match: bool,
        build_unique_id: u32,
    ) -> Result<Self, ProtocolError> {
        if num_public_connections == 0 {
            return Err(ProtocolError::InvalidParams(
                "a session needs at least one public connection".into(),
            ));
        }

        let mut settings = Self {
            is_lan_match,
            num_public_connections,
            allow_join_in_progress: true,
            allow_join_via_presence: true,
            uses_presence: true,
            should_advertise: true,
            use_lobbies_if_available: true,
            build_unique_id,
            attributes: BTreeMap::new(),
        };
        settings.set(
            MATCH_TYPE_KEY,
            match_type,
            Advertisement::ViaOnlineServiceAndPing,
        );
        Ok(settings)
    }

    /// Inserts or replaces an attribute.
    pub fn set(
        &mut self,
        key: &str,
        value: impl Into<AttributeValue>,
        advertisement: Advertisement,
    ) {
        self.attributes.insert(
            key.to_string(),
            SessionAttribute {
                value: value.into(),
                advertisement,
            },
        );
    }

    /// Looks up an attribute value by key.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key).map(|attr| &attr.value)
    }

    /// The advertised match type, if one was stamped.
    pub fn match_type(&self) -> Option<&str> {
        self.get(MATCH_TYPE_KEY).and_then(AttributeValue::as_str)
    }

    /// Returns a copy containing only the attributes searchers may see.
    pub fn advertised(&self) -> Self {
        let mut copy = self.clone();
        copy.attributes
            .retain(|_, attr| attr.advertisement.is_advertised());
        copy
    }
}

// ---------------------------------------------------------------------------
// SessionSearchParams
// ---------------------------------------------------------------------------

/// The parameter block submitted with a find request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSearchParams {
    /// Upper bound on the number of results the provider returns. ≥ 1.
    pub max_results: u32,

    /// `true` to search the local network instead of the online service.
    pub is_lan_query: bool,

    /// Only return sessions that use presence.
    pub presence_filter: bool,
}

impl SessionSearchParams {
    /// Builds a presence-filtered search.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidParams`] if `max_results` is zero.
    pub fn new(
        max_results: u32,
        is_lan_query: bool,
    ) -> Result<Self, ProtocolError> {
        if max_results == 0 {
            return Err(ProtocolError::InvalidParams(
                "a search must allow at least one result".into(),
            ));
        }
        Ok(Self {
            max_results,
            is_lan_query,
            presence_filter: true,
        })
    }

    /// Returns `true` if a session with these settings satisfies the
    /// query's LAN and presence constraints.
    pub fn accepts(&self, settings: &SessionSettings) -> bool {
        if self.is_lan_query != settings.is_lan_match {
            return false;
        }
        if self.presence_filter && !settings.uses_presence {
            return false;
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Search results
// ---------------------------------------------------------------------------

/// One session returned by a search.
///
/// Opaque to the orchestrator: it is passed back to the provider verbatim
/// when joining. Callers inspect it through [`attribute`](Self::attribute)
/// and [`match_type`](Self::match_type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    /// Provider-assigned id, unique per hosted session.
    pub session_id: String,

    /// The player hosting the session.
    pub owning_user: NetId,

    /// Address clients travel to once they have joined.
    pub host_address: String,

    /// The advertised subset of the host's settings.
    pub settings: SessionSettings,

    /// Slots still open.
    pub open_public_connections: u32,

    /// Round-trip estimate in milliseconds. 0 when unknown.
    pub ping_ms: u32,
}

impl SessionDescriptor {
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.settings.get(key)
    }

    pub fn match_type(&self) -> Option<&str> {
        self.settings.match_type()
    }

    /// Returns `true` when no public slots remain.
    pub fn is_full(&self) -> bool {
        self.open_public_connections == 0
    }
}

/// What a host broadcasts on a LAN so searchers can discover it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LanBeacon {
    pub build_unique_id: u32,
    pub descriptor: SessionDescriptor,
}

// ---------------------------------------------------------------------------
// JoinResult
// ---------------------------------------------------------------------------

/// Outcome code of a join request, passed through from the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinResult {
    Success,
    SessionIsFull,
    SessionDoesNotExist,
    CouldNotRetrieveAddress,
    AlreadyInSession,
    UnknownError,
}

impl JoinResult {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for JoinResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "Success",
            Self::SessionIsFull => "SessionIsFull",
            Self::SessionDoesNotExist => "SessionDoesNotExist",
            Self::CouldNotRetrieveAddress => "CouldNotRetrieveAddress",
            Self::AlreadyInSession => "AlreadyInSession",
            Self::UnknownError => "UnknownError",
        };
        f.write_str(s)
    }
}
