//! Codec trait and implementations for advertising session data.
//!
//! A provider that broadcasts its sessions (the offline LAN provider, or a
//! real backend's ping replies) has to put descriptors on the wire somehow.
//! It does so through a [`Codec`], so the format can change without
//! touching the provider.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes them back.
///
/// `Send + Sync + 'static` because providers keep their codec for their
/// whole lifetime and may use it from a background task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value cannot be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match `T`.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Readable in packet captures and logs, which is what you want on a LAN.
///
/// ```rust
/// use lobbyforge_protocol::{
///     Codec, JsonCodec, LanBeacon, NetId, SessionDescriptor, SessionSettings,
/// };
///
/// let beacon = LanBeacon {
///     build_unique_id: 1,
///     descriptor: SessionDescriptor {
///         session_id: "a1".into(),
///         owning_user: NetId::new("host"),
///         host_address: "127.0.0.1:7777".into(),
///         settings: SessionSettings::for_match(4, "Team", true, 1).unwrap(),
///         open_public_connections: 4,
///         ping_ms: 0,
///     },
/// };
///
/// let bytes = JsonCodec.encode(&beacon).unwrap();
/// let decoded: LanBeacon = JsonCodec.decode(&bytes).unwrap();
/// assert_eq!(beacon, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
