//! Codec trait and the JSON implementation.
//!
//! The gateway never calls `serde_json` directly; it goes through a
//! [`Codec`] so a binary format can be swapped in without touching the
//! connection handler.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Converts values to bytes and back.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match `T`.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

/// A [`Codec`] backed by `serde_json`. Human-readable, which is what browser
/// clients want.
///
/// ```rust
/// use spyfall_protocol::{Codec, Envelope, JsonCodec, Payload, SystemMessage};
///
/// let codec = JsonCodec;
/// let envelope = Envelope::new(1, 5000, Payload::System(SystemMessage::Heartbeat { client_time: 5000 }));
///
/// let bytes = codec.encode(&envelope).unwrap();
/// let decoded: Envelope = codec.decode(&bytes).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{ClientCommand, Envelope, Payload, ServerEvent};

    #[test]
    fn test_json_codec_decodes_text_frame_from_browser() {
        let raw = br#"{"seq":1,"timestamp":0,"payload":{"type":"Command","data":{"event":"createRoom","data":{"playerName":"Ann"}}}}"#;
        let env: Envelope = JsonCodec.decode(raw).unwrap();
        assert_eq!(
            env.payload,
            Payload::Command(ClientCommand::CreateRoom {
                player_name: "Ann".into()
            })
        );
    }

    #[test]
    fn test_json_codec_rejects_unknown_command() {
        let raw = br#"{"seq":1,"timestamp":0,"payload":{"type":"Command","data":{"event":"fly","data":{}}}}"#;
        let result: Result<Envelope, _> = JsonCodec.decode(raw);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let result: Result<Envelope, _> = JsonCodec.decode(b"not json");
        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("decode failed"));
    }

    #[test]
    fn test_json_codec_encodes_event_envelope() {
        let env = Envelope::new(
            4,
            10,
            Payload::Event(ServerEvent::UpdateTimer { seconds: 59 }),
        );
        let bytes = JsonCodec.encode(&env).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["payload"]["type"], "Event");
        assert_eq!(json["payload"]["data"]["event"], "updateTimer");
        assert_eq!(json["payload"]["data"]["data"]["seconds"], 59);
    }
}
