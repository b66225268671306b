//! Codec for encoding and decoding Relay wire frames.
//!
//! Frames are discrete JSON text messages; the transport (WebSocket)
//! already delimits them, so no length prefix is needed.

use thiserror::Error;

use crate::message::Message;

/// Maximum inbound frame size (64 KiB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode a message as a JSON text frame.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    serde_json::to_string(message).map_err(ProtocolError::Encode)
}

/// Decode a message from a JSON text frame.
///
/// # Errors
///
/// Returns an error if the frame is oversized or not a valid message
/// object. An unrecognized `type` tag is not an error; it decodes to
/// [`EventKind::Unknown`](crate::EventKind::Unknown).
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::EventKind;

    #[test]
    fn test_decode_client_frame() {
        // The minimal shape a client sends; server-side fields default.
        let msg = decode(r#"{"type":"message","content":"hi","sender":"alice"}"#).unwrap();
        assert_eq!(msg.kind, EventKind::Broadcast);
        assert_eq!(msg.content, "hi");
        assert_eq!(msg.sender, "alice");
        assert!(msg.id.is_none());
        assert_eq!(msg.timestamp, 0);
        assert!(!msg.delivered);
    }

    #[test]
    fn test_decode_private_frame() {
        let msg =
            decode(r#"{"type":"private","content":"hey","sender":"alice","recipient":"bob"}"#)
                .unwrap();
        assert_eq!(msg.kind, EventKind::Private);
        assert_eq!(msg.recipient.as_deref(), Some("bob"));
        assert!(msg.room.is_none());
    }

    #[test]
    fn test_decode_unknown_kind() {
        let msg = decode(r#"{"type":"emoji-blast","content":"x","sender":"alice"}"#).unwrap();
        assert_eq!(msg.kind, EventKind::Unknown);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode("not json at all"),
            Err(ProtocolError::Decode(_))
        ));
        assert!(matches!(decode(r#"{"content":5}"#), Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_skips_absent_fields() {
        let text = encode(&Message::broadcast("hi", "alice", "lobby")).unwrap();
        assert!(text.contains(r#""type":"message""#));
        assert!(text.contains(r#""room":"lobby""#));
        assert!(text.contains(r#""delivered":false"#));
        // No id yet and no recipient on a broadcast.
        assert!(!text.contains(r#""id""#));
        assert!(!text.contains(r#""recipient""#));
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let msg = Message::private("hey", "alice", "bob").with_id(7);
        let decoded = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn test_frame_too_large() {
        let huge = format!(
            r#"{{"type":"message","content":"{}","sender":"a"}}"#,
            "x".repeat(MAX_FRAME_SIZE)
        );
        assert!(matches!(
            decode(&huge),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }
}
