//! Durable copy of the last known good timeline.
//!
//! The mirror is a single blob in the key-value store, scoped to one
//! conversation and one user. Reads fail soft: whatever cannot be decoded
//! is treated as an empty cache. Writes are best effort and never block the
//! message flow.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::capabilities::{KeyNamespace, KvError, KvKey};
use crate::model::{normalize_timeline, ConversationId, Message, UserId};
use crate::{UnixTimeMs, MAX_MIRRORED_MESSAGES, MIRROR_SCHEMA_VERSION};

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("schema version {found} is newer than supported {max}")]
    FutureSchema { found: u32, max: u32 },

    #[error("unknown schema version: {0}")]
    UnknownSchema(u32),

    #[error("invalid key: {0}")]
    Key(#[from] KvError),
}

#[derive(Serialize, Deserialize, Debug)]
struct MirrorEnvelope {
    schema_version: u32,
    saved_at_ms: u64,
    messages: Vec<Message>,
}

/// Key of the mirror blob for one conversation as seen by one user.
pub fn storage_key(conversation: &ConversationId, user: &UserId) -> Result<KvKey, MirrorError> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(conversation.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(user.as_str().as_bytes());
    let hash = hasher.finalize();
    let key = format!("messages_v{}_{}", MIRROR_SCHEMA_VERSION, &hash.to_hex()[..16]);
    Ok(KvKey::new(KeyNamespace::Cache, key)?)
}

/// Serializes the newest [`MAX_MIRRORED_MESSAGES`] real messages. Placeholders are never stored.
pub fn encode(messages: &[Message], now: UnixTimeMs) -> Result<Vec<u8>, MirrorError> {
    let envelope = MirrorEnvelope {
        schema_version: MIRROR_SCHEMA_VERSION,
        saved_at_ms: now.as_millis(),
        messages: messages
            .iter()
            .filter(|m| !m.is_placeholder())
            .take(MAX_MIRRORED_MESSAGES)
            .cloned()
            .collect(),
    };
    Ok(serde_json::to_vec(&envelope)?)
}

/// Strict decoding, used by [`decode`].
pub fn try_decode(bytes: &[u8]) -> Result<Vec<Message>, MirrorError> {
    let envelope: MirrorEnvelope = serde_json::from_slice(bytes)?;
    match envelope.schema_version {
        MIRROR_SCHEMA_VERSION => {}
        found if found > MIRROR_SCHEMA_VERSION => {
            return Err(MirrorError::FutureSchema {
                found,
                max: MIRROR_SCHEMA_VERSION,
            })
        }
        found => return Err(MirrorError::UnknownSchema(found)),
    }

    let mut messages: Vec<Message> = envelope
        .messages
        .into_iter()
        .filter(|m| match m.validate() {
            Ok(()) => !m.is_placeholder(),
            Err(error) => {
                warn!(message = %m.id, %error, "dropping invalid cached message");
                false
            }
        })
        .collect();
    normalize_timeline(&mut messages);
    Ok(messages)
}

/// Never fails: a missing or corrupt blob is an empty cache.
#[must_use]
pub fn decode(bytes: &[u8]) -> Vec<Message> {
    try_decode(bytes).unwrap_or_else(|error| {
        warn!(%error, size = bytes.len(), "cached messages unreadable, starting empty");
        Vec::new()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Author, Location, MessageId};

    fn message(id: &str, at: u64) -> Message {
        Message {
            id: MessageId::new(id),
            text: format!("text {id}"),
            created_at: UnixTimeMs(at),
            author: Author::new("u1", "Ann"),
            image: None,
            location: None,
            system: false,
        }
    }

    #[test]
    fn test_round_trip_preserves_order_and_content() {
        let mut with_location = message("m2", 200);
        with_location.location = Some(Location::new(50.4501, 30.5234).unwrap());
        let mut with_image = message("m3", 300);
        with_image.text = String::new();
        with_image.image = Some("https://cdn.example.com/u1-1-cat.jpg".into());
        let original = vec![with_image, with_location, message("m1", 100)];

        let bytes = encode(&original, UnixTimeMs(1)).unwrap();
        assert_eq!(decode(&bytes), original);
    }

    #[test]
    fn test_placeholder_never_persisted() {
        let list = vec![Message::placeholder("empty", UnixTimeMs(5))];
        let bytes = encode(&list, UnixTimeMs(5)).unwrap();
        assert!(decode(&bytes).is_empty());
    }

    #[test]
    fn test_encode_caps_message_count() {
        let list: Vec<_> = (0..(MAX_MIRRORED_MESSAGES as u64 + 10))
            .rev()
            .map(|i| message(&format!("m{i}"), i))
            .collect();
        let decoded = decode(&encode(&list, UnixTimeMs(0)).unwrap());
        assert_eq!(decoded.len(), MAX_MIRRORED_MESSAGES);
        assert_eq!(decoded[0].id, list[0].id);
    }

    #[test]
    fn test_corrupt_blob_decodes_empty() {
        assert!(decode(b"not json").is_empty());
        assert!(decode(b"").is_empty());
        assert!(decode(br#"{"schema_version":1}"#).is_empty());
    }

    #[test]
    fn test_future_schema_rejected() {
        let bytes = br#"{"schema_version":99,"saved_at_ms":0,"messages":[]}"#;
        assert!(matches!(
            try_decode(bytes),
            Err(MirrorError::FutureSchema { found: 99, .. })
        ));
        assert!(decode(bytes).is_empty());
    }

    #[test]
    fn test_invalid_entries_dropped_rest_kept() {
        let bytes = br#"{"schema_version":1,"saved_at_ms":0,"messages":[
            {"id":"ok","text":"hi","created_at":1,"author":{"id":"u1","display_name":"Ann"}},
            {"id":"bad","text":"","created_at":2,"author":{"id":"u1","display_name":"Ann"},
             "location":{"latitude":500.0,"longitude":0.0}}
        ]}"#;
        let messages = decode(bytes);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].id.as_str(), "ok");
    }

    #[test]
    fn test_storage_key_is_scoped() {
        let room = ConversationId::new("room");
        let a = storage_key(&room, &UserId::new("ann")).unwrap();
        let b = storage_key(&room, &UserId::new("bob")).unwrap();
        let other = storage_key(&ConversationId::new("other"), &UserId::new("ann")).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, other);
        assert_eq!(a, storage_key(&room, &UserId::new("ann")).unwrap());
        assert!(a.raw().starts_with("cache:messages_v1_"));
    }
}
