//! Wire shape of the live conversation feed.
//!
//! Each entry of the remote collection is a document
//! `{_id, text, createdAt, user: {_id, name}, image?, location?}`; the
//! server stamps `createdAt` at write time, so appended documents carry no
//! timestamp of their own.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::capabilities::RemoteError;
use crate::model::{normalize_timeline, Author, Location, Message, MessageId, MessagePayload, UserId};
use crate::UnixTimeMs;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RemoteUser {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RemoteDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "createdAt")]
    pub created_at_ms: u64,
    pub user: RemoteUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// Body of an append. Timestamp and id are assigned remotely.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct NewRemoteDocument {
    pub text: String,
    pub user: RemoteUser,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl NewRemoteDocument {
    /// Payload must already be validated.
    #[must_use]
    pub fn from_payload(payload: MessagePayload, author: &Author) -> Self {
        Self {
            text: payload.text.unwrap_or_default(),
            user: RemoteUser {
                id: author.id.to_string(),
                name: author.display_name.clone(),
            },
            image: payload.image,
            location: payload.location,
        }
    }
}

impl TryFrom<RemoteDocument> for Message {
    type Error = crate::model::PayloadError;

    fn try_from(doc: RemoteDocument) -> Result<Self, Self::Error> {
        let message = Message {
            id: MessageId::new(doc.id),
            text: doc.text,
            created_at: UnixTimeMs(doc.created_at_ms),
            author: Author {
                id: UserId::new(doc.user.id),
                display_name: doc.user.name,
            },
            image: doc.image.filter(|image| !image.trim().is_empty()),
            location: doc.location,
            system: false,
        };
        message.validate()?;
        Ok(message)
    }
}

/// One delivery of a live subscription.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum RemoteEvent {
    Snapshot(Vec<RemoteDocument>),
    Failed(RemoteError),
}

/// Converts a full snapshot into a timeline, skipping malformed documents.
#[must_use]
pub fn messages_from_snapshot(documents: Vec<RemoteDocument>) -> Vec<Message> {
    let mut messages: Vec<Message> = documents
        .into_iter()
        .filter_map(|doc| {
            let id = doc.id.clone();
            match Message::try_from(doc) {
                Ok(message) => Some(message),
                Err(error) => {
                    warn!(document = %id, %error, "skipping malformed remote document");
                    None
                }
            }
        })
        .collect();
    normalize_timeline(&mut messages);
    messages
}
