use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{ConnectivityOutput, KvError, RemoteError};
use crate::model::{
    Author, ConversationId, MessageId, MessagePayload, SessionId, SubscriptionId, WatchId,
};
use crate::remote::RemoteEvent;
use crate::{DEFAULT_PLACEHOLDER_TEXT, MAX_DISPLAY_NAME_LEN};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("conversation id cannot be empty")]
    EmptyConversation,
    #[error("user id cannot be empty")]
    EmptyUserId,
    #[error("display name cannot be empty")]
    EmptyDisplayName,
    #[error("display name too long ({len} > {max})")]
    DisplayNameTooLong { len: usize, max: usize },
}

/// Everything a chat session is scoped to. The user identity is stable before chat starts.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub conversation_id: ConversationId,
    pub user: Author,
    #[serde(default)]
    pub placeholder_text: Option<String>,
}

impl SessionConfig {
    pub fn new(conversation_id: impl Into<String>, user: Author) -> Self {
        Self {
            conversation_id: ConversationId::new(conversation_id),
            user,
            placeholder_text: None,
        }
    }

    #[must_use]
    pub fn with_placeholder_text(mut self, text: impl Into<String>) -> Self {
        self.placeholder_text = Some(text.into());
        self
    }

    #[must_use]
    pub fn placeholder_text(&self) -> &str {
        self.placeholder_text
            .as_deref()
            .unwrap_or(DEFAULT_PLACEHOLDER_TEXT)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.conversation_id.as_str().trim().is_empty() {
            return Err(ConfigError::EmptyConversation);
        }
        if self.user.id.as_str().trim().is_empty() {
            return Err(ConfigError::EmptyUserId);
        }
        let name = self.user.display_name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyDisplayName);
        }
        if name.len() > MAX_DISPLAY_NAME_LEN {
            return Err(ConfigError::DisplayNameTooLong {
                len: name.len(),
                max: MAX_DISPLAY_NAME_LEN,
            });
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum Event {
    // --- Shell-facing ---
    StartSession(SessionConfig),
    EndSession,
    /// The host's own reachability flag.
    NetworkStatusChanged {
        online: bool,
    },
    SendRequested(MessagePayload),
    DismissNotification,

    // --- Capability responses ---
    #[serde(skip)]
    ConnectivityChecked {
        watch: WatchId,
        output: ConnectivityOutput,
    },
    #[serde(skip)]
    ConnectivityChanged {
        watch: WatchId,
        reading: ConnectivityOutput,
    },
    #[serde(skip)]
    RemoteUpdated {
        subscription: SubscriptionId,
        event: RemoteEvent,
    },
    #[serde(skip)]
    AppendCompleted {
        session: SessionId,
        result: Result<MessageId, RemoteError>,
    },
    #[serde(skip)]
    MirrorLoaded {
        ticket: u64,
        result: Result<Option<Vec<u8>>, KvError>,
    },
    #[serde(skip)]
    MirrorSaved(Result<(), KvError>),
}

impl Event {
    /// Stable name for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::StartSession(_) => "start_session",
            Self::EndSession => "end_session",
            Self::NetworkStatusChanged { .. } => "network_status_changed",
            Self::SendRequested(_) => "send_requested",
            Self::DismissNotification => "dismiss_notification",
            Self::ConnectivityChecked { .. } => "connectivity_checked",
            Self::ConnectivityChanged { .. } => "connectivity_changed",
            Self::RemoteUpdated { .. } => "remote_updated",
            Self::AppendCompleted { .. } => "append_completed",
            Self::MirrorLoaded { .. } => "mirror_loaded",
            Self::MirrorSaved(_) => "mirror_saved",
        }
    }
}
