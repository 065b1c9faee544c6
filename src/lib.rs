// lib.rs - message synchronization and offline-continuity core

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]

pub mod app;
pub mod capabilities;
pub mod connectivity;
pub mod event;
pub mod mirror;
pub mod model;
pub mod remote;
pub mod store;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use app::{App, SyncEngine};
pub use capabilities::{Capabilities, Effect};
pub use connectivity::{ConnectivityMonitor, ListenerId, SignalSource};
pub use crux_core::{render::Render, App as CruxApp};
pub use event::{Event, SessionConfig};
pub use model::{
    Author, ConversationId, Location, Message, MessageId, MessagePayload, Model, Notification,
    NotificationKind, PayloadError, SendRejection, SyncMode, UserId, ViewModel,
};

pub const MAX_TEXT_LEN: usize = 10_000;
pub const MAX_DISPLAY_NAME_LEN: usize = 128;
pub const MAX_MIRRORED_MESSAGES: usize = 1_000;
pub const MIRROR_SCHEMA_VERSION: u32 = 1;
pub const DEFAULT_PLACEHOLDER_TEXT: &str = "No messages yet. Say hello!";
pub const PLACEHOLDER_ID: &str = "placeholder";
pub const SYSTEM_AUTHOR_ID: &str = "system";
pub const SYSTEM_AUTHOR_NAME: &str = "System";

/// Failure taxonomy of the sync core.
///
/// None of these are fatal. Every variant degrades to "operate from cache,
/// disable sending" and is surfaced to the user at most as a notification.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncError {
    #[error("connectivity unknown: {reason}")]
    ConnectivityUnknown { reason: String },

    #[error("cache read failed: {reason}")]
    CacheReadFailure { reason: String },

    #[error("cache write failed: {reason}")]
    CacheWriteFailure { reason: String },

    #[error("remote subscription failed: {reason}")]
    RemoteSubscriptionFailure { reason: String },

    #[error("send failed: {reason}")]
    SendFailure { reason: String },
}

impl SyncError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConnectivityUnknown { .. } => "CONNECTIVITY_UNKNOWN",
            Self::CacheReadFailure { .. } => "CACHE_READ_FAILURE",
            Self::CacheWriteFailure { .. } => "CACHE_WRITE_FAILURE",
            Self::RemoteSubscriptionFailure { .. } => "REMOTE_SUBSCRIPTION_FAILURE",
            Self::SendFailure { .. } => "SEND_FAILURE",
        }
    }

    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        true
    }

    /// Whether the failure is worth interrupting the user for.
    #[must_use]
    pub const fn is_user_visible(&self) -> bool {
        matches!(
            self,
            Self::RemoteSubscriptionFailure { .. } | Self::SendFailure { .. }
        )
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self {
            Self::ConnectivityUnknown { .. } => {
                "Unable to check your connection. Showing saved messages.".into()
            }
            Self::CacheReadFailure { .. } => "Saved messages could not be loaded.".into(),
            Self::CacheWriteFailure { .. } => "Messages could not be saved for offline use.".into(),
            Self::RemoteSubscriptionFailure { .. } => {
                "Lost connection to the chat. Showing saved messages.".into()
            }
            Self::SendFailure { .. } => "Message could not be sent. Please try again.".into(),
        }
    }
}

/// Explicit timestamp unit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    #[must_use]
    pub fn now() -> Self {
        Self(get_current_time_ms())
    }

    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
