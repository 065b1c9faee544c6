use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::connectivity::ConnectivityMonitor;
use crate::event::SessionConfig;
use crate::{
    UnixTimeMs, MAX_TEXT_LEN, PLACEHOLDER_ID, SYSTEM_AUTHOR_ID, SYSTEM_AUTHOR_NAME,
};

// --- Typed IDs ---

macro_rules! typed_id {
    ($name:ident) => {
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

typed_id!(MessageId);
typed_id!(UserId);
typed_id!(ConversationId);

/// Ticket for a live remote subscription. Results carrying any other ticket are stale.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Ticket for one `StartSession`. Appends issued under another session are stale.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

/// Ticket for the connectivity watch stream (and initial reading) of one session.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PayloadError {
    #[error("message has no text, image or location")]
    Empty,
    #[error("message cannot carry both an image and a location")]
    ImageAndLocation,
    #[error("invalid image url: {0}")]
    InvalidImageUrl(String),
    #[error("invalid location: lat={lat}, lon={lon}")]
    InvalidLocation { lat: f64, lon: f64 },
    #[error("text too long ({len} > {max})")]
    TextTooLong { len: usize, max: usize },
    #[error("missing {0}")]
    MissingField(&'static str),
}

/// Validated lat/lon pair.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, PayloadError> {
        let location = Self { latitude, longitude };
        location.validate()?;
        Ok(location)
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        if !self.latitude.is_finite()
            || !self.longitude.is_finite()
            || !(-90.0..=90.0).contains(&self.latitude)
            || !(-180.0..=180.0).contains(&self.longitude)
        {
            return Err(PayloadError::InvalidLocation {
                lat: self.latitude,
                lon: self.longitude,
            });
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub display_name: String,
}

impl Author {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: UserId::new(id),
            display_name: display_name.into(),
        }
    }

    fn system() -> Self {
        Self::new(SYSTEM_AUTHOR_ID, SYSTEM_AUTHOR_NAME)
    }
}

/// Image references must be absolute http(s) URLs to an already uploaded blob.
pub fn validate_image_url(raw: &str) -> Result<(), PayloadError> {
    let parsed = url::Url::parse(raw).map_err(|e| PayloadError::InvalidImageUrl(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(PayloadError::InvalidImageUrl(format!(
            "unsupported scheme '{other}'"
        ))),
    }
}

/// One entry of the timeline. Immutable once persisted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    #[serde(default)]
    pub text: String,
    pub created_at: UnixTimeMs,
    pub author: Author,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub system: bool,
}

impl Message {
    /// Synthetic entry shown when there is nothing else to show.
    #[must_use]
    pub fn placeholder(text: &str, now: UnixTimeMs) -> Self {
        Self {
            id: MessageId::new(PLACEHOLDER_ID),
            text: text.to_string(),
            created_at: now,
            author: Author::system(),
            image: None,
            location: None,
            system: true,
        }
    }

    #[must_use]
    pub fn is_placeholder(&self) -> bool {
        self.system && self.id.as_str() == PLACEHOLDER_ID
    }

    /// Structural checks for stored or received entries. Image references
    /// are taken as written by whichever client sent them; only outgoing
    /// payloads are held to http(s).
    pub fn validate(&self) -> Result<(), PayloadError> {
        if self.id.as_str().is_empty() {
            return Err(PayloadError::MissingField("id"));
        }
        if self.author.id.as_str().is_empty() {
            return Err(PayloadError::MissingField("author id"));
        }
        if self.image.is_some() && self.location.is_some() {
            return Err(PayloadError::ImageAndLocation);
        }
        if self.image.as_deref().is_some_and(|image| image.trim().is_empty()) {
            return Err(PayloadError::MissingField("image"));
        }
        if let Some(location) = &self.location {
            location.validate()?;
        }
        Ok(())
    }
}

/// Sorts newest first and keeps the first occurrence of each id.
pub fn normalize_timeline(messages: &mut Vec<Message>) {
    messages.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    let mut seen = std::collections::HashSet::with_capacity(messages.len());
    messages.retain(|m| seen.insert(m.id.clone()));
}

/// What the composer hands over. Media is already uploaded/resolved.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct MessagePayload {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl MessagePayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            image: Some(url.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn location(location: Location) -> Self {
        Self {
            location: Some(location),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), PayloadError> {
        let has_text = self.text.as_deref().is_some_and(|t| !t.trim().is_empty());
        if !has_text && self.image.is_none() && self.location.is_none() {
            return Err(PayloadError::Empty);
        }
        if let Some(text) = &self.text {
            if text.len() > MAX_TEXT_LEN {
                return Err(PayloadError::TextTooLong {
                    len: text.len(),
                    max: MAX_TEXT_LEN,
                });
            }
        }
        if self.image.is_some() && self.location.is_some() {
            return Err(PayloadError::ImageAndLocation);
        }
        if let Some(image) = &self.image {
            validate_image_url(image)?;
        }
        if let Some(location) = &self.location {
            location.validate()?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncMode {
    #[default]
    Initializing,
    OnlineLive,
    OfflineCached,
}

impl SyncMode {
    #[must_use]
    pub const fn can_send(self) -> bool {
        matches!(self, Self::OnlineLive)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::OnlineLive => "online_live",
            Self::OfflineCached => "offline_cached",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SendRejection {
    NoSession,
    Offline,
    Invalid { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    #[must_use]
    pub const fn default_duration_ms(self) -> u64 {
        match self {
            Self::Info => 3000,
            Self::Success => 2000,
            Self::Warning => 4000,
            Self::Error => 5000,
        }
    }
}

/// Non-blocking, dismissible message for the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    /// Increases by one for every notification raised in a session.
    pub seq: u64,
    pub message: String,
    pub kind: NotificationKind,
    pub created_at_ms: u64,
    pub duration_ms: u64,
}

#[derive(Default)]
pub struct Model {
    pub session: Option<SessionConfig>,
    pub session_id: Option<SessionId>,
    pub mode: SyncMode,
    /// The canonical list, newest first. Never empty once a mode has been entered.
    pub messages: Vec<Message>,
    pub connectivity: ConnectivityMonitor,
    pub connectivity_watch: Option<WatchId>,
    pub remote_subscription: Option<SubscriptionId>,
    pub pending_load: Option<u64>,
    pub sending_count: usize,
    pub notification: Option<Notification>,
    pub notifications_raised: u64,
    pub last_send_rejection: Option<SendRejection>,
    next_ticket: u64,
}

impl Model {
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    #[must_use]
    pub fn can_send(&self) -> bool {
        self.is_running() && self.mode.can_send()
    }

    pub fn next_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }

    pub fn notify(&mut self, message: impl Into<String>, kind: NotificationKind) {
        self.notifications_raised += 1;
        self.notification = Some(Notification {
            seq: self.notifications_raised,
            message: message.into(),
            kind,
            created_at_ms: UnixTimeMs::now().as_millis(),
            duration_ms: kind.default_duration_ms(),
        });
    }

    pub fn clear_notification(&mut self) {
        self.notification = None;
    }

    /// Replaces the canonical list, substituting the placeholder for an empty one.
    pub fn replace_messages(&mut self, mut messages: Vec<Message>) {
        normalize_timeline(&mut messages);
        if messages.is_empty() {
            let text = self
                .session
                .as_ref()
                .map_or(crate::DEFAULT_PLACEHOLDER_TEXT, SessionConfig::placeholder_text);
            messages.push(Message::placeholder(text, UnixTimeMs::now()));
        }
        self.messages = messages;
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MessageView {
    pub id: String,
    pub text: String,
    pub created_at_ms: u64,
    pub author_id: String,
    pub author_name: String,
    pub is_mine: bool,
    pub image: Option<String>,
    pub location: Option<Location>,
    pub system: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NotificationView {
    pub seq: u64,
    pub message: String,
    pub kind: NotificationKind,
    pub duration_ms: u64,
}

impl From<&Notification> for NotificationView {
    fn from(n: &Notification) -> Self {
        Self {
            seq: n.seq,
            message: n.message.clone(),
            kind: n.kind,
            duration_ms: n.duration_ms,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct ViewModel {
    pub mode: SyncMode,
    pub messages: Vec<MessageView>,
    pub can_send: bool,
    pub is_offline: bool,
    pub sending_count: usize,
    pub notification: Option<NotificationView>,
    pub last_send_rejection: Option<SendRejection>,
}
