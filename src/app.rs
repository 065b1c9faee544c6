//! The synchronization state machine.
//!
//! Decides which message set is authoritative at every moment: the live
//! remote feed while reachable, the local mirror otherwise. Every transition
//! is a reaction to one discrete [`Event`]; results of superseded effects
//! (old subscriptions, old cache reads) are recognised by their ticket and
//! dropped.

use tracing::{debug, info, warn};

use crate::capabilities::{Capabilities, ConnectivityOutput, KvError, KvKey, RemoteError};
use crate::connectivity::SignalSource;
use crate::event::{Event, SessionConfig};
use crate::mirror;
use crate::model::{
    Message, MessageId, MessagePayload, MessageView, Model, NotificationKind, NotificationView,
    SendRejection, SessionId, SubscriptionId, SyncMode, ViewModel, WatchId,
};
use crate::remote::{messages_from_snapshot, NewRemoteDocument, RemoteEvent};
use crate::{SyncError, UnixTimeMs};

#[derive(Default)]
pub struct App;

/// The engine is the Crux app; the alias names its role.
pub type SyncEngine = App;

impl App {
    fn start_session(config: SessionConfig, model: &mut Model, caps: &Capabilities) {
        if let Err(error) = config.validate() {
            warn!(%error, "refusing to start chat session");
            model.notify(format!("Cannot open chat: {error}"), NotificationKind::Error);
            caps.render.render();
            return;
        }

        if model.is_running() {
            Self::end_session(model, caps);
        }

        info!(
            conversation = %config.conversation_id,
            user = %config.user.id,
            "chat session starting"
        );
        model.session = Some(config);
        model.session_id = Some(SessionId(model.next_ticket()));
        model.mode = SyncMode::Initializing;
        model.messages.clear();
        model.sending_count = 0;
        model.last_send_rejection = None;
        model.notification = None;
        model.connectivity.reset();

        let watch = WatchId(model.next_ticket());
        model.connectivity_watch = Some(watch);
        caps.connectivity
            .check(move |output| Event::ConnectivityChecked { watch, output });
        caps.connectivity
            .watch(watch, move |reading| Event::ConnectivityChanged { watch, reading });

        caps.render.render();
    }

    /// Releases every subscription. Returns whether anything was still active.
    fn end_session(model: &mut Model, caps: &Capabilities) -> bool {
        let mut released = false;

        if let Some(subscription) = model.remote_subscription.take() {
            caps.remote.unsubscribe(subscription);
            released = true;
        }
        if let Some(watch) = model.connectivity_watch.take() {
            caps.connectivity.unwatch(watch);
            released = true;
        }
        model.pending_load = None;
        model.session_id = None;
        model.sending_count = 0;
        model.connectivity.reset();

        if let Some(session) = model.session.take() {
            info!(conversation = %session.conversation_id, mode = %model.mode, "chat session ended");
            model.mode = SyncMode::Initializing;
            released = true;
        }
        released
    }

    fn on_reachability(source: SignalSource, reachable: bool, model: &mut Model, caps: &Capabilities) {
        if !model.is_running() {
            debug!(?source, reachable, "reachability reading outside a session");
            return;
        }

        let target = match (model.connectivity.observe(source, reachable), model.mode) {
            (Some(changed), _) => changed,
            (None, SyncMode::Initializing) => model.connectivity.current_state(),
            (None, _) => {
                debug!(?source, reachable, mode = %model.mode, "reachability unchanged");
                return;
            }
        };

        if target {
            Self::enter_online(model, caps);
        } else {
            Self::enter_offline(model, caps, None);
        }
    }

    fn enter_online(model: &mut Model, caps: &Capabilities) {
        if model.mode == SyncMode::OnlineLive {
            return;
        }
        let Some(conversation) = model.session.as_ref().map(|s| s.conversation_id.clone()) else {
            return;
        };

        let previous = model.mode;
        model.mode = SyncMode::OnlineLive;
        model.pending_load = None;
        if model.messages.is_empty() {
            model.replace_messages(Vec::new());
        }

        if let Some(stale) = model.remote_subscription.take() {
            caps.remote.unsubscribe(stale);
        }
        let subscription = SubscriptionId(model.next_ticket());
        model.remote_subscription = Some(subscription);
        caps.remote.subscribe(subscription, conversation, move |event| {
            Event::RemoteUpdated {
                subscription,
                event,
            }
        });

        info!(from = %previous, to = %model.mode, subscription = subscription.0, "mode transition");
        let text = if previous == SyncMode::OfflineCached {
            "Back online."
        } else {
            "Connected."
        };
        model.notify(text, NotificationKind::Success);
        caps.render.render();
    }

    /// `cause` is set when the live feed failed rather than the network.
    fn enter_offline(model: &mut Model, caps: &Capabilities, cause: Option<SyncError>) {
        if model.mode == SyncMode::OfflineCached {
            debug!("already serving from cache");
            return;
        }

        let previous = model.mode;
        model.mode = SyncMode::OfflineCached;
        if model.messages.is_empty() {
            model.replace_messages(Vec::new());
        }

        if let Some(subscription) = model.remote_subscription.take() {
            caps.remote.unsubscribe(subscription);
        }
        Self::load_mirror(model, caps);

        info!(from = %previous, to = %model.mode, "mode transition");
        let text = cause.map_or_else(
            || "You are offline. Showing saved messages.".to_string(),
            |error| error.user_facing_message(),
        );
        model.notify(text, NotificationKind::Warning);
        caps.render.render();
    }

    /// Logs a failure and raises an `Error` notification when it concerns the user.
    fn report(error: &SyncError, context: &str, model: &mut Model) {
        warn!(
            %error,
            code = error.code(),
            recoverable = error.is_recoverable(),
            "{}",
            context
        );
        if error.is_user_visible() {
            model.notify(error.user_facing_message(), NotificationKind::Error);
        }
    }

    fn mirror_key(model: &Model) -> Option<KvKey> {
        let session = model.session.as_ref()?;
        match mirror::storage_key(&session.conversation_id, &session.user.id) {
            Ok(key) => Some(key),
            Err(error) => {
                warn!(%error, "cannot derive cache key");
                None
            }
        }
    }

    fn load_mirror(model: &mut Model, caps: &Capabilities) {
        let Some(key) = Self::mirror_key(model) else {
            model.replace_messages(Vec::new());
            return;
        };
        let ticket = model.next_ticket();
        model.pending_load = Some(ticket);
        caps.kv
            .get(&key, move |result| Event::MirrorLoaded { ticket, result });
    }

    fn persist_mirror(messages: &[Message], model: &mut Model, caps: &Capabilities) {
        let Some(key) = Self::mirror_key(model) else {
            return;
        };
        match mirror::encode(messages, UnixTimeMs::now()) {
            Ok(bytes) => caps.kv.set(&key, bytes, Event::MirrorSaved),
            Err(e) => {
                let error = SyncError::CacheWriteFailure {
                    reason: e.to_string(),
                };
                Self::report(&error, "cannot encode messages for cache", model);
            }
        }
    }

    fn on_mirror_loaded(
        ticket: u64,
        result: Result<Option<Vec<u8>>, KvError>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        if model.pending_load != Some(ticket) || model.mode != SyncMode::OfflineCached {
            debug!(ticket, mode = %model.mode, "dropping superseded cache read");
            return;
        }
        model.pending_load = None;

        let messages = match result {
            Ok(Some(bytes)) => mirror::decode(&bytes),
            Ok(None) => {
                debug!("no cached messages");
                Vec::new()
            }
            Err(e) => {
                let error = SyncError::CacheReadFailure {
                    reason: e.to_string(),
                };
                Self::report(&error, "serving empty cache", model);
                Vec::new()
            }
        };

        info!(count = messages.len(), "showing cached messages");
        model.replace_messages(messages);
        caps.render.render();
    }

    fn on_remote_event(
        subscription: SubscriptionId,
        event: RemoteEvent,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        if model.remote_subscription != Some(subscription) || model.mode != SyncMode::OnlineLive {
            debug!(subscription = subscription.0, "dropping delivery from stale subscription");
            return;
        }

        match event {
            RemoteEvent::Snapshot(documents) => {
                let messages = messages_from_snapshot(documents);
                debug!(count = messages.len(), subscription = subscription.0, "remote snapshot");
                Self::persist_mirror(&messages, model, caps);
                model.replace_messages(messages);
                caps.render.render();
            }
            RemoteEvent::Failed(e) => {
                let error = SyncError::RemoteSubscriptionFailure {
                    reason: e.to_string(),
                };
                warn!(%error, subscription = subscription.0, "live feed failed, falling back to cache");
                Self::enter_offline(model, caps, Some(error));
            }
        }
    }

    fn reject_send(rejection: SendRejection, model: &mut Model, caps: &Capabilities) {
        info!(?rejection, "send rejected");
        let text = match &rejection {
            SendRejection::NoSession => "Chat is not open.".to_string(),
            SendRejection::Offline => "You are offline. Messages can't be sent right now.".to_string(),
            SendRejection::Invalid { message } => format!("Message not sent: {message}"),
        };
        model.notify(text, NotificationKind::Warning);
        model.last_send_rejection = Some(rejection);
        caps.render.render();
    }

    fn send(payload: MessagePayload, model: &mut Model, caps: &Capabilities) {
        let (session, conversation, author) = match (model.session_id, &model.session) {
            (Some(id), Some(config)) => (id, config.conversation_id.clone(), config.user.clone()),
            _ => return Self::reject_send(SendRejection::NoSession, model, caps),
        };
        if !model.mode.can_send() {
            return Self::reject_send(SendRejection::Offline, model, caps);
        }
        if let Err(error) = payload.validate() {
            let rejection = SendRejection::Invalid {
                message: error.to_string(),
            };
            return Self::reject_send(rejection, model, caps);
        }

        let document = NewRemoteDocument::from_payload(payload, &author);
        model.sending_count += 1;
        model.last_send_rejection = None;
        caps.remote.append(conversation, document, move |result| {
            Event::AppendCompleted { session, result }
        });
        caps.render.render();
    }

    fn on_append_completed(
        session: SessionId,
        result: Result<MessageId, RemoteError>,
        model: &mut Model,
        caps: &Capabilities,
    ) {
        if model.session_id != Some(session) {
            debug!(session = session.0, "append completed for an ended session");
            return;
        }
        model.sending_count = model.sending_count.saturating_sub(1);

        match result {
            // The message shows up with the next live snapshot.
            Ok(id) => debug!(message = %id, mode = %model.mode, "message appended"),
            Err(e) => {
                let error = SyncError::SendFailure {
                    reason: e.to_string(),
                };
                Self::report(&error, "send failed", model);
            }
        }
        caps.render.render();
    }
}

impl crux_core::App for App {
    type Event = Event;
    type Model = Model;
    type ViewModel = ViewModel;
    type Capabilities = Capabilities;

    fn update(&self, event: Self::Event, model: &mut Self::Model, caps: &Self::Capabilities) {
        debug!(event = event.name(), mode = %model.mode, "update");

        match event {
            Event::StartSession(config) => Self::start_session(config, model, caps),

            Event::EndSession => {
                if Self::end_session(model, caps) {
                    caps.render.render();
                }
            }

            Event::NetworkStatusChanged { online } => {
                Self::on_reachability(SignalSource::Injected, online, model, caps);
            }

            Event::ConnectivityChecked { watch, output } => {
                if model.connectivity_watch != Some(watch) {
                    debug!(watch = watch.0, "dropping initial reading from an ended session");
                    return;
                }
                let reachable = match output {
                    ConnectivityOutput::Reading { online } => online,
                    ConnectivityOutput::Unavailable { reason } => {
                        let error = SyncError::ConnectivityUnknown { reason };
                        Self::report(&error, "treating unknown reachability as offline", model);
                        false
                    }
                };
                Self::on_reachability(SignalSource::Polled, reachable, model, caps);
            }

            Event::ConnectivityChanged { watch, reading } => {
                if model.connectivity_watch != Some(watch) {
                    debug!(watch = watch.0, "dropping reading from stale watch");
                    return;
                }
                Self::on_reachability(SignalSource::Polled, reading.is_reachable(), model, caps);
            }

            Event::RemoteUpdated {
                subscription,
                event,
            } => Self::on_remote_event(subscription, event, model, caps),

            Event::MirrorLoaded { ticket, result } => {
                Self::on_mirror_loaded(ticket, result, model, caps);
            }

            Event::MirrorSaved(result) => match result {
                Ok(()) => debug!("messages cached"),
                Err(e) => {
                    let retryable = e.is_retryable();
                    let error = SyncError::CacheWriteFailure {
                        reason: e.to_string(),
                    };
                    Self::report(&error, "cache write failed", model);
                    debug!(retryable, "cache write not retried");
                }
            },

            Event::SendRequested(payload) => Self::send(payload, model, caps),

            Event::AppendCompleted { session, result } => {
                Self::on_append_completed(session, result, model, caps);
            }

            Event::DismissNotification => {
                if model.notification.is_some() {
                    model.clear_notification();
                    caps.render.render();
                }
            }
        }
    }

    fn view(&self, model: &Self::Model) -> Self::ViewModel {
        let me = model.session.as_ref().map(|s| &s.user.id);
        let messages = model
            .messages
            .iter()
            .map(|m| MessageView {
                id: m.id.to_string(),
                text: m.text.clone(),
                created_at_ms: m.created_at.as_millis(),
                author_id: m.author.id.to_string(),
                author_name: m.author.display_name.clone(),
                is_mine: !m.system && me == Some(&m.author.id),
                image: m.image.clone(),
                location: m.location,
                system: m.system,
            })
            .collect();

        ViewModel {
            mode: model.mode,
            messages,
            can_send: model.can_send(),
            is_offline: model.mode == SyncMode::OfflineCached,
            sending_count: model.sending_count,
            notification: model.notification.as_ref().map(NotificationView::from),
            last_send_rejection: model.last_send_rejection.clone(),
        }
    }
}
