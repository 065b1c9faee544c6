#![allow(dead_code)]

use chat_sync::capabilities::{
    ConnectivityOperation, ConnectivityOutput, KvOperation, RemoteOperation, RemoteOutput,
};
use chat_sync::remote::{RemoteDocument, RemoteUser};
use chat_sync::store::{KvStore, MemoryKvStore};
use chat_sync::{App, Author, Effect, Event, Model, SessionConfig, ViewModel};
use crux_core::testing::AppTester;
use crux_core::Request;

pub const ROOM: &str = "room-42";

pub fn me() -> Author {
    Author::new("u1", "Ann")
}

pub fn config() -> SessionConfig {
    SessionConfig::new(ROOM, me())
}

pub fn doc(id: &str, created_at_ms: u64) -> RemoteDocument {
    RemoteDocument {
        id: id.into(),
        text: format!("text of {id}"),
        created_at_ms,
        user: RemoteUser {
            id: "u2".into(),
            name: "Bob".into(),
        },
        image: None,
        location: None,
    }
}

/// Operations the core asked the shell for during one step.
#[derive(Debug, Default)]
pub struct Outcome {
    pub connectivity: Vec<ConnectivityOperation>,
    pub kv: Vec<KvOperation>,
    pub remote: Vec<RemoteOperation>,
    pub renders: usize,
}

impl Outcome {
    pub fn is_empty(&self) -> bool {
        self.connectivity.is_empty() && self.kv.is_empty() && self.remote.is_empty() && self.renders == 0
    }

    pub fn subscribed(&self) -> bool {
        self.remote
            .iter()
            .any(|op| matches!(op, RemoteOperation::Subscribe { .. }))
    }

    pub fn unsubscribed(&self) -> bool {
        self.remote
            .iter()
            .any(|op| matches!(op, RemoteOperation::Unsubscribe { .. }))
    }

    pub fn appends(&self) -> Vec<&RemoteOperation> {
        self.remote
            .iter()
            .filter(|op| matches!(op, RemoteOperation::Append { .. }))
            .collect()
    }

    pub fn cache_writes(&self) -> Vec<(&str, &[u8])> {
        self.kv
            .iter()
            .filter_map(|op| match op {
                KvOperation::Set { key, value } => Some((key.as_str(), value.as_slice())),
                KvOperation::Get { .. } => None,
            })
            .collect()
    }

    pub fn cache_reads(&self) -> usize {
        self.kv
            .iter()
            .filter(|op| matches!(op, KvOperation::Get { .. }))
            .count()
    }

    fn absorb(&mut self, other: Outcome) {
        self.connectivity.extend(other.connectivity);
        self.kv.extend(other.kv);
        self.remote.extend(other.remote);
        self.renders += other.renders;
    }
}

/// Plays the shell: keeps open streams, answers storage requests from `store`.
pub struct Shell {
    pub app: AppTester<App, Effect>,
    pub model: Model,
    pub store: Box<dyn KvStore>,
    /// When false, storage requests queue up in `kv_pending`.
    pub auto_kv: bool,
    pub kv_pending: Vec<Request<KvOperation>>,
    pub checks: Vec<Request<ConnectivityOperation>>,
    pub watch: Option<Request<ConnectivityOperation>>,
    /// Every subscription ever opened, oldest first.
    pub feeds: Vec<Request<RemoteOperation>>,
    pub appends: Vec<Request<RemoteOperation>>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::with_store(Box::new(MemoryKvStore::new()))
    }
}

impl Shell {
    pub fn with_store(store: Box<dyn KvStore>) -> Self {
        Self {
            app: AppTester::<App, Effect>::default(),
            model: Model::default(),
            store,
            auto_kv: true,
            kv_pending: Vec::new(),
            checks: Vec::new(),
            watch: None,
            feeds: Vec::new(),
            appends: Vec::new(),
        }
    }

    pub fn view(&self) -> ViewModel {
        self.app.view(&self.model)
    }

    pub fn dispatch(&mut self, event: Event) -> Outcome {
        let update = self.app.update(event, &mut self.model);
        self.settle(update.effects, update.events)
    }

    fn settle(&mut self, effects: Vec<Effect>, events: Vec<Event>) -> Outcome {
        let mut outcome = Outcome::default();
        for effect in effects {
            let more = self.route(effect);
            outcome.absorb(more);
        }
        for event in events {
            let more = self.dispatch(event);
            outcome.absorb(more);
        }
        outcome
    }

    fn route(&mut self, effect: Effect) -> Outcome {
        let mut outcome = Outcome::default();
        match effect {
            Effect::Connectivity(request) => {
                outcome.connectivity.push(request.operation.clone());
                match request.operation {
                    ConnectivityOperation::Check => self.checks.push(request),
                    ConnectivityOperation::Watch { .. } => self.watch = Some(request),
                    ConnectivityOperation::Unwatch { .. } => {}
                }
            }
            Effect::Remote(request) => {
                outcome.remote.push(request.operation.clone());
                match request.operation {
                    RemoteOperation::Subscribe { .. } => self.feeds.push(request),
                    RemoteOperation::Append { .. } => self.appends.push(request),
                    RemoteOperation::Unsubscribe { .. } => {}
                }
            }
            Effect::KeyValue(mut request) => {
                outcome.kv.push(request.operation.clone());
                if self.auto_kv {
                    let output = self.store.handle(&request.operation);
                    let update = self
                        .app
                        .resolve(&mut request, output)
                        .expect("storage request resolves");
                    outcome.absorb(self.settle(update.effects, update.events));
                } else {
                    self.kv_pending.push(request);
                }
            }
            Effect::Render(_) => outcome.renders += 1,
        }
        outcome
    }

    pub fn start(&mut self) -> Outcome {
        self.dispatch(Event::StartSession(config()))
    }

    /// Starts a session and answers the initial reachability check.
    pub fn start_with(&mut self, online: bool) -> Outcome {
        let mut outcome = self.start();
        outcome.absorb(self.answer_check(ConnectivityOutput::Reading { online }));
        outcome
    }

    /// Answers the most recent initial-reachability request.
    pub fn answer_check(&mut self, output: ConnectivityOutput) -> Outcome {
        let latest = self.checks.len().checked_sub(1).expect("a pending reachability check");
        self.answer_check_at(latest, output)
    }

    /// Answers one of the initial-reachability requests, oldest first.
    pub fn answer_check_at(&mut self, index: usize, output: ConnectivityOutput) -> Outcome {
        let mut check = self.checks.remove(index);
        let update = self
            .app
            .resolve(&mut check, output)
            .expect("reachability check resolves");
        self.settle(update.effects, update.events)
    }

    /// Pushes a reading through the open connectivity watch.
    pub fn watch_reports(&mut self, online: bool) -> Outcome {
        let mut watch = self.watch.take().expect("an open watch");
        let update = self
            .app
            .resolve(&mut watch, ConnectivityOutput::Reading { online })
            .expect("watch resolves");
        self.watch = Some(watch);
        self.settle(update.effects, update.events)
    }

    pub fn host_reports(&mut self, online: bool) -> Outcome {
        self.dispatch(Event::NetworkStatusChanged { online })
    }

    pub fn deliver_on(&mut self, feed: usize, output: RemoteOutput) -> Outcome {
        let mut request = self.feeds.remove(feed);
        let update = self
            .app
            .resolve(&mut request, output)
            .expect("feed resolves");
        self.feeds.insert(feed, request);
        self.settle(update.effects, update.events)
    }

    /// Delivers a snapshot on the most recent subscription.
    pub fn deliver(&mut self, documents: Vec<RemoteDocument>) -> Outcome {
        let latest = self.feeds.len() - 1;
        self.deliver_on(latest, RemoteOutput::Snapshot { documents })
    }

    pub fn complete_append(&mut self, output: RemoteOutput) -> Outcome {
        let mut request = self.appends.remove(0);
        let update = self
            .app
            .resolve(&mut request, output)
            .expect("append resolves");
        self.settle(update.effects, update.events)
    }

    pub fn resolve_pending_kv(&mut self, output: chat_sync::capabilities::KvResult) -> Outcome {
        let mut request = self.kv_pending.remove(0);
        let update = self
            .app
            .resolve(&mut request, output)
            .expect("storage request resolves");
        self.settle(update.effects, update.events)
    }

    pub fn message_ids(&self) -> Vec<String> {
        self.model
            .messages
            .iter()
            .map(|m| m.id.to_string())
            .collect()
    }
}
