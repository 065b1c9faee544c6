//! Reachability arbitration.
//!
//! Two partially redundant signals reach the core: the host pushes its own
//! network flag ([`SignalSource::Injected`]) and the connectivity capability
//! is polled/watched directly ([`SignalSource::Polled`]). They are collapsed
//! into a single boolean here. Offline wins: once both sources have reported,
//! the feed counts as reachable only while both say so.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    Injected,
    Polled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(bool) + Send>;

#[derive(Default)]
pub struct ConnectivityMonitor {
    injected: Option<bool>,
    polled: Option<bool>,
    combined: Option<bool>,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener: u64,
}

impl ConnectivityMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reachability as currently arbitrated. Unknown counts as unreachable.
    #[must_use]
    pub fn current_state(&self) -> bool {
        self.combined.unwrap_or(false)
    }

    /// Records a reading and returns the new combined state only if it changed.
    ///
    /// Listeners run once per actual transition, never for repeated identical
    /// readings or for a source flip the other source overrules.
    pub fn observe(&mut self, source: SignalSource, reachable: bool) -> Option<bool> {
        match source {
            SignalSource::Injected => self.injected = Some(reachable),
            SignalSource::Polled => self.polled = Some(reachable),
        }

        let combined = self.arbitrate();
        if combined == self.combined {
            return None;
        }
        self.combined = combined;

        let reachable = combined?;
        for (_, listener) in &mut self.listeners {
            listener(reachable);
        }
        Some(reachable)
    }

    fn arbitrate(&self) -> Option<bool> {
        match (self.injected, self.polled) {
            (None, None) => None,
            (Some(only), None) | (None, Some(only)) => Some(only),
            (Some(injected), Some(polled)) => Some(injected && polled),
        }
    }

    pub fn subscribe<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(bool) + Send + 'static,
    {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns whether the listener was still registered. Safe to call twice.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Forgets all readings and listeners.
    pub fn reset(&mut self) {
        self.injected = None;
        self.polled = None;
        self.combined = None;
        self.listeners.clear();
    }
}

impl fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("injected", &self.injected)
            .field("polled", &self.polled)
            .field("combined", &self.combined)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}
