use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

use crate::model::WatchId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityOperation {
    /// One reading of current reachability.
    Check,
    /// Stream of readings until unwatched.
    Watch { watch_id: WatchId },
    /// Stop a watch. The shell must accept unknown or already stopped ids.
    Unwatch { watch_id: WatchId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectivityOutput {
    Reading { online: bool },
    Unavailable { reason: String },
}

impl ConnectivityOutput {
    /// Fail-safe interpretation: an unknown state is unreachable.
    #[must_use]
    pub fn is_reachable(&self) -> bool {
        matches!(self, Self::Reading { online: true })
    }
}

impl Operation for ConnectivityOperation {
    type Output = ConnectivityOutput;
}

/// Device network reachability, as seen by the platform.
#[derive(Capability)]
pub struct Connectivity<Ev> {
    context: CapabilityContext<ConnectivityOperation, Ev>,
}

impl<Ev> Connectivity<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<ConnectivityOperation, Ev>) -> Self {
        Self { context }
    }

    pub fn check<F>(&self, make_event: F)
    where
        F: FnOnce(ConnectivityOutput) -> Ev + Send + 'static,
    {
        self.context.spawn({
            let context = self.context.clone();
            async move {
                let output = context
                    .request_from_shell(ConnectivityOperation::Check)
                    .await;
                context.update_app(make_event(output));
            }
        });
    }

    pub fn watch<F>(&self, watch_id: WatchId, make_event: F)
    where
        F: Fn(ConnectivityOutput) -> Ev + Send + 'static,
    {
        self.context.spawn({
            let context = self.context.clone();
            async move {
                let mut readings =
                    context.stream_from_shell(ConnectivityOperation::Watch { watch_id });
                while let Some(reading) = readings.next().await {
                    context.update_app(make_event(reading));
                }
            }
        });
    }

    pub fn unwatch(&self, watch_id: WatchId) {
        self.context.spawn({
            let context = self.context.clone();
            async move {
                context
                    .notify_shell(ConnectivityOperation::Unwatch { watch_id })
                    .await;
            }
        });
    }
}
