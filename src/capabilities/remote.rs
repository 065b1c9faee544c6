use crux_core::capability::{CapabilityContext, Operation};
use crux_core::macros::Capability;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ConversationId, MessageId, SubscriptionId};
use crate::remote::{NewRemoteDocument, RemoteDocument, RemoteEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteOperation {
    /// Live, ordered feed of the whole conversation. Each delivery is a full snapshot.
    Subscribe {
        subscription_id: SubscriptionId,
        conversation: ConversationId,
    },
    /// The shell must accept unknown or already closed ids.
    Unsubscribe { subscription_id: SubscriptionId },
    Append {
        conversation: ConversationId,
        document: NewRemoteDocument,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RemoteOutput {
    Snapshot { documents: Vec<RemoteDocument> },
    Appended { id: MessageId },
    Failed { error: RemoteError },
}

impl Operation for RemoteOperation {
    type Output = RemoteOutput;
}

#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum RemoteError {
    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("permission denied")]
    PermissionDenied,

    #[error("rejected by server: {reason}")]
    Rejected { reason: String },

    #[error("unexpected {output} output for {operation}")]
    UnexpectedOutput { operation: String, output: String },
}

impl RemoteError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// The remote document store, keyed by conversation.
#[derive(Capability)]
pub struct Remote<Ev> {
    context: CapabilityContext<RemoteOperation, Ev>,
}

impl<Ev> Remote<Ev>
where
    Ev: 'static,
{
    pub fn new(context: CapabilityContext<RemoteOperation, Ev>) -> Self {
        Self { context }
    }

    /// Delivers snapshots until the first failure, which ends the subscription.
    pub fn subscribe<F>(
        &self,
        subscription_id: SubscriptionId,
        conversation: ConversationId,
        make_event: F,
    ) where
        F: Fn(RemoteEvent) -> Ev + Send + 'static,
    {
        self.context.spawn({
            let context = self.context.clone();
            async move {
                let mut deliveries = context.stream_from_shell(RemoteOperation::Subscribe {
                    subscription_id,
                    conversation,
                });
                while let Some(output) = deliveries.next().await {
                    let event = match output {
                        RemoteOutput::Snapshot { documents } => RemoteEvent::Snapshot(documents),
                        RemoteOutput::Failed { error } => RemoteEvent::Failed(error),
                        RemoteOutput::Appended { .. } => {
                            RemoteEvent::Failed(RemoteError::UnexpectedOutput {
                                operation: "subscribe".into(),
                                output: "appended".into(),
                            })
                        }
                    };
                    let failed = matches!(event, RemoteEvent::Failed(_));
                    context.update_app(make_event(event));
                    if failed {
                        break;
                    }
                }
            }
        });
    }

    pub fn unsubscribe(&self, subscription_id: SubscriptionId) {
        self.context.spawn({
            let context = self.context.clone();
            async move {
                context
                    .notify_shell(RemoteOperation::Unsubscribe { subscription_id })
                    .await;
            }
        });
    }

    pub fn append<F>(&self, conversation: ConversationId, document: NewRemoteDocument, make_event: F)
    where
        F: FnOnce(Result<MessageId, RemoteError>) -> Ev + Send + 'static,
    {
        self.context.spawn({
            let context = self.context.clone();
            async move {
                let result = match context
                    .request_from_shell(RemoteOperation::Append {
                        conversation,
                        document,
                    })
                    .await
                {
                    RemoteOutput::Appended { id } => Ok(id),
                    RemoteOutput::Failed { error } => Err(error),
                    RemoteOutput::Snapshot { .. } => Err(RemoteError::UnexpectedOutput {
                        operation: "append".into(),
                        output: "snapshot".into(),
                    }),
                };
                context.update_app(make_event(result));
            }
        });
    }
}
