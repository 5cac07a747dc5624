//! Outbound signals for collaborators outside the sync core (desync
//! recovery, notification UI, badges).

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{error, warn};

use parley_shared::{ChannelId, MessageId, StagedId, ThreadId, Topic};
use parley_store::TrackingTotals;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientNotification {
    /// A sequence gap was detected; the recovery collaborator should
    /// refetch the topic's state.
    Desync {
        topic: Topic,
        expected: i64,
        received: i64,
    },
    Kicked {
        channel_id: ChannelId,
    },
    NewMention {
        channel_id: ChannelId,
        message_id: MessageId,
        thread_id: Option<ThreadId>,
    },
    Notice {
        channel_id: ChannelId,
        text: String,
    },
    ChannelJoined {
        channel_id: ChannelId,
    },
    SendFailed {
        channel_id: ChannelId,
        staged_id: StagedId,
        error: String,
    },
    TrackingChanged(TrackingTotals),
}

/// Non-blocking sender half. Without a receiver attached, notifications are
/// dropped silently.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::Sender<ClientNotification>>,
}

impl Notifier {
    pub fn new(tx: mpsc::Sender<ClientNotification>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A notifier plus the receiver to hand to the consumer.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ClientNotification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    pub fn notify(&self, notification: ClientNotification) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(notification) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) => {
                warn!(notification = ?dropped, "Notification queue full, dropping");
            }
            Err(TrySendError::Closed(_)) => {
                error!("Notification receiver dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let (notifier, mut rx) = Notifier::channel(1);
        notifier.notify(ClientNotification::Kicked { channel_id: ChannelId(1) });
        notifier.notify(ClientNotification::Kicked { channel_id: ChannelId(2) });

        assert_eq!(
            rx.try_recv().unwrap(),
            ClientNotification::Kicked { channel_id: ChannelId(1) }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn detached_notifier_is_a_no_op() {
        Notifier::default().notify(ClientNotification::ChannelJoined { channel_id: ChannelId(1) });
    }
}
