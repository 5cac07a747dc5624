//! Topic subscription registry and sequence-gap detection.
//!
//! The registry is the only place that knows which topics are live. The
//! bus transport itself runs elsewhere; it is told to open or close topics
//! through [`TransportCommand`]s and feeds envelopes back into the engine.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use parley_shared::constants::UNSEEN_SEQUENCE_ID;
use parley_shared::{ChannelId, ThreadId, Topic, UserId};
use parley_store::{Channel, ChannelSubscriptions};

/// Instructions for the bus transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCommand {
    /// Start delivering `topic`, resuming after `last_seen` (`-1` for
    /// "from now on").
    Subscribe { topic: Topic, last_seen: i64 },
    Unsubscribe { topic: Topic },
}

/// Which handler set receives a topic's events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicHandler {
    Channel(ChannelId),
    Thread(ChannelId, ThreadId),
    UserState(UserId),
}

impl TopicHandler {
    pub fn for_topic(topic: &Topic) -> Self {
        match *topic {
            Topic::Channel(channel) => TopicHandler::Channel(channel),
            Topic::Thread(channel, thread) => TopicHandler::Thread(channel, thread),
            Topic::UserState(user) => TopicHandler::UserState(user),
        }
    }
}

/// A sequence id that did not follow the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    pub expected: i64,
    pub received: i64,
}

/// Result of admitting an envelope for a subscribed topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    pub handler: TopicHandler,
    pub gap: Option<Gap>,
}

#[derive(Debug)]
struct Subscription {
    handler: TopicHandler,
    last_sequence_id: i64,
}

#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    topics: HashMap<Topic, Subscription>,
    transport: Option<mpsc::UnboundedSender<TransportCommand>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that forwards subscribe/unsubscribe commands to the
    /// transport.
    pub fn with_transport(transport: mpsc::UnboundedSender<TransportCommand>) -> Self {
        Self {
            topics: HashMap::new(),
            transport: Some(transport),
        }
    }

    fn send(&self, command: TransportCommand) {
        let Some(transport) = &self.transport else {
            return;
        };
        if transport.send(command).is_err() {
            warn!("Bus transport is gone, command dropped");
        }
    }

    /// Register `topic`. Subscribing to a topic that is already live is a
    /// no-op and keeps its current sequence id. Returns whether a new
    /// subscription was created.
    pub fn subscribe(
        &mut self,
        topic: Topic,
        handler: TopicHandler,
        resume_from: Option<i64>,
    ) -> bool {
        if self.topics.contains_key(&topic) {
            return false;
        }
        let last_seen = resume_from.unwrap_or(UNSEEN_SEQUENCE_ID);
        debug!(topic = %topic, last_seen, "Subscribing");
        self.topics.insert(
            topic,
            Subscription {
                handler,
                last_sequence_id: last_seen,
            },
        );
        self.send(TransportCommand::Subscribe { topic, last_seen });
        true
    }

    /// Drop `topic`. Events for it still sitting in the queue are discarded
    /// on arrival. Returns whether the topic was subscribed.
    pub fn unsubscribe(&mut self, topic: &Topic) -> bool {
        if self.topics.remove(topic).is_none() {
            return false;
        }
        debug!(topic = %topic, "Unsubscribing");
        self.send(TransportCommand::Unsubscribe { topic: *topic });
        true
    }

    /// Drop every thread topic of `channel_id`.
    pub fn unsubscribe_threads(&mut self, channel_id: ChannelId) {
        let threads: Vec<Topic> = self
            .topics
            .keys()
            .filter(|t| matches!(t, Topic::Thread(c, _) if *c == channel_id))
            .copied()
            .collect();
        for topic in threads {
            self.unsubscribe(&topic);
        }
    }

    pub fn is_subscribed(&self, topic: &Topic) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn last_sequence_id(&self, topic: &Topic) -> Option<i64> {
        self.topics.get(topic).map(|s| s.last_sequence_id)
    }

    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.topics.keys()
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    /// Admit an inbound event. `None` when the topic is not subscribed.
    ///
    /// A gap is reported when a sequence id has been seen and `sequence_id`
    /// is not its successor. The stored id always moves to `sequence_id`,
    /// so one gap is reported once.
    pub fn accept(&mut self, topic: &Topic, sequence_id: i64) -> Option<Admitted> {
        let subscription = self.topics.get_mut(topic)?;
        let last = subscription.last_sequence_id;

        let gap = (last >= 0 && sequence_id != last + 1).then_some(Gap {
            expected: last + 1,
            received: sequence_id,
        });
        subscription.last_sequence_id = sequence_id;

        Some(Admitted {
            handler: subscription.handler,
            gap,
        })
    }
}

impl ChannelSubscriptions for SubscriptionRegistry {
    fn start_channel_subscription(&mut self, channel: &Channel) {
        self.subscribe(
            channel.topic(),
            TopicHandler::Channel(channel.id),
            channel.last_seen_sequence_id,
        );
    }

    fn stop_channel_subscription(&mut self, channel_id: ChannelId) {
        self.unsubscribe_threads(channel_id);
        self.unsubscribe(&channel_id.to_topic());
    }
}
