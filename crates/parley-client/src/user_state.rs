//! Handlers for the global `user-state:{user_id}` topic.

use tracing::{debug, info};

use parley_shared::protocol::UserStateEvent;
use parley_store::{ChannelSubscriptions, Counter};

use crate::engine::SyncEngine;
use crate::error::Result;
use crate::notifications::ClientNotification;

impl SyncEngine {
    pub(crate) fn handle_user_state_event(&mut self, payload: &serde_json::Value) -> Result<()> {
        match UserStateEvent::decode(payload)? {
            UserStateEvent::TrackingState(delta) => {
                self.tracking.apply_delta(&mut self.channels, &delta);
            }

            UserStateEvent::BulkTrackingState(snapshot) => {
                self.tracking.apply_snapshot(&mut self.channels, &snapshot);
            }

            UserStateEvent::HasThreads { has_threads } => {
                self.has_threads = has_threads;
            }

            UserStateEvent::NewMentions {
                channel_id,
                message_id,
                thread_id,
            } => {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    if thread_id.is_none() && !channel.membership.has_read(message_id) {
                        channel.tracking.increment(Counter::Mention);
                    }
                }
                self.notifier.notify(ClientNotification::NewMention {
                    channel_id,
                    message_id,
                    thread_id,
                });
            }

            UserStateEvent::Kick { channel_id } => {
                info!(channel = %channel_id, "Removed from channel");
                self.channels.remove(channel_id, &mut self.subscriptions);
                self.notifier
                    .notify(ClientNotification::Kicked { channel_id });
            }

            UserStateEvent::NewChannel { channel } => {
                let channel_id = channel.id;
                info!(channel = %channel_id, "Joined new channel");
                let channel = self.channels.store(channel);
                if channel.membership.following {
                    self.subscriptions.start_channel_subscription(channel);
                }
                self.notifier
                    .notify(ClientNotification::ChannelJoined { channel_id });
            }

            UserStateEvent::Notice {
                channel_id,
                text_content,
            } => {
                self.notifier.notify(ClientNotification::Notice {
                    channel_id,
                    text: text_content,
                });
            }

            UserStateEvent::SelfFlagged {
                channel_id,
                chat_message_id,
                user_flag_status,
            } => {
                let message = self
                    .channels
                    .get_mut(channel_id)
                    .and_then(|c| c.find_message_mut(chat_message_id));
                if let Some(message) = message {
                    message.set_user_flag_status(user_flag_status);
                }
            }

            UserStateEvent::ChannelStatus { channel_id, status } => {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    debug!(channel = %channel_id, ?status, "Channel status changed");
                    channel.status = status;
                }
            }

            UserStateEvent::ChannelEdits {
                channel_id,
                title,
                slug,
                description,
            } => {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    if let Some(title) = title {
                        channel.title = title;
                    }
                    if slug.is_some() {
                        channel.slug = slug;
                    }
                    if description.is_some() {
                        channel.description = description;
                    }
                }
            }

            UserStateEvent::ChannelMetadata {
                channel_id,
                memberships_count,
            } => {
                if let Some(channel) = self.channels.get_mut(channel_id) {
                    channel.memberships_count = memberships_count;
                }
            }

            UserStateEvent::Unknown => {
                debug!("Ignoring unknown user-state event");
            }
        }
        Ok(())
    }
}
