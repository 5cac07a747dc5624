//! Handlers for events on channel and thread topics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use parley_shared::protocol::{ChannelEvent, MessagePayload};
use parley_shared::{ChannelId, MessageId, StagedId, ThreadId, Topic, UserId};
use parley_store::{Channel, Counter, Lookup, MentionWarning, ThreadActivity};

use crate::engine::SyncEngine;
use crate::error::Result;
use crate::staged::{self, Reconciled};

impl SyncEngine {
    /// Resolve `channel_id` (and `thread_id` for thread topics), fetching
    /// what is missing. Returns false when the topic was closed or the
    /// entity evicted while fetching.
    async fn resolve_target(
        &mut self,
        topic: Topic,
        channel_id: ChannelId,
        thread_id: Option<ThreadId>,
    ) -> Result<bool> {
        let api = Arc::clone(&self.api);
        let Some(channel) = self
            .channels
            .find(channel_id, api.as_ref(), Lookup::FetchIfMissing)
            .await?
        else {
            return Ok(false);
        };
        if let Some(thread_id) = thread_id {
            channel
                .threads_mut()
                .find(thread_id, api.as_ref(), Lookup::FetchIfMissing)
                .await?;
        }

        let still_cached = match thread_id {
            Some(thread_id) => self
                .channels
                .get(channel_id)
                .is_some_and(|c| c.threads().contains(thread_id)),
            None => self.channels.contains(channel_id),
        };
        Ok(still_cached && self.subscriptions.is_subscribed(&topic))
    }

    /// Make sure the thread a channel-topic reply belongs to is cached, so
    /// its tracking can be updated. A failed fetch only costs the thread
    /// tracking; the message itself is still applied. Returns false when the
    /// channel or topic went away meanwhile.
    async fn resolve_reply_thread(
        &mut self,
        topic: Topic,
        channel_id: ChannelId,
        thread_id: ThreadId,
    ) -> bool {
        let api = Arc::clone(&self.api);
        if let Some(channel) = self.channels.get_mut(channel_id) {
            if channel.threading_enabled && !channel.threads().contains(thread_id) {
                let fetched = channel
                    .threads_mut()
                    .find(thread_id, api.as_ref(), Lookup::FetchIfMissing)
                    .await;
                if let Err(e) = fetched {
                    warn!(
                        channel = %channel_id,
                        thread = %thread_id,
                        error = %e,
                        "Thread fetch failed"
                    );
                }
            }
        }
        self.channels.contains(channel_id) && self.subscriptions.is_subscribed(&topic)
    }

    pub(crate) async fn handle_channel_event(
        &mut self,
        topic: Topic,
        channel_id: ChannelId,
        thread_id: Option<ThreadId>,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let event = ChannelEvent::decode(payload)?;
        if matches!(event, ChannelEvent::Unknown) {
            debug!(topic = %topic, "Ignoring unknown channel event");
            return Ok(());
        }

        if !self.resolve_target(topic, channel_id, thread_id).await? {
            debug!(topic = %topic, "Target gone after fetch, dropping event");
            return Ok(());
        }
        if let (None, ChannelEvent::Sent { chat_message, .. }) = (thread_id, &event) {
            if let Some(reply_thread) = chat_message.thread_id {
                if !self.resolve_reply_thread(topic, channel_id, reply_thread).await {
                    debug!(topic = %topic, "Channel gone after thread fetch, dropping event");
                    return Ok(());
                }
            }
        }
        let current_user = self.current_user;
        let Some(channel) = self.channels.get_mut(channel_id) else {
            return Ok(());
        };

        match event {
            ChannelEvent::Sent {
                chat_message,
                staged_id,
            } => match thread_id {
                Some(thread_id) => {
                    let staged_id = staged_id.as_ref();
                    staged::reconcile_in_channel(
                        channel,
                        Some(thread_id),
                        &chat_message,
                        staged_id,
                        current_user,
                    );
                }
                None => on_channel_sent(channel, &chat_message, staged_id.as_ref(), current_user),
            },

            ChannelEvent::Reaction {
                chat_message_id,
                emoji,
                action,
                user,
            } => {
                if let Some(message) = channel.find_message_in_mut(thread_id, chat_message_id) {
                    message.react(&emoji, action, user.id, current_user);
                }
            }

            ChannelEvent::Processed { chat_message } => {
                if let Some(message) = channel.find_message_in_mut(thread_id, chat_message.id) {
                    message.apply_render(&chat_message, true);
                }
            }

            ChannelEvent::Refresh { chat_message } => {
                if let Some(message) = channel.find_message_in_mut(thread_id, chat_message.id) {
                    message.apply_render(&chat_message, false);
                }
            }

            ChannelEvent::Edit { chat_message } => {
                if let Some(message) = channel.find_message_in_mut(thread_id, chat_message.id) {
                    message.apply_edit(&chat_message);
                }
            }

            ChannelEvent::Delete {
                deleted_id,
                deleted_at,
                deleted_by_id,
            } => {
                let at = deleted_at.unwrap_or_else(Utc::now);
                on_delete(channel, thread_id, deleted_id, at, deleted_by_id, current_user);
            }

            ChannelEvent::BulkDelete {
                deleted_ids,
                deleted_at,
            } => {
                let at = deleted_at.unwrap_or_else(Utc::now);
                for id in deleted_ids {
                    on_delete(channel, thread_id, id, at, None, current_user);
                }
            }

            ChannelEvent::Restore { chat_message } => {
                match channel.find_message_in_mut(thread_id, chat_message.id) {
                    Some(message) => {
                        message.apply_edit(&chat_message);
                        message.restore();
                    }
                    None => {
                        let list = channel.message_list_mut(thread_id.or(chat_message.thread_id));
                        staged::reconcile(list, channel_id, &chat_message, None, current_user);
                    }
                }
            }

            ChannelEvent::MentionWarning {
                chat_message_id,
                cannot_see,
                without_membership,
                groups_with_too_many_members,
                group_mentions_disabled,
            } => {
                if let Some(message) = channel.find_message_in_mut(thread_id, chat_message_id) {
                    message.set_mention_warning(MentionWarning {
                        cannot_see,
                        without_membership,
                        groups_with_too_many_members,
                        group_mentions_disabled,
                    });
                }
            }

            ChannelEvent::SelfFlagged {
                chat_message_id,
                user_flag_status,
            } => {
                if let Some(message) = channel.find_message_in_mut(thread_id, chat_message_id) {
                    message.set_user_flag_status(user_flag_status);
                }
            }

            ChannelEvent::Flag {
                chat_message_id,
                reviewable_id,
            } => {
                if let Some(message) = channel.find_message_in_mut(thread_id, chat_message_id) {
                    message.set_reviewable(reviewable_id);
                }
            }

            ChannelEvent::ThreadCreated {
                chat_message_id,
                thread_id: created,
            } => {
                if let Some(message) = channel.find_message_mut(chat_message_id) {
                    message.set_thread(created);
                }
            }

            ChannelEvent::UpdateThreadOriginalMessage {
                thread_id: updated,
                original_message,
                reply_count,
                ..
            } => {
                // The reply itself is tracked when its `sent` arrives; only
                // the denormalised count is taken from here.
                let thread = channel.threads_mut().get_mut(updated);
                if let (Some(thread), Some(count)) = (thread, reply_count) {
                    thread.reply_count = count;
                }
                if let Some(message) = channel.find_message_mut(original_message.id) {
                    message.apply_render(&original_message, false);
                }
            }

            ChannelEvent::Unknown => {}
        }
        Ok(())
    }
}

/// `sent` on the channel topic: reconcile into the right list and update
/// channel or thread tracking for messages seen for the first time.
///
/// Thread replies may already have been reconciled through the thread
/// topic, so their freshness is judged by the thread's last message id
/// rather than by the reconcile outcome.
fn on_channel_sent(
    channel: &mut Channel,
    message: &MessagePayload,
    staged_id: Option<&StagedId>,
    current_user: UserId,
) {
    let reply_to = message.thread_id.filter(|thread_id| {
        channel
            .threads()
            .get(*thread_id)
            .map_or(true, |thread| thread.original_message_id != Some(message.id))
    });
    let own = message.author_id() == Some(current_user);

    let Some(thread_id) = reply_to else {
        let outcome =
            staged::reconcile_in_channel(channel, None, message, staged_id, current_user);
        if !outcome.is_new() {
            return;
        }
        if let Some(author) = message.author_id() {
            let created_at = message.created_at.unwrap_or_else(Utc::now);
            channel.touch_last_message(message.id, created_at, author);
        }
        if own || outcome == Reconciled::Promoted {
            channel.membership.advance_read(message.id);
        } else if !channel.membership.has_read(message.id) && !channel.membership.muted {
            channel.tracking.increment(Counter::Unread);
        }
        return;
    };

    let fresh = channel
        .threads()
        .get(thread_id)
        .is_some_and(|t| t.last_message_id.map_or(true, |last| message.id > last));
    staged::reconcile_in_channel(channel, Some(thread_id), message, staged_id, current_user);
    if !fresh {
        return;
    }

    let activity = channel
        .threads_mut()
        .record_new_message(thread_id, message.id, own);
    let Some(activity) = activity else {
        return;
    };
    if activity.is_unread() {
        channel.unread_threads_since_last_viewed =
            channel.unread_threads_since_last_viewed.saturating_add(1);
    }
    if activity == ThreadActivity::WatchedUnread {
        channel.tracking.increment(Counter::WatchedThreadsUnread);
    }
}

/// Soft-delete a message. Deleting someone else's unread top-level message
/// takes it back out of the channel's unread count.
fn on_delete(
    channel: &mut Channel,
    thread_id: Option<ThreadId>,
    id: MessageId,
    at: DateTime<Utc>,
    by: Option<UserId>,
    current_user: UserId,
) {
    let unread = channel.membership.last_read_message_id.map_or(true, |last| id > last);
    let Some(message) = channel.find_message_in_mut(thread_id, id) else {
        return;
    };
    if message.is_deleted() {
        return;
    }
    message.mark_deleted(at, by);

    let counted = unread
        && thread_id.is_none()
        && message.thread_id.is_none()
        && message.author_id != Some(current_user);
    if counted {
        channel.tracking.decrement(Counter::Unread);
    }
}
