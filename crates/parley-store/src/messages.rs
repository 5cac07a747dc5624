//! Message entities and the ordered per-channel / per-thread message list.

use chrono::{DateTime, Utc};
use serde::Serialize;

use parley_shared::protocol::{MessagePayload, RenderedPayload};
use parley_shared::types::ReactionAction;
use parley_shared::{ChannelId, MessageId, StagedId, ThreadId, UserId};

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message, either confirmed (`id` set) or staged
/// (`staged_id` set, waiting for the server to echo it back).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    /// Server identity. `None` while the message is staged.
    pub id: Option<MessageId>,
    /// Client identity of an optimistic echo. Cleared on promotion.
    pub staged_id: Option<StagedId>,
    pub channel_id: ChannelId,
    pub thread_id: Option<ThreadId>,
    pub in_reply_to_id: Option<MessageId>,
    pub author_id: Option<UserId>,
    /// Raw markdown as typed.
    pub content: String,
    /// Server-cooked HTML. Empty until the server renders it.
    pub rendered_content: String,
    pub excerpt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub deleted_by_id: Option<UserId>,
    /// Bumped on every server-side mutation of this message.
    pub version: u32,
    pub edited: bool,
    pub processed: bool,
    /// Set when sending a staged message failed.
    pub error: Option<String>,
    pub reactions: Vec<Reaction>,
    pub mention_warning: Option<MentionWarning>,
    pub user_flag_status: Option<i32>,
    pub reviewable_id: Option<u64>,
    pub upload_ids: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reaction {
    pub emoji: String,
    pub count: u32,
    /// Whether the current user is among the reactors.
    pub reacted: bool,
    pub user_ids: Vec<UserId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MentionWarning {
    pub cannot_see: Vec<UserId>,
    pub without_membership: Vec<UserId>,
    pub groups_with_too_many_members: Vec<String>,
    pub group_mentions_disabled: Vec<String>,
}

impl Message {
    /// Build an optimistic echo for a message the local user just composed.
    pub fn staged(
        staged_id: StagedId,
        channel_id: ChannelId,
        author_id: UserId,
        content: String,
    ) -> Self {
        Self {
            id: None,
            staged_id: Some(staged_id),
            channel_id,
            thread_id: None,
            in_reply_to_id: None,
            author_id: Some(author_id),
            content,
            rendered_content: String::new(),
            excerpt: None,
            created_at: Utc::now(),
            deleted_at: None,
            deleted_by_id: None,
            version: 0,
            edited: false,
            processed: false,
            error: None,
            reactions: Vec::new(),
            mention_warning: None,
            user_flag_status: None,
            reviewable_id: None,
            upload_ids: Vec::new(),
        }
    }

    /// Build a confirmed message from a server payload.
    ///
    /// A payload without `created_at` is stamped with the local clock rather
    /// than rejected.
    pub fn from_payload(channel_id: ChannelId, payload: &MessagePayload) -> Self {
        Self {
            id: Some(payload.id),
            staged_id: None,
            channel_id: payload.channel_id.unwrap_or(channel_id),
            thread_id: payload.thread_id,
            in_reply_to_id: payload.in_reply_to_id,
            author_id: payload.author_id(),
            content: payload.message.clone(),
            rendered_content: payload.cooked.clone(),
            excerpt: payload.excerpt.clone(),
            created_at: payload.created_at.unwrap_or_else(Utc::now),
            deleted_at: payload.deleted_at,
            deleted_by_id: payload.deleted_by_id,
            version: 0,
            edited: false,
            processed: false,
            error: None,
            reactions: Vec::new(),
            mention_warning: None,
            user_flag_status: None,
            reviewable_id: None,
            upload_ids: payload.upload_ids.clone(),
        }
    }

    pub fn is_staged(&self) -> bool {
        self.id.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn bump(&mut self) {
        self.version = self.version.saturating_add(1);
    }

    /// Turn this staged echo into the confirmed message in place.
    pub fn promote(&mut self, payload: &MessagePayload) {
        self.id = Some(payload.id);
        self.staged_id = None;
        self.error = None;
        self.rendered_content = payload.cooked.clone();
        self.excerpt = payload.excerpt.clone();
        if let Some(created_at) = payload.created_at {
            self.created_at = created_at;
        }
        if payload.thread_id.is_some() {
            self.thread_id = payload.thread_id;
        }
    }

    pub fn apply_edit(&mut self, payload: &MessagePayload) {
        self.content = payload.message.clone();
        self.rendered_content = payload.cooked.clone();
        self.excerpt = payload.excerpt.clone();
        self.upload_ids = payload.upload_ids.clone();
        self.edited = true;
        self.bump();
    }

    /// Apply a re-render (`processed` marks the first one).
    pub fn apply_render(&mut self, payload: &RenderedPayload, processed: bool) {
        self.rendered_content = payload.cooked.clone();
        if payload.excerpt.is_some() {
            self.excerpt = payload.excerpt.clone();
        }
        if processed {
            self.processed = true;
        }
        self.bump();
    }

    pub fn mark_deleted(&mut self, at: DateTime<Utc>, by: Option<UserId>) {
        self.deleted_at = Some(at);
        self.deleted_by_id = by;
        self.bump();
    }

    pub fn restore(&mut self) {
        self.deleted_at = None;
        self.deleted_by_id = None;
        self.bump();
    }

    pub fn set_mention_warning(&mut self, warning: MentionWarning) {
        self.mention_warning = Some(warning);
        self.bump();
    }

    pub fn set_user_flag_status(&mut self, status: i32) {
        self.user_flag_status = Some(status);
        self.bump();
    }

    pub fn set_reviewable(&mut self, reviewable_id: u64) {
        self.reviewable_id = Some(reviewable_id);
        self.bump();
    }

    pub fn set_thread(&mut self, thread_id: ThreadId) {
        if self.thread_id != Some(thread_id) {
            self.thread_id = Some(thread_id);
            self.bump();
        }
    }

    /// Apply a reaction change from `user`. Adding twice or removing a
    /// reaction the user never made is a no-op.
    pub fn react(
        &mut self,
        emoji: &str,
        action: ReactionAction,
        user: UserId,
        current_user: UserId,
    ) {
        let index = self.reactions.iter().position(|r| r.emoji == emoji);

        match action {
            ReactionAction::Add => {
                let reaction = match index {
                    Some(i) => &mut self.reactions[i],
                    None => {
                        self.reactions.push(Reaction {
                            emoji: emoji.to_string(),
                            count: 0,
                            reacted: false,
                            user_ids: Vec::new(),
                        });
                        let last = self.reactions.len() - 1;
                        &mut self.reactions[last]
                    }
                };
                if reaction.user_ids.contains(&user) {
                    return;
                }
                reaction.user_ids.push(user);
                reaction.count += 1;
                if user == current_user {
                    reaction.reacted = true;
                }
            }
            ReactionAction::Remove => {
                let Some(i) = index else { return };
                let reaction = &mut self.reactions[i];
                let Some(pos) = reaction.user_ids.iter().position(|u| *u == user) else {
                    return;
                };
                reaction.user_ids.remove(pos);
                reaction.count = reaction.count.saturating_sub(1);
                if user == current_user {
                    reaction.reacted = false;
                }
                if reaction.count == 0 {
                    self.reactions.remove(i);
                }
            }
        }
        self.bump();
    }
}

// ---------------------------------------------------------------------------
// MessageList
// ---------------------------------------------------------------------------

/// Ordered list of the messages loaded for one channel or thread.
///
/// Confirmed messages are unique by server id; staged messages are unique by
/// staged id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageList {
    messages: Vec<Message>,
}

impl MessageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Message> {
        self.messages.iter_mut()
    }

    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == Some(id))
    }

    pub fn get_mut(&mut self, id: MessageId) -> Option<&mut Message> {
        self.messages.iter_mut().find(|m| m.id == Some(id))
    }

    pub fn find_staged(&self, staged_id: &StagedId) -> Option<&Message> {
        self.messages
            .iter()
            .find(|m| m.staged_id.as_ref() == Some(staged_id))
    }

    pub fn find_staged_mut(&mut self, staged_id: &StagedId) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .find(|m| m.staged_id.as_ref() == Some(staged_id))
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Append a message. Returns `false` (and drops the message) when an
    /// entry with the same server id or staged id already exists.
    pub fn push(&mut self, message: Message) -> bool {
        let duplicate = match (&message.id, &message.staged_id) {
            (Some(id), _) => self.get(*id).is_some(),
            (None, Some(staged)) => self.find_staged(staged).is_some(),
            (None, None) => false,
        };
        if duplicate {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn remove(&mut self, id: MessageId) -> Option<Message> {
        let index = self.messages.iter().position(|m| m.id == Some(id))?;
        Some(self.messages.remove(index))
    }

    pub fn remove_staged(&mut self, staged_id: &StagedId) -> Option<Message> {
        let index = self
            .messages
            .iter()
            .position(|m| m.staged_id.as_ref() == Some(staged_id))?;
        Some(self.messages.remove(index))
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn confirmed(id: u64) -> Message {
        let payload = MessagePayload {
            id: MessageId(id),
            channel_id: None,
            thread_id: None,
            in_reply_to_id: None,
            user: None,
            message: format!("message {id}"),
            cooked: String::new(),
            excerpt: None,
            created_at: None,
            deleted_at: None,
            deleted_by_id: None,
            upload_ids: Vec::new(),
        };
        Message::from_payload(ChannelId(1), &payload)
    }

    #[test]
    fn push_rejects_duplicate_ids() {
        let mut list = MessageList::new();
        assert!(list.push(confirmed(1)));
        assert!(!list.push(confirmed(1)));
        assert!(list.push(confirmed(2)));
        assert_eq!(list.len(), 2);

        let staged = Message::staged("s".into(), ChannelId(1), UserId(1), "hi".into());
        assert!(list.push(staged.clone()));
        assert!(!list.push(staged));
        assert_eq!(list.len(), 3);
    }

    #[test]
    fn reactions_track_counts_and_own_flag() {
        let mut message = confirmed(1);
        let me = UserId(1);

        message.react("heart", ReactionAction::Add, me, me);
        message.react("heart", ReactionAction::Add, UserId(2), me);
        message.react("heart", ReactionAction::Add, UserId(2), me);
        assert_eq!(message.reactions.len(), 1);
        assert_eq!(message.reactions[0].count, 2);
        assert!(message.reactions[0].reacted);

        message.react("heart", ReactionAction::Remove, me, me);
        assert_eq!(message.reactions[0].count, 1);
        assert!(!message.reactions[0].reacted);

        message.react("heart", ReactionAction::Remove, UserId(2), me);
        assert!(message.reactions.is_empty());

        message.react("tada", ReactionAction::Remove, UserId(3), me);
        assert!(message.reactions.is_empty());
    }

    #[test]
    fn server_mutations_bump_version() {
        let mut message = confirmed(1);
        message.apply_render(
            &RenderedPayload {
                id: MessageId(1),
                cooked: "<p>x</p>".into(),
                excerpt: None,
            },
            true,
        );
        message.mark_deleted(Utc::now(), Some(UserId(4)));
        message.restore();
        assert_eq!(message.version, 3);
        assert!(message.processed);
        assert!(!message.is_deleted());
    }
}
