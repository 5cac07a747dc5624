//! Optimistic local echoes and their reconciliation with `sent` events.

use tracing::debug;

use parley_shared::protocol::MessagePayload;
use parley_shared::{ChannelId, MessageId, StagedId, ThreadId, UserId};
use parley_store::{Channel, Message, MessageList};

/// What a `sent` event did to a message list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciled {
    /// Our staged echo became the confirmed message.
    Promoted,
    /// A message this list had not seen yet.
    Appended,
    /// The message was already confirmed here; nothing new.
    AlreadyPresent,
}

impl Reconciled {
    /// Whether the event introduced a message not seen before.
    pub fn is_new(self) -> bool {
        !matches!(self, Reconciled::AlreadyPresent)
    }
}

/// Everything needed to stage a message before the server sees it.
#[derive(Debug, Clone)]
pub struct Draft {
    pub channel_id: ChannelId,
    pub content: String,
    pub thread_id: Option<ThreadId>,
    pub in_reply_to_id: Option<MessageId>,
    pub upload_ids: Vec<u64>,
}

/// Insert a staged echo of `draft` into `list`. Returns false if the staged
/// id is already taken.
pub fn stage(list: &mut MessageList, staged_id: StagedId, author: UserId, draft: &Draft) -> bool {
    let mut message = Message::staged(staged_id, draft.channel_id, author, draft.content.clone());
    message.thread_id = draft.thread_id;
    message.in_reply_to_id = draft.in_reply_to_id;
    message.upload_ids = draft.upload_ids.clone();
    list.push(message)
}

/// Merge a `sent` event into `list`.
///
/// A message by `current_user` whose staged id matches an echo in `list`
/// promotes that echo in place. Anything else is appended unless already
/// confirmed. A staged id with no matching echo (e.g. sent from another
/// device) degrades to an ordinary append.
pub fn reconcile(
    list: &mut MessageList,
    channel_id: ChannelId,
    payload: &MessagePayload,
    staged_id: Option<&StagedId>,
    current_user: UserId,
) -> Reconciled {
    let own = payload.author_id() == Some(current_user);

    if let Some(staged_id) = staged_id.filter(|_| own) {
        if let Some(echo) = list.find_staged_mut(staged_id) {
            debug!(staged = %staged_id, message = %payload.id, "Promoting staged message");
            echo.promote(payload);
            if let Some(thread_id) = payload.thread_id {
                propagate_thread(list, payload.id, payload.in_reply_to_id, thread_id);
            }
            return Reconciled::Promoted;
        }
    }

    if list.get(payload.id).is_some() {
        return Reconciled::AlreadyPresent;
    }

    list.push(Message::from_payload(channel_id, payload));
    if let Some(thread_id) = payload.thread_id {
        propagate_thread(list, payload.id, payload.in_reply_to_id, thread_id);
    }
    Reconciled::Appended
}

/// [`reconcile`] into the list of `channel` that `thread_id` selects. Our
/// own echo is first moved there from wherever it was staged, e.g. the
/// channel list of a thread that was not cached at compose time.
pub fn reconcile_in_channel(
    channel: &mut Channel,
    thread_id: Option<ThreadId>,
    payload: &MessagePayload,
    staged_id: Option<&StagedId>,
    current_user: UserId,
) -> Reconciled {
    if let Some(staged_id) = staged_id.filter(|_| payload.author_id() == Some(current_user)) {
        channel.relocate_staged(staged_id, thread_id);
    }
    let channel_id = channel.id;
    let list = channel.message_list_mut(thread_id);
    reconcile(list, channel_id, payload, staged_id, current_user)
}

/// Give the parent of `message_id` and every reply to it the resolved
/// thread id.
fn propagate_thread(
    list: &mut MessageList,
    message_id: MessageId,
    in_reply_to: Option<MessageId>,
    thread_id: ThreadId,
) {
    for message in list.iter_mut() {
        let is_parent = in_reply_to.is_some() && message.id == in_reply_to;
        let is_reply = message.in_reply_to_id == Some(message_id);
        if (is_parent || is_reply) && message.thread_id.is_none() {
            message.set_thread(thread_id);
        }
    }
}

/// Record a failed send on the staged echo, wherever in the channel it
/// lives. Returns false when the echo is gone (already promoted).
pub fn mark_failed(channel: &mut Channel, staged_id: &StagedId, error: String) -> bool {
    match channel.find_staged_mut(staged_id) {
        Some(echo) => {
            echo.error = Some(error);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::protocol::UserRef;

    const ME: UserId = UserId(1);

    fn draft() -> Draft {
        Draft {
            channel_id: ChannelId(1),
            content: "hello".into(),
            thread_id: None,
            in_reply_to_id: None,
            upload_ids: Vec::new(),
        }
    }

    fn sent(id: u64, author: UserId) -> MessagePayload {
        MessagePayload {
            id: MessageId(id),
            channel_id: Some(ChannelId(1)),
            thread_id: None,
            in_reply_to_id: None,
            user: Some(UserRef {
                id: author,
                username: "someone".into(),
            }),
            message: "hello".into(),
            cooked: "<p>hello</p>".into(),
            excerpt: Some("hello".into()),
            created_at: None,
            deleted_at: None,
            deleted_by_id: None,
            upload_ids: Vec::new(),
        }
    }

    #[test]
    fn matching_staged_id_promotes_in_place() {
        let mut list = MessageList::new();
        let staged = StagedId::from("abc");
        assert!(stage(&mut list, staged.clone(), ME, &draft()));
        list.find_staged_mut(&staged).unwrap().error = Some("timeout".into());

        let outcome = reconcile(&mut list, ChannelId(1), &sent(10, ME), Some(&staged), ME);
        assert_eq!(outcome, Reconciled::Promoted);
        assert_eq!(list.len(), 1);

        let message = list.get(MessageId(10)).unwrap();
        assert!(message.staged_id.is_none());
        assert!(message.error.is_none());
        assert_eq!(message.rendered_content, "<p>hello</p>");
        assert!(list.find_staged(&staged).is_none());
    }

    #[test]
    fn replayed_sent_is_idempotent() {
        let mut list = MessageList::new();
        let staged = StagedId::from("abc");
        assert!(stage(&mut list, staged.clone(), ME, &draft()));

        reconcile(&mut list, ChannelId(1), &sent(10, ME), Some(&staged), ME);
        let again = reconcile(&mut list, ChannelId(1), &sent(10, ME), Some(&staged), ME);
        assert_eq!(again, Reconciled::AlreadyPresent);
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn staged_id_from_another_author_is_not_promoted() {
        let mut list = MessageList::new();
        let staged = StagedId::from("abc");
        assert!(stage(&mut list, staged.clone(), ME, &draft()));

        let outcome = reconcile(&mut list, ChannelId(1), &sent(10, UserId(2)), Some(&staged), ME);
        assert_eq!(outcome, Reconciled::Appended);
        assert_eq!(list.len(), 2);
        assert!(list.find_staged(&staged).is_some());
    }

    #[test]
    fn unknown_staged_id_degrades_to_append() {
        let mut list = MessageList::new();
        let unknown = StagedId::from("zzz");
        let outcome = reconcile(&mut list, ChannelId(1), &sent(10, ME), Some(&unknown), ME);
        assert_eq!(outcome, Reconciled::Appended);
        assert!(outcome.is_new());
    }

    #[test]
    fn promotion_propagates_thread_to_parent_and_replies() {
        let mut list = MessageList::new();
        list.push(Message::from_payload(ChannelId(1), &sent(5, UserId(2))));

        let mut reply_draft = draft();
        reply_draft.in_reply_to_id = Some(MessageId(5));
        let staged = StagedId::from("abc");
        assert!(stage(&mut list, staged.clone(), ME, &reply_draft));

        let mut confirmed = sent(10, ME);
        confirmed.in_reply_to_id = Some(MessageId(5));
        confirmed.thread_id = Some(ThreadId(3));
        reconcile(&mut list, ChannelId(1), &confirmed, Some(&staged), ME);

        assert_eq!(list.get(MessageId(5)).unwrap().thread_id, Some(ThreadId(3)));
        assert_eq!(list.get(MessageId(10)).unwrap().thread_id, Some(ThreadId(3)));
    }

    #[test]
    fn failure_is_recorded_on_thread_echoes() {
        let payload = parley_store::testing::category_channel(1, "general");
        let mut channel = Channel::from_payload(payload);
        channel
            .threads_mut()
            .store(parley_store::testing::thread_payload(1, 3, None));
        let mut thread_draft = draft();
        thread_draft.thread_id = Some(ThreadId(3));
        let staged = StagedId::from("abc");
        let list = channel.message_list_mut(Some(ThreadId(3)));
        assert!(stage(list, staged.clone(), ME, &thread_draft));

        assert!(mark_failed(&mut channel, &staged, "timeout".into()));
        let echo = channel.find_staged_mut(&staged).unwrap();
        assert_eq!(echo.error.as_deref(), Some("timeout"));
        assert!(!mark_failed(&mut channel, &StagedId::from("nope"), "x".into()));
    }

    #[test]
    fn duplicate_staged_id_is_refused() {
        let mut list = MessageList::new();
        let staged = StagedId::from("abc");
        assert!(stage(&mut list, staged.clone(), ME, &draft()));
        assert!(!stage(&mut list, staged, ME, &draft()));
        assert_eq!(list.len(), 1);
    }
}
