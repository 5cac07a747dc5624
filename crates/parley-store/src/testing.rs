//! In-memory [`ChatApi`] fake and payload builders for tests.
//!
//! Enabled for this crate's own unit tests and, through the `testing`
//! feature, for downstream integration suites.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use parley_shared::payloads::{
    ChannelMeta, ChannelPayload, LastMessagePayload, MembershipPayload, MessageBusLastIds,
    MyChannelsResponse, SendMessageRequest, SendMessageResponse, ThreadPayload,
};
use parley_shared::types::{ChannelKind, ChannelStatus, NotificationLevel};
use parley_shared::{ChannelId, MessageId, ThreadId, UserId};

use crate::api::{ApiError, ChatApi};

const FIRST_SENT_MESSAGE_ID: u64 = 1_000;

/// Every call the fake received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiCall {
    FetchChannel(ChannelId),
    FetchThread(ChannelId, ThreadId),
    ListMyChannels,
    Follow(ChannelId),
    Unfollow(ChannelId),
    MarkRead(ChannelId, MessageId),
    SendMessage(ChannelId, SendMessageRequest),
}

#[derive(Default)]
struct FakeState {
    channels: HashMap<ChannelId, ChannelPayload>,
    threads: HashMap<(ChannelId, ThreadId), ThreadPayload>,
    my_channels: MyChannelsResponse,
    calls: Vec<ApiCall>,
    fail_membership: bool,
    fail_sends: bool,
    next_message_id: u64,
}

/// Serves canned payloads and records every request.
#[derive(Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_channel(&self, payload: ChannelPayload) {
        self.state().channels.insert(payload.id, payload);
    }

    pub fn add_thread(&self, payload: ThreadPayload) {
        self.state()
            .threads
            .insert((payload.channel_id, payload.id), payload);
    }

    pub fn set_my_channels(&self, response: MyChannelsResponse) {
        self.state().my_channels = response;
    }

    /// Make follow and unfollow requests fail with a server error.
    pub fn fail_membership_calls(&self, fail: bool) {
        self.state().fail_membership = fail;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state().fail_sends = fail;
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.state().calls.clone()
    }

    fn count(&self, matches: impl Fn(&ApiCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| matches(c)).count()
    }

    pub fn channel_fetches(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::FetchChannel(_)))
    }

    pub fn thread_fetches(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::FetchThread(..)))
    }

    pub fn follow_calls(&self) -> usize {
        self.count(|c| matches!(c, ApiCall::Follow(_)))
    }

    pub fn sent_messages(&self) -> Vec<SendMessageRequest> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                ApiCall::SendMessage(_, request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    fn membership(&self, call: ApiCall, following: bool) -> Result<MembershipPayload, ApiError> {
        let mut state = self.state();
        state.calls.push(call);
        if state.fail_membership {
            return Err(ApiError::Status(500));
        }
        Ok(MembershipPayload {
            following,
            ..Default::default()
        })
    }
}

#[async_trait]
impl ChatApi for FakeApi {
    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelPayload, ApiError> {
        let mut state = self.state();
        state.calls.push(ApiCall::FetchChannel(channel_id));
        state
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn fetch_thread(
        &self,
        channel_id: ChannelId,
        thread_id: ThreadId,
    ) -> Result<ThreadPayload, ApiError> {
        let mut state = self.state();
        state.calls.push(ApiCall::FetchThread(channel_id, thread_id));
        state
            .threads
            .get(&(channel_id, thread_id))
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn list_my_channels(&self) -> Result<MyChannelsResponse, ApiError> {
        let mut state = self.state();
        state.calls.push(ApiCall::ListMyChannels);
        Ok(state.my_channels.clone())
    }

    async fn follow_channel(&self, channel_id: ChannelId) -> Result<MembershipPayload, ApiError> {
        self.membership(ApiCall::Follow(channel_id), true)
    }

    async fn unfollow_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<MembershipPayload, ApiError> {
        self.membership(ApiCall::Unfollow(channel_id), false)
    }

    async fn mark_read(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), ApiError> {
        self.state()
            .calls
            .push(ApiCall::MarkRead(channel_id, message_id));
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError> {
        let mut state = self.state();
        state
            .calls
            .push(ApiCall::SendMessage(channel_id, request.clone()));
        if state.fail_sends {
            return Err(ApiError::Transport("connection reset".into()));
        }
        let id = FIRST_SENT_MESSAGE_ID + state.next_message_id;
        state.next_message_id += 1;
        Ok(SendMessageResponse {
            message_id: Some(MessageId(id)),
        })
    }
}

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

fn channel(id: u64, kind: ChannelKind, title: &str, slug: Option<&str>) -> ChannelPayload {
    ChannelPayload {
        id: ChannelId(id),
        kind,
        title: title.to_string(),
        slug: slug.map(str::to_string),
        description: None,
        status: ChannelStatus::Open,
        threading_enabled: true,
        memberships_count: 2,
        current_user_membership: MembershipPayload::default(),
        last_message: None,
        meta: ChannelMeta {
            message_bus_last_ids: MessageBusLastIds {
                channel_message_bus_last_id: Some(0),
            },
        },
    }
}

/// A category channel the user does not follow yet, with cursor 0.
pub fn category_channel(id: u64, slug: &str) -> ChannelPayload {
    channel(id, ChannelKind::Category, slug, Some(slug))
}

/// A direct-message channel with one earlier message, not yet followed.
pub fn direct_message_channel(id: u64, title: &str) -> ChannelPayload {
    let mut payload = channel(id, ChannelKind::DirectMessage, title, None);
    payload.last_message = Some(LastMessagePayload {
        id: MessageId(1),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        user_id: UserId(2),
    });
    payload
}

/// A thread rooted at message 100, with a membership at `level` when given.
pub fn thread_payload(
    channel_id: u64,
    thread_id: u64,
    level: Option<NotificationLevel>,
) -> ThreadPayload {
    ThreadPayload {
        id: ThreadId(thread_id),
        channel_id: ChannelId(channel_id),
        title: None,
        current_user_membership: level.map(|notification_level| MembershipPayload {
            notification_level,
            ..Default::default()
        }),
        original_message_id: Some(MessageId(100)),
        last_message_id: Some(MessageId(100)),
        reply_count: 0,
    }
}
