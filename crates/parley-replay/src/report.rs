//! End-of-replay summary: channel ranking plus aggregate totals.

use serde::Serialize;

use parley_client::SyncEngine;
use parley_shared::ChannelId;
use parley_store::ranking::activity_class;
use parley_store::{Channel, TrackingTotals};

#[derive(Debug, Serialize)]
pub struct RankedChannel {
    pub id: ChannelId,
    pub title: String,
    pub class: String,
    pub starred: bool,
    pub unread: u32,
    pub mentions: u32,
}

impl From<&Channel> for RankedChannel {
    fn from(channel: &Channel) -> Self {
        Self {
            id: channel.id,
            title: channel.title.clone(),
            class: format!("{:?}", activity_class(channel)).to_lowercase(),
            starred: channel.membership.starred,
            unread: channel.tracking.unread_count,
            mentions: channel.tracking.mention_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub channels: Vec<RankedChannel>,
    pub totals: TrackingTotals,
    pub open_topics: usize,
}

impl Report {
    pub fn from_engine(engine: &SyncEngine) -> Self {
        Self {
            channels: engine
                .channels()
                .channels_by_activity()
                .into_iter()
                .map(RankedChannel::from)
                .collect(),
            totals: engine.totals(),
            open_topics: engine.subscriptions().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_shared::payloads::MyChannelsResponse;
    use parley_shared::protocol::BusEnvelope;
    use parley_shared::{Topic, UserId};
    use parley_store::testing::{category_channel, FakeApi};
    use parley_store::ChatApi;
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn report_lists_followed_channels_by_activity() {
        let api = Arc::new(FakeApi::new());
        let mut quiet = category_channel(1, "quiet");
        quiet.current_user_membership.following = true;
        let mut busy = category_channel(2, "busy");
        busy.current_user_membership.following = true;
        api.set_my_channels(MyChannelsResponse {
            public_channels: vec![quiet, busy, category_channel(3, "lurking")],
            ..Default::default()
        });

        let dyn_api: Arc<dyn ChatApi> = api;
        let mut engine = SyncEngine::new(dyn_api, UserId(1));
        engine.bootstrap().await.unwrap();
        engine
            .dispatch(BusEnvelope {
                topic: Topic::UserState(UserId(1)),
                sequence_id: 0,
                payload: json!({"type": "tracking_state", "channel_id": 2, "unread_count": 3}),
            })
            .await;

        let report = Report::from_engine(&engine);
        let ids: Vec<u64> = report.channels.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(report.channels[0].class, "unread");
        assert_eq!(report.totals.public_channel_unread_count, 3);
        // user-state plus the two followed channels
        assert_eq!(report.open_topics, 3);
    }
}
