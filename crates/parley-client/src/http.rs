//! [`ChatApi`] over the chat server's JSON REST API.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use parley_shared::payloads::{
    ChannelPayload, MembershipPayload, MyChannelsResponse, SendMessageRequest, SendMessageResponse,
    ThreadPayload,
};
use parley_shared::{ChannelId, MessageId, ThreadId};
use parley_store::{ApiError, ChatApi};

use crate::config::ClientConfig;
use crate::error::ClientError;

#[derive(Clone)]
pub struct HttpChatApi {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    api_username: Option<String>,
}

/// Single-resource responses come wrapped in their resource name.
#[derive(Deserialize)]
struct ChannelEnvelope {
    channel: ChannelPayload,
}

#[derive(Deserialize)]
struct ThreadEnvelope {
    thread: ThreadPayload,
}

#[derive(Deserialize)]
struct MembershipEnvelope {
    membership: MembershipPayload,
}

impl HttpChatApi {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base_url = config.base_url.trim_end_matches('/');
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base url must be http(s), got {:?}",
                config.base_url
            )));
        }

        let http = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            api_key: config.api_key.clone(),
            api_username: config.api_username.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/chat/api{}", self.base_url, path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut builder = self.http.request(method, self.url(path));
        if let Some(key) = &self.api_key {
            builder = builder.header("Api-Key", key);
        }
        if let Some(username) = &self.api_username {
            builder = builder.header("Api-Username", username);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, ApiError> {
        let res = builder
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        match res.status() {
            status if status.is_success() => Ok(res),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            status => {
                let body = res.text().await.unwrap_or_default();
                debug!(%status, body = %body, "Request rejected");
                Err(ApiError::Status(status.as_u16()))
            }
        }
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ApiError> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn fetch_channel(&self, channel_id: ChannelId) -> Result<ChannelPayload, ApiError> {
        let path = format!("/channels/{channel_id}");
        let envelope: ChannelEnvelope = self.json(self.request(Method::GET, &path)).await?;
        Ok(envelope.channel)
    }

    async fn fetch_thread(
        &self,
        channel_id: ChannelId,
        thread_id: ThreadId,
    ) -> Result<ThreadPayload, ApiError> {
        let path = format!("/channels/{channel_id}/threads/{thread_id}");
        let envelope: ThreadEnvelope = self.json(self.request(Method::GET, &path)).await?;
        Ok(envelope.thread)
    }

    async fn list_my_channels(&self) -> Result<MyChannelsResponse, ApiError> {
        self.json(self.request(Method::GET, "/me/channels")).await
    }

    async fn follow_channel(&self, channel_id: ChannelId) -> Result<MembershipPayload, ApiError> {
        let path = format!("/channels/{channel_id}/memberships/me");
        let envelope: MembershipEnvelope = self.json(self.request(Method::POST, &path)).await?;
        Ok(envelope.membership)
    }

    async fn unfollow_channel(
        &self,
        channel_id: ChannelId,
    ) -> Result<MembershipPayload, ApiError> {
        let path = format!("/channels/{channel_id}/memberships/me/follows");
        let envelope: MembershipEnvelope = self.json(self.request(Method::DELETE, &path)).await?;
        Ok(envelope.membership)
    }

    async fn mark_read(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), ApiError> {
        let path = format!("/channels/{channel_id}/read");
        let body = serde_json::json!({ "message_id": message_id });
        self.send(self.request(Method::PUT, &path).json(&body)).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: ChannelId,
        request: &SendMessageRequest,
    ) -> Result<SendMessageResponse, ApiError> {
        let path = format!("/channels/{channel_id}/messages");
        self.json(self.request(Method::POST, &path).json(request)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_rooted_under_the_chat_api() {
        let config = ClientConfig {
            base_url: "https://chat.example.org".into(),
            ..ClientConfig::default()
        };
        let api = HttpChatApi::new(&config).unwrap();
        assert_eq!(
            api.url("/channels/4/threads/9"),
            "https://chat.example.org/chat/api/channels/4/threads/9"
        );
    }

    #[test]
    fn trailing_slash_is_dropped() {
        let config = ClientConfig {
            base_url: "https://chat.example.org/".into(),
            ..ClientConfig::default()
        };
        let api = HttpChatApi::new(&config).unwrap();
        assert_eq!(api.url("/me/channels"), "https://chat.example.org/chat/api/me/channels");
    }

    #[test]
    fn non_http_base_url_is_rejected() {
        let config = ClientConfig {
            base_url: "chat.example.org".into(),
            ..ClientConfig::default()
        };
        assert!(matches!(HttpChatApi::new(&config), Err(ClientError::Config(_))));
    }

    #[test]
    fn wrapped_responses_decode() {
        let json = r#"{"membership": {"following": true, "notification_level": "watching"}}"#;
        let envelope: MembershipEnvelope = serde_json::from_str(json).unwrap();
        assert!(envelope.membership.following);

        let json = r#"{"channel": {"id": 3, "kind": "category", "title": "General"}}"#;
        let envelope: ChannelEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.channel.id, ChannelId(3));
    }
}
