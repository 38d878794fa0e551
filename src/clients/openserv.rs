//! Agent chat platform client.

use super::{error_for_status, AgentChannel, ChannelRef, ChatMessage, ClientError, MessageSender};
use crate::server::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub const DEFAULT_OPENSERV_BASE_URL: &str = "https://api.openserv.ai";

#[derive(Serialize)]
struct PostMessageBody<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    messages: Vec<ChatMessage>,
}

/// HTTP client for the agent chat API.
pub struct OpenServClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    session_cookie: Option<String>,
}

impl OpenServClient {
    /// Create a new client.
    ///
    /// `session_cookie` is the `connect.sid` value; reading chat history is
    /// rejected by the platform without it.
    pub fn new(
        base_url: &str,
        api_key: &str,
        session_cookie: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        if session_cookie.is_none() {
            warn!("No connect.sid cookie configured, collecting agent replies may fail");
        }

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            session_cookie,
        })
    }

    fn chat_url(&self, channel: &ChannelRef, endpoint: &str) -> String {
        format!(
            "{}/workspaces/{}/agent-chat/{}/{}",
            self.base_url, channel.workspace_id, channel.agent_id, endpoint
        )
    }

    async fn post_message(
        &self,
        channel: &ChannelRef,
        text: &str,
        operation: &str,
    ) -> Result<(), ClientError> {
        let url = self.chat_url(channel, "message");
        debug!("POST {} ({} chars)", url, text.len());

        let started = Instant::now();
        let result = self.do_post(&url, text).await;

        metrics::record_collaborator_request(
            "openserv",
            operation,
            result.is_ok(),
            started.elapsed(),
        );
        result
    }

    async fn do_post(&self, url: &str, text: &str) -> Result<(), ClientError> {
        let response = self
            .client
            .post(url)
            .header("x-openserv-key", &self.api_key)
            .header("accept", "*/*")
            .json(&PostMessageBody { message: text })
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }
        Ok(())
    }

    async fn fetch_messages(&self, url: &str) -> Result<Vec<ChatMessage>, ClientError> {
        let mut request = self
            .client
            .get(url)
            .header("x-openserv-key", &self.api_key)
            .header("accept", "application/json");
        if let Some(sid) = &self.session_cookie {
            request = request.header("cookie", format!("connect.sid={}", sid));
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(error_for_status(response).await);
        }
        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| ClientError::InvalidResponse(e.to_string()))?;
        Ok(body.messages)
    }
}

#[async_trait]
impl AgentChannel for OpenServClient {
    async fn submit(&self, channel: &ChannelRef, prompt: &str) -> Result<(), ClientError> {
        self.post_message(channel, prompt, "submit").await
    }

    async fn collect(&self, channel: &ChannelRef) -> Result<Vec<ChatMessage>, ClientError> {
        let url = self.chat_url(channel, "messages");
        debug!("GET {}", url);

        let started = Instant::now();
        let result = self.fetch_messages(&url).await;

        metrics::record_collaborator_request(
            "openserv",
            "collect",
            result.is_ok(),
            started.elapsed(),
        );
        result
    }
}

#[async_trait]
impl MessageSender for OpenServClient {
    async fn send(&self, channel: &ChannelRef, text: &str) -> Result<(), ClientError> {
        self.post_message(channel, text, "send").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_url_trims_trailing_slash() {
        let client = OpenServClient::new(
            "https://api.example.com/",
            "key",
            Some("sid".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.chat_url(&ChannelRef::new("3422", "140"), "messages"),
            "https://api.example.com/workspaces/3422/agent-chat/140/messages"
        );
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        let client =
            OpenServClient::new("http://127.0.0.1:1", "key", None, Duration::from_secs(2))
                .unwrap();
        let err = client
            .submit(&ChannelRef::new("1", "2"), "hello")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::Connection(_) | ClientError::Timeout
        ));
    }
}
