//! Outbound collaborators.
//!
//! The agent chat platform serves both content generation (submit a prompt,
//! wait, read the agent's reply) and outbound messaging (a prompt addressed
//! to the messaging agent). The insight model condenses raw category text.

mod gemini;
mod openserv;

pub use gemini::{GeminiClient, DEFAULT_GEMINI_BASE_URL};
pub use openserv::{OpenServClient, DEFAULT_OPENSERV_BASE_URL};

use crate::model::Category;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Errors that can occur when talking to a collaborator.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Request timeout")]
    Timeout,

    #[error("Blocked by provider: {0}")]
    Blocked(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Connection(err.to_string())
        }
    }
}

/// Maps a non-success response into [`ClientError`], keeping a bounded slice
/// of the body for the logs.
pub(crate) async fn error_for_status(response: reqwest::Response) -> ClientError {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return ClientError::RateLimited;
    }
    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(300).collect();
    ClientError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Workspace + agent pair addressing one agent chat.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub workspace_id: String,
    pub agent_id: String,
}

impl ChannelRef {
    pub fn new(workspace_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            agent_id: agent_id.into(),
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace_id, self.agent_id)
    }
}

/// One entry of an agent chat history.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub message: Option<String>,
}

impl ChatMessage {
    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            author: "agent".to_string(),
            message: Some(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            author: "user".to_string(),
            message: Some(text.into()),
        }
    }

    pub fn is_from_agent(&self) -> bool {
        self.author == "agent"
    }
}

/// Text of the last agent-authored, non-empty message.
pub fn last_agent_message(messages: &[ChatMessage]) -> Option<&str> {
    messages
        .iter()
        .rev()
        .filter(|m| m.is_from_agent())
        .find_map(|m| m.message.as_deref().filter(|text| !text.trim().is_empty()))
}

/// Content-generation side of the agent chat platform.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait AgentChannel: Send + Sync {
    /// Posts a prompt to the channel. The reply arrives asynchronously.
    async fn submit(&self, channel: &ChannelRef, prompt: &str) -> Result<(), ClientError>;

    /// Full chat history of the channel, oldest first.
    async fn collect(&self, channel: &ChannelRef) -> Result<Vec<ChatMessage>, ClientError>;
}

/// Outbound messaging agent.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, channel: &ChannelRef, text: &str) -> Result<(), ClientError>;
}

/// Raw material handed to the insight model for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisInput {
    pub category: Category,
    pub intel: String,
    pub social: Option<String>,
}

/// Condenses a category's raw text into the final briefing.
#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait InsightSynthesizer: Send + Sync {
    async fn synthesize(&self, input: &SynthesisInput) -> Result<String, ClientError>;
}
