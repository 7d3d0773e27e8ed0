use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

const SLACK_API_BASE: &str = "https://slack.com/api";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("slack transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    /// Slack answers HTTP 200 with `ok: false` for API-level failures.
    #[error("slack api error: {0}")]
    Api(String),
}

/// Posts the agent's reply back into the originating channel. One call, no
/// retry, no delivery confirmation beyond the HTTP outcome.
#[async_trait]
pub trait ReplyDispatcher: Send + Sync {
    async fn post(&self, channel: &str, text: &str) -> Result<(), DispatchError>;
}

pub struct SlackClient {
    http: Client,
    bot_token: SecretString,
    base_url: String,
}

impl SlackClient {
    pub fn new(bot_token: SecretString) -> Self {
        Self { http: Client::new(), bot_token, base_url: SLACK_API_BASE.to_string() }
    }
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    error: Option<String>,
}

/// Slack answers HTTP 200 with `ok: false` plus an error token for
/// API-level failures; only `ok: true` counts as delivered.
fn into_dispatch_result(body: PostMessageResponse) -> Result<(), DispatchError> {
    if body.ok {
        Ok(())
    } else {
        Err(DispatchError::Api(body.error.unwrap_or_else(|| "unknown error".to_string())))
    }
}

#[async_trait]
impl ReplyDispatcher for SlackClient {
    async fn post(&self, channel: &str, text: &str) -> Result<(), DispatchError> {
        let url = format!("{}/chat.postMessage", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.bot_token.expose_secret())
            .json(&json!({ "channel": channel, "text": text }))
            .send()
            .await?
            .error_for_status()?;

        let body: PostMessageResponse = response.json().await?;
        into_dispatch_result(body)?;

        debug!(event_name = "slack.reply.posted", channel = %channel, "reply delivered");
        Ok(())
    }
}
