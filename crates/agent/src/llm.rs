use anyhow::{Context, Result};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use deskbot_core::config::LlmConfig;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: Some(content.into()), tool_calls: None, tool_call_id: None }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolDefinition]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a str>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
}

/// Seam between the agent loop and the hosted model, so the loop can be
/// exercised with a scripted fake.
#[async_trait]
pub trait LlmApi: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], tools: &[ToolDefinition])
        -> Result<ChatMessage>;
}

/// OpenAI-compatible chat-completions client.
pub struct LlmClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { http: reqwest::Client::new(), config }
    }
}

#[async_trait]
impl LlmApi for LlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatMessage> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .context("llm api key is not configured (set DESKBOT_LLM_API_KEY)")?;

        let tools_param = if tools.is_empty() { None } else { Some(tools) };
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            tools: tools_param,
            tool_choice: tools_param.is_some().then_some("auto"),
            max_tokens: self.config.max_tokens,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        debug!(event_name = "agent.llm.request", url = %url, model = %self.config.model);

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .context("failed to reach the chat-completions endpoint")?;

        let status = response.status();
        let body = response.text().await.context("failed to read chat-completions response")?;
        let body = into_api_body(status, body)?;

        let chat: ChatResponse = serde_json::from_str(&body)
            .context("failed to decode chat-completions response")?;

        chat.choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .context("chat-completions response contained no choices")
    }
}

/// Non-success statuses carry the upstream status code and body so the
/// failure is attributable from the log line alone.
fn into_api_body(status: reqwest::StatusCode, body: String) -> Result<String> {
    if status.is_success() {
        Ok(body)
    } else {
        anyhow::bail!("chat-completions endpoint returned {status}: {body}")
    }
}
