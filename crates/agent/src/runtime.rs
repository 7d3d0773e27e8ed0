use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::llm::{ChatMessage, LlmApi};
use crate::tools::ToolRegistry;

/// Fixed instructions passed to the model at startup. Invocation order
/// preferences live here, not in code: the loop itself is policy-free.
pub const SYSTEM_PROMPT: &str = "\
You are an IT helpdesk assistant for Slack. You help employees with account \
tasks using the provided identity tools. Rules:\n\
- Always resolve a user by email with find-user-by-email before invoking any \
user-scoped operation, and use the returned user_id.\n\
- Resolve groups with find-group-by-name before add-user-to-group.\n\
- When a lookup reports found=false, tell the user what was not found \
instead of guessing identifiers.\n\
- When a tool call fails, explain the failure briefly; never invent results.\n\
- Reply in short plain sentences suitable for a chat message. When a reset \
link is produced, include the URL verbatim.";

/// Upper bound on call/execute round trips for one inbound message.
const MAX_TOOL_ITERATIONS: usize = 8;

/// Seam the server depends on; lets gateway tests inject a recording fake.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn respond(&self, text: &str) -> Result<String>;
}

pub struct AgentRuntime {
    llm: Box<dyn LlmApi>,
    tools: ToolRegistry,
    system_prompt: String,
}

impl AgentRuntime {
    pub fn new(llm: impl LlmApi + 'static, tools: ToolRegistry) -> Self {
        Self { llm: Box::new(llm), tools, system_prompt: SYSTEM_PROMPT.to_string() }
    }

    /// Runs the bounded agentic loop for one message: call the model with the
    /// declared tool set, execute whatever it requests, feed each result back,
    /// and return the first non-tool reply.
    pub async fn respond(&self, text: &str) -> Result<String> {
        let definitions = self.tools.definitions();
        let mut messages =
            vec![ChatMessage::system(self.system_prompt.clone()), ChatMessage::user(text)];

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let response = self.llm.chat(&messages, &definitions).await?;

            let tool_calls = response.tool_calls.clone().unwrap_or_default();
            if tool_calls.is_empty() {
                return Ok(response.content.unwrap_or_default());
            }

            info!(
                event_name = "agent.tools.requested",
                count = tool_calls.len(),
                iteration,
                "model requested tool calls"
            );
            messages.push(response);

            for call in &tool_calls {
                let arguments: Value = serde_json::from_str(&call.function.arguments)
                    .unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

                // A failed operation becomes the tool result so the model can
                // narrate it to the user; the loop never aborts on tool errors.
                let result = match self.tools.execute(&call.function.name, arguments).await {
                    Ok(value) => value.to_string(),
                    Err(error) => {
                        warn!(
                            event_name = "agent.tool.failed",
                            tool = %call.function.name,
                            error = %error,
                            "tool call failed"
                        );
                        format!("tool call failed: {error}")
                    }
                };

                messages.push(ChatMessage::tool_result(call.id.clone(), result));
            }
        }

        Ok("I could not finish that request within the allowed number of operations. Please try a more specific request.".to_string())
    }
}

#[async_trait]
impl AgentService for AgentRuntime {
    async fn respond(&self, text: &str) -> Result<String> {
        AgentRuntime::respond(self, text).await
    }
}
