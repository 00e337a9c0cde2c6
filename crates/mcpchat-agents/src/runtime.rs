use std::sync::Arc;

use futures::future::join_all;
use mcpchat_common::{Error, Result};
use tracing::{debug, info, instrument, warn};

use crate::checkpoint::{CheckpointSaver, ThreadConfig};
use crate::providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, MessagePart, ToolDefinition,
};
use crate::tools::{Tool, ToolOutput};

/// Maximum number of tool-use round-trips before the loop is forcibly stopped.
const MAX_TOOL_ITERATIONS: usize = 25;

/// Conversation state returned by [`ReactAgent::invoke`].
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub messages: Vec<ChatMessage>,
}

impl AgentState {
    /// Text of the final message, i.e. the model's answer.
    pub fn final_text(&self) -> String {
        self.messages.last().map(ChatMessage::text).unwrap_or_default()
    }

    /// True when the message before the answer is a tool result.
    pub fn answer_follows_tool_output(&self) -> bool {
        self.messages
            .len()
            .checked_sub(2)
            .and_then(|i| self.messages.get(i))
            .is_some_and(ChatMessage::is_tool_result)
    }
}

/// Reason-and-act agent: alternates model calls and tool executions until the
/// model answers without requesting tools.
pub struct ReactAgent {
    model: Arc<dyn LlmProvider>,
    tools: Vec<Box<dyn Tool>>,
    checkpointer: Arc<dyn CheckpointSaver>,
    system_prompt: Option<String>,
}

impl ReactAgent {
    pub fn new(
        model: Arc<dyn LlmProvider>,
        tools: Vec<Box<dyn Tool>>,
        checkpointer: Arc<dyn CheckpointSaver>,
    ) -> Self {
        info!(
            "agent ready: provider={}, model={}, tools={}",
            model.provider_id(),
            model.model(),
            tools.len()
        );
        Self {
            model,
            tools,
            checkpointer,
            system_prompt: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    fn find_tool(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

    /// Append `messages` to the thread's history and run the agent loop.
    #[instrument(skip(self, messages, thread), fields(thread_id = %thread.thread_id))]
    pub async fn invoke(
        &self,
        messages: Vec<ChatMessage>,
        thread: &ThreadConfig,
    ) -> Result<AgentState> {
        let mut history = self.checkpointer.load(thread).await?;
        history.extend(messages);

        let tool_defs = self.tool_definitions();

        for iteration in 0..MAX_TOOL_ITERATIONS {
            let request = LlmRequest {
                model: String::new(),
                messages: history.clone(),
                system: self.system_prompt.clone(),
                max_tokens: None,
                temperature: None,
                tools: tool_defs.clone(),
            };

            let response = self.model.complete(&request).await?;

            if !response.has_tool_use() {
                history.push(ChatMessage {
                    role: ChatRole::Assistant,
                    content: MessagePart::Parts(response.content),
                });
                self.checkpointer.save(thread, &history).await?;
                return Ok(AgentState { messages: history });
            }

            debug!("tool round {}", iteration + 1);

            let calls: Vec<(String, String, serde_json::Value)> = response
                .content
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::ToolUse { id, name, input } => {
                        Some((id.clone(), name.clone(), input.clone()))
                    }
                    _ => None,
                })
                .collect();

            history.push(ChatMessage {
                role: ChatRole::Assistant,
                content: MessagePart::Parts(response.content),
            });

            let outputs = join_all(
                calls
                    .iter()
                    .map(|(_, name, input)| self.run_tool(name, input.clone())),
            )
            .await;

            let tool_results = calls
                .into_iter()
                .zip(outputs)
                .map(|((id, _, _), output)| ContentBlock::ToolResult {
                    tool_use_id: id,
                    content: output.content,
                    is_error: output.is_error,
                })
                .collect();

            history.push(ChatMessage {
                role: ChatRole::User,
                content: MessagePart::Parts(tool_results),
            });
        }

        Err(Error::Agent(format!(
            "tool loop exceeded maximum of {MAX_TOOL_ITERATIONS} iterations"
        )))
    }

    async fn run_tool(&self, name: &str, input: serde_json::Value) -> ToolOutput {
        match self.find_tool(name) {
            Some(tool) => tool.execute(input).await.unwrap_or_else(|e| {
                warn!("tool {name} failed: {e}");
                ToolOutput::error(e.to_string())
            }),
            None => ToolOutput::error(format!("unknown tool: {name}")),
        }
    }
}
