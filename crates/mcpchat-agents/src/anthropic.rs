use async_trait::async_trait;
use mcpchat_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::chat_model::ModelSettings;
use crate::http;
use crate::providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse, MessagePart,
    ToolDefinition, Usage,
};

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_MODEL: &str = "claude-3-5-haiku-latest";
const ANTHROPIC_VERSION: &str = "2023-06-01";
/// The Messages API requires an output cap on every request.
const FALLBACK_MAX_TOKENS: u32 = 4096;

/// Client for the Anthropic Messages API.
pub struct MessagesModel {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    max_tokens: u32,
}

impl MessagesModel {
    /// `max_tokens` falls back to `max_completion_tokens`, the only other cap
    /// a config can carry.
    pub fn new(api_key: impl Into<String>, settings: &ModelSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: http::endpoint(ANTHROPIC_BASE_URL, "v1/messages"),
            api_key: api_key.into(),
            model: settings.model_or(ANTHROPIC_MODEL),
            temperature: settings.temperature,
            max_tokens: settings
                .max_tokens
                .or(settings.max_completion_tokens)
                .unwrap_or(FALLBACK_MAX_TOKENS),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.url = http::endpoint(base_url, "v1/messages");
        self
    }

    fn body<'a>(&'a self, request: &'a LlmRequest) -> MessagesRequest<'a> {
        MessagesRequest {
            model: if request.model.is_empty() {
                self.model.as_str()
            } else {
                request.model.as_str()
            },
            max_tokens: request.max_tokens.unwrap_or(self.max_tokens),
            system: request.system.as_deref(),
            messages: turns(&request.messages),
            temperature: request.temperature.or(self.temperature),
            tools: request.tools.iter().map(ToolSpec::from).collect(),
        }
    }
}

#[async_trait]
impl LlmProvider for MessagesModel {
    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(provider = "anthropic"))]
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let call = self
            .http
            .post(&self.url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let reply: MessagesReply = http::post_json(call, "anthropic", &self.body(request)).await?;
        Ok(reply.into())
    }
}

/// Group the agent history into alternating user/assistant turns.
///
/// Consecutive messages with the same role are merged because the API
/// rejects two user turns in a row (a tool result followed by a new query
/// after an interrupted exchange, for example).
fn turns(history: &[ChatMessage]) -> Vec<Turn<'_>> {
    let mut out: Vec<Turn<'_>> = Vec::new();
    for message in history {
        let role = match message.role {
            ChatRole::System => continue,
            ChatRole::Assistant => "assistant",
            ChatRole::User | ChatRole::Tool => "user",
        };
        let blocks = blocks(&message.content);
        if blocks.is_empty() {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => out.push(Turn {
                role,
                content: blocks,
            }),
        }
    }
    out
}

fn blocks(content: &MessagePart) -> Vec<Block<'_>> {
    match content {
        MessagePart::Text(text) if text.is_empty() => Vec::new(),
        MessagePart::Text(text) => vec![Block::Text { text }],
        MessagePart::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentBlock::Text { text } if text.is_empty() => None,
                ContentBlock::Text { text } => Some(Block::Text { text }),
                ContentBlock::ToolUse { id, name, input } => {
                    Some(Block::ToolUse { id, name, input })
                }
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => Some(Block::ToolResult {
                    tool_use_id,
                    content,
                    is_error: *is_error,
                }),
            })
            .collect(),
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Turn<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec<'a>>,
}

#[derive(Debug, Serialize)]
struct Turn<'a> {
    role: &'static str,
    content: Vec<Block<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block<'a> {
    Text {
        text: &'a str,
    },
    ToolUse {
        id: &'a str,
        name: &'a str,
        input: &'a Value,
    },
    ToolResult {
        tool_use_id: &'a str,
        content: &'a str,
        #[serde(skip_serializing_if = "is_false")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ToolSpec<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

impl<'a> From<&'a ToolDefinition> for ToolSpec<'a> {
    fn from(tool: &'a ToolDefinition) -> Self {
        Self {
            name: &tool.name,
            description: &tool.description,
            input_schema: &tool.input_schema,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesReply {
    model: String,
    content: Vec<ReplyBlock>,
    stop_reason: Option<String>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplyBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    /// Thinking and server-side blocks carry nothing the agent loop uses.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct TokenUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl From<MessagesReply> for LlmResponse {
    fn from(reply: MessagesReply) -> Self {
        LlmResponse {
            content: reply
                .content
                .into_iter()
                .filter_map(|block| match block {
                    ReplyBlock::Text { text } => Some(ContentBlock::Text { text }),
                    ReplyBlock::ToolUse { id, name, input } => {
                        Some(ContentBlock::ToolUse { id, name, input })
                    }
                    ReplyBlock::Other => None,
                })
                .collect(),
            model: reply.model,
            usage: reply.usage.map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
            stop_reason: reply.stop_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_results(results: &[(&str, &str, bool)]) -> ChatMessage {
        ChatMessage {
            role: ChatRole::User,
            content: MessagePart::Parts(
                results
                    .iter()
                    .map(|(id, content, is_error)| ContentBlock::ToolResult {
                        tool_use_id: id.to_string(),
                        content: content.to_string(),
                        is_error: *is_error,
                    })
                    .collect(),
            ),
        }
    }

    #[test]
    fn max_completion_tokens_stands_in_for_max_tokens() {
        let settings = ModelSettings {
            model_provider: "anthropic".to_string(),
            max_completion_tokens: Some(1200),
            ..Default::default()
        };
        let model = MessagesModel::new("k", &settings);
        assert_eq!(model.max_tokens, 1200);

        let both = ModelSettings {
            max_tokens: Some(300),
            ..settings
        };
        assert_eq!(MessagesModel::new("k", &both).max_tokens, 300);
        assert_eq!(
            MessagesModel::new("k", &ModelSettings::default()).max_tokens,
            FALLBACK_MAX_TOKENS
        );
    }

    #[test]
    fn body_carries_configured_model_and_temperature() {
        let settings = ModelSettings {
            model_provider: "anthropic".to_string(),
            model: Some("claude-3-7-sonnet-latest".to_string()),
            temperature: Some(0.0),
            max_tokens: Some(2000),
            max_completion_tokens: None,
        };
        let model = MessagesModel::new("k", &settings);
        let request = LlmRequest {
            messages: vec![ChatMessage::user("hi")],
            system: Some("be brief".to_string()),
            ..Default::default()
        };
        let body = serde_json::to_value(model.body(&request)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "claude-3-7-sonnet-latest",
                "max_tokens": 2000,
                "system": "be brief",
                "messages": [{"role": "user", "content": [{"type": "text", "text": "hi"}]}],
                "temperature": 0.0
            })
        );
    }

    #[test]
    fn is_error_is_sent_only_for_failed_tools() {
        let history = vec![tool_results(&[
            ("toolu_1", "ok", false),
            ("toolu_2", "server offline", true),
        ])];
        let wire = serde_json::to_value(turns(&history)).unwrap();
        assert_eq!(
            wire,
            json!([{
                "role": "user",
                "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "ok"},
                    {"type": "tool_result", "tool_use_id": "toolu_2",
                     "content": "server offline", "is_error": true}
                ]
            }])
        );
    }

    #[test]
    fn consecutive_user_messages_share_a_turn() {
        let history = vec![
            ChatMessage::user("first"),
            ChatMessage {
                role: ChatRole::Assistant,
                content: MessagePart::Parts(vec![ContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "read_file".to_string(),
                    input: json!({"path": "a"}),
                }]),
            },
            tool_results(&[("toolu_1", "contents", false)]),
            ChatMessage::user("second"),
            ChatMessage::assistant(""),
        ];

        let wire = turns(&history);
        let roles: Vec<_> = wire.iter().map(|t| t.role).collect();
        assert_eq!(roles, ["user", "assistant", "user"]);
        assert_eq!(wire[2].content.len(), 2);
    }

    #[test]
    fn unknown_reply_blocks_are_dropped() {
        let reply: MessagesReply = serde_json::from_value(json!({
            "model": "claude-3-7-sonnet-latest",
            "content": [
                {"type": "thinking", "thinking": "...", "signature": "sig"},
                {"type": "text", "text": "Checking."},
                {"type": "tool_use", "id": "toolu_9", "name": "get-alerts", "input": {"state": "CA"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 50, "output_tokens": 30}
        }))
        .unwrap();

        let response = LlmResponse::from(reply);
        assert_eq!(
            response.content,
            vec![
                ContentBlock::Text {
                    text: "Checking.".to_string()
                },
                ContentBlock::ToolUse {
                    id: "toolu_9".to_string(),
                    name: "get-alerts".to_string(),
                    input: json!({"state": "CA"}),
                },
            ]
        );
        assert!(response.has_tool_use());
    }
}
