use std::borrow::Cow;

use async_trait::async_trait;
use mcpchat_common::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{instrument, warn};

use crate::chat_model::ModelSettings;
use crate::http;
use crate::providers::{
    ChatMessage, ChatRole, ContentBlock, LlmProvider, LlmRequest, LlmResponse, MessagePart,
    ToolDefinition, Usage, extract_text,
};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OPENAI_MODEL: &str = "gpt-4o-mini";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
const GEMINI_MODEL: &str = "gemini-2.0-flash";

/// Output token cap sent with each completion.
///
/// The API rejects requests that carry both fields, so a configured
/// `max_completion_tokens` replaces `max_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenLimit {
    Unset,
    MaxTokens(u32),
    MaxCompletionTokens(u32),
}

impl TokenLimit {
    fn from_settings(settings: &ModelSettings) -> Self {
        match (settings.max_completion_tokens, settings.max_tokens) {
            (Some(limit), _) => Self::MaxCompletionTokens(limit),
            (None, Some(limit)) => Self::MaxTokens(limit),
            (None, None) => Self::Unset,
        }
    }

    /// A per-request `max_tokens` only overrides a plain `max_tokens` setting.
    fn for_request(self, requested: Option<u32>) -> Self {
        match (self, requested) {
            (Self::MaxCompletionTokens(_), _) | (_, None) => self,
            (_, Some(limit)) => Self::MaxTokens(limit),
        }
    }

    fn max_tokens(self) -> Option<u32> {
        match self {
            Self::MaxTokens(limit) => Some(limit),
            _ => None,
        }
    }

    fn max_completion_tokens(self) -> Option<u32> {
        match self {
            Self::MaxCompletionTokens(limit) => Some(limit),
            _ => None,
        }
    }
}

/// Client for the Chat Completions API and services that expose the same
/// wire format (Gemini's OpenAI compatibility layer).
pub struct ChatCompletionsModel {
    http: reqwest::Client,
    provider_id: &'static str,
    url: String,
    api_key: String,
    model: String,
    temperature: Option<f64>,
    limit: TokenLimit,
}

impl ChatCompletionsModel {
    pub fn openai(api_key: impl Into<String>, settings: &ModelSettings) -> Self {
        Self::with_defaults("openai", OPENAI_BASE_URL, OPENAI_MODEL, api_key, settings)
    }

    pub fn gemini(api_key: impl Into<String>, settings: &ModelSettings) -> Self {
        Self::with_defaults("google_genai", GEMINI_BASE_URL, GEMINI_MODEL, api_key, settings)
    }

    fn with_defaults(
        provider_id: &'static str,
        base_url: &str,
        model: &str,
        api_key: impl Into<String>,
        settings: &ModelSettings,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            provider_id,
            url: http::endpoint(base_url, "chat/completions"),
            api_key: api_key.into(),
            model: settings.model_or(model),
            temperature: settings.temperature,
            limit: TokenLimit::from_settings(settings),
        }
    }

    /// Point the client at another deployment of the same API.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.url = http::endpoint(base_url, "chat/completions");
        self
    }

    fn body<'a>(&'a self, request: &'a LlmRequest) -> CompletionRequest<'a> {
        let limit = self.limit.for_request(request.max_tokens);
        CompletionRequest {
            model: if request.model.is_empty() {
                self.model.as_str()
            } else {
                request.model.as_str()
            },
            messages: wire_messages(request.system.as_deref(), &request.messages),
            temperature: request.temperature.or(self.temperature),
            max_tokens: limit.max_tokens(),
            max_completion_tokens: limit.max_completion_tokens(),
            tools: request.tools.iter().map(FunctionTool::from).collect(),
        }
    }
}

#[async_trait]
impl LlmProvider for ChatCompletionsModel {
    fn provider_id(&self) -> &str {
        self.provider_id
    }

    fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(provider = self.provider_id))]
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse> {
        let call = self.http.post(&self.url).bearer_auth(&self.api_key);
        let reply: CompletionReply =
            http::post_json(call, self.provider_id, &self.body(request)).await?;
        Ok(reply.into())
    }
}

/// Flatten the agent history into Chat Completions messages.
///
/// A turn of tool results becomes one `tool` message per call; an assistant
/// turn keeps its text next to the calls it requested.
fn wire_messages<'a>(system: Option<&'a str>, history: &'a [ChatMessage]) -> Vec<Message<'a>> {
    let mut out: Vec<Message<'a>> = system
        .map(|content| Message::System { content })
        .into_iter()
        .collect();

    for message in history {
        match (&message.role, &message.content) {
            (ChatRole::System, _) => {}
            (_, MessagePart::Parts(blocks)) if message.is_tool_result() => {
                out.extend(blocks.iter().filter_map(|block| match block {
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => Some(Message::Tool {
                        tool_call_id: tool_use_id,
                        content: if *is_error {
                            Cow::Owned(format!("Error: {content}"))
                        } else {
                            Cow::Borrowed(content.as_str())
                        },
                    }),
                    _ => None,
                }));
            }
            (ChatRole::Assistant, MessagePart::Parts(blocks)) => {
                let text = extract_text(blocks);
                out.push(Message::Assistant {
                    content: (!text.is_empty()).then_some(Cow::Owned(text)),
                    tool_calls: blocks.iter().filter_map(ToolCall::from_block).collect(),
                });
            }
            (ChatRole::Assistant, MessagePart::Text(text)) => out.push(Message::Assistant {
                content: Some(Cow::Borrowed(text.as_str())),
                tool_calls: Vec::new(),
            }),
            (_, MessagePart::Text(text)) => out.push(Message::User {
                content: Cow::Borrowed(text.as_str()),
            }),
            (_, MessagePart::Parts(blocks)) => out.push(Message::User {
                content: Cow::Owned(extract_text(blocks)),
            }),
        }
    }
    out
}

/// Tool call arguments arrive as a JSON string; some compatible services
/// send an empty string for calls without parameters.
fn parse_arguments(name: &str, raw: &str) -> Value {
    if raw.trim().is_empty() {
        return Value::Object(Default::default());
    }
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("discarding malformed arguments for {name}: {e}");
        Value::Object(Default::default())
    })
}

fn stop_reason(finish_reason: &str) -> String {
    match finish_reason {
        "stop" => "end_turn",
        "tool_calls" => "tool_use",
        "length" => "max_tokens",
        other => other,
    }
    .to_string()
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<FunctionTool<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum Message<'a> {
    System {
        content: &'a str,
    },
    User {
        content: Cow<'a, str>,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<Cow<'a, str>>,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall<'a>>,
    },
    Tool {
        tool_call_id: &'a str,
        content: Cow<'a, str>,
    },
}

#[derive(Debug, Serialize)]
struct ToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionCall<'a>,
}

impl<'a> ToolCall<'a> {
    fn from_block(block: &'a ContentBlock) -> Option<Self> {
        match block {
            ContentBlock::ToolUse { id, name, input } => Some(Self {
                id,
                kind: "function",
                function: FunctionCall {
                    name,
                    arguments: input.to_string(),
                },
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FunctionCall<'a> {
    name: &'a str,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct FunctionTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionSpec<'a>,
}

#[derive(Debug, Serialize)]
struct FunctionSpec<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolDefinition> for FunctionTool<'a> {
    fn from(tool: &'a ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: FunctionSpec {
                name: &tool.name,
                description: &tool.description,
                parameters: &tool.input_schema,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionReply {
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Reply,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Reply {
    content: Option<String>,
    tool_calls: Option<Vec<ReplyToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ReplyToolCall {
    id: String,
    function: ReplyFunction,
}

#[derive(Debug, Deserialize)]
struct ReplyFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct TokenUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

impl From<CompletionReply> for LlmResponse {
    fn from(reply: CompletionReply) -> Self {
        let mut content = Vec::new();
        let mut stop = None;

        if let Some(choice) = reply.choices.into_iter().next() {
            if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
                content.push(ContentBlock::Text { text });
            }
            content.extend(choice.message.tool_calls.into_iter().flatten().map(|call| {
                ContentBlock::ToolUse {
                    input: parse_arguments(&call.function.name, &call.function.arguments),
                    id: call.id,
                    name: call.function.name,
                }
            }));
            stop = choice.finish_reason.as_deref().map(stop_reason);
        }

        LlmResponse {
            content,
            model: reply.model,
            usage: reply.usage.map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
            stop_reason: stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn settings(max_tokens: Option<u32>, max_completion_tokens: Option<u32>) -> ModelSettings {
        ModelSettings {
            model_provider: "openai".to_string(),
            model: Some("gpt-4.1-nano".to_string()),
            temperature: Some(0.1),
            max_tokens,
            max_completion_tokens,
        }
    }

    fn serialized(model: &ChatCompletionsModel, request: &LlmRequest) -> Value {
        serde_json::to_value(model.body(request)).unwrap()
    }

    #[test]
    fn max_completion_tokens_replaces_max_tokens() {
        let model = ChatCompletionsModel::openai("k", &settings(Some(500), Some(800)));
        let body = serialized(&model, &LlmRequest::default());
        assert_eq!(body["max_completion_tokens"], 800);
        assert!(body.get("max_tokens").is_none());

        let per_request = LlmRequest {
            max_tokens: Some(64),
            ..Default::default()
        };
        let body = serialized(&model, &per_request);
        assert_eq!(body["max_completion_tokens"], 800);
        assert!(body.get("max_tokens").is_none());
    }

    #[test]
    fn max_tokens_is_sent_alone_when_configured_alone() {
        let model = ChatCompletionsModel::openai("k", &settings(Some(500), None));
        let body = serialized(&model, &LlmRequest::default());
        assert_eq!(body["max_tokens"], 500);
        assert!(body.get("max_completion_tokens").is_none());
        assert_eq!(body["model"], "gpt-4.1-nano");
        assert_eq!(body["temperature"], 0.1);
    }

    #[test]
    fn no_limit_and_no_tools_keep_the_body_minimal() {
        let model = ChatCompletionsModel::openai("k", &ModelSettings::default());
        let body = serialized(&model, &LlmRequest::default());
        assert_eq!(body, json!({"model": OPENAI_MODEL, "messages": []}));
    }

    #[test]
    fn gemini_uses_the_compatibility_endpoint() {
        let model = ChatCompletionsModel::gemini("k", &ModelSettings::default());
        assert_eq!(model.provider_id(), "google_genai");
        assert_eq!(model.model(), GEMINI_MODEL);
        assert_eq!(
            model.url,
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );
    }

    #[test]
    fn tool_turns_map_to_tool_messages() {
        let history = vec![
            ChatMessage::user("what's in /tmp"),
            ChatMessage {
                role: ChatRole::Assistant,
                content: MessagePart::Parts(vec![
                    ContentBlock::ToolUse {
                        id: "call_a".to_string(),
                        name: "list_directory".to_string(),
                        input: json!({"path": "/tmp"}),
                    },
                    ContentBlock::ToolUse {
                        id: "call_b".to_string(),
                        name: "read_file".to_string(),
                        input: json!({"path": "/tmp/x"}),
                    },
                ]),
            },
            ChatMessage {
                role: ChatRole::User,
                content: MessagePart::Parts(vec![
                    ContentBlock::ToolResult {
                        tool_use_id: "call_a".to_string(),
                        content: "x".to_string(),
                        is_error: false,
                    },
                    ContentBlock::ToolResult {
                        tool_use_id: "call_b".to_string(),
                        content: "permission denied".to_string(),
                        is_error: true,
                    },
                ]),
            },
        ];

        let wire = serde_json::to_value(wire_messages(Some("be brief"), &history)).unwrap();
        assert_eq!(
            wire,
            json!([
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "what's in /tmp"},
                {"role": "assistant", "tool_calls": [
                    {"id": "call_a", "type": "function",
                     "function": {"name": "list_directory", "arguments": "{\"path\":\"/tmp\"}"}},
                    {"id": "call_b", "type": "function",
                     "function": {"name": "read_file", "arguments": "{\"path\":\"/tmp/x\"}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_a", "content": "x"},
                {"role": "tool", "tool_call_id": "call_b", "content": "Error: permission denied"}
            ])
        );
    }

    #[test]
    fn reply_with_empty_arguments_yields_empty_input() {
        let reply: CompletionReply = serde_json::from_value(json!({
            "model": "gemini-2.0-flash",
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{
                        "id": "0",
                        "type": "function",
                        "function": {"name": "get-alerts", "arguments": ""}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();

        let response = LlmResponse::from(reply);
        assert_eq!(
            response.content,
            vec![ContentBlock::ToolUse {
                id: "0".to_string(),
                name: "get-alerts".to_string(),
                input: json!({}),
            }]
        );
        assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
        assert!(response.usage.is_none());
    }

    #[test]
    fn truncated_reply_reports_max_tokens() {
        let reply: CompletionReply = serde_json::from_value(json!({
            "model": "gpt-4o-mini",
            "choices": [{
                "message": {"role": "assistant", "content": "partial"},
                "finish_reason": "length"
            }],
            "usage": {"prompt_tokens": 4, "completion_tokens": 16}
        }))
        .unwrap();
        let response = LlmResponse::from(reply);
        assert_eq!(response.stop_reason.as_deref(), Some("max_tokens"));
        assert_eq!(response.usage.map(|u| u.output_tokens), Some(16));
    }
}
