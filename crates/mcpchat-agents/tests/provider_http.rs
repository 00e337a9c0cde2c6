use mcpchat_agents::ChatMessage;
use mcpchat_agents::ModelSettings;
use mcpchat_agents::anthropic::MessagesModel;
use mcpchat_agents::openai::ChatCompletionsModel;
use mcpchat_agents::providers::{ChatRole, ContentBlock, LlmProvider, LlmRequest, MessagePart};
use serde_json::json;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn hello_request() -> LlmRequest {
    LlmRequest {
        messages: vec![ChatMessage::user("hello")],
        ..Default::default()
    }
}

fn settings(provider: &str) -> ModelSettings {
    ModelSettings {
        model_provider: provider.to_string(),
        ..Default::default()
    }
}

fn text_completion(model: &str, text: &str) -> serde_json::Value {
    json!({
        "model": model,
        "choices": [{
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 3, "completion_tokens": 2}
    })
}

#[tokio::test]
async fn openai_sends_configured_generation_settings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_json(json!({
            "model": "gpt-4.1-nano",
            "messages": [{"role": "user", "content": "hello"}],
            "temperature": 0.3,
            "max_completion_tokens": 900
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_completion("gpt-4.1-nano", "Hi!")))
        .expect(1)
        .mount(&server)
        .await;

    let config = ModelSettings {
        model: Some("gpt-4.1-nano".to_string()),
        temperature: Some(0.3),
        max_tokens: Some(100),
        max_completion_tokens: Some(900),
        ..settings("openai")
    };
    let model = ChatCompletionsModel::openai("sk-test", &config)
        .with_base_url(&format!("{}/v1", server.uri()));

    let response = model.complete(&hello_request()).await.unwrap();
    assert_eq!(
        response.content,
        vec![ContentBlock::Text {
            text: "Hi!".to_string()
        }]
    );
    assert_eq!(response.stop_reason.as_deref(), Some("end_turn"));
}

#[tokio::test]
async fn gemini_reports_its_own_provider_id_in_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/openai/chat/completions"))
        .and(header("authorization", "Bearer g-key"))
        .respond_with(ResponseTemplate::new(400).set_body_string("API key not valid"))
        .mount(&server)
        .await;

    let model = ChatCompletionsModel::gemini("g-key", &settings("google_genai"))
        .with_base_url(&format!("{}/v1beta/openai/", server.uri()));
    let message = model.complete(&hello_request()).await.unwrap_err().to_string();
    assert!(message.contains("google_genai"));
    assert!(message.contains("400"));
    assert!(message.contains("API key not valid"));
}

#[tokio::test]
async fn anthropic_sends_failed_tool_results_with_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "max_tokens": 256,
            "messages": [
                {"role": "user", "content": [{"type": "text", "text": "forecast?"}]},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "toolu_1", "name": "get-forecast", "input": {"city": "Tokyo"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "toolu_1", "content": "upstream timeout", "is_error": true}
                ]}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "The forecast service is down."}],
            "model": "claude-3-5-haiku-latest",
            "usage": {"input_tokens": 9, "output_tokens": 4},
            "stop_reason": "end_turn"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = ModelSettings {
        max_completion_tokens: Some(256),
        ..settings("anthropic")
    };
    let model = MessagesModel::new("ak-test", &config).with_base_url(&server.uri());

    let request = LlmRequest {
        messages: vec![
            ChatMessage::user("forecast?"),
            ChatMessage {
                role: ChatRole::Assistant,
                content: MessagePart::Parts(vec![ContentBlock::ToolUse {
                    id: "toolu_1".to_string(),
                    name: "get-forecast".to_string(),
                    input: json!({"city": "Tokyo"}),
                }]),
            },
            ChatMessage {
                role: ChatRole::User,
                content: MessagePart::Parts(vec![ContentBlock::ToolResult {
                    tool_use_id: "toolu_1".to_string(),
                    content: "upstream timeout".to_string(),
                    is_error: true,
                }]),
            },
        ],
        ..Default::default()
    };

    let response = model.complete(&request).await.unwrap();
    assert!(!response.has_tool_use());
    assert_eq!(response.usage.map(|u| u.input_tokens), Some(9));
}
