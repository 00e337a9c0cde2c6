use std::sync::Arc;

use mcpchat_common::{Error, Result};
use mcpchat_config::LlmConfig;
use tracing::info;

use crate::anthropic::MessagesModel;
use crate::openai::ChatCompletionsModel;
use crate::providers::LlmProvider;

/// Settings needed to construct a chat model client.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSettings {
    pub model_provider: String,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub max_completion_tokens: Option<u32>,
}

impl ModelSettings {
    pub(crate) fn model_or(&self, fallback: &str) -> String {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(fallback)
            .to_string()
    }
}

impl From<&LlmConfig> for ModelSettings {
    fn from(llm: &LlmConfig) -> Self {
        Self {
            model_provider: llm.model_provider.clone(),
            model: Some(llm.model.clone()),
            temperature: llm.temperature,
            max_tokens: llm.max_tokens_u32(),
            max_completion_tokens: llm.max_completion_tokens_u32(),
        }
    }
}

/// Build a chat model client for `settings`, reading API keys from the
/// process environment.
pub fn init_chat_model(settings: &ModelSettings) -> Result<Arc<dyn LlmProvider>> {
    init_chat_model_with(settings, |key| std::env::var(key).ok())
}

/// Like [`init_chat_model`] but resolves API keys through `lookup`.
pub fn init_chat_model_with(
    settings: &ModelSettings,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn LlmProvider>> {
    let provider_id = settings.model_provider.to_lowercase();

    let api_key = |var: &str| {
        lookup(var)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::ModelInit(format!("{var} is not set")))
    };

    let model: Arc<dyn LlmProvider> = match provider_id.as_str() {
        "openai" => Arc::new(ChatCompletionsModel::openai(
            api_key("OPENAI_API_KEY")?,
            settings,
        )),
        "anthropic" => Arc::new(MessagesModel::new(api_key("ANTHROPIC_API_KEY")?, settings)),
        "google_genai" => Arc::new(ChatCompletionsModel::gemini(
            api_key("GOOGLE_API_KEY")?,
            settings,
        )),
        _ => {
            return Err(Error::ModelInit(format!(
                "Unsupported model_provider: {}",
                settings.model_provider
            )));
        }
    };

    if !model.supports_tool_calling() {
        return Err(Error::ModelInit(format!(
            "Tool calling unsupported by model_provider: {}",
            settings.model_provider
        )));
    }

    info!(
        "initialized chat model: provider={}, model={}",
        model.provider_id(),
        model.model()
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(provider: &str) -> ModelSettings {
        ModelSettings {
            model_provider: provider.to_string(),
            ..Default::default()
        }
    }

    fn with_all_keys(key: &str) -> Option<String> {
        Some(format!("{key}-value"))
    }

    #[test]
    fn builds_each_supported_provider() {
        for (provider, expected_id) in [
            ("openai", "openai"),
            ("anthropic", "anthropic"),
            ("google_genai", "google_genai"),
        ] {
            let model = init_chat_model_with(&settings(provider), with_all_keys).unwrap();
            assert_eq!(model.provider_id(), expected_id);
        }
    }

    #[test]
    fn provider_match_ignores_case() {
        let model = init_chat_model_with(&settings("OpenAI"), with_all_keys).unwrap();
        assert_eq!(model.provider_id(), "openai");
    }

    #[test]
    fn configured_model_name_is_used() {
        let s = ModelSettings {
            model_provider: "anthropic".into(),
            model: Some("claude-3-7-sonnet-latest".into()),
            ..Default::default()
        };
        let model = init_chat_model_with(&s, with_all_keys).unwrap();
        assert_eq!(model.model(), "claude-3-7-sonnet-latest");
    }

    #[test]
    fn unsupported_provider_is_a_model_init_error() {
        let err = init_chat_model_with(&settings("cohere"), with_all_keys).err().unwrap();
        assert!(err.is_model_init());
        assert_eq!(
            err.to_string(),
            "Failed to initialize chat model: Unsupported model_provider: cohere"
        );
    }

    #[test]
    fn missing_api_key_names_the_variable() {
        let err = init_chat_model_with(&settings("openai"), |_| None).err().unwrap();
        assert!(err.is_model_init());
        assert!(err.to_string().contains("OPENAI_API_KEY is not set"));

        let blank = init_chat_model_with(&settings("google_genai"), |_| Some("  ".into()))
            .err().unwrap();
        assert!(blank.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn blank_model_name_falls_back_to_provider_default() {
        let s = ModelSettings {
            model_provider: "google_genai".into(),
            model: Some(" ".into()),
            ..Default::default()
        };
        let model = init_chat_model_with(&s, with_all_keys).unwrap();
        assert_eq!(model.model(), "gemini-2.0-flash");
    }

    #[test]
    fn settings_from_llm_config() {
        let llm = LlmConfig {
            model_provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            temperature: Some(0.5),
            max_tokens: Some(serde_json::Number::from(1000)),
            max_completion_tokens: None,
        };
        let s = ModelSettings::from(&llm);
        assert_eq!(s.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(s.temperature, Some(0.5));
        assert_eq!(s.max_tokens, Some(1000));
        assert_eq!(s.max_completion_tokens, None);
    }
}
