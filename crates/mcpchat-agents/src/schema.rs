use serde_json::{Map, Value};

/// Keywords the Gemini function-declaration schema rejects.
const GEMINI_UNSUPPORTED_KEYS: &[&str] = &[
    "$schema",
    "$id",
    "$comment",
    "additionalProperties",
    "default",
    "examples",
];

/// Which provider's schema dialect tool schemas are adapted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderHint {
    OpenAi,
    GoogleGemini,
    GoogleGenAi,
    Anthropic,
    Xai,
    #[default]
    None,
}

impl ProviderHint {
    /// Hint for a configured provider id; `None` when transformations are
    /// disabled or the provider has no known dialect.
    pub fn for_provider(provider: &str, transformations_enabled: bool) -> Self {
        if !transformations_enabled {
            return ProviderHint::None;
        }
        match provider {
            "openai" => ProviderHint::OpenAi,
            "google_gemini" => ProviderHint::GoogleGemini,
            "google_genai" => ProviderHint::GoogleGenAi,
            "anthropic" => ProviderHint::Anthropic,
            "xai" => ProviderHint::Xai,
            _ => ProviderHint::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderHint::OpenAi => "openai",
            ProviderHint::GoogleGemini => "google_gemini",
            ProviderHint::GoogleGenAi => "google_genai",
            ProviderHint::Anthropic => "anthropic",
            ProviderHint::Xai => "xai",
            ProviderHint::None => "none",
        }
    }

    fn is_gemini(&self) -> bool {
        matches!(self, ProviderHint::GoogleGemini | ProviderHint::GoogleGenAi)
    }
}

/// Adapt `schema` to the dialect named by `hint`. `ProviderHint::None`
/// returns the schema unchanged.
pub fn transform_schema(schema: &Value, hint: ProviderHint) -> Value {
    if hint == ProviderHint::None {
        return schema.clone();
    }

    let mut out = schema.clone();
    if hint.is_gemini() {
        strip_for_gemini(&mut out, false);
    }
    if hint == ProviderHint::OpenAi {
        ensure_properties(&mut out);
    }
    ensure_object_root(&mut out);
    out
}

/// `property_map` marks the value of a `properties` keyword, whose keys are
/// property names rather than schema keywords.
fn strip_for_gemini(value: &mut Value, property_map: bool) {
    match value {
        Value::Object(map) => {
            if !property_map {
                for key in GEMINI_UNSUPPORTED_KEYS {
                    map.remove(*key);
                }
                collapse_nullable_type(map);
            }
            for (key, child) in map.iter_mut() {
                strip_for_gemini(child, !property_map && key == "properties");
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| strip_for_gemini(v, false)),
        _ => {}
    }
}

/// `"type": ["string", "null"]` becomes `"type": "string", "nullable": true`.
fn collapse_nullable_type(map: &mut Map<String, Value>) {
    let Some(Value::Array(types)) = map.get("type") else {
        return;
    };
    let non_null: Vec<Value> = types
        .iter()
        .filter(|t| t.as_str() != Some("null"))
        .cloned()
        .collect();
    if non_null.len() == types.len() || non_null.len() != 1 {
        return;
    }
    map.insert("type".to_string(), non_null[0].clone());
    map.insert("nullable".to_string(), Value::Bool(true));
}

fn ensure_properties(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_str) == Some("object")
                && !map.contains_key("properties")
            {
                map.insert("properties".to_string(), Value::Object(Map::new()));
            }
            for child in map.values_mut() {
                ensure_properties(child);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(ensure_properties),
        _ => {}
    }
}

fn ensure_object_root(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if !map.contains_key("type") {
                map.insert("type".to_string(), Value::String("object".to_string()));
            }
            if map.get("type").and_then(Value::as_str) == Some("object")
                && !map.contains_key("properties")
            {
                map.insert("properties".to_string(), Value::Object(Map::new()));
            }
        }
        _ => {
            *value = serde_json::json!({"type": "object", "properties": {}});
        }
    }
}
