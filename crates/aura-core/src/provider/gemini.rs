use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tracing::debug;

use crate::config::DEFAULT_API_BASE;
use crate::error::ProviderError;
use crate::types::{
    CompletionResponse, ContentPart, FinishReason, Message, Role, TokenUsage, ToolCall,
};
use crate::util::http;

use super::LlmProvider;

/// Google Gemini API provider.
pub struct GeminiProvider {
    api_key: String,
    api_base: String,
    default_model: String,
}

impl GeminiProvider {
    pub fn new(api_key: String, api_base: Option<String>, default_model: String) -> Self {
        let base = api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string());
        Self {
            api_key,
            api_base: base.trim_end_matches('/').to_string(),
            default_model,
        }
    }

    /// Normalize model name: strip "gemini/" and "models/" prefixes.
    fn normalize_model(model: &str) -> &str {
        let model = model.strip_prefix("gemini/").unwrap_or(model);
        model.strip_prefix("models/").unwrap_or(model)
    }

    /// Convert messages to Gemini `contents`, pulling out the system instruction.
    ///
    /// Consecutive tool results are grouped into a single turn so every
    /// `functionCall` turn is answered by exactly one `functionResponse` turn.
    fn convert_messages(messages: &[Message]) -> (Option<serde_json::Value>, Vec<serde_json::Value>) {
        let mut system_instruction = None;
        let mut contents: Vec<serde_json::Value> = Vec::new();
        let mut pending_responses: Vec<serde_json::Value> = Vec::new();

        for msg in messages {
            if msg.role != Role::Tool && !pending_responses.is_empty() {
                contents.push(json!({"role": "user", "parts": std::mem::take(&mut pending_responses)}));
            }

            match msg.role {
                Role::System => {
                    system_instruction = Some(json!({
                        "parts": [{"text": msg.content.as_deref().unwrap_or("")}]
                    }));
                }
                Role::User => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{"text": msg.content.as_deref().unwrap_or("")}]
                    }));
                }
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if let Some(ref text) = msg.content {
                        if !text.is_empty() || msg.tool_calls.is_empty() {
                            parts.push(json!({"text": text}));
                        }
                    }
                    for tc in &msg.tool_calls {
                        parts.push(json!({
                            "functionCall": {"name": tc.name, "args": tc.arguments}
                        }));
                    }
                    if parts.is_empty() {
                        parts.push(json!({"text": ""}));
                    }
                    contents.push(json!({"role": "model", "parts": parts}));
                }
                Role::Tool => {
                    let name = msg.name.as_deref().unwrap_or("tool");
                    let content = msg.content.as_deref().unwrap_or("");
                    // functionResponse.response must be an object
                    let response = match serde_json::from_str::<serde_json::Value>(content) {
                        Ok(v) if v.is_object() => v,
                        Ok(v) => json!({"result": v}),
                        Err(_) => json!({"result": content}),
                    };
                    pending_responses.push(json!({
                        "functionResponse": {
                            "name": name,
                            "response": response,
                        }
                    }));
                }
            }
        }

        if !pending_responses.is_empty() {
            contents.push(json!({"role": "user", "parts": pending_responses}));
        }

        (system_instruction, contents)
    }

    /// Convert function-style tool definitions to Gemini format.
    fn convert_tools(tools: &[serde_json::Value]) -> Vec<serde_json::Value> {
        let declarations: Vec<serde_json::Value> = tools
            .iter()
            .filter_map(|t| {
                let function = t.get("function")?;
                let mut decl = json!({
                    "name": function.get("name")?,
                    "description": function.get("description").and_then(|v| v.as_str()).unwrap_or(""),
                });
                if let Some(parameters) = Self::declared_parameters(function.get("parameters")) {
                    decl["parameters"] = parameters.clone();
                }
                Some(decl)
            })
            .collect();

        vec![json!({"functionDeclarations": declarations})]
    }

    /// Gemini rejects an OBJECT schema with no properties, so zero-argument
    /// tools are declared without one.
    fn declared_parameters(parameters: Option<&serde_json::Value>) -> Option<&serde_json::Value> {
        parameters.filter(|p| {
            p.get("properties")
                .and_then(|v| v.as_object())
                .is_some_and(|o| !o.is_empty())
        })
    }

    /// Build the `generateContent` request body.
    fn build_body(
        messages: &[Message],
        tools: Option<&[serde_json::Value]>,
        max_tokens: u32,
        temperature: f64,
    ) -> serde_json::Value {
        let (system_instruction, contents) = Self::convert_messages(messages);

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": max_tokens,
                "temperature": temperature,
            },
        });

        if let Some(system) = system_instruction {
            body["systemInstruction"] = system;
        }

        if let Some(tools) = tools {
            if !tools.is_empty() {
                body["tools"] = json!(Self::convert_tools(tools));
            }
        }

        body
    }

    /// Pull the human-readable message out of a Gemini error body.
    fn error_message(text: &str) -> String {
        serde_json::from_str::<serde_json::Value>(text)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| text.to_string())
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn chat(
        &self,
        messages: &[Message],
        tools: Option<&[serde_json::Value]>,
        model: &str,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<CompletionResponse, ProviderError> {
        let model_name = Self::normalize_model(model);
        let url = format!("{}/models/{}:generateContent", self.api_base, model_name);
        let body = Self::build_body(messages, tools, max_tokens, temperature);

        debug!(
            "Gemini request with model {} ({} contents)",
            model_name,
            body["contents"].as_array().map_or(0, |c| c.len())
        );

        let response = http::client()
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message: Self::error_message(&text),
            });
        }

        let data: serde_json::Value = response.json().await?;
        Self::parse_response(&data)
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

impl GeminiProvider {
    fn parse_response(data: &serde_json::Value) -> Result<CompletionResponse, ProviderError> {
        let candidate = data
            .get("candidates")
            .and_then(|v| v.get(0))
            .ok_or_else(|| {
                let reason = data["promptFeedback"]["blockReason"]
                    .as_str()
                    .map(|r| format!(" (prompt blocked: {r})"))
                    .unwrap_or_default();
                ProviderError::Parse(format!("No candidates in response{reason}"))
            })?;

        let raw_parts = candidate
            .get("content")
            .and_then(|v| v.get("parts"))
            .and_then(|v| v.as_array())
            .ok_or_else(|| {
                let reason = candidate["finishReason"].as_str().unwrap_or("unknown");
                ProviderError::Parse(format!("No parts in response (finish reason: {reason})"))
            })?;

        let mut parts = Vec::with_capacity(raw_parts.len());
        for part in raw_parts {
            if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                parts.push(ContentPart::Text(text.to_string()));
            }
            if let Some(fc) = part.get("functionCall") {
                let name = fc
                    .get("name")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                let args = fc.get("args").cloned().unwrap_or(json!({}));
                let arguments: HashMap<String, serde_json::Value> =
                    serde_json::from_value(args).unwrap_or_default();
                let id = fc
                    .get("id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| {
                        let uuid = uuid::Uuid::new_v4().simple().to_string();
                        format!("call_{}", &uuid[..8])
                    });

                parts.push(ContentPart::FunctionCall(ToolCall {
                    id,
                    name,
                    arguments,
                }));
            }
        }

        let has_calls = parts
            .iter()
            .any(|p| matches!(p, ContentPart::FunctionCall(_)));
        let finish_reason = match candidate.get("finishReason").and_then(|v| v.as_str()) {
            _ if has_calls => FinishReason::ToolCalls,
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") | Some("RECITATION") | Some("BLOCKLIST") => FinishReason::Safety,
            _ => FinishReason::Stop,
        };

        let usage = match data.get("usageMetadata") {
            Some(u) => {
                let count = |key: &str| u.get(key).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
                TokenUsage {
                    prompt_tokens: count("promptTokenCount"),
                    completion_tokens: count("candidatesTokenCount"),
                    total_tokens: count("totalTokenCount"),
                }
            }
            None => TokenUsage::default(),
        };

        Ok(CompletionResponse {
            parts,
            finish_reason,
            usage,
        })
    }
}
