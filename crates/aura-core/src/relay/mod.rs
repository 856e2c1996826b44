//! Chat relay: seeds a per-request session with caller history, runs the
//! automatic function-dispatch loop, and collects directives.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::error::{Result, ToolError};
use crate::provider::LlmProvider;
use crate::tool::ToolRegistry;
use crate::types::{Directive, FinishReason, Message, ToolCall, Turn};
use crate::util::truncate_string;

/// Text and directives produced by one chat exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RelayReply {
    pub text: String,
    pub directives: Vec<Directive>,
}

/// Settings that shape every request a session makes.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub model: String,
    pub system_instruction: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    pub max_iterations: u32,
}

impl SessionOptions {
    pub fn from_agent_config(model: impl Into<String>, agent: &AgentConfig) -> Self {
        let instruction = agent.system_instruction.trim();
        Self {
            model: model.into(),
            system_instruction: (!instruction.is_empty()).then(|| instruction.to_string()),
            max_tokens: agent.max_tokens,
            temperature: agent.temperature,
            max_iterations: agent.max_tool_iterations.max(1),
        }
    }
}

/// A single-use conversation with the model.
///
/// Nothing here is shared between requests: each session owns its history.
pub struct ChatSession {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    options: SessionOptions,
    history: Vec<Message>,
}

impl ChatSession {
    /// Start a session seeded with caller-supplied turns, order preserved.
    pub fn start(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        options: SessionOptions,
        turns: &[Turn],
    ) -> Self {
        let mut history = Vec::with_capacity(turns.len() + 1);
        if let Some(ref instruction) = options.system_instruction {
            history.push(Message::system(instruction));
        }
        for turn in turns {
            if !turn.is_user() && turn.role != "assistant" {
                debug!("Treating history role '{}' as model", turn.role);
            }
            history.push(turn.to_message());
        }

        Self {
            provider,
            tools,
            options,
            history,
        }
    }

    /// Submit a user message and let the model call tools until it answers.
    pub async fn send_message(&mut self, message: &str) -> Result<RelayReply> {
        self.history.push(Message::user(message));

        let tool_defs = self.tools.get_definitions();
        let tools = if tool_defs.is_empty() {
            None
        } else {
            Some(tool_defs.as_slice())
        };

        let mut texts: Vec<String> = Vec::new();
        let mut directives = Vec::new();

        for iteration in 0..self.options.max_iterations {
            debug!("Relay iteration {}", iteration + 1);

            let response = self
                .provider
                .chat(
                    &self.history,
                    tools,
                    &self.options.model,
                    self.options.max_tokens,
                    self.options.temperature,
                )
                .await?;

            debug!(
                "Model call {}: finish={:?} tokens={} (prompt {}, completion {})",
                iteration + 1,
                response.finish_reason,
                response.usage.total_tokens,
                response.usage.prompt_tokens,
                response.usage.completion_tokens
            );
            if response.finish_reason == FinishReason::Safety {
                warn!("Model response was cut short by a safety filter");
            }

            let text = response.text();
            if let Some(ref t) = text {
                if !t.trim().is_empty() {
                    texts.push(t.clone());
                }
            }

            if !response.has_tool_calls() {
                self.history.push(Message::assistant(text.unwrap_or_default()));
                return Ok(RelayReply {
                    text: texts.join("\n"),
                    directives,
                });
            }

            let calls: Vec<ToolCall> = response.function_calls().cloned().collect();
            directives.extend(calls.iter().map(Directive::from));
            self.history
                .push(Message::assistant_with_tool_calls(text, calls.clone()));

            let results = futures::future::join_all(calls.iter().map(|call| {
                let tools = self.tools.clone();
                async move {
                    let outcome = tools.execute(&call.name, call.arguments.clone()).await;
                    (call, outcome)
                }
            }))
            .await;

            for (call, outcome) in results {
                info!("Dispatched {}({})", call.name, Self::format_tool_args(&call.arguments));
                self.history.push(Message::tool_result(
                    &call.id,
                    &call.name,
                    Self::tool_response(&call.name, outcome).to_string(),
                ));
            }
        }

        warn!(
            "Stopped after {} model calls without a final answer",
            self.options.max_iterations
        );
        Ok(RelayReply {
            text: texts.join("\n"),
            directives,
        })
    }

    /// JSON object handed back to the model as the function response.
    fn tool_response(
        name: &str,
        outcome: std::result::Result<serde_json::Value, ToolError>,
    ) -> serde_json::Value {
        match outcome {
            Ok(value) => value,
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                serde_json::json!({"error": e.to_string()})
            }
        }
    }

    /// Format tool arguments for logging (abbreviated to avoid clutter).
    fn format_tool_args(args: &HashMap<String, serde_json::Value>) -> String {
        let mut keys: Vec<&String> = args.keys().collect();
        keys.sort();
        keys.iter()
            .map(|k| {
                let value = match &args[*k] {
                    serde_json::Value::String(s) => {
                        format!("\"{}\"", truncate_string(s, 50, "..."))
                    }
                    other => truncate_string(&other.to_string(), 50, "..."),
                };
                format!("{}={}", k, value)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Run one stateless exchange: fresh session, seeded history, one message.
pub async fn relay(
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    options: SessionOptions,
    history: &[Turn],
    message: &str,
) -> Result<RelayReply> {
    let mut session = ChatSession::start(provider, tools, options, history);
    session.send_message(message).await
}
