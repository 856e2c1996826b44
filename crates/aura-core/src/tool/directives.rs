//! Inert tools whose only job is to let the model emit directives.
//!
//! The browser client performs the actual action; the server just hands the
//! model a status marker so it can finish its reply.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use super::Tool;
use crate::error::ToolError;

type Params = HashMap<String, serde_json::Value>;

/// Declarative description of one directive tool.
pub struct DirectiveSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Required string parameters, each with its description.
    pub string_params: &'static [(&'static str, &'static str)],
    /// Builds the stub result from validated parameters.
    pub result: fn(&Params) -> serde_json::Value,
}

pub const DIRECTIVES: &[DirectiveSpec] = &[
    DirectiveSpec {
        name: "open_youtube",
        description: "Opens YouTube and searches for a specific song or video.",
        string_params: &[("query", "Song, artist or video to search for")],
        result: |p| json!({"status": "requesting_youtube_search", "query": p["query"]}),
    },
    DirectiveSpec {
        name: "search_web",
        description: "Searches Google for real-time information.",
        string_params: &[("query", "Search query")],
        result: |p| json!({"status": "requesting_google_search", "query": p["query"]}),
    },
    DirectiveSpec {
        name: "open_terminal",
        description: "Opens the local system terminal environment.",
        string_params: &[],
        result: |_| json!({"status": "opening_terminal"}),
    },
];

/// A `Tool` backed by a `DirectiveSpec`.
pub struct DirectiveTool {
    spec: &'static DirectiveSpec,
}

impl DirectiveTool {
    pub fn new(spec: &'static DirectiveSpec) -> Self {
        Self { spec }
    }
}

#[async_trait]
impl Tool for DirectiveTool {
    fn name(&self) -> &str {
        self.spec.name
    }

    fn description(&self) -> &str {
        self.spec.description
    }

    fn parameters(&self) -> serde_json::Value {
        let properties: serde_json::Map<String, serde_json::Value> = self
            .spec
            .string_params
            .iter()
            .map(|(name, desc)| {
                (name.to_string(), json!({"type": "string", "description": desc}))
            })
            .collect();
        let required: Vec<&str> = self.spec.string_params.iter().map(|(n, _)| *n).collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    async fn execute(&self, params: Params) -> Result<serde_json::Value, ToolError> {
        for (name, _) in self.spec.string_params {
            match params.get(*name) {
                Some(v) if v.is_string() => {}
                _ => {
                    return Err(ToolError::InvalidParams(format!(
                        "'{}' requires a string '{}' parameter",
                        self.spec.name, name
                    )))
                }
            }
        }
        Ok((self.spec.result)(&params))
    }
}

/// All declared directive tools, in declaration order.
pub fn directive_tools() -> Vec<Arc<dyn Tool>> {
    DIRECTIVES
        .iter()
        .map(|spec| Arc::new(DirectiveTool::new(spec)) as Arc<dyn Tool>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(name: &str) -> DirectiveTool {
        let spec = DIRECTIVES.iter().find(|s| s.name == name).unwrap();
        DirectiveTool::new(spec)
    }

    fn query(q: &str) -> Params {
        let mut p = HashMap::new();
        p.insert("query".to_string(), json!(q));
        p
    }

    #[test]
    fn test_three_directives_declared() {
        let names: Vec<&str> = DIRECTIVES.iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["open_youtube", "search_web", "open_terminal"]);
        assert_eq!(directive_tools().len(), 3);
    }

    #[test]
    fn test_parameter_schemas() {
        let yt = tool("open_youtube").parameters();
        assert_eq!(yt["properties"]["query"]["type"], "string");
        assert_eq!(yt["required"], json!(["query"]));

        let term = tool("open_terminal").parameters();
        assert_eq!(term["properties"], json!({}));
        assert_eq!(term["required"], json!([]));
    }

    #[tokio::test]
    async fn test_stub_results() {
        let out = tool("open_youtube").execute(query("daft punk")).await.unwrap();
        assert_eq!(out, json!({"status": "requesting_youtube_search", "query": "daft punk"}));

        let out = tool("search_web").execute(query("weather oslo")).await.unwrap();
        assert_eq!(out, json!({"status": "requesting_google_search", "query": "weather oslo"}));

        let out = tool("open_terminal").execute(HashMap::new()).await.unwrap();
        assert_eq!(out, json!({"status": "opening_terminal"}));
    }

    #[tokio::test]
    async fn test_missing_query_rejected() {
        let err = tool("search_web").execute(HashMap::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(_)));

        let mut wrong_type = HashMap::new();
        wrong_type.insert("query".to_string(), json!(42));
        let err = tool("open_youtube").execute(wrong_type).await.unwrap_err();
        assert!(err.to_string().contains("query"));
    }
}
