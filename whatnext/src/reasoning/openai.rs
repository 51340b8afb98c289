//! OpenAI Assistants API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, error};

use super::{
    AgentDefinition, ReasoningEngine, RunRequest, RunStatus, ToolCallRequest, ToolOutput,
};
use crate::error::{Result, WhatnextError};

const ASSISTANTS_BETA_HEADER: &str = "assistants=v2";

/// Reasoning engine backed by the `/assistants` and `/threads` endpoints.
pub struct OpenAiAssistantsEngine {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiAssistantsEngine {
    pub fn new(base_url: &str, api_key: &str, timeout_secs: u64) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(WhatnextError::Config(
                "API key required for the OpenAI reasoning engine".to_string(),
            ));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| WhatnextError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, url = %url, "Calling reasoning engine");

        let mut request = self
            .client
            .request(method, &url)
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA_HEADER);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| {
            error!("HTTP request failed: {}", e);
            WhatnextError::Upstream(format!("request to {} failed: {}", path, e))
        })?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!(status = %status, "Reasoning engine API error: {}", truncate(&text, 300));
            return Err(WhatnextError::Upstream(format!(
                "{} returned {}: {}",
                path,
                status,
                truncate(&text, 300)
            )));
        }

        serde_json::from_str(&text).map_err(|e| {
            WhatnextError::Upstream(format!("invalid JSON from {}: {}", path, e))
        })
    }
}

fn truncate(body: &str, max: usize) -> &str {
    if body.len() <= max {
        return body;
    }
    let mut end = max;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

fn required_id(value: &Value, what: &str) -> Result<String> {
    value["id"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| WhatnextError::Upstream(format!("{} response missing id", what)))
}

/// Maps a run object onto [`RunStatus`].
pub(crate) fn parse_run_status(run: &Value) -> Result<RunStatus> {
    let status = run["status"]
        .as_str()
        .ok_or_else(|| WhatnextError::Upstream("run response missing status".to_string()))?;

    Ok(match status {
        "queued" => RunStatus::Queued,
        "in_progress" => RunStatus::InProgress,
        "cancelling" => RunStatus::Cancelling,
        "cancelled" => RunStatus::Cancelled,
        "completed" => RunStatus::Completed,
        "expired" => RunStatus::Expired,
        "incomplete" => RunStatus::Incomplete,
        "failed" => RunStatus::Failed {
            reason: run["last_error"]["message"].as_str().map(str::to_string),
        },
        "requires_action" => {
            let calls = run["required_action"]["submit_tool_outputs"]["tool_calls"]
                .as_array()
                .map(|calls| {
                    calls
                        .iter()
                        .map(|tc| ToolCallRequest {
                            id: tc["id"].as_str().unwrap_or_default().to_string(),
                            name: tc["function"]["name"].as_str().unwrap_or_default().to_string(),
                            arguments: tc["function"]["arguments"]
                                .as_str()
                                .unwrap_or_default()
                                .to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default();
            RunStatus::RequiresAction(calls)
        }
        other => {
            return Err(WhatnextError::Upstream(format!(
                "unknown run status '{}'",
                other
            )))
        }
    })
}

/// Text of the first text part of the first message in a message list.
pub(crate) fn first_message_text(list: &Value) -> Option<String> {
    list["data"]
        .get(0)?
        .get("content")?
        .as_array()?
        .iter()
        .find_map(|part| part["text"]["value"].as_str().map(str::to_string))
}

#[async_trait]
impl ReasoningEngine for OpenAiAssistantsEngine {
    async fn create_agent(&self, agent: &AgentDefinition) -> Result<String> {
        let mut body = json!({
            "name": agent.name,
            "instructions": agent.instructions,
            "model": agent.model,
            "tools": agent.tools.iter().map(|t| t.to_openai_tool_json()).collect::<Vec<_>>(),
        });
        if let Some(temperature) = agent.temperature {
            body["temperature"] = json!(temperature);
        }
        let created = self.call(Method::POST, "/assistants", Some(body)).await?;
        required_id(&created, "assistant")
    }

    async fn create_thread(&self) -> Result<String> {
        let created = self.call(Method::POST, "/threads", Some(json!({}))).await?;
        required_id(&created, "thread")
    }

    async fn append_message(&self, thread_id: &str, content: &str) -> Result<()> {
        self.call(
            Method::POST,
            &format!("/threads/{}/messages", thread_id),
            Some(json!({ "role": "user", "content": content })),
        )
        .await?;
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, request: &RunRequest) -> Result<String> {
        let mut body = json!({ "assistant_id": request.assistant_id });
        if let Some(instructions) = &request.instructions {
            body["instructions"] = json!(instructions);
        }
        if let Some(tools) = &request.tools {
            body["tools"] = json!(tools.iter().map(|t| t.to_openai_tool_json()).collect::<Vec<_>>());
        }
        if let Some(model) = &request.model {
            body["model"] = json!(model);
        }
        if let Some(temperature) = request.temperature {
            body["temperature"] = json!(temperature);
        }
        let created = self
            .call(Method::POST, &format!("/threads/{}/runs", thread_id), Some(body))
            .await?;
        required_id(&created, "run")
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunStatus> {
        let run = self
            .call(
                Method::GET,
                &format!("/threads/{}/runs/{}", thread_id, run_id),
                None,
            )
            .await?;
        parse_run_status(&run)
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()> {
        self.call(
            Method::POST,
            &format!("/threads/{}/runs/{}/submit_tool_outputs", thread_id, run_id),
            Some(json!({ "tool_outputs": outputs })),
        )
        .await?;
        Ok(())
    }

    async fn latest_message(&self, thread_id: &str) -> Result<Option<String>> {
        let list = self
            .call(
                Method::GET,
                &format!("/threads/{}/messages?limit=1&order=desc", thread_id),
                None,
            )
            .await?;
        Ok(first_message_text(&list))
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()> {
        self.call(
            Method::POST,
            &format!("/threads/{}/runs/{}/cancel", thread_id, run_id),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_empty_api_key_rejected() {
        assert!(OpenAiAssistantsEngine::new("https://api.openai.com/v1", " ", 30).is_err());
    }

    #[test]
    fn test_parse_requires_action() {
        let run = json!({
            "id": "run_1",
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": {
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {
                            "name": "fetch_nearby_locations_condensed",
                            "arguments": "{\"categories\":\"cafes\",\"tag\":\"coffee\"}"
                        }
                    }]
                }
            }
        });
        let RunStatus::RequiresAction(calls) = parse_run_status(&run).unwrap() else {
            panic!("expected requires_action");
        };
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "fetch_nearby_locations_condensed");
        assert!(calls[0].arguments.contains("cafes"));
    }

    #[test]
    fn test_parse_failed_and_unknown() {
        let failed = json!({"status": "failed", "last_error": {"message": "rate_limit_exceeded"}});
        assert_eq!(
            parse_run_status(&failed).unwrap(),
            RunStatus::Failed {
                reason: Some("rate_limit_exceeded".to_string())
            }
        );
        assert!(parse_run_status(&json!({"status": "dreaming"})).is_err());
    }

    #[test]
    fn test_first_message_text() {
        let list = json!({
            "data": [{
                "role": "assistant",
                "content": [{"type": "text", "text": {"value": "cafe-0002, cafe-0001", "annotations": []}}]
            }]
        });
        assert_eq!(first_message_text(&list).as_deref(), Some("cafe-0002, cafe-0001"));
        assert_eq!(first_message_text(&json!({"data": []})), None);
    }
}
