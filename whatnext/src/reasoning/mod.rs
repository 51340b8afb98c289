//! Reasoning Engine Abstraction
//!
//! The recommender talks to an assistant-style reasoning engine: agent
//! configurations, durable conversation threads, and asynchronous runs that
//! are polled until they settle. A run may pause and request tool outputs
//! before it completes.

pub mod openai;
pub mod scripted;

pub use openai::OpenAiAssistantsEngine;
pub use scripted::{RunScript, ScriptedEngine};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

use crate::config::{EngineProvider, ReasoningConfig};
use crate::error::{Result, WhatnextError};

/// A function the agent may call, in JSON-schema form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolDefinition {
    pub fn to_openai_tool_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Agent configuration created once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDefinition {
    pub name: String,
    pub instructions: String,
    pub model: String,
    pub temperature: Option<f64>,
    pub tools: Vec<ToolDefinition>,
}

/// Per-run overrides of the agent configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunRequest {
    pub assistant_id: String,
    pub instructions: Option<String>,
    /// `Some(vec![])` explicitly disables tools for this run.
    pub tools: Option<Vec<ToolDefinition>>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
}

impl RunRequest {
    pub fn for_agent(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            ..Default::default()
        }
    }
}

/// A tool call the engine is waiting on. `arguments` is the raw JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// Observed state of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction(Vec<ToolCallRequest>),
    Cancelling,
    Cancelled,
    Failed { reason: Option<String> },
    Completed,
    Expired,
    Incomplete,
}

impl RunStatus {
    /// The run ended without producing a usable answer.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            RunStatus::Failed { .. }
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::RequiresAction(_) => "requires_action",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Failed { .. } => "failed",
            RunStatus::Completed => "completed",
            RunStatus::Expired => "expired",
            RunStatus::Incomplete => "incomplete",
        }
    }
}

/// Abstract interface for assistant-style reasoning engines
#[async_trait]
pub trait ReasoningEngine: Send + Sync {
    /// Register an agent configuration, returning its identifier.
    async fn create_agent(&self, agent: &AgentDefinition) -> Result<String>;

    async fn create_thread(&self) -> Result<String>;

    /// Append a user message to a thread.
    async fn append_message(&self, thread_id: &str, content: &str) -> Result<()>;

    /// Start a run on a thread, returning the run identifier.
    async fn create_run(&self, thread_id: &str, request: &RunRequest) -> Result<String>;

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunStatus>;

    /// Submit every pending tool output of a run in one call.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()>;

    /// Text of the newest message on the thread.
    async fn latest_message(&self, thread_id: &str) -> Result<Option<String>>;

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<()>;
}

/// Factory for creating reasoning engines
pub struct ReasoningEngineFactory;

impl ReasoningEngineFactory {
    /// Create the engine selected by configuration
    pub fn create(config: &ReasoningConfig) -> Result<Arc<dyn ReasoningEngine>> {
        match config.provider {
            EngineProvider::OpenAi => {
                let api_key = config.api_key()?;
                let engine = OpenAiAssistantsEngine::new(
                    &config.base_url,
                    &api_key,
                    config.request_timeout_secs,
                )?;
                Ok(Arc::new(engine))
            }
            EngineProvider::Scripted => {
                let allowed = std::env::var("WHATNEXT_ALLOW_SCRIPTED_ENGINE")
                    .map(|v| v == "1" || v == "true")
                    .unwrap_or(false)
                    || cfg!(test);
                if !allowed {
                    return Err(WhatnextError::Config(
                        "The scripted reasoning engine is for local development only. Set WHATNEXT_ALLOW_SCRIPTED_ENGINE=1 to enable it.".to_string(),
                    ));
                }
                warn!("Using the scripted reasoning engine: replies are canned");
                Ok(Arc::new(ScriptedEngine::new()))
            }
        }
    }
}
