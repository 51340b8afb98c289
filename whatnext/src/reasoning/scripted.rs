//! Deterministic in-process reasoning engine.
//!
//! Each created run consumes the next queued [`RunScript`] and replays its
//! statuses, one per `retrieve_run`. The last status is sticky, so a script
//! ending in `InProgress` never settles.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    AgentDefinition, ReasoningEngine, RunRequest, RunStatus, ToolCallRequest, ToolOutput,
};
use crate::error::{Result, WhatnextError};

const DEFAULT_REPLY: &str = "Hi! Tell me what you are in the mood for and I will look around.";

/// Status sequence and final reply of one scripted run.
#[derive(Debug, Clone, Default)]
pub struct RunScript {
    steps: Vec<RunStatus>,
    reply: Option<String>,
}

impl RunScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: RunStatus) -> Self {
        self.steps.push(status);
        self
    }

    /// Pause the run on a single tool call with the given JSON arguments.
    pub fn requires_action(self, call_id: &str, tool: &str, arguments: Value) -> Self {
        self.status(RunStatus::RequiresAction(vec![ToolCallRequest {
            id: call_id.to_string(),
            name: tool.to_string(),
            arguments: arguments.to_string(),
        }]))
    }

    pub fn completes_with(mut self, reply: &str) -> Self {
        self.reply = Some(reply.to_string());
        self.status(RunStatus::Completed)
    }

    pub fn fails(self, reason: &str) -> Self {
        self.status(RunStatus::Failed {
            reason: Some(reason.to_string()),
        })
    }

    pub fn stays_in_progress(self) -> Self {
        self.status(RunStatus::InProgress)
    }
}

#[derive(Debug)]
struct ScriptedRun {
    thread_id: String,
    steps: VecDeque<RunStatus>,
    reply: Option<String>,
    cancelled: bool,
}

#[derive(Debug, Default)]
struct ScriptState {
    next_id: u64,
    agents: Vec<AgentDefinition>,
    threads: HashMap<String, Vec<String>>,
    runs: HashMap<String, ScriptedRun>,
    scripts: VecDeque<RunScript>,
    run_requests: Vec<RunRequest>,
    submitted: Vec<(String, Vec<ToolOutput>)>,
    cancelled: Vec<String>,
}

impl ScriptState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}_{:04}", prefix, self.next_id)
    }
}

/// Reasoning engine that replays queued scripts.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    state: Mutex<ScriptState>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the script for the next created run.
    pub fn push_script(&self, script: RunScript) {
        self.lock().scripts.push_back(script);
    }

    pub fn with_scripts(scripts: impl IntoIterator<Item = RunScript>) -> Self {
        let engine = Self::new();
        for script in scripts {
            engine.push_script(script);
        }
        engine
    }

    pub fn agents(&self) -> Vec<AgentDefinition> {
        self.lock().agents.clone()
    }

    pub fn threads_created(&self) -> usize {
        self.lock().threads.len()
    }

    /// Messages of a thread, oldest first.
    pub fn messages(&self, thread_id: &str) -> Vec<String> {
        self.lock()
            .threads
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn run_requests(&self) -> Vec<RunRequest> {
        self.lock().run_requests.clone()
    }

    /// Every `submit_tool_outputs` call as `(run_id, outputs)`.
    pub fn submitted_outputs(&self) -> Vec<(String, Vec<ToolOutput>)> {
        self.lock().submitted.clone()
    }

    pub fn cancelled_runs(&self) -> Vec<String> {
        self.lock().cancelled.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        // A panicking test thread must not wedge the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn unknown(what: &str, id: &str) -> WhatnextError {
    WhatnextError::Upstream(format!("unknown {} '{}'", what, id))
}

#[async_trait]
impl ReasoningEngine for ScriptedEngine {
    async fn create_agent(&self, agent: &AgentDefinition) -> Result<String> {
        let mut state = self.lock();
        state.agents.push(agent.clone());
        Ok(state.next_id("asst"))
    }

    async fn create_thread(&self) -> Result<String> {
        let mut state = self.lock();
        let id = state.next_id("thread");
        state.threads.insert(id.clone(), Vec::new());
        Ok(id)
    }

    async fn append_message(&self, thread_id: &str, content: &str) -> Result<()> {
        let mut state = self.lock();
        let messages = state
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| unknown("thread", thread_id))?;
        messages.push(content.to_string());
        Ok(())
    }

    async fn create_run(&self, thread_id: &str, request: &RunRequest) -> Result<String> {
        let mut state = self.lock();
        if !state.threads.contains_key(thread_id) {
            return Err(unknown("thread", thread_id));
        }
        let script = state
            .scripts
            .pop_front()
            .unwrap_or_else(|| RunScript::new().completes_with(DEFAULT_REPLY));
        let id = state.next_id("run");
        state.run_requests.push(request.clone());
        state.runs.insert(
            id.clone(),
            ScriptedRun {
                thread_id: thread_id.to_string(),
                steps: script.steps.into(),
                reply: script.reply,
                cancelled: false,
            },
        );
        Ok(id)
    }

    async fn retrieve_run(&self, thread_id: &str, run_id: &str) -> Result<RunStatus> {
        let mut state = self.lock();
        let run = state
            .runs
            .get_mut(run_id)
            .filter(|run| run.thread_id == thread_id)
            .ok_or_else(|| unknown("run", run_id))?;

        if run.cancelled {
            return Ok(RunStatus::Cancelled);
        }
        let status = if run.steps.len() > 1 {
            run.steps.pop_front()
        } else {
            run.steps.front().cloned()
        }
        .unwrap_or(RunStatus::Completed);

        if status == RunStatus::Completed {
            if let Some(reply) = run.reply.take() {
                let thread = run.thread_id.clone();
                if let Some(messages) = state.threads.get_mut(&thread) {
                    messages.push(reply);
                }
            }
        }
        Ok(status)
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<()> {
        let mut state = self.lock();
        if !state.runs.contains_key(run_id) {
            return Err(unknown("run", run_id));
        }
        state.submitted.push((run_id.to_string(), outputs.to_vec()));
        Ok(())
    }

    async fn latest_message(&self, thread_id: &str) -> Result<Option<String>> {
        let state = self.lock();
        let messages = state
            .threads
            .get(thread_id)
            .ok_or_else(|| unknown("thread", thread_id))?;
        Ok(messages.last().cloned())
    }

    async fn cancel_run(&self, _thread_id: &str, run_id: &str) -> Result<()> {
        let mut state = self.lock();
        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| unknown("run", run_id))?;
        run.cancelled = true;
        state.cancelled.push(run_id.to_string());
        Ok(())
    }
}
