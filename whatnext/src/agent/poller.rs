//! Deadline-bounded polling of a reasoning run.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, warn};

use crate::error::Result;
use crate::reasoning::{ReasoningEngine, RunStatus, ToolCallRequest};

/// How a poll cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    RequiresAction(Vec<ToolCallRequest>),
    Completed,
    /// The engine ended the run without an answer.
    Failed(RunStatus),
    /// The deadline passed; the run has been cancelled.
    TimedOut,
}

/// Polls one run at a fixed interval until it settles or the deadline passes.
#[derive(Debug, Clone, Copy)]
pub struct RunPoller {
    interval: Duration,
    deadline: Instant,
}

impl RunPoller {
    pub fn new(interval: Duration, deadline: Instant) -> Self {
        Self { interval, deadline }
    }

    pub async fn poll(
        &self,
        engine: &dyn ReasoningEngine,
        thread_id: &str,
        run_id: &str,
    ) -> Result<PollOutcome> {
        loop {
            let status = match time::timeout_at(self.deadline, engine.retrieve_run(thread_id, run_id)).await {
                Ok(status) => status?,
                Err(_) => return self.cancel(engine, thread_id, run_id).await,
            };

            match status {
                RunStatus::Completed => return Ok(PollOutcome::Completed),
                failed if failed.is_failure() => {
                    warn!(run_id, status = failed.label(), "Run ended without an answer");
                    return Ok(PollOutcome::Failed(failed));
                }
                _ if Instant::now() >= self.deadline => {
                    return self.cancel(engine, thread_id, run_id).await;
                }
                RunStatus::RequiresAction(calls) => return Ok(PollOutcome::RequiresAction(calls)),
                pending => {
                    debug!(run_id, status = pending.label(), "Run still pending");
                }
            }

            let wake = (Instant::now() + self.interval).min(self.deadline);
            time::sleep_until(wake).await;
        }
    }

    async fn cancel(
        &self,
        engine: &dyn ReasoningEngine,
        thread_id: &str,
        run_id: &str,
    ) -> Result<PollOutcome> {
        warn!(run_id, "Turn deadline exceeded, cancelling run");
        if let Err(e) = engine.cancel_run(thread_id, run_id).await {
            // The user still gets the timeout reply.
            warn!(run_id, "Failed to cancel run: {}", e);
        }
        Ok(PollOutcome::TimedOut)
    }
}
