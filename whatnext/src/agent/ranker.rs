//! Personalized re-ranking of a candidate set.
//!
//! A second run on the same thread, with tools disabled and the sorter
//! instructions, returns business ids best match first. Ids are resolved
//! back to full locations in that order.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::poller::{PollOutcome, RunPoller};
use super::prompts;
use crate::error::Result;
use crate::locations::{Location, LocationQueryEngine, LocationSummary};
use crate::profiles::UserTags;
use crate::reasoning::{ReasoningEngine, RunRequest, ToolOutput};

/// Input of a ranking pass.
#[derive(Debug, Clone)]
pub struct RankingRequest<'a> {
    pub thread_id: &'a str,
    pub assistant_id: &'a str,
    pub tags: &'a UserTags,
    pub message: &'a str,
    pub candidates: &'a [LocationSummary],
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RankingOutcome {
    Ranked(Vec<Location>),
    Failed,
    TimedOut,
}

pub struct PersonalizationRanker {
    engine: Arc<dyn ReasoningEngine>,
    locations: LocationQueryEngine,
    model: Option<String>,
}

impl PersonalizationRanker {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        locations: LocationQueryEngine,
        model: Option<String>,
    ) -> Self {
        Self {
            engine,
            locations,
            model,
        }
    }

    pub async fn rank(
        &self,
        request: &RankingRequest<'_>,
        poller: &RunPoller,
    ) -> Result<RankingOutcome> {
        let candidates_json = serde_json::to_string(request.candidates)?;
        self.engine
            .append_message(
                request.thread_id,
                &prompts::ranking_message(request.tags, request.message, &candidates_json),
            )
            .await?;

        let run = RunRequest {
            instructions: Some(prompts::SORTER_INSTRUCTIONS.to_string()),
            tools: Some(Vec::new()),
            model: self.model.clone(),
            ..RunRequest::for_agent(request.assistant_id)
        };
        let run_id = self.engine.create_run(request.thread_id, &run).await?;
        debug!(run_id = %run_id, candidates = request.candidates.len(), "Started ranking run");

        loop {
            match poller.poll(self.engine.as_ref(), request.thread_id, &run_id).await? {
                PollOutcome::Completed => break,
                PollOutcome::Failed(_) => return Ok(RankingOutcome::Failed),
                PollOutcome::TimedOut => return Ok(RankingOutcome::TimedOut),
                PollOutcome::RequiresAction(calls) => {
                    warn!(run_id = %run_id, calls = calls.len(), "Ranking run asked for tools");
                    let outputs: Vec<ToolOutput> = calls
                        .into_iter()
                        .map(|call| ToolOutput {
                            tool_call_id: call.id,
                            output: prompts::UNREGISTERED_TOOL_OUTPUT.to_string(),
                        })
                        .collect();
                    self.engine
                        .submit_tool_outputs(request.thread_id, &run_id, &outputs)
                        .await?;
                }
            }
        }

        let reply = self
            .engine
            .latest_message(request.thread_id)
            .await?
            .unwrap_or_default();
        let offered: HashSet<&str> = request
            .candidates
            .iter()
            .map(|c| c.business_id.as_str())
            .collect();
        let ids: Vec<String> = parse_ranked_ids(&reply, request.limit)
            .into_iter()
            .filter(|id| {
                let known = offered.contains(id.as_str());
                if !known {
                    debug!(business_id = %id, "Dropping id that was not a candidate");
                }
                known
            })
            .collect();

        let ranked = self.locations.find_by_ids(&ids).await?;
        info!(
            requested = ids.len(),
            resolved = ranked.len(),
            "Personalized ranking resolved"
        );
        Ok(RankingOutcome::Ranked(ranked))
    }
}

/// Splits a `"id1, id2, ..."` reply and keeps the first `limit` ids.
pub fn parse_ranked_ids(reply: &str, limit: usize) -> Vec<String> {
    reply
        .split(", ")
        .map(|id| id.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|id| !id.is_empty())
        .take(limit)
        .map(str::to_string)
        .collect()
}
