//! Agent Turn Controller
//!
//! Drives one conversational turn against the reasoning engine:
//!
//! ```text
//! Started -> Polling -> (RequiresAction -> Polling)* -> Completed | Failed | TimedOut
//! ```
//!
//! A completed turn that produced candidate locations continues into the
//! personalization ranker; every other completed turn returns the engine's
//! latest message. Failed runs and deadline overruns become apologies.

pub mod poller;
pub mod prompts;
pub mod ranker;

pub use poller::{PollOutcome, RunPoller};
pub use ranker::{parse_ranked_ids, PersonalizationRanker, RankingOutcome, RankingRequest};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, field, info, info_span, warn, Instrument};

use crate::error::{Result, WhatnextError};
use crate::locations::{GeoPoint, Location, LocationQueryEngine, LocationSummary};
use crate::profiles::{ProfileStore, UserTags};
use crate::reasoning::{AgentDefinition, ReasoningEngine, RunRequest, ToolCallRequest, ToolOutput};
use crate::session::{ConversationSession, SessionRegistry};
use crate::tools::{self, ArgumentValidator, ToolInvocation};
use crate::vocabulary::Vocabulary;

/// Agent configuration registered with the reasoning engine at startup.
pub fn agent_definition(vocab: &Vocabulary, model: &str, temperature: Option<f64>) -> AgentDefinition {
    AgentDefinition {
        name: prompts::AGENT_NAME.to_string(),
        instructions: prompts::RECOMMENDER_INSTRUCTIONS.to_string(),
        model: model.to_string(),
        temperature,
        tools: tools::tool_definitions(vocab),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub user_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl ChatRequest {
    fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(WhatnextError::Validation("user_id must not be empty".to_string()));
        }
        if self.message.trim().is_empty() {
            return Err(WhatnextError::Validation("message must not be empty".to_string()));
        }
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(WhatnextError::Validation(format!("invalid latitude {}", self.latitude)));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(WhatnextError::Validation(format!("invalid longitude {}", self.longitude)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Regular,
    Locations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Locations(Vec<Location>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub user_id: String,
    pub session_id: String,
    pub content: ChatContent,
    pub chat_type: ChatType,
    /// Always `"false"`: the reply is authored by the assistant.
    pub is_user_message: String,
}

impl ChatReply {
    fn regular(user_id: &str, session_id: &str, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            content: ChatContent::Text(text.into()),
            chat_type: ChatType::Regular,
            is_user_message: "false".to_string(),
        }
    }

    fn locations(user_id: &str, session_id: &str, locations: Vec<Location>) -> Self {
        Self {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            content: ChatContent::Locations(locations),
            chat_type: ChatType::Locations,
            is_user_message: "false".to_string(),
        }
    }
}

/// State of a turn, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Started,
    Polling,
    RequiresAction,
    Completed,
    Failed,
    TimedOut,
}

impl TurnState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TurnState::Completed | TurnState::Failed | TurnState::TimedOut
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// Candidates fetched per location search, before ranking.
    pub candidate_pool_size: usize,
}

impl Default for TurnSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            candidate_pool_size: 30,
        }
    }
}

/// What the tool calls of a turn produced.
#[derive(Debug, Default)]
struct ToolFindings {
    /// Last location-search result and the limit it asked for.
    search: Option<(Vec<LocationSummary>, usize)>,
    lookup_missed: bool,
}

impl ToolFindings {
    /// Candidates worth ranking, if the turn produced any.
    fn rankable(&self) -> Option<(&[LocationSummary], usize)> {
        match &self.search {
            Some((candidates, limit)) if !candidates.is_empty() && !self.lookup_missed => {
                Some((candidates.as_slice(), *limit))
            }
            _ => None,
        }
    }
}

pub struct TurnController {
    engine: Arc<dyn ReasoningEngine>,
    sessions: Arc<SessionRegistry>,
    profiles: Arc<dyn ProfileStore>,
    locations: LocationQueryEngine,
    validator: ArgumentValidator,
    ranker: PersonalizationRanker,
    settings: TurnSettings,
}

impl TurnController {
    pub fn new(
        engine: Arc<dyn ReasoningEngine>,
        sessions: Arc<SessionRegistry>,
        profiles: Arc<dyn ProfileStore>,
        locations: LocationQueryEngine,
        validator: ArgumentValidator,
        ranker: PersonalizationRanker,
        settings: TurnSettings,
    ) -> Self {
        Self {
            engine,
            sessions,
            profiles,
            locations,
            validator,
            ranker,
            settings,
        }
    }

    /// Runs one turn. Failed and timed-out runs yield apology replies;
    /// validation, storage and engine transport errors are returned.
    pub async fn handle_turn(&self, request: ChatRequest) -> Result<ChatReply> {
        request.validate()?;
        let span = info_span!(
            "chat_turn",
            user_id = %request.user_id,
            session_id = field::Empty
        );
        self.run_turn(request).instrument(span).await
    }

    async fn run_turn(&self, request: ChatRequest) -> Result<ChatReply> {
        let started = Instant::now();
        let poller = RunPoller::new(self.settings.poll_interval, started + self.settings.timeout);
        let mut state = TurnState::Started;

        let tags = self.profiles.get_tags(&request.user_id).await?;
        let resolved = self.sessions.resolve(request.session_id.as_deref()).await?;
        let session = resolved.session;
        tracing::Span::current().record("session_id", session.session_id.as_str());

        let message = prompts::turn_message(&request.message, &tags, resolved.created);
        self.engine.append_message(&session.thread_id, &message).await?;
        let run_id = self
            .engine
            .create_run(&session.thread_id, &RunRequest::for_agent(&session.assistant_id))
            .await?;
        info!(run_id = %run_id, new_session = resolved.created, "Started turn");

        let center = GeoPoint::new(request.longitude, request.latitude);
        let mut findings = ToolFindings::default();
        transition(&mut state, TurnState::Polling);

        while !state.is_terminal() {
            match poller.poll(self.engine.as_ref(), &session.thread_id, &run_id).await? {
                PollOutcome::RequiresAction(calls) => {
                    transition(&mut state, TurnState::RequiresAction);
                    let outputs = self
                        .dispatch_tools(&calls, &session, center, &mut findings)
                        .await?;
                    self.engine
                        .submit_tool_outputs(&session.thread_id, &run_id, &outputs)
                        .await?;
                    transition(&mut state, TurnState::Polling);
                }
                PollOutcome::Completed => transition(&mut state, TurnState::Completed),
                PollOutcome::Failed(_) => {
                    transition(&mut state, TurnState::Failed);
                    return Ok(ChatReply::regular(
                        &request.user_id,
                        &session.session_id,
                        prompts::FAILED_RUN_APOLOGY,
                    ));
                }
                PollOutcome::TimedOut => {
                    transition(&mut state, TurnState::TimedOut);
                    return Ok(ChatReply::regular(
                        &request.user_id,
                        &session.session_id,
                        prompts::TIMEOUT_APOLOGY,
                    ));
                }
            }
        }

        let Some((candidates, limit)) = findings.rankable() else {
            let reply = self
                .engine
                .latest_message(&session.thread_id)
                .await?
                .unwrap_or_default();
            info!(elapsed_ms = started.elapsed().as_millis() as u64, "Turn answered conversationally");
            return Ok(ChatReply::regular(&request.user_id, &session.session_id, reply));
        };

        self.personalize(&request, &session, &tags, candidates, limit, &poller, started)
            .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn personalize(
        &self,
        request: &ChatRequest,
        session: &ConversationSession,
        tags: &UserTags,
        candidates: &[LocationSummary],
        limit: usize,
        poller: &RunPoller,
        started: Instant,
    ) -> Result<ChatReply> {
        let ranking = RankingRequest {
            thread_id: &session.thread_id,
            assistant_id: &session.assistant_id,
            tags,
            message: &request.message,
            candidates,
            limit,
        };
        let reply = match self.ranker.rank(&ranking, poller).await? {
            RankingOutcome::Ranked(locations) => {
                info!(
                    results = locations.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Turn answered with ranked locations"
                );
                ChatReply::locations(&request.user_id, &session.session_id, locations)
            }
            RankingOutcome::Failed => ChatReply::regular(
                &request.user_id,
                &session.session_id,
                prompts::FAILED_RUN_APOLOGY,
            ),
            RankingOutcome::TimedOut => ChatReply::regular(
                &request.user_id,
                &session.session_id,
                prompts::TIMEOUT_APOLOGY,
            ),
        };
        Ok(reply)
    }

    async fn dispatch_tools(
        &self,
        calls: &[ToolCallRequest],
        session: &ConversationSession,
        center: GeoPoint,
        findings: &mut ToolFindings,
    ) -> Result<Vec<ToolOutput>> {
        let mut outputs = Vec::with_capacity(calls.len());
        for call in calls {
            let invocation = ToolInvocation::from_request(call, &self.validator);
            debug!(tool = invocation.tool_name(), call_id = invocation.call_id(), "Dispatching tool call");

            let output = match &invocation {
                ToolInvocation::NearbyLocations { args, .. } => {
                    let query = args.to_query(center, self.settings.candidate_pool_size);
                    let found = self
                        .locations
                        .find_nearby_condensed(&query, Utc::now())
                        .await?;
                    info!(
                        results = found.len(),
                        categories = ?args.categories,
                        tags = ?args.tags,
                        open_only = args.open_only,
                        "Location search finished"
                    );
                    let output = if found.is_empty() {
                        prompts::NO_RESULTS_OUTPUT.to_string()
                    } else {
                        self.sessions
                            .record_candidates(&session.session_id, &found)
                            .await?;
                        found
                            .iter()
                            .filter_map(|l| l.name.as_deref())
                            .collect::<Vec<_>>()
                            .join(", ")
                    };
                    findings.search = Some((found, args.limit));
                    output
                }
                ToolInvocation::SpecificLocation { business_id, .. } => {
                    match self.locations.find_one_by_id(business_id).await? {
                        Some(location) => serde_json::to_string(&location)?,
                        None => {
                            debug!(business_id = %business_id, "Location lookup missed");
                            findings.lookup_missed = true;
                            prompts::LOOKUP_MISS_OUTPUT.to_string()
                        }
                    }
                }
                ToolInvocation::Unregistered { name, .. } => {
                    warn!(tool = %name, "Tool not registered, answering without it");
                    prompts::UNREGISTERED_TOOL_OUTPUT.to_string()
                }
            };
            outputs.push(ToolOutput {
                tool_call_id: invocation.call_id().to_string(),
                output,
            });
        }
        Ok(outputs)
    }
}

fn transition(state: &mut TurnState, next: TurnState) {
    let from = *state;
    debug!(?from, to = ?next, "Turn state");
    *state = next;
}
