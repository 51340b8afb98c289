//! Explicit construction of the service graph.

use std::sync::Arc;

use chrono_tz::Tz;
use tracing::info;

use crate::agent::{self, PersonalizationRanker, TurnController, TurnSettings};
use crate::config::AppConfig;
use crate::error::Result;
use crate::locations::{InMemoryLocationStore, LocationQueryEngine, LocationStore};
use crate::profiles::{InMemoryProfileStore, ProfileStore};
use crate::reasoning::ReasoningEngine;
use crate::session::{InMemorySessionStore, SessionRegistry, SessionStore};
use crate::tools::ArgumentValidator;
use crate::vocabulary::Vocabulary;

/// Collaborators the services are built from.
pub struct ServiceParts {
    pub engine: Arc<dyn ReasoningEngine>,
    pub locations: Arc<dyn LocationStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub vocabulary: Arc<Vocabulary>,
    pub assistant_id: String,
    pub timezone: Tz,
    pub session_ttl: std::time::Duration,
    pub ranking_model: Option<String>,
    pub turn: TurnSettings,
}

/// Long-lived services shared by every request.
#[derive(Clone)]
pub struct Services {
    pub controller: Arc<TurnController>,
    pub locations: LocationQueryEngine,
    pub profiles: Arc<dyn ProfileStore>,
    pub sessions: Arc<SessionRegistry>,
    pub vocabulary: Arc<Vocabulary>,
}

impl Services {
    pub fn from_parts(parts: ServiceParts) -> Self {
        let locations = LocationQueryEngine::new(parts.locations, parts.timezone);
        let sessions = Arc::new(SessionRegistry::new(
            parts.sessions,
            parts.engine.clone(),
            parts.assistant_id,
            parts.session_ttl,
        ));
        let ranker = PersonalizationRanker::new(
            parts.engine.clone(),
            locations.clone(),
            parts.ranking_model,
        );
        let controller = Arc::new(TurnController::new(
            parts.engine,
            sessions.clone(),
            parts.profiles.clone(),
            locations.clone(),
            ArgumentValidator::new(parts.vocabulary.clone()),
            ranker,
            parts.turn,
        ));
        Self {
            controller,
            locations,
            profiles: parts.profiles,
            sessions,
            vocabulary: parts.vocabulary,
        }
    }

    /// Loads the data files named by `config` and registers the agent
    /// configuration unless one is configured.
    pub async fn build(config: &AppConfig, engine: Arc<dyn ReasoningEngine>) -> Result<Self> {
        let vocabulary = Arc::new(Vocabulary::load(
            &config.data.categories_path,
            &config.data.tags_path,
        )?);
        let locations = Arc::new(InMemoryLocationStore::from_json_file(
            &config.data.locations_path,
        )?);
        let profiles = Arc::new(InMemoryProfileStore::from_json_file(&config.data.users_path)?);

        let assistant_id = match &config.reasoning.assistant_id {
            Some(id) => {
                info!(assistant_id = %id, "Using configured agent");
                id.clone()
            }
            None => {
                let definition = agent::agent_definition(
                    &vocabulary,
                    &config.reasoning.model,
                    config.reasoning.temperature,
                );
                let id = engine.create_agent(&definition).await?;
                info!(assistant_id = %id, "Registered agent configuration");
                id
            }
        };

        Ok(Self::from_parts(ServiceParts {
            engine,
            locations,
            profiles,
            sessions: Arc::new(InMemorySessionStore::new()),
            vocabulary,
            assistant_id,
            timezone: config.hours.tz()?,
            session_ttl: config.session.ttl(),
            ranking_model: Some(config.reasoning.ranking_model.clone()),
            turn: config.turn.settings(),
        }))
    }
}
