//! Session registry: session id → conversation thread + agent configuration.
//!
//! Sessions live in a [`SessionStore`] with a sliding TTL. Resolution is
//! create-if-absent, serialized per session id so concurrent first messages
//! for the same new session share one thread.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, WhatnextError};
use crate::locations::LocationSummary;
use crate::reasoning::ReasoningEngine;

/// Key prefix of the per-session candidate snapshots.
pub const CANDIDATE_SNAPSHOT_PREFIX: &str = "locations";

/// Snapshots kept per key; older ones are dropped first.
pub const MAX_SNAPSHOTS_PER_KEY: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub thread_id: String,
    pub assistant_id: String,
}

/// Key/value cache contract for sessions and tool-output snapshots.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live session, refreshing its TTL.
    async fn get(&self, session_id: &str) -> Result<Option<ConversationSession>>;

    async fn put(&self, session: ConversationSession, ttl: Duration) -> Result<()>;

    /// Append a serialized payload to the list under `key`.
    async fn append_snapshot(&self, key: &str, payload: String, ttl: Duration) -> Result<()>;

    /// Payloads under `key`, oldest first.
    async fn snapshots(&self, key: &str) -> Result<Vec<String>>;
}

struct Expiring<T> {
    value: T,
    touched_at: Instant,
    ttl: Duration,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            touched_at: Instant::now(),
            ttl,
        }
    }

    fn is_live(&self) -> bool {
        self.touched_at.elapsed() < self.ttl
    }
}

/// Process-local [`SessionStore`].
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Expiring<ConversationSession>>>,
    snapshots: Mutex<HashMap<String, Expiring<Vec<String>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drops expired entries. Called on every insert.
fn sweep_expired<T>(entries: &mut HashMap<String, Expiring<T>>) {
    let before = entries.len();
    entries.retain(|_, entry| entry.is_live());
    let evicted = before - entries.len();
    if evicted > 0 {
        debug!(evicted, remaining = entries.len(), "Evicted expired entries");
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<ConversationSession>> {
        let mut sessions = lock(&self.sessions);
        match sessions.get_mut(session_id) {
            Some(entry) if entry.is_live() => {
                entry.touched_at = Instant::now();
                Ok(Some(entry.value.clone()))
            }
            Some(_) => {
                debug!(session_id, "Session expired");
                sessions.remove(session_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, session: ConversationSession, ttl: Duration) -> Result<()> {
        let mut sessions = lock(&self.sessions);
        sweep_expired(&mut sessions);
        sessions.insert(session.session_id.clone(), Expiring::new(session, ttl));
        Ok(())
    }

    async fn append_snapshot(&self, key: &str, payload: String, ttl: Duration) -> Result<()> {
        let mut snapshots = lock(&self.snapshots);
        sweep_expired(&mut snapshots);
        let entry = snapshots
            .entry(key.to_string())
            .or_insert_with(|| Expiring::new(Vec::new(), ttl));
        entry.value.push(payload);
        if entry.value.len() > MAX_SNAPSHOTS_PER_KEY {
            let excess = entry.value.len() - MAX_SNAPSHOTS_PER_KEY;
            entry.value.drain(..excess);
        }
        entry.touched_at = Instant::now();
        entry.ttl = ttl;
        Ok(())
    }

    async fn snapshots(&self, key: &str) -> Result<Vec<String>> {
        let snapshots = lock(&self.snapshots);
        Ok(snapshots
            .get(key)
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value.clone())
            .unwrap_or_default())
    }
}

/// A resolved session and whether this call created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSession {
    pub session: ConversationSession,
    pub created: bool,
}

pub struct SessionRegistry {
    store: Arc<dyn SessionStore>,
    engine: Arc<dyn ReasoningEngine>,
    assistant_id: String,
    ttl: Duration,
    creation_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new(
        store: Arc<dyn SessionStore>,
        engine: Arc<dyn ReasoningEngine>,
        assistant_id: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            engine,
            assistant_id: assistant_id.into(),
            ttl,
            creation_locks: DashMap::new(),
        }
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    /// Looks up `requested`, creating a session with a fresh thread when it
    /// is absent. A missing id gets a new UUID; an unknown one is kept.
    pub async fn resolve(&self, requested: Option<&str>) -> Result<ResolvedSession> {
        let session_id = requested
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let creation_lock = self
            .creation_locks
            .entry(session_id.clone())
            .or_default()
            .clone();
        let resolved = {
            let _guard = creation_lock.lock().await;
            self.resolve_locked(&session_id).await
        };
        drop(creation_lock);
        self.creation_locks
            .remove_if(&session_id, |_, lock| Arc::strong_count(lock) == 1);
        resolved
    }

    async fn resolve_locked(&self, session_id: &str) -> Result<ResolvedSession> {
        if let Some(session) = self.store.get(session_id).await? {
            return Ok(ResolvedSession {
                session,
                created: false,
            });
        }

        let thread_id = self.engine.create_thread().await?;
        let session = ConversationSession {
            session_id: session_id.to_string(),
            thread_id,
            assistant_id: self.assistant_id.clone(),
        };
        self.store.put(session.clone(), self.ttl).await?;
        info!(
            session_id,
            thread_id = %session.thread_id,
            "Created conversation session"
        );
        Ok(ResolvedSession {
            session,
            created: true,
        })
    }

    /// Records the candidates offered during a turn.
    pub async fn record_candidates(
        &self,
        session_id: &str,
        candidates: &[LocationSummary],
    ) -> Result<()> {
        let payload = serde_json::to_string(candidates)?;
        self.store
            .append_snapshot(&snapshot_key(session_id), payload, self.ttl)
            .await
    }

    /// Candidate sets offered earlier in the session, oldest first.
    pub async fn recent_candidates(&self, session_id: &str) -> Result<Vec<Vec<LocationSummary>>> {
        self.store
            .snapshots(&snapshot_key(session_id))
            .await?
            .iter()
            .map(|payload| serde_json::from_str(payload).map_err(WhatnextError::from))
            .collect()
    }
}

fn snapshot_key(session_id: &str) -> String {
    format!("{}:{}", CANDIDATE_SNAPSHOT_PREFIX, session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reasoning::ScriptedEngine;

    fn registry(engine: Arc<ScriptedEngine>) -> SessionRegistry {
        SessionRegistry::new(
            Arc::new(InMemorySessionStore::new()),
            engine,
            "asst_test",
            Duration::from_secs(3600),
        )
    }

    #[tokio::test]
    async fn test_missing_id_creates_new_session() {
        let engine = Arc::new(ScriptedEngine::new());
        let registry = registry(engine.clone());

        let first = registry.resolve(None).await.unwrap();
        assert!(first.created);
        assert!(Uuid::parse_str(&first.session.session_id).is_ok());
        assert_eq!(first.session.assistant_id, "asst_test");

        let again = registry
            .resolve(Some(first.session.session_id.as_str()))
            .await
            .unwrap();
        assert!(!again.created);
        assert_eq!(again.session, first.session);
        assert_eq!(engine.threads_created(), 1);
    }

    #[tokio::test]
    async fn test_unknown_client_id_is_kept() {
        let registry = registry(Arc::new(ScriptedEngine::new()));
        let resolved = registry.resolve(Some("client-abc")).await.unwrap();
        assert!(resolved.created);
        assert_eq!(resolved.session.session_id, "client-abc");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_messages_share_one_thread() {
        let engine = Arc::new(ScriptedEngine::new());
        let registry = Arc::new(registry(engine.clone()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.resolve(Some("shared")).await.unwrap() })
            })
            .collect();
        let mut created = 0;
        for handle in handles {
            if handle.await.unwrap().created {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(engine.threads_created(), 1);
    }

    #[tokio::test]
    async fn test_expired_session_is_dropped() {
        let store = InMemorySessionStore::new();
        let session = ConversationSession {
            session_id: "s1".to_string(),
            thread_id: "t1".to_string(),
            assistant_id: "a1".to_string(),
        };
        store.put(session.clone(), Duration::ZERO).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), None);

        store.put(session.clone(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("s1").await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_inserts_evict_expired_entries() {
        let store = InMemorySessionStore::new();
        for i in 0..100 {
            let session_id = format!("stale-{}", i);
            store
                .put(
                    ConversationSession {
                        session_id: session_id.clone(),
                        thread_id: format!("thread-{}", i),
                        assistant_id: "a1".to_string(),
                    },
                    Duration::ZERO,
                )
                .await
                .unwrap();
            store
                .append_snapshot(&snapshot_key(&session_id), "[]".to_string(), Duration::ZERO)
                .await
                .unwrap();
        }

        let fresh = ConversationSession {
            session_id: "fresh".to_string(),
            thread_id: "thread-fresh".to_string(),
            assistant_id: "a1".to_string(),
        };
        store.put(fresh, Duration::from_secs(60)).await.unwrap();
        store
            .append_snapshot(&snapshot_key("fresh"), "[]".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let sessions = lock(&store.sessions);
        assert_eq!(sessions.len(), 1);
        assert!(sessions.contains_key("fresh"));
        let snapshots = lock(&store.snapshots);
        assert_eq!(snapshots.len(), 1);
        assert!(snapshots.contains_key(&snapshot_key("fresh")));
    }

    #[tokio::test]
    async fn test_snapshot_list_is_capped() {
        let store = InMemorySessionStore::new();
        for i in 0..(MAX_SNAPSHOTS_PER_KEY + 5) {
            store
                .append_snapshot("locations:s1", i.to_string(), Duration::from_secs(60))
                .await
                .unwrap();
        }
        let kept = store.snapshots("locations:s1").await.unwrap();
        assert_eq!(kept.len(), MAX_SNAPSHOTS_PER_KEY);
        assert_eq!(kept.first().map(String::as_str), Some("5"));
        assert_eq!(kept.last(), Some(&(MAX_SNAPSHOTS_PER_KEY + 4).to_string()));
    }

    #[tokio::test]
    async fn test_candidate_snapshots_round_trip() {
        let registry = registry(Arc::new(ScriptedEngine::new()));
        let summary = LocationSummary {
            business_id: "cafes-0001".to_string(),
            name: Some("Bean There".to_string()),
            stars: Some(4.5),
            review_count: 12,
            cur_open: 1,
            categories: None,
            tag: None,
            price: None,
        };
        registry.record_candidates("s1", &[summary.clone()]).await.unwrap();
        registry.record_candidates("s1", &[]).await.unwrap();

        let history = registry.recent_candidates("s1").await.unwrap();
        assert_eq!(history, vec![vec![summary], vec![]]);
        assert!(registry.recent_candidates("s2").await.unwrap().is_empty());
    }
}
