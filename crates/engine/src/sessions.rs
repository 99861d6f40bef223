use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use flux_shared::ToolRegistry;
use tracing::{debug, info, warn};

use crate::conversation::ConversationState;
use crate::gateway::ModelGateway;
use crate::message::{Message, Role};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};

pub const DEFAULT_SESSION_CAPACITY: usize = 256;
pub const DEFAULT_SESSION_IDLE: Duration = Duration::from_secs(30 * 60);

/// One live conversation. `persisted` counts transcript entries already stored.
pub struct Session {
    pub id: String,
    pub orchestrator: Orchestrator,
    persisted: usize,
}

impl Session {
    pub fn persisted(&self) -> usize {
        self.persisted
    }

    /// Entries appended since the last `mark_saved`.
    pub fn unsaved(&self) -> &[Message] {
        self.orchestrator.state().since(self.persisted)
    }

    pub fn mark_saved(&mut self) {
        self.persisted = self.orchestrator.state().len();
    }

    /// Dropping the session loses nothing the transcript store cannot rebuild.
    fn is_disposable(&self) -> bool {
        self.unsaved().iter().all(|m| m.role == Role::System)
    }
}

pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

/// How many sessions stay in memory, and for how long without use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub capacity: usize,
    pub idle_ttl: Duration,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_SESSION_CAPACITY,
            idle_ttl: DEFAULT_SESSION_IDLE,
        }
    }
}

struct Entry {
    session: SharedSession,
    last_used: Instant,
}

impl Entry {
    /// Not held by any request and fully stored.
    fn evictable(&self) -> bool {
        Arc::strong_count(&self.session) == 1
            && self.session.try_lock().is_ok_and(|s| s.is_disposable())
    }
}

/// Live sessions keyed by id. Each session is locked for the length of a turn,
/// so turns within a session never interleave while sessions run in parallel.
///
/// Idle sessions past `idle_ttl`, and the least recently used ones beyond
/// `capacity`, are dropped from memory when a new session opens. A dropped
/// session resumes from its stored transcript on the next `open`.
pub struct SessionStore {
    gateway: Arc<dyn ModelGateway>,
    registry: Arc<ToolRegistry>,
    config: Arc<OrchestratorConfig>,
    system_prompt: String,
    limits: SessionLimits,
    sessions: Mutex<HashMap<String, Entry>>,
}

impl SessionStore {
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        registry: Arc<ToolRegistry>,
        config: Arc<OrchestratorConfig>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            registry,
            config,
            system_prompt: system_prompt.into(),
            limits: SessionLimits::default(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// A capacity of zero is raised to one.
    pub fn with_limits(mut self, limits: SessionLimits) -> Self {
        self.limits = SessionLimits {
            capacity: limits.capacity.max(1),
            ..limits
        };
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the session for `id`, creating it when missing. A fresh session
    /// resumes `stored` when it holds an earlier transcript. The bool reports
    /// whether a new session was created.
    ///
    /// `stored` runs without the session map locked.
    pub fn open(&self, id: Option<&str>, stored: impl FnOnce(&str) -> Vec<Message>) -> (SharedSession, bool) {
        if let Some(existing) = id.and_then(|id| self.get(id)) {
            return (existing, false);
        }

        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let transcript = stored(&id);
        let session = Arc::new(tokio::sync::Mutex::new(self.build(id.clone(), transcript)));

        let mut sessions = self.lock();
        let now = Instant::now();

        // Another request may have opened the same id while the transcript loaded.
        if let Some(entry) = sessions.get_mut(&id) {
            entry.last_used = now;
            return (Arc::clone(&entry.session), false);
        }

        self.evict(&mut sessions, now);
        sessions.insert(id.clone(), Entry {
            session: Arc::clone(&session),
            last_used: now,
        });

        info!(session = %id, live = sessions.len(), "opened session");
        (session, true)
    }

    fn build(&self, id: String, transcript: Vec<Message>) -> Session {
        let orchestrator = Orchestrator::new(
            Arc::clone(&self.gateway),
            Arc::clone(&self.registry),
            Arc::clone(&self.config),
        );

        let (orchestrator, persisted) = if transcript.is_empty() {
            (orchestrator.with_system_prompt(self.system_prompt.clone()), 0)
        } else {
            debug!(session = %id, messages = transcript.len(), "resuming stored transcript");
            let persisted = transcript.len();
            (orchestrator.with_state(ConversationState::from_messages(transcript)), persisted)
        };

        Session {
            id,
            orchestrator,
            persisted,
        }
    }

    /// Makes room for one more session.
    fn evict(&self, sessions: &mut HashMap<String, Entry>, now: Instant) {
        let before = sessions.len();
        let ttl = self.limits.idle_ttl;
        sessions.retain(|_, entry| !(now.duration_since(entry.last_used) >= ttl && entry.evictable()));

        while sessions.len() >= self.limits.capacity {
            let oldest = sessions
                .iter()
                .filter(|(_, entry)| entry.evictable())
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(id, _)| id.clone());

            match oldest {
                Some(id) => {
                    sessions.remove(&id);
                }
                None => {
                    warn!(live = sessions.len(), capacity = self.limits.capacity, "session capacity exceeded, every session is busy");
                    break;
                }
            }
        }

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, live = sessions.len(), "evicted idle sessions");
        }
    }

    pub fn get(&self, id: &str) -> Option<SharedSession> {
        let mut sessions = self.lock();
        let entry = sessions.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(Arc::clone(&entry.session))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
