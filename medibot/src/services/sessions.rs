//! In-memory per-visitor state: the chat conversation and form busy flags.
//!
//! State sits behind a `std::sync::Mutex` that is only held for the
//! duration of a transition, never across an `.await`.

use crate::models::analysis::AnalysisKind;
use crate::models::chat::{Conversation, SubmitRejection, Turn};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

#[derive(Debug)]
pub struct SessionState {
    pub conversation: Conversation,
    busy_forms: HashSet<AnalysisKind>,
    last_seen: Instant,
}

impl SessionState {
    fn new() -> Self {
        Self {
            conversation: Conversation::new(),
            busy_forms: HashSet::new(),
            last_seen: Instant::now(),
        }
    }

    fn has_work_in_flight(&self) -> bool {
        self.conversation.is_busy() || !self.busy_forms.is_empty()
    }

    pub fn is_form_busy(&self, kind: AnalysisKind) -> bool {
        self.busy_forms.contains(&kind)
    }
}

/// Shared handle to one visitor's state.
#[derive(Debug, Clone)]
pub struct SharedSession(Arc<Mutex<SessionState>>);

impl SharedSession {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(SessionState::new())))
    }

    /// Lock the state; a poisoned lock still holds consistent data because
    /// every transition is a single mutation.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a chat turn. The returned guard must be completed with the
    /// reply; dropping it instead abandons the turn.
    pub fn begin_turn(&self, input: &str) -> Result<PendingReply, SubmitRejection> {
        let turn = self.lock().conversation.begin_submit(input)?;
        Ok(PendingReply {
            session: self.clone(),
            turn,
            settled: false,
        })
    }

    /// Mark an analysis form busy; `None` when a call is already in flight.
    pub fn try_begin_analysis(&self, kind: AnalysisKind) -> Option<FormGuard> {
        let mut state = self.lock();
        if !state.busy_forms.insert(kind) {
            return None;
        }

        Some(FormGuard {
            session: self.clone(),
            kind,
        })
    }
}

/// Chat turn awaiting its bot reply.
#[derive(Debug)]
pub struct PendingReply {
    session: SharedSession,
    turn: Turn,
    settled: bool,
}

impl PendingReply {
    pub fn message(&self) -> &str {
        &self.turn.message
    }

    pub fn placeholder_id(&self) -> &str {
        &self.turn.placeholder_id
    }

    pub fn complete(mut self, reply: String) {
        self.session
            .lock()
            .conversation
            .resolve(&self.turn.placeholder_id, reply);
        self.settled = true;
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if !self.settled {
            tracing::warn!(
                placeholder_id = %self.turn.placeholder_id,
                "Chat turn dropped before a reply arrived"
            );
            self.session
                .lock()
                .conversation
                .abandon(&self.turn.placeholder_id);
        }
    }
}

/// Clears the form's busy flag when dropped.
#[derive(Debug)]
pub struct FormGuard {
    session: SharedSession,
    kind: AnalysisKind,
}

impl Drop for FormGuard {
    fn drop(&mut self) {
        self.session.lock().busy_forms.remove(&self.kind);
    }
}

/// All live sessions keyed by conversation id.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, SharedSession>>,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            idle_timeout,
        }
    }

    /// Fetch the session, creating it on first sight, and mark it active.
    pub fn get_or_create(&self, conversation_id: &str) -> SharedSession {
        let session = self
            .sessions
            .entry(conversation_id.to_string())
            .or_insert_with(SharedSession::new)
            .clone();

        session.lock().last_seen = Instant::now();
        session
    }

    pub fn get(&self, conversation_id: &str) -> Option<SharedSession> {
        self.sessions.get(conversation_id).map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove sessions idle longer than the timeout. Sessions with a call
    /// in flight are kept. Returns the number removed.
    pub fn sweep(&self) -> usize {
        let before = self.sessions.len();
        let timeout = self.idle_timeout;

        self.sessions.retain(|_, session| {
            let state = session.lock();
            state.has_work_in_flight() || state.last_seen.elapsed() < timeout
        });

        before.saturating_sub(self.sessions.len())
    }

    /// How often the sweeper runs.
    pub fn sweep_period(&self) -> Duration {
        (self.idle_timeout / 4).max(Duration::from_secs(1))
    }

    /// Periodically sweep idle sessions for the lifetime of the process.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let store = self.clone();
        let period = self.sweep_period();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = store.sweep();
                if removed > 0 {
                    tracing::info!(
                        removed,
                        remaining = store.len(),
                        "Swept idle chat sessions"
                    );
                }
            }
        })
    }
}
