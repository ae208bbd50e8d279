//! Session store: identifier -> accumulated history and execution counter.
//!
//! The map itself sits behind a short-lived `RwLock` used only for
//! bookkeeping. Each session carries its own async mutex, held by the engine
//! for a whole resolve -> execute -> commit round, so executions within one
//! session are serialized while different sessions never wait on each other.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tracing::{debug, info};

use crate::{
    error::{EngineError, Result},
    execution::python::preamble_cell,
    notebook::Cell,
};

/// Counter value of a fresh or reset session.
pub const INITIAL_EXECUTION_COUNT: u64 = 0;

#[derive(Debug, Clone)]
pub struct SessionState {
    history: Vec<Cell>,
    execution_count: u64,
}

impl SessionState {
    fn fresh() -> Self {
        Self {
            history: vec![preamble_cell()],
            execution_count: INITIAL_EXECUTION_COUNT,
        }
    }

    /// Every unit, preamble first.
    pub fn history(&self) -> &[Cell] {
        &self.history
    }

    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// Record that an execution was attempted, whatever its outcome, and
    /// return the unit's count.
    pub fn advance(&mut self) -> u64 {
        self.execution_count += 1;
        self.execution_count
    }
}

#[derive(Debug)]
pub struct Session {
    id: String,
    state: AsyncMutex<SessionState>,
    last_used: Mutex<Instant>,
}

impl Session {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: AsyncMutex::new(SessionState::fresh()),
            last_used: Mutex::new(Instant::now()),
        }
    }

    /// Acquire the session for one execution round.
    pub async fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(*self.last_used.lock())
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing session for `id`, or a new one holding only the preamble.
    /// Racing callers for an unseen `id` all get the same session.
    pub fn resolve(&self, id: &str) -> Arc<Session> {
        if let Some(session) = self.sessions.read().get(id) {
            session.touch();
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write();
        let session = sessions.entry(id.to_string()).or_insert_with(|| {
            debug!(session = id, "creating session");
            Arc::new(Session::new(id))
        });
        session.touch();
        Arc::clone(session)
    }

    /// Drop the session; the next `resolve` starts over. Returns whether a
    /// session existed.
    pub fn reset(&self, id: &str) -> bool {
        let existed = self.sessions.write().remove(id).is_some();
        if existed {
            info!(session = id, "session reset");
        }
        existed
    }

    /// Replace the history of `session` after a successful round. `state`
    /// must be the guard obtained from `session.lock()`. Fails if the session
    /// was reset or evicted since it was resolved.
    pub fn commit(&self, session: &Arc<Session>, state: &mut SessionState, history: Vec<Cell>) -> Result<()> {
        if !self.is_current(session) {
            return Err(EngineError::SessionReset(session.id.clone()));
        }
        state.history = history;
        session.touch();
        Ok(())
    }

    /// Whether `session` is still the one registered under its identifier.
    pub fn is_current(&self, session: &Arc<Session>) -> bool {
        self.sessions
            .read()
            .get(&session.id)
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove sessions idle for longer than `ttl`. Sessions with an execution
    /// in flight are skipped.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|id, session| {
            let busy = session.state.try_lock().is_err();
            let keep = busy || session.idle_for(now) <= ttl;
            if !keep {
                debug!(session = %id, "evicting idle session");
            }
            keep
        });
        before - sessions.len()
    }

    /// Periodically evict idle sessions until the task is aborted.
    pub async fn sweep(self: Arc<Self>, interval: Duration, ttl: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let evicted = self.evict_idle(ttl);
            if evicted > 0 {
                info!(evicted, remaining = self.len(), "evicted idle sessions");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_creates_session_with_preamble() {
        let store = SessionStore::new();
        let session = store.resolve("a");
        let state = session.lock().await;
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.execution_count(), INITIAL_EXECUTION_COUNT);
        assert!(state.history()[0].source.as_str().contains("_nbexec_capture_figures"));
    }

    #[test]
    fn resolve_returns_same_session() {
        let store = SessionStore::new();
        let first = store.resolve("a");
        let second = store.resolve("a");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn racing_resolves_store_exactly_one_session() {
        let store = Arc::new(SessionStore::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.resolve("shared"))
            })
            .collect();
        let sessions: Vec<Arc<Session>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(store.len(), 1);
        assert!(sessions.iter().all(|s| Arc::ptr_eq(s, &sessions[0])));
    }

    #[tokio::test]
    async fn reset_then_resolve_starts_fresh() {
        let store = SessionStore::new();
        let session = store.resolve("a");
        {
            let mut state = session.lock().await;
            state.advance();
            let mut history = state.history().to_vec();
            history.push(Cell::code("x = 1"));
            store.commit(&session, &mut state, history).unwrap();
            assert_eq!(state.history().len(), 2);
        }

        assert!(store.reset("a"));
        assert!(!store.reset("a"));

        let fresh = store.resolve("a");
        assert!(!Arc::ptr_eq(&fresh, &session));
        let state = fresh.lock().await;
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.execution_count(), INITIAL_EXECUTION_COUNT);
    }

    #[tokio::test]
    async fn commit_after_reset_is_rejected() {
        let store = SessionStore::new();
        let session = store.resolve("a");
        let mut state = session.lock().await;
        store.reset("a");
        let err = store
            .commit(&session, &mut state, vec![Cell::code("x")])
            .unwrap_err();
        assert!(matches!(err, EngineError::SessionReset(id) if id == "a"));
        assert_eq!(state.history().len(), 1);
    }

    #[tokio::test]
    async fn eviction_skips_busy_sessions() {
        let store = SessionStore::new();
        let idle = store.resolve("idle");
        let busy = store.resolve("busy");
        drop(idle);
        let _guard = busy.lock().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(store.evict_idle(Duration::from_millis(1)), 1);
        assert_eq!(store.len(), 1);
        assert!(store.is_current(&busy));
    }

    #[test]
    fn recently_used_sessions_survive_eviction() {
        let store = SessionStore::new();
        store.resolve("a");
        assert_eq!(store.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 1);
    }
}
