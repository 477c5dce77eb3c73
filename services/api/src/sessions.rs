//! In-memory session store.
//!
//! The store owns every session record and is the only contended shared
//! resource in the service. The outer map lock guards insert-on-create only;
//! each session carries its own short-lived lock for history, the busy flag
//! and the pending-input queue. No lock is ever held across an await point,
//! so a slow pipeline run for one session cannot block another session.

use crate::broker::{PipelineEvent, PipelineInput};
use anchor_core::turn::{Role, Turn};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// An input deferred while its session was busy, together with the event
/// sender of the connection that submitted it.
pub struct QueuedRun {
    pub input: PipelineInput,
    pub events: mpsc::Sender<PipelineEvent>,
}

#[derive(Default)]
struct SessionState {
    busy: bool,
    history: Vec<Turn>,
    pending: VecDeque<QueuedRun>,
}

#[derive(Default)]
struct SessionHandle {
    state: Mutex<SessionState>,
}

/// A point-in-time view of one session, for the inspection endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub turns: usize,
    pub busy: bool,
}

/// Holds per-conversation state keyed by the client-supplied session id.
///
/// Sessions are created lazily on first reference and never destroyed by the
/// store itself. All operations on one session are linearizable; operations
/// on different sessions never block each other.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<String, Arc<SessionHandle>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get_or_create(&self, session_id: &str) -> Arc<SessionHandle> {
        let mut map = self.inner.lock().expect("session map poisoned");
        map.entry(session_id.to_string()).or_default().clone()
    }

    /// Atomically checks and sets the busy flag. Returns false if a run is
    /// already in progress for this session.
    pub fn try_acquire(&self, session_id: &str) -> bool {
        let handle = self.get_or_create(session_id);
        let mut state = handle.state.lock().expect("session poisoned");
        if state.busy {
            false
        } else {
            state.busy = true;
            true
        }
    }

    /// Acquires the session for `run`, or defers it if a run is in progress.
    ///
    /// Returns the run back when acquired so the caller executes it
    /// immediately; returns `None` when it was appended to the pending queue
    /// (it will be handed out by a later [`SessionStore::release`]). The
    /// check-and-set and the enqueue are one critical section, so a run can
    /// never be parked while the session is idle.
    pub fn acquire_or_enqueue(&self, session_id: &str, run: QueuedRun) -> Option<QueuedRun> {
        let handle = self.get_or_create(session_id);
        let mut state = handle.state.lock().expect("session poisoned");
        if state.busy {
            state.pending.push_back(run);
            None
        } else {
            state.busy = true;
            Some(run)
        }
    }

    /// Releases the session after a run. If inputs were queued while the run
    /// was in progress, the oldest one is returned and the session stays
    /// busy; otherwise the busy flag is cleared. Safe to call for a session
    /// that was never acquired.
    pub fn release(&self, session_id: &str) -> Option<QueuedRun> {
        let handle = self.get_or_create(session_id);
        let mut state = handle.state.lock().expect("session poisoned");
        match state.pending.pop_front() {
            Some(next) => Some(next),
            None => {
                state.busy = false;
                None
            }
        }
    }

    /// Appends one turn to the session's history.
    pub fn append_turn(&self, session_id: &str, role: Role, text: &str) {
        let handle = self.get_or_create(session_id);
        let mut state = handle.state.lock().expect("session poisoned");
        state.history.push(Turn {
            role,
            text: text.to_string(),
        });
    }

    /// Returns a snapshot of the session's ordered history.
    pub fn history(&self, session_id: &str) -> Vec<Turn> {
        let handle = self.get_or_create(session_id);
        let state = handle.state.lock().expect("session poisoned");
        state.history.clone()
    }

    /// Summarizes every known session.
    pub fn snapshot(&self) -> Vec<SessionSummary> {
        let map = self.inner.lock().expect("session map poisoned");
        map.iter()
            .map(|(session_id, handle)| {
                let state = handle.state.lock().expect("session poisoned");
                SessionSummary {
                    session_id: session_id.clone(),
                    turns: state.history.len(),
                    busy: state.busy,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(text: &str) -> QueuedRun {
        let (events, _rx) = mpsc::channel(1);
        QueuedRun {
            input: PipelineInput::Text(text.to_string()),
            events,
        }
    }

    fn input_text(run: &QueuedRun) -> &str {
        match &run.input {
            PipelineInput::Text(text) => text,
            PipelineInput::Audio(_) => panic!("expected text input"),
        }
    }

    #[test]
    fn test_try_acquire_is_exclusive_per_session() {
        let store = SessionStore::new();
        assert!(store.try_acquire("s1"));
        assert!(!store.try_acquire("s1"));
        // A different session is unaffected.
        assert!(store.try_acquire("s2"));
    }

    #[test]
    fn test_release_clears_busy_and_is_idempotent() {
        let store = SessionStore::new();
        assert!(store.try_acquire("s1"));
        assert!(store.release("s1").is_none());
        assert!(store.try_acquire("s1"));

        // Releasing a session that was never acquired is a no-op.
        assert!(store.release("unseen").is_none());
        assert!(store.try_acquire("unseen"));
    }

    #[test]
    fn test_acquire_or_enqueue_preserves_arrival_order() {
        let store = SessionStore::new();

        let first = store.acquire_or_enqueue("s1", queued("first"));
        assert_eq!(input_text(first.as_ref().unwrap()), "first");

        assert!(store.acquire_or_enqueue("s1", queued("second")).is_none());
        assert!(store.acquire_or_enqueue("s1", queued("third")).is_none());

        let next = store.release("s1").unwrap();
        assert_eq!(input_text(&next), "second");
        // Still busy while a queued run is being handed out.
        assert!(!store.try_acquire("s1"));

        let next = store.release("s1").unwrap();
        assert_eq!(input_text(&next), "third");

        assert!(store.release("s1").is_none());
        assert!(store.try_acquire("s1"));
    }

    #[test]
    fn test_history_append_order() {
        let store = SessionStore::new();
        store.append_turn("s1", Role::User, "hello");
        store.append_turn("s1", Role::Assistant, "hi there");

        let history = store.history("s1");
        assert_eq!(
            history,
            vec![Turn::user("hello"), Turn::assistant("hi there")]
        );
        // Other sessions are isolated.
        assert!(store.history("s2").is_empty());
    }

    #[test]
    fn test_snapshot_reports_turns_and_busy() {
        let store = SessionStore::new();
        store.append_turn("s1", Role::User, "hello");
        assert!(store.try_acquire("s1"));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].session_id, "s1");
        assert_eq!(snapshot[0].turns, 1);
        assert!(snapshot[0].busy);
    }
}
