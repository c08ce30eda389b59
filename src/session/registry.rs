//! Tracks live streaming sessions and their in-flight generation

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::AbortHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Generating,
    Closed,
}

struct SessionEntry {
    state: SessionState,
    /// Identifies the current generation; stale tasks cannot touch a newer one
    ticket: u64,
    task: Option<AbortHandle>,
    connected_at: DateTime<Utc>,
}

/// All Open and Generating sessions, keyed by session id.
///
/// Closed sessions are removed. Every transition is a single map operation,
/// so a session can start at most one generation at a time and is closed
/// exactly once.
pub struct ConnectionRegistry {
    sessions: DashMap<String, SessionEntry>,
    next_ticket: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn register(&self, id: &str) {
        self.sessions.insert(
            id.to_string(),
            SessionEntry {
                state: SessionState::Open,
                ticket: 0,
                task: None,
                connected_at: Utc::now(),
            },
        );
    }

    /// Move `Open -> Generating`. Returns the generation ticket, or `None`
    /// when the session is busy or gone.
    pub fn try_begin(&self, id: &str) -> Option<u64> {
        let mut entry = self.sessions.get_mut(id)?;
        if entry.state != SessionState::Open {
            return None;
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        entry.state = SessionState::Generating;
        entry.ticket = ticket;
        entry.task = None;
        Some(ticket)
    }

    /// Record the abort handle of the task running `ticket`
    pub fn attach(&self, id: &str, ticket: u64, task: AbortHandle) {
        if let Some(mut entry) = self.sessions.get_mut(id) {
            if entry.state == SessionState::Generating && entry.ticket == ticket {
                entry.task = Some(task);
            }
        }
    }

    /// True while `ticket` is the session's running generation
    pub fn is_current(&self, id: &str, ticket: u64) -> bool {
        self.sessions
            .get(id)
            .map(|e| e.state == SessionState::Generating && e.ticket == ticket)
            .unwrap_or(false)
    }

    /// Move `Generating -> Open` if `ticket` is still current
    pub fn finish(&self, id: &str, ticket: u64) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut entry) if entry.state == SessionState::Generating && entry.ticket == ticket => {
                entry.state = SessionState::Open;
                entry.task = None;
                true
            }
            _ => false,
        }
    }

    /// Remove the session and abort its in-flight task.
    ///
    /// Idempotent; returns true only for the call that closed it.
    pub fn close(&self, id: &str) -> bool {
        match self.sessions.remove(id) {
            Some((_, entry)) => {
                if let Some(task) = entry.task {
                    task.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn state(&self, id: &str) -> SessionState {
        self.sessions
            .get(id)
            .map(|e| e.state)
            .unwrap_or(SessionState::Closed)
    }

    pub fn connected_at(&self, id: &str) -> Option<DateTime<Utc>> {
        self.sessions.get(id).map(|e| e.connected_at)
    }

    /// Number of Open and Generating sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions with a generation in flight
    pub fn generating_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|e| e.state == SessionState::Generating)
            .count()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
