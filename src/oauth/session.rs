//! Browser-session bookkeeping: pending OAuth state and the active credential.
//!
//! Sessions expire after an idle TTL and the store holds at most `capacity`
//! of them; creating one past capacity evicts the least recently seen,
//! anonymous sessions first.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::Credential;

/// One year; longer TTLs are clamped.
const MAX_TTL_SECS: i64 = 365 * 24 * 60 * 60;
const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Clone)]
struct SessionData {
    pending_state: Option<String>,
    credential: Option<Credential>,
    last_seen: DateTime<Utc>,
}

impl SessionData {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            pending_state: None,
            credential: None,
            last_seen: now,
        }
    }
}

/// Sessions keyed by the opaque id carried in the session cookie.
pub struct SessionStore {
    ttl: Duration,
    capacity: usize,
    sessions: Mutex<HashMap<String, SessionData>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_limits(DEFAULT_TTL_SECS, DEFAULT_CAPACITY)
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(ttl_secs: u64, capacity: usize) -> Self {
        let secs = i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(MAX_TTL_SECS);
        Self {
            ttl: Duration::seconds(secs),
            capacity,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn with_sessions<R>(&self, f: impl FnOnce(&mut HashMap<String, SessionData>) -> R) -> R {
        let mut sessions = self.sessions.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut sessions)
    }

    fn is_expired(&self, data: &SessionData, now: DateTime<Utc>) -> bool {
        now - data.last_seen >= self.ttl
    }

    /// Look up a live session and mark it seen. An expired entry is removed.
    fn live<'a>(
        &self,
        sessions: &'a mut HashMap<String, SessionData>,
        session_id: &str,
        now: DateTime<Utc>,
    ) -> Option<&'a mut SessionData> {
        if sessions
            .get(session_id)
            .is_some_and(|d| self.is_expired(d, now))
        {
            sessions.remove(session_id);
            return None;
        }
        let data = sessions.get_mut(session_id)?;
        data.last_seen = now;
        Some(data)
    }

    /// Drop expired sessions, then evict until there is room for one more.
    fn make_room(&self, sessions: &mut HashMap<String, SessionData>, now: DateTime<Utc>) {
        sessions.retain(|_, d| !self.is_expired(d, now));
        while !sessions.is_empty() && sessions.len() >= self.capacity {
            let victim = sessions
                .iter()
                .min_by_key(|(_, d)| (d.credential.is_some(), d.last_seen))
                .map(|(id, _)| id.clone());
            match victim {
                Some(id) => {
                    sessions.remove(&id);
                    debug!("evicted least recently used session");
                }
                None => break,
            }
        }
    }

    fn insert(&self, sessions: &mut HashMap<String, SessionData>, id: &str, now: DateTime<Utc>) {
        self.make_room(sessions, now);
        if self.capacity > 0 {
            sessions.insert(id.to_string(), SessionData::new(now));
        }
    }

    /// Create an empty session and return its id.
    pub fn create(&self) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        self.with_sessions(|s| self.insert(s, &id, now));
        id
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.with_sessions(|s| self.live(s, session_id, Utc::now()).is_some())
    }

    pub fn len(&self) -> usize {
        self.with_sessions(|s| s.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget a session entirely.
    pub fn remove(&self, session_id: &str) -> bool {
        self.with_sessions(|s| s.remove(session_id).is_some())
    }

    /// Drop expired sessions, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        self.with_sessions(|s| {
            let before = s.len();
            s.retain(|_, d| !self.is_expired(d, now));
            before - s.len()
        })
    }

    pub fn set_pending_state(&self, session_id: &str, state: &str) {
        let now = Utc::now();
        self.with_sessions(|s| {
            if self.live(s, session_id, now).is_none() {
                self.insert(s, session_id, now);
            }
            if let Some(data) = s.get_mut(session_id) {
                data.pending_state = Some(state.to_string());
            }
        });
    }

    /// Compare `state` against the session's recorded state and clear it on a
    /// match. A mismatch leaves the recorded state in place.
    pub fn take_pending_state_if(&self, session_id: &str, state: &str) -> bool {
        self.with_sessions(|s| match self.live(s, session_id, Utc::now()) {
            Some(data) if data.pending_state.as_deref() == Some(state) => {
                data.pending_state = None;
                true
            }
            _ => false,
        })
    }

    pub fn pending_state(&self, session_id: &str) -> Option<String> {
        self.with_sessions(|s| {
            self.live(s, session_id, Utc::now())
                .and_then(|d| d.pending_state.clone())
        })
    }

    pub fn credential(&self, session_id: &str) -> Option<Credential> {
        self.with_sessions(|s| {
            self.live(s, session_id, Utc::now())
                .and_then(|d| d.credential.clone())
        })
    }

    pub fn set_credential(&self, session_id: &str, credential: Credential) {
        let now = Utc::now();
        self.with_sessions(|s| {
            if self.live(s, session_id, now).is_none() {
                self.insert(s, session_id, now);
            }
            if let Some(data) = s.get_mut(session_id) {
                data.credential = Some(credential);
            }
        });
    }

    /// Remove the credential; returns whether one was present.
    pub fn clear_credential(&self, session_id: &str) -> bool {
        self.with_sessions(|s| {
            self.live(s, session_id, Utc::now())
                .and_then(|d| d.credential.take())
                .is_some()
        })
    }

    #[cfg(test)]
    fn backdate(&self, session_id: &str, by: Duration) {
        self.with_sessions(|s| {
            if let Some(data) = s.get_mut(session_id) {
                data.last_seen = data.last_seen - by;
            }
        });
    }
}
