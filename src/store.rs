//! Per-browser sessions.
//!
//! Each browser gets an opaque id in a session cookie (no `Max-Age`, so it
//! ends with the browser session) and its own `Session` in memory. Nothing
//! is persisted; a browser without a known id starts from the initial state.

use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::models::UserId;
use crate::session::Session;

/// Session cookie name
pub const SESSION_COOKIE: &str = "paperdesk_session";

/// Sessions untouched for this long are dropped.
pub const SESSION_IDLE_HOURS: u64 = 12;

const SESSION_ID_LEN: usize = 32;

pub type SessionId = String;

/// Shared handle to one browser's session. Never hold the guard across an
/// `.await`.
#[derive(Clone)]
pub struct SessionHandle(Arc<Mutex<Session>>);

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    pub fn lock(&self) -> MutexGuard<'_, Session> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Entry {
    session: SessionHandle,
    last_seen: Instant,
}

pub struct SessionStore {
    placeholder_user: UserId,
    idle: Duration,
    entries: Mutex<HashMap<SessionId, Entry>>,
}

impl SessionStore {
    pub fn new(placeholder_user: UserId) -> Self {
        Self::with_idle(placeholder_user, Duration::from_secs(SESSION_IDLE_HOURS * 3600))
    }

    pub fn with_idle(placeholder_user: UserId, idle: Duration) -> Self {
        Self {
            placeholder_user,
            idle,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<SessionId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Finds the session named by the request's cookie, or starts a fresh
    /// one and adds its cookie to the returned jar.
    pub fn resolve(&self, jar: CookieJar) -> (CookieJar, SessionHandle) {
        let now = Instant::now();
        let mut entries = self.entries();
        entries.retain(|_, entry| {
            let alive = now.duration_since(entry.last_seen) < self.idle;
            if !alive {
                entry.session.lock().cancel_chat_turn();
            }
            alive
        });

        if let Some(cookie) = jar.get(SESSION_COOKIE) {
            if let Some(entry) = entries.get_mut(cookie.value()) {
                entry.last_seen = now;
                return (jar, entry.session.clone());
            }
            debug!("unknown or expired session cookie");
        }

        let id = new_session_id();
        let session = SessionHandle::new(Session::new(self.placeholder_user));
        entries.insert(
            id.clone(),
            Entry {
                session: session.clone(),
                last_seen: now,
            },
        );
        info!(sessions = entries.len(), "new browser session");

        let cookie = Cookie::build((SESSION_COOKIE, id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .build();
        (jar.add(cookie), session)
    }
}

fn new_session_id() -> SessionId {
    rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}
