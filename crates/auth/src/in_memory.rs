//! In-memory identity provider for tests/dev.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;

use rollcall_core::PrincipalId;

use crate::{AuthEvent, IdentityProvider, Session, SessionError, UserProfile};

/// In-memory [`IdentityProvider`].
///
/// - Profiles are stored as raw rows and parsed on every fetch, like a real
///   backend response
/// - Lookup failures and profile latency are scriptable
/// - Session changes are pushed by the test through [`sign_in`](Self::sign_in),
///   [`refresh`](Self::refresh) and [`expire`](Self::expire)
#[derive(Debug)]
pub struct InMemoryIdentityProvider {
    current: Mutex<Option<Session>>,
    profiles: Mutex<HashMap<PrincipalId, JsonValue>>,
    events: broadcast::Sender<AuthEvent>,
    session_failures: AtomicU32,
    profile_failures: AtomicU32,
    profile_delay: Mutex<Duration>,
    session_lookups: AtomicUsize,
    profile_lookups: AtomicUsize,
    sign_outs: AtomicUsize,
}

impl Default for InMemoryIdentityProvider {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            current: Mutex::new(None),
            profiles: Mutex::new(HashMap::new()),
            events,
            session_failures: AtomicU32::new(0),
            profile_failures: AtomicU32::new(0),
            profile_delay: Mutex::new(Duration::ZERO),
            session_lookups: AtomicUsize::new(0),
            profile_lookups: AtomicUsize::new(0),
            sign_outs: AtomicUsize::new(0),
        }
    }
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the session returned by the initial lookup (no event is sent).
    pub fn with_session(self, session: Session) -> Self {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(session);
        }
        self
    }

    pub fn insert_profile(&self, profile: &UserProfile) {
        if let Ok(row) = serde_json::to_value(profile) {
            self.insert_profile_row(profile.id, row);
        }
    }

    pub fn insert_profile_row(&self, user_id: PrincipalId, row: JsonValue) {
        if let Ok(mut profiles) = self.profiles.lock() {
            profiles.insert(user_id, row);
        }
    }

    /// The next `n` session lookups fail.
    pub fn fail_session_lookups(&self, n: u32) {
        self.session_failures.store(n, Ordering::SeqCst);
    }

    /// The next `n` profile lookups fail.
    pub fn fail_profile_lookups(&self, n: u32) {
        self.profile_failures.store(n, Ordering::SeqCst);
    }

    pub fn set_profile_delay(&self, delay: Duration) {
        if let Ok(mut current) = self.profile_delay.lock() {
            *current = delay;
        }
    }

    pub fn sign_in(&self, session: Session) {
        self.replace_session(Some(session.clone()));
        let _ = self.events.send(AuthEvent::SignedIn(session));
    }

    pub fn refresh(&self, session: Session) {
        self.replace_session(Some(session.clone()));
        let _ = self.events.send(AuthEvent::TokenRefreshed(session));
    }

    /// Backend-side sign-out (e.g. session expired elsewhere).
    pub fn expire(&self) {
        self.replace_session(None);
        let _ = self.events.send(AuthEvent::SignedOut);
    }

    pub fn session_lookups(&self) -> usize {
        self.session_lookups.load(Ordering::SeqCst)
    }

    pub fn profile_lookups(&self) -> usize {
        self.profile_lookups.load(Ordering::SeqCst)
    }

    pub fn sign_outs(&self) -> usize {
        self.sign_outs.load(Ordering::SeqCst)
    }

    fn replace_session(&self, session: Option<Session>) {
        if let Ok(mut current) = self.current.lock() {
            *current = session;
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn current_session(&self) -> Result<Option<Session>, SessionError> {
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.session_failures) {
            return Err(SessionError::LookupFailed("session backend unavailable".to_string()));
        }
        self.current
            .lock()
            .map(|current| current.clone())
            .map_err(|_| SessionError::LookupFailed("session store poisoned".to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn fetch_profile(&self, session: &Session) -> Result<Option<UserProfile>, SessionError> {
        self.profile_lookups.fetch_add(1, Ordering::SeqCst);

        let delay = self
            .profile_delay
            .lock()
            .map(|d| *d)
            .unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if Self::take_failure(&self.profile_failures) {
            return Err(SessionError::LookupFailed("profile backend unavailable".to_string()));
        }

        let row = self
            .profiles
            .lock()
            .map_err(|_| SessionError::LookupFailed("profile store poisoned".to_string()))?
            .get(&session.user_id)
            .cloned();

        match row {
            None => Ok(None),
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| SessionError::LookupFailed(format!("malformed profile row: {e}"))),
        }
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        self.expire();
        Ok(())
    }
}
