//! Session manager — per-agent sessions with an expiring scratchpad
//!
//! Sessions are created on authentication and live for a fixed TTL; there
//! is no renewal. An expired session is removed the moment anything touches
//! it. Tools never hold a session: they get a [`ScratchpadHandle`] that
//! re-resolves the session on every access.

use crate::auth::{Authenticator, Credentials, Identity};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use extgate_core::{GatewayError, Result, SessionConfig, SessionKey};
use extgate_tools::Scratchpad;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Session {
    pub key: SessionKey,
    pub identity: Identity,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Per-session lock: scratchpad mutations within a session are serialized.
    scratchpad: Mutex<HashMap<String, Value>>,
}

impl Session {
    fn new(identity: Identity, ttl: Duration) -> Self {
        let created_at = Utc::now();
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self {
            key: SessionKey::generate(),
            identity,
            created_at,
            expires_at: created_at.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            scratchpad: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.key.clone(),
            principal: self.identity.principal.clone(),
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }

    fn pad(&self) -> std::sync::MutexGuard<'_, HashMap<String, Value>> {
        match self.scratchpad.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// What the caller learns about its session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: SessionKey,
    pub principal: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

type SessionMap = DashMap<SessionKey, Arc<Session>>;

pub struct SessionManager {
    sessions: Arc<SessionMap>,
    authenticator: Arc<dyn Authenticator>,
    ttl: Duration,
    max_entries: usize,
}

impl SessionManager {
    pub fn new(authenticator: Arc<dyn Authenticator>, config: &SessionConfig) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            authenticator,
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_scratchpad_entries,
        }
    }

    /// Override the session lifetime (sub-second TTLs are useful in tests).
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Validate credentials and open a fresh session with an empty scratchpad.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<SessionInfo> {
        let identity = self.authenticator.authenticate(credentials).await?;
        let session = Arc::new(Session::new(identity, self.ttl));
        let info = session.info();
        self.sessions.insert(session.key.clone(), session);
        info!(session = %info.session_id, principal = %info.principal, "Session created");
        Ok(info)
    }

    /// The active session for `key`, or an `auth` error.
    pub fn resolve(&self, key: &SessionKey) -> Result<Arc<Session>> {
        resolve_in(&self.sessions, key)
    }

    /// Scratchpad accessor for a tool call on behalf of `key`.
    pub fn scratchpad(&self, key: &SessionKey) -> Result<Arc<dyn Scratchpad>> {
        self.resolve(key)?;
        Ok(Arc::new(ScratchpadHandle {
            key: key.clone(),
            sessions: self.sessions.clone(),
            max_entries: self.max_entries,
        }))
    }

    /// End a session early. Returns false if it did not exist.
    pub fn logout(&self, key: &SessionKey) -> bool {
        let removed = self.sessions.remove(key).is_some();
        if removed {
            info!(session = %key, "Session logged out");
        }
        removed
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| !s.is_expired());
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            debug!(purged, "Purged expired sessions");
        }
        purged
    }

    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| !s.is_expired()).count()
    }

    /// Periodically purge expired sessions until `shutdown` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        manager.purge_expired();
                    }
                    _ = shutdown.cancelled() => {
                        debug!("Session sweeper stopped");
                        return;
                    }
                }
            }
        })
    }
}

fn resolve_in(sessions: &SessionMap, key: &SessionKey) -> Result<Arc<Session>> {
    let session = sessions
        .get(key)
        .map(|s| s.value().clone())
        .ok_or_else(|| GatewayError::auth("unknown session"))?;
    if session.is_expired() {
        sessions.remove_if(key, |_, s| s.is_expired());
        debug!(session = %key, "Session expired");
        return Err(GatewayError::auth("session expired"));
    }
    Ok(session)
}

/// Scratchpad view handed to tools. Holds a key, never the session itself.
pub struct ScratchpadHandle {
    key: SessionKey,
    sessions: Arc<SessionMap>,
    max_entries: usize,
}

impl Scratchpad for ScratchpadHandle {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let session = resolve_in(&self.sessions, &self.key)?;
        let value = session.pad().get(key).cloned();
        Ok(value)
    }

    fn set(&self, key: &str, value: Value) -> Result<()> {
        let session = resolve_in(&self.sessions, &self.key)?;
        let mut pad = session.pad();
        if !pad.contains_key(key) && pad.len() >= self.max_entries {
            return Err(GatewayError::validation(
                "scratchpad_set",
                format!("scratchpad is full ({} entries)", self.max_entries),
            ));
        }
        pad.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<Option<Value>> {
        let session = resolve_in(&self.sessions, &self.key)?;
        let removed = session.pad().remove(key);
        Ok(removed)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let session = resolve_in(&self.sessions, &self.key)?;
        let keys = session.pad().keys().cloned().collect();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenAuthenticator;
    use extgate_core::{AuthMode, ErrorKind};
    use serde_json::json;

    fn manager() -> SessionManager {
        let auth = TokenAuthenticator { mode: AuthMode::Token, token: Some("secret".into()) };
        SessionManager::new(Arc::new(auth), &SessionConfig::default())
    }

    #[tokio::test]
    async fn wrong_token_creates_no_session() {
        let m = manager();
        let err = m.authenticate(&Credentials::token("nope")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(m.active_count(), 0);
    }

    #[tokio::test]
    async fn unknown_session_is_auth_error() {
        let err = manager().resolve(&SessionKey::new("missing")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
    }

    #[tokio::test]
    async fn last_write_wins() {
        let m = manager();
        let info = m.authenticate(&Credentials::token("secret")).await.unwrap();
        let pad = m.scratchpad(&info.session_id).unwrap();
        pad.set("k", json!(1)).unwrap();
        pad.set("k", json!(2)).unwrap();
        assert_eq!(pad.get("k").unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn scratchpad_entry_limit() {
        let m = SessionManager::new(
            Arc::new(TokenAuthenticator { mode: AuthMode::None, token: None }),
            &SessionConfig { max_scratchpad_entries: 2, ..Default::default() },
        );
        let info = m.authenticate(&Credentials::default()).await.unwrap();
        let pad = m.scratchpad(&info.session_id).unwrap();
        pad.set("a", json!(1)).unwrap();
        pad.set("b", json!(2)).unwrap();
        assert_eq!(pad.set("c", json!(3)).unwrap_err().kind(), ErrorKind::Validation);
        // Overwriting an existing key is still allowed at the limit.
        pad.set("a", json!(10)).unwrap();
    }

    #[tokio::test]
    async fn logout_invalidates_handles() {
        let m = manager();
        let info = m.authenticate(&Credentials::token("secret")).await.unwrap();
        let pad = m.scratchpad(&info.session_id).unwrap();
        assert!(m.logout(&info.session_id));
        assert_eq!(pad.keys().unwrap_err().kind(), ErrorKind::Auth);
        assert!(!m.logout(&info.session_id));
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let m = manager().with_ttl(Duration::from_millis(30));
        m.authenticate(&Credentials::token("secret")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(m.purge_expired(), 1);
        assert_eq!(m.active_count(), 0);
    }
}
