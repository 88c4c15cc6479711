//! Login Sessions
//!
//! Sessions are held in memory only and live until the instance goes away.  There's no expiry and
//! no logout.  Callers only ever get copies; the authoritative list stays behind the lock.
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};

use log::{debug, info};

use crate::{
    crypto::make_session_token,
    error::{OmniErrorKind, Result},
    metadata::UserInfo,
    time::{unix_nanos, unix_now},
};

/// An authenticated user
///
/// This is a detached copy.  Changing it does not change the session the instance holds.
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    token: String,
    user: UserInfo,
    login_time: u64,
    last_activity: u64,
}

impl Session {
    pub(crate) fn new(token: String, user: UserInfo, login_time: u64) -> Self {
        Session {
            token,
            user,
            login_time,
            last_activity: login_time,
        }
    }

    /// The token clients present on later requests
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Who logged in, as of the login
    pub fn user(&self) -> &UserInfo {
        &self.user
    }

    /// Unix seconds
    pub fn login_time(&self) -> u64 {
        self.login_time
    }

    /// Unix seconds of the most recent successful resolve
    pub fn last_activity(&self) -> u64 {
        self.last_activity
    }
}

#[derive(Debug, Default)]
pub(crate) struct SessionManager {
    sessions: Mutex<Vec<Session>>,
    counter: AtomicU64,
}

impl SessionManager {
    pub(crate) fn new() -> Self {
        SessionManager {
            sessions: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
        }
    }

    /// Start a session for `user`, who occupies `slot` in the user table
    pub(crate) fn login(&self, user: UserInfo, slot: usize) -> Session {
        let nanos = unix_nanos();
        let count = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let token = make_session_token(nanos, slot, count);

        let session = Session::new(token, user, nanos / 1_000_000_000);
        info!("session started for {}", session.user.username);

        let mut sessions = self.sessions.lock().expect("poisoned session lock");
        sessions.push(session.clone());
        session
    }

    /// Look up a token, refreshing its last activity time
    pub(crate) fn resolve(&self, token: &str) -> Result<Session> {
        let mut sessions = self.sessions.lock().expect("poisoned session lock");

        match sessions.iter_mut().find(|s| s.token == token) {
            Some(session) => {
                session.last_activity = unix_now();
                Ok(session.clone())
            }
            None => {
                debug!("unknown session token {}", token);
                Err(OmniErrorKind::InvalidSession.into())
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.sessions.lock().expect("poisoned session lock").len()
    }
}

#[cfg(test)]
mod test {
    use assert_matches::assert_matches;

    use super::*;
    use crate::metadata::UserRole;

    fn user(name: &str) -> UserInfo {
        UserInfo {
            username: name.to_string(),
            role: UserRole::Normal,
            created_time: 0,
            last_login: 0,
        }
    }

    #[test]
    fn login_then_resolve() {
        let manager = SessionManager::new();
        let session = manager.login(user("alice"), 3);

        let resolved = manager.resolve(session.token()).unwrap();
        assert_eq!(resolved.user().username, "alice");
        assert_eq!(resolved.token(), session.token());
        assert!(resolved.last_activity() >= session.login_time());
    }

    #[test]
    fn unknown_token() {
        let manager = SessionManager::new();
        manager.login(user("alice"), 0);
        assert_matches!(
            manager.resolve("nope").map_err(|e| e.kind()),
            Err(OmniErrorKind::InvalidSession)
        );
    }

    #[test]
    fn repeated_logins_get_distinct_tokens() {
        let manager = SessionManager::new();
        let a = manager.login(user("alice"), 0);
        let b = manager.login(user("alice"), 0);
        assert_ne!(a.token(), b.token());
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn copies_are_detached() {
        let manager = SessionManager::new();
        let mut copy = manager.login(user("alice"), 0);
        copy.user.username = "mallory".to_string();

        let resolved = manager.resolve(copy.token()).unwrap();
        assert_eq!(resolved.user().username, "alice");
    }
}
