//! Auth collaborator contract.
//!
//! SYSTEM CONTEXT
//! ==============
//! Credential storage and login flows live outside this crate. The gateway
//! and the channel manager only read the current user and bearer token, and
//! report 401 responses back so the owner can force a logout.

use std::sync::RwLock;

use tracing::info;

/// Read-only view of the authenticated session.
pub trait AuthProvider: Send + Sync {
    /// ID of the authenticated user, if any.
    fn current_user(&self) -> Option<String>;

    /// Bearer token for REST calls and private-channel auth, if any.
    fn token(&self) -> Option<String>;

    /// Called when the backend rejected the token with 401.
    fn on_unauthorized(&self) {}
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Session {
    token: Option<String>,
    user_id: Option<String>,
}

/// In-memory [`AuthProvider`]. A 401 clears the token, matching a forced logout.
#[derive(Debug, Default)]
pub struct InMemoryAuth {
    session: RwLock<Session>,
}

impl InMemoryAuth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session that already knows both token and user.
    #[must_use]
    pub fn signed_in(token: &str, user_id: &str) -> Self {
        let auth = Self::new();
        auth.login(token);
        auth.set_user(Some(user_id.to_owned()));
        auth
    }

    /// Store a token. The user is resolved separately (`/users/me`).
    pub fn login(&self, token: &str) {
        self.write(|s| s.token = Some(token.to_owned()));
    }

    pub fn set_user(&self, user_id: Option<String>) {
        self.write(|s| s.user_id = user_id);
    }

    pub fn logout(&self) {
        self.write(|s| *s = Session::default());
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.read(|s| s.token.is_some())
    }

    fn read<T>(&self, f: impl FnOnce(&Session) -> T) -> T {
        let guard = self.session.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&guard)
    }

    fn write(&self, f: impl FnOnce(&mut Session)) {
        let mut guard = self.session.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        f(&mut guard);
    }
}

impl AuthProvider for InMemoryAuth {
    fn current_user(&self) -> Option<String> {
        self.read(|s| s.user_id.clone())
    }

    fn token(&self) -> Option<String> {
        self.read(|s| s.token.clone())
    }

    fn on_unauthorized(&self) {
        info!("auth: token rejected, signing out");
        self.logout();
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
