use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{BackendError, ValidationError};
use crate::role_guard::UserRole;

/// Shared bearer token slot. The HTTP layer reads it on every request; the
/// auth manager writes it on login and logout.
#[derive(Clone, Default)]
pub struct AuthToken {
    inner: Arc<RwLock<Option<String>>>,
}

impl AuthToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        let handle = Self::new();
        handle.set(token);
        handle
    }

    #[must_use]
    pub fn get(&self) -> Option<String> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.get().is_some()
    }

    pub fn set(&self, token: impl Into<String>) {
        let token = token.into();
        let value = (!token.trim().is_empty()).then_some(token);
        match self.inner.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }

    pub fn clear(&self) {
        match self.inner.write() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("is_set", &self.is_set())
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResponse {
    pub token: String,
    pub refresh: Option<String>,
    pub user: UserProfile,
}

#[derive(Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("email", &self.email)
            .finish()
    }
}

#[async_trait]
pub trait AuthBackend {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, BackendError>;
    /// Returns the backend's confirmation message, if it sent one.
    async fn register(&self, account: &NewAccount) -> Result<Option<String>, BackendError>;
}

/// What survives between runs: the bearer token and the profile it was
/// issued for.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredLogin {
    pub token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

impl StoredLogin {
    #[must_use]
    pub fn token_only(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user: None,
        }
    }
}

impl fmt::Debug for StoredLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredLogin")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
#[error("{message}")]
pub struct TokenStoreError {
    message: String,
}

impl TokenStoreError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<StoredLogin>;
    fn save(&self, login: &StoredLogin) -> Result<(), TokenStoreError>;
    fn clear(&self) -> Result<(), TokenStoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    login: RwLock<Option<StoredLogin>>,
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<StoredLogin> {
        self.login.read().ok().and_then(|guard| guard.clone())
    }

    fn save(&self, login: &StoredLogin) -> Result<(), TokenStoreError> {
        let mut guard = self
            .login
            .write()
            .map_err(|_| TokenStoreError::new("token store lock poisoned"))?;
        *guard = Some(login.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), TokenStoreError> {
        let mut guard = self
            .login
            .write()
            .map_err(|_| TokenStoreError::new("token store lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("login failed: {0}")]
    Backend(#[source] BackendError),
    #[error("registration failed: {0}")]
    Registration(#[source] BackendError),
}

pub struct AuthManager<B: AuthBackend> {
    backend: B,
    token: AuthToken,
    store: Box<dyn TokenStore>,
    user: Option<UserProfile>,
}

impl<B: AuthBackend> AuthManager<B> {
    /// Restores the stored login. When `token` already holds a value (for
    /// example from the environment) the stored profile is only reused if it
    /// was issued for that same token.
    #[must_use]
    pub fn new(backend: B, token: AuthToken, store: Box<dyn TokenStore>) -> Self {
        let user = match (store.load(), token.get()) {
            (Some(stored), None) => {
                token.set(stored.token);
                stored.user
            }
            (Some(stored), Some(current)) if stored.token == current => stored.user,
            _ => None,
        };

        Self {
            backend,
            token,
            store,
            user,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_set()
    }

    /// The logged-in profile. Once the token is gone (logout, or a `401`
    /// that cleared it) there is no user, whatever was cached.
    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref().filter(|_| self.is_authenticated())
    }

    #[must_use]
    pub fn role(&self) -> UserRole {
        self.user().map_or(UserRole::default(), |user| user.role)
    }

    #[must_use]
    pub fn token(&self) -> &AuthToken {
        &self.token
    }

    pub async fn login(&mut self, credentials: &Credentials) -> Result<&UserProfile, AuthError> {
        require_credentials(&credentials.username, &credentials.password)?;

        let response = self
            .backend
            .login(credentials)
            .await
            .map_err(AuthError::Backend)?;

        self.token.set(response.token.clone());
        let stored = StoredLogin {
            token: response.token,
            user: Some(response.user.clone()),
        };
        if let Err(error) = self.store.save(&stored) {
            warn!("failed to persist bearer token: {error}");
        }
        info!(
            "logged in as `{}` ({})",
            response.user.username, response.user.role
        );

        Ok(self.user.insert(response.user))
    }

    /// Creates an account. The current login, if any, is left untouched.
    pub async fn register(&self, account: &NewAccount) -> Result<String, AuthError> {
        require_credentials(&account.username, &account.password)?;

        let message = self
            .backend
            .register(account)
            .await
            .map_err(AuthError::Registration)?;
        info!("registered account `{}`", account.username);
        Ok(message.unwrap_or_else(|| "User created successfully".to_string()))
    }

    pub fn logout(&mut self) {
        self.token.clear();
        self.user = None;
        if let Err(error) = self.store.clear() {
            warn!("failed to clear stored bearer token: {error}");
        }
    }
}

fn require_credentials(username: &str, password: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        return Err(ValidationError::MissingField { field: "username" });
    }
    if password.is_empty() {
        return Err(ValidationError::MissingField { field: "password" });
    }
    Ok(())
}

impl<B: AuthBackend> fmt::Debug for AuthManager<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthManager")
            .field("token", &self.token)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}
