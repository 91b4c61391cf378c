//! Authentication context around the external auth service.
//!
//! The bearer token is opaque here: issuing and validating it is the auth
//! service's job. The context only keeps the current user, persists the
//! token between invocations, and drops it when the service rejects it.

use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::AuthError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Secretary,
    Advisor,
    DeansOffice,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Secretary => "secretary",
            Self::Advisor => "advisor",
            Self::DeansOffice => "deansoffice",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSession {
    pub token: String,
    pub user: User,
}

pub trait AuthService {
    fn login(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<StoredSession, AuthError>> + Send;

    fn validate(&self, token: &str) -> impl Future<Output = Result<User, AuthError>> + Send;
}

pub struct HttpAuthService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

impl AuthService for HttpAuthService {
    async fn login(&self, email: &str, password: &str) -> Result<StoredSession, AuthError> {
        let response = self
            .client
            .post(format!("{}/auth/login", self.base_url))
            .json(&LoginRequest { email, password })
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(response.error_for_status()?.json().await?)
    }

    async fn validate(&self, token: &str) -> Result<User, AuthError> {
        let response = self
            .client
            .get(format!("{}/auth/validate", self.base_url))
            .bearer_auth(token)
            .send()
            .await?;
        if matches!(
            response.status(),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN
        ) {
            return Err(AuthError::TokenRejected);
        }
        Ok(response.error_for_status()?.json().await?)
    }
}

/// JSON file holding the token and user between CLI invocations.
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Result<Option<StoredSession>, AuthError> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, session: &StoredSession) -> Result<(), AuthError> {
        std::fs::write(&self.path, serde_json::to_string_pretty(session)?)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), AuthError> {
        match std::fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

pub struct AuthContext<A> {
    service: A,
    store: SessionStore,
    session: Option<StoredSession>,
}

impl<A: AuthService> AuthContext<A> {
    pub fn new(service: A, store: SessionStore) -> Self {
        Self {
            service,
            store,
            session: None,
        }
    }

    /// Revalidates a stored token. Any failure discards the stored session.
    pub async fn restore(&mut self) -> Result<Option<&User>, AuthError> {
        let stored = match self.store.load() {
            Ok(Some(stored)) => stored,
            Ok(None) => return Ok(None),
            Err(AuthError::Corrupt(e)) => {
                warn!(error = %e, "discarding unreadable session file");
                self.store.clear()?;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match self.service.validate(&stored.token).await {
            Ok(user) => {
                self.session = Some(StoredSession {
                    token: stored.token,
                    user,
                });
            }
            Err(e) => {
                warn!(error = %e, "token validation failed");
                self.session = None;
                self.store.clear()?;
            }
        }
        Ok(self.user())
    }

    pub async fn login(&mut self, email: &str, password: &str) -> Result<&User, AuthError> {
        let session = self.service.login(email, password).await?;
        self.store.save(&session)?;
        info!(email = %session.user.email, role = session.user.role.as_str(), "logged in");
        Ok(&self.session.insert(session).user)
    }

    pub fn logout(&mut self) -> Result<(), AuthError> {
        self.session = None;
        self.store.clear()
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(|session| &session.user)
    }

    pub fn token(&self) -> Option<&str> {
        self.session.as_ref().map(|session| session.token.as_str())
    }
}
