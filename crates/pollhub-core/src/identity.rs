use std::sync::{Arc, OnceLock};

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PollError, Result};
use crate::repository::UserRepository;

pub const USERNAME_MIN_LEN: usize = 3;
pub const PASSWORD_MIN_LEN: usize = 6;

/// Public identity of a user: what a token resolves to and what polls
/// reference as their creator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserRef {
    pub id: Uuid,
    pub username: String,
}

/// A stored user, including the password digest.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    pub password_digest: String,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn to_ref(&self) -> UserRef {
        UserRef {
            id: self.id,
            username: self.username.clone(),
        }
    }
}

/// One-way password hashing. `verify` must compare in constant time.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> anyhow::Result<String>;

    fn verify(&self, password: &str, digest: &str) -> bool;
}

/// Bearer token issuance. Expiry is enforced by `verify`.
pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user: &UserRef) -> anyhow::Result<String>;

    fn verify(&self, token: &str) -> Option<UserRef>;
}

/// Registers and authenticates users and resolves bearer tokens.
pub struct IdentityService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn CredentialHasher>,
    tokens: Arc<dyn TokenIssuer>,
    dummy_digest: OnceLock<Option<String>>,
}

impl IdentityService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn CredentialHasher>,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
            dummy_digest: OnceLock::new(),
        }
    }

    /// Create a user and return it together with a fresh token.
    pub fn register(&self, username: &str, password: &str) -> Result<(UserRef, String)> {
        let username = username.trim();
        if username.chars().count() < USERNAME_MIN_LEN {
            return Err(PollError::validation(format!(
                "Username must be at least {} characters long",
                USERNAME_MIN_LEN
            )));
        }
        if password.chars().count() < PASSWORD_MIN_LEN {
            return Err(PollError::validation(format!(
                "Password must be at least {} characters long",
                PASSWORD_MIN_LEN
            )));
        }

        if self.users.find_by_username(username)?.is_some() {
            return Err(PollError::DuplicateUsername);
        }

        let record = UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_digest: self.hasher.hash(password)?,
            created_at: Utc::now().trunc_subsecs(6),
        };
        self.users.insert(&record)?;

        let user = record.to_ref();
        let token = self.tokens.issue(&user)?;

        info!(user_id = %user.id, username = %user.username, "User registered");
        Ok((user, token))
    }

    /// Check credentials and return the user with a fresh token.
    ///
    /// Unknown usernames and wrong passwords both yield `InvalidCredentials`,
    /// and both pay for one digest verification.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<(UserRef, String)> {
        let record = self.users.find_by_username(username.trim())?;

        let verified = match &record {
            Some(record) => self.hasher.verify(password, &record.password_digest),
            None => {
                if let Some(digest) = self.dummy_digest() {
                    let _ = self.hasher.verify(password, digest);
                }
                false
            }
        };

        match record {
            Some(record) if verified => {
                let user = record.to_ref();
                let token = self.tokens.issue(&user)?;
                Ok((user, token))
            }
            _ => {
                warn!("Rejected login attempt");
                Err(PollError::InvalidCredentials)
            }
        }
    }

    /// Map a bearer token to its user without touching the user store.
    pub fn resolve(&self, token: &str) -> Result<UserRef> {
        self.tokens.verify(token).ok_or(PollError::Unauthenticated)
    }

    fn dummy_digest(&self) -> Option<&str> {
        self.dummy_digest
            .get_or_init(|| self.hasher.hash("pollhub-login-placeholder").ok())
            .as_deref()
    }
}
