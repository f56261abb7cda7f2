use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::AppResult;
use crate::remote::data::UserId;

/// User-editable metadata held by the auth provider alongside the account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    pub username: Option<String>,
    pub avatar_url: Option<String>,
}

/// Raw account payload as the auth provider reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: UserId,
    pub email: String,
    pub metadata: UserMetadata,
}

/// An issued session. Persistence and refresh are the provider's business;
/// the client only ever sees the current session or its absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: AuthUser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChange {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// One transition on the provider's auth-state stream.
#[derive(Debug, Clone)]
pub struct AuthEvent {
    pub change: AuthChange,
    pub session: Option<Session>,
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// The persisted session, if the provider restored one.
    async fn current_session(&self) -> AppResult<Option<Session>>;

    /// Register a credential with attached metadata. Issues a session.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> AppResult<AuthUser>;

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthUser>;

    /// Revoke the current session.
    async fn sign_out(&self) -> AppResult<()>;

    async fn request_password_reset(&self, email: &str) -> AppResult<()>;

    /// Overwrite metadata on the signed-in account.
    async fn update_current_user(&self, metadata: UserMetadata) -> AppResult<AuthUser>;

    /// Auth-state transition feed (sign-in, sign-out, refresh, update).
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

pub type DynAuthProvider = Arc<dyn AuthProvider>;
