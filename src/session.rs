//! Process-wide session state, derived from the remote auth provider.
//! The store is the only writer of the current-user channel; every other
//! component reads it through `watch` receivers.

use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::{AppError, AppResult};
use crate::notice::NoticeCenter;
use crate::remote::auth::{AuthEvent, AuthUser, UserMetadata};
use crate::remote::data::{ProfileRow, UserId};
use crate::remote::{DynAuthProvider, DynConnectivityProbe, DynDataStore};
use crate::validate;

/// Normalized, client-local representation of the authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: UserId,
    pub email: String,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// Normalization applied wherever a raw auth payload becomes a session
/// user: missing or empty username becomes "User", empty avatar becomes
/// absent, id and email copy verbatim.
fn normalize(user: &AuthUser) -> SessionUser {
    SessionUser {
        id: user.id.clone(),
        email: user.email.clone(),
        username: user
            .metadata
            .username
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "User".to_string()),
        avatar_url: user.metadata.avatar_url.clone().filter(|s| !s.is_empty()),
    }
}

pub struct SessionStore {
    auth: DynAuthProvider,
    data: DynDataStore,
    notices: NoticeCenter,
    connectivity: Option<DynConnectivityProbe>,
    user_tx: watch::Sender<Option<SessionUser>>,
    loading_tx: watch::Sender<bool>,
    shutdown_tx: watch::Sender<bool>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl SessionStore {
    /// Load the persisted session (if any), publish the user, and start
    /// republishing on every auth-state transition until the store is
    /// dropped.
    pub async fn init(
        auth: DynAuthProvider,
        data: DynDataStore,
        notices: NoticeCenter,
        connectivity: Option<DynConnectivityProbe>,
    ) -> Arc<Self> {
        let (user_tx, _) = watch::channel(None);
        let (loading_tx, _) = watch::channel(true);
        let (shutdown_tx, _) = watch::channel(false);

        let store = Arc::new(Self {
            auth,
            data,
            notices,
            connectivity,
            user_tx,
            loading_tx,
            shutdown_tx,
            forwarder: Mutex::new(None),
        });

        match store.auth.current_session().await {
            Ok(Some(session)) => {
                store.user_tx.send_replace(Some(normalize(&session.user)));
            }
            Ok(None) => {}
            Err(err) => tracing::warn!("Session load error: {}", err),
        }

        // Subscribe before spawning so no transition between init and the
        // task's first poll is lost.
        let events = store.auth.subscribe();
        let handle = tokio::spawn(forward_auth_events(
            events,
            store.user_tx.clone(),
            store.shutdown_tx.subscribe(),
        ));
        *store.forwarder.lock().await = Some(handle);

        store.loading_tx.send_replace(false);
        store
    }

    /// Observable current user; `None` while signed out.
    pub fn user(&self) -> watch::Receiver<Option<SessionUser>> {
        self.user_tx.subscribe()
    }

    pub fn current_user(&self) -> Option<SessionUser> {
        self.user_tx.borrow().clone()
    }

    /// True until the persisted-session load has settled.
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading_tx.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading_tx.borrow()
    }

    /// Register the credential, then create the profile row keyed by the
    /// new user id. The user is published only when both succeed; a failed
    /// profile insert leaves an orphaned auth identity behind and publishes
    /// nothing.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: &str,
    ) -> AppResult<SessionUser> {
        validate::sign_up(email, password, username)?;

        let auth_user = self
            .auth
            .sign_up(
                email,
                password,
                UserMetadata {
                    username: Some(username.to_string()),
                    avatar_url: None,
                },
            )
            .await
            .map_err(|err| {
                self.notices.error("Signup failed", &err);
                err
            })?;
        let user = normalize(&auth_user);

        if let Err(err) = self
            .data
            .insert_profile(ProfileRow {
                id: user.id.clone(),
                username: user.username.clone(),
                avatar_url: None,
            })
            .await
        {
            tracing::error!("Profile creation error: {}", err);
            self.notices.error("Signup failed", &err);
            return Err(err);
        }

        self.user_tx.send_replace(Some(user.clone()));
        Ok(user)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AppResult<SessionUser> {
        validate::sign_in(email, password)?;

        if let Some(probe) = &self.connectivity {
            if !probe.is_connected().await {
                return Err(AppError::Offline);
            }
        }

        let auth_user = self.auth.sign_in(email, password).await.map_err(|err| {
            self.notices.error("Login failed", &err);
            err
        })?;
        let user = normalize(&auth_user);
        self.user_tx.send_replace(Some(user.clone()));
        Ok(user)
    }

    /// Revoke the remote session; local state clears either way.
    pub async fn sign_out(&self) {
        if let Err(err) = self.auth.sign_out().await {
            tracing::warn!("Sign-out error: {}", err);
        }
        self.user_tx.send_replace(None);
    }

    pub async fn reset_password(&self, email: &str) -> AppResult<()> {
        self.auth.request_password_reset(email).await
    }

    /// Update the published user's avatar in place. Used by the profile
    /// workflow so other open views see a fresh avatar immediately.
    pub fn set_avatar_url(&self, url: &str) {
        self.user_tx.send_modify(|user| {
            if let Some(user) = user {
                user.avatar_url = Some(url.to_string());
            }
        });
    }

    /// Update the published user's display fields after a successful
    /// profile save.
    pub fn apply_profile(&self, username: &str, avatar_url: Option<&str>) {
        self.user_tx.send_modify(|user| {
            if let Some(user) = user {
                user.username = username.to_string();
                user.avatar_url = avatar_url.map(str::to_string);
            }
        });
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Ok(mut guard) = self.forwarder.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }
}

/// Republish a normalized user (or absence) on every auth transition.
async fn forward_auth_events(
    mut events: broadcast::Receiver<AuthEvent>,
    user_tx: watch::Sender<Option<SessionUser>>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            event = events.recv() => match event {
                Ok(event) => {
                    let user = event.session.as_ref().map(|s| normalize(&s.user));
                    user_tx.send_replace(user);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Auth event stream lagged by {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
