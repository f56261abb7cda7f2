//! In-process backend implementing the auth and data-store interfaces.
//! Drives the integration tests and doubles as an embedded demo backend.
//! Row semantics mirror the hosted store: profiles keyed by user id, at
//! most one like row per (post, user), posts inner-joined to profiles.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::{broadcast, Mutex};

use crate::error::{AppError, AppResult};
use crate::remote::auth::{
    AuthChange, AuthEvent, AuthProvider, AuthUser, Session, UserMetadata,
};
use crate::remote::data::{
    ChangeEvent, ChangeKind, DataStore, LikeRow, NewPost, PostId, PostRow, ProfileRow, Table,
    UserId,
};

struct Account {
    user: AuthUser,
    password: String,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    session: Option<Session>,
    posts: Vec<PostRow>,
    profiles: HashMap<UserId, ProfileRow>,
    likes: HashSet<LikeRow>,
    reset_requests: Vec<String>,
}

pub struct MemoryBackend {
    state: Mutex<State>,
    changes: broadcast::Sender<ChangeEvent>,
    auth_events: broadcast::Sender<AuthEvent>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        let (auth_events, _) = broadcast::channel(64);
        Self {
            state: Mutex::new(State::default()),
            changes,
            auth_events,
        }
    }

    fn emit_change(&self, event: ChangeEvent) {
        let _ = self.changes.send(event);
    }

    fn emit_auth(&self, change: AuthChange, session: Option<Session>) {
        let _ = self.auth_events.send(AuthEvent { change, session });
    }

    /// Insert a post row verbatim, without a change notification. Lets
    /// tests control ids and timestamps.
    pub async fn seed_post(&self, post: PostRow) {
        self.state.lock().await.posts.push(post);
    }

    /// The profile row for a user, if any.
    pub async fn profile(&self, id: &UserId) -> Option<ProfileRow> {
        self.state.lock().await.profiles.get(id).cloned()
    }

    /// Emails that requested a password reset, in order.
    pub async fn reset_requests(&self) -> Vec<String> {
        self.state.lock().await.reset_requests.clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn current_session(&self) -> AppResult<Option<Session>> {
        Ok(self.state.lock().await.session.clone())
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> AppResult<AuthUser> {
        let session = {
            let mut state = self.state.lock().await;
            if state.accounts.contains_key(email) {
                return Err(AppError::Auth("User already registered".into()));
            }

            let user = AuthUser {
                id: UserId::new(uuid::Uuid::now_v7().to_string()),
                email: email.to_string(),
                metadata,
            };
            state.accounts.insert(
                email.to_string(),
                Account {
                    user: user.clone(),
                    password: password.to_string(),
                },
            );
            let session = Session { user };
            state.session = Some(session.clone());
            session
        };

        self.emit_auth(AuthChange::SignedIn, Some(session.clone()));
        Ok(session.user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthUser> {
        let session = {
            let mut state = self.state.lock().await;
            let user = state
                .accounts
                .get(email)
                .filter(|a| a.password == password)
                .map(|a| a.user.clone())
                .ok_or_else(|| AppError::Auth("Invalid login credentials".into()))?;
            let session = Session { user };
            state.session = Some(session.clone());
            session
        };

        self.emit_auth(AuthChange::SignedIn, Some(session.clone()));
        Ok(session.user)
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.state.lock().await.session = None;
        self.emit_auth(AuthChange::SignedOut, None);
        Ok(())
    }

    async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        // The hosted provider accepts resets for unknown emails too.
        self.state
            .lock()
            .await
            .reset_requests
            .push(email.to_string());
        Ok(())
    }

    async fn update_current_user(&self, metadata: UserMetadata) -> AppResult<AuthUser> {
        let session = {
            let mut state = self.state.lock().await;
            let Some(session) = state.session.as_mut() else {
                return Err(AppError::Auth("Not authenticated".into()));
            };
            if let Some(username) = metadata.username {
                session.user.metadata.username = Some(username);
            }
            if let Some(avatar_url) = metadata.avatar_url {
                session.user.metadata.avatar_url = Some(avatar_url);
            }
            let updated = session.clone();
            let email = updated.user.email.clone();
            if let Some(account) = state.accounts.get_mut(&email) {
                account.user.metadata = updated.user.metadata.clone();
            }
            updated
        };

        self.emit_auth(AuthChange::UserUpdated, Some(session.clone()));
        Ok(session.user)
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }
}

#[async_trait]
impl DataStore for MemoryBackend {
    async fn select_posts(
        &self,
        author: Option<&UserId>,
    ) -> AppResult<Vec<(PostRow, ProfileRow)>> {
        let state = self.state.lock().await;
        let mut rows: Vec<(PostRow, ProfileRow)> = state
            .posts
            .iter()
            .filter(|p| author.map_or(true, |a| p.user_id == *a))
            .filter_map(|p| {
                state
                    .profiles
                    .get(&p.user_id)
                    .map(|profile| (p.clone(), profile.clone()))
            })
            .collect();
        rows.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at));
        Ok(rows)
    }

    async fn insert_post(&self, post: NewPost) -> AppResult<PostRow> {
        let row = PostRow {
            id: PostId::new(uuid::Uuid::now_v7().to_string()),
            user_id: post.user_id,
            caption: post.caption,
            image_url: post.image_url,
            likes: 0,
            created_at: Utc::now(),
        };
        self.state.lock().await.posts.push(row.clone());
        self.emit_change(ChangeEvent {
            table: Table::Posts,
            kind: ChangeKind::Insert,
            post_id: Some(row.id.clone()),
            author_id: Some(row.user_id.clone()),
        });
        Ok(row)
    }

    async fn update_post(
        &self,
        id: &PostId,
        caption: Option<String>,
        image_url: Option<String>,
    ) -> AppResult<()> {
        let author = {
            let mut state = self.state.lock().await;
            match state.posts.iter_mut().find(|p| p.id == *id) {
                Some(post) => {
                    post.caption = caption;
                    post.image_url = image_url;
                    Some(post.user_id.clone())
                }
                // Updating a missing row matches zero rows; not an error.
                None => None,
            }
        };
        if let Some(author_id) = author {
            self.emit_change(ChangeEvent {
                table: Table::Posts,
                kind: ChangeKind::Update,
                post_id: Some(id.clone()),
                author_id: Some(author_id),
            });
        }
        Ok(())
    }

    async fn delete_post(&self, id: &PostId) -> AppResult<()> {
        let author = {
            let mut state = self.state.lock().await;
            let author = state
                .posts
                .iter()
                .find(|p| p.id == *id)
                .map(|p| p.user_id.clone());
            state.posts.retain(|p| p.id != *id);
            state.likes.retain(|l| l.post_id != *id);
            author
        };
        if let Some(author_id) = author {
            self.emit_change(ChangeEvent {
                table: Table::Posts,
                kind: ChangeKind::Delete,
                post_id: Some(id.clone()),
                author_id: Some(author_id),
            });
        }
        Ok(())
    }

    async fn like_counts(&self, posts: &[PostId]) -> AppResult<HashMap<PostId, u64>> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for like in &state.likes {
            if posts.contains(&like.post_id) {
                *counts.entry(like.post_id.clone()).or_insert(0u64) += 1;
            }
        }
        Ok(counts)
    }

    async fn liked_by(&self, posts: &[PostId], user: &UserId) -> AppResult<HashSet<PostId>> {
        let state = self.state.lock().await;
        Ok(posts
            .iter()
            .filter(|p| {
                state.likes.contains(&LikeRow {
                    post_id: (*p).clone(),
                    user_id: user.clone(),
                })
            })
            .cloned()
            .collect())
    }

    async fn insert_like(&self, post: &PostId, user: &UserId) -> AppResult<()> {
        {
            let mut state = self.state.lock().await;
            let inserted = state.likes.insert(LikeRow {
                post_id: post.clone(),
                user_id: user.clone(),
            });
            if !inserted {
                return Err(AppError::Data(
                    "duplicate key value violates unique constraint \"likes_pkey\"".into(),
                ));
            }
        }
        self.emit_change(ChangeEvent {
            table: Table::Likes,
            kind: ChangeKind::Insert,
            post_id: Some(post.clone()),
            author_id: Some(user.clone()),
        });
        Ok(())
    }

    async fn delete_like(&self, post: &PostId, user: &UserId) -> AppResult<()> {
        let removed = self.state.lock().await.likes.remove(&LikeRow {
            post_id: post.clone(),
            user_id: user.clone(),
        });
        if removed {
            self.emit_change(ChangeEvent {
                table: Table::Likes,
                kind: ChangeKind::Delete,
                post_id: Some(post.clone()),
                author_id: Some(user.clone()),
            });
        }
        Ok(())
    }

    async fn insert_profile(&self, profile: ProfileRow) -> AppResult<()> {
        {
            let mut state = self.state.lock().await;
            if state.profiles.contains_key(&profile.id) {
                return Err(AppError::Data(
                    "duplicate key value violates unique constraint \"profiles_pkey\"".into(),
                ));
            }
            state.profiles.insert(profile.id.clone(), profile);
        }
        self.emit_change(ChangeEvent {
            table: Table::Profiles,
            kind: ChangeKind::Insert,
            post_id: None,
            author_id: None,
        });
        Ok(())
    }

    async fn update_profile(
        &self,
        id: &UserId,
        username: &str,
        avatar_url: Option<&str>,
    ) -> AppResult<()> {
        {
            let mut state = self.state.lock().await;
            let Some(profile) = state.profiles.get_mut(id) else {
                return Ok(()); // zero rows matched
            };
            profile.username = username.to_string();
            profile.avatar_url = avatar_url.map(str::to_string);
        }
        self.emit_change(ChangeEvent {
            table: Table::Profiles,
            kind: ChangeKind::Update,
            post_id: None,
            author_id: Some(id.clone()),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }
}
