//! Shared test doubles: a recording uploader and wrappers that force
//! selected remote operations to fail while delegating the rest.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use framez::error::{AppError, AppResult};
use framez::notice::NoticeCenter;
use framez::remote::auth::{AuthEvent, AuthUser, Session, UserMetadata};
use framez::remote::data::{
    ChangeEvent, NewPost, PostId, PostRow, ProfileRow, UserId,
};
use framez::remote::{
    AuthProvider, ConnectivityProbe, DataStore, ImageUploader, MemoryBackend,
};
use framez::session::SessionStore;

/// Build a session store straight over a memory backend.
pub async fn init_store(backend: &Arc<MemoryBackend>) -> Arc<SessionStore> {
    SessionStore::init(
        backend.clone(),
        backend.clone(),
        NoticeCenter::new(),
        None,
    )
    .await
}

/// Uploader that never touches the network: counts calls and returns a
/// deterministic URL derived from the file name.
pub struct RecordingUploader {
    calls: AtomicUsize,
}

impl RecordingUploader {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageUploader for RecordingUploader {
    async fn upload(&self, path: &Path) -> AppResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.jpg");
        Ok(format!("https://img.test/{}", name))
    }
}

/// Uploader that always rejects.
pub struct FailingUploader;

#[async_trait]
impl ImageUploader for FailingUploader {
    async fn upload(&self, _path: &Path) -> AppResult<String> {
        Err(AppError::Upload("Invalid upload preset".into()))
    }
}

/// Probe reporting no connectivity.
pub struct OfflineProbe;

#[async_trait]
impl ConnectivityProbe for OfflineProbe {
    async fn is_connected(&self) -> bool {
        false
    }
}

/// Which data-store operation a [`FailingStore`] should reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    ProfileInsert,
    ProfileUpdate,
    Likes,
    PostWrites,
}

fn forced() -> AppError {
    AppError::Data("forced failure".into())
}

/// Data store delegating to a [`MemoryBackend`] except for one forced
/// failure class.
pub struct FailingStore {
    inner: Arc<MemoryBackend>,
    failure: Failure,
}

impl FailingStore {
    pub fn new(inner: Arc<MemoryBackend>, failure: Failure) -> Self {
        Self { inner, failure }
    }
}

#[async_trait]
impl DataStore for FailingStore {
    async fn select_posts(
        &self,
        author: Option<&UserId>,
    ) -> AppResult<Vec<(PostRow, ProfileRow)>> {
        self.inner.select_posts(author).await
    }

    async fn insert_post(&self, post: NewPost) -> AppResult<PostRow> {
        if self.failure == Failure::PostWrites {
            return Err(forced());
        }
        self.inner.insert_post(post).await
    }

    async fn update_post(
        &self,
        id: &PostId,
        caption: Option<String>,
        image_url: Option<String>,
    ) -> AppResult<()> {
        if self.failure == Failure::PostWrites {
            return Err(forced());
        }
        self.inner.update_post(id, caption, image_url).await
    }

    async fn delete_post(&self, id: &PostId) -> AppResult<()> {
        if self.failure == Failure::PostWrites {
            return Err(forced());
        }
        self.inner.delete_post(id).await
    }

    async fn like_counts(&self, posts: &[PostId]) -> AppResult<HashMap<PostId, u64>> {
        self.inner.like_counts(posts).await
    }

    async fn liked_by(&self, posts: &[PostId], user: &UserId) -> AppResult<HashSet<PostId>> {
        self.inner.liked_by(posts, user).await
    }

    async fn insert_like(&self, post: &PostId, user: &UserId) -> AppResult<()> {
        if self.failure == Failure::Likes {
            return Err(forced());
        }
        self.inner.insert_like(post, user).await
    }

    async fn delete_like(&self, post: &PostId, user: &UserId) -> AppResult<()> {
        if self.failure == Failure::Likes {
            return Err(forced());
        }
        self.inner.delete_like(post, user).await
    }

    async fn insert_profile(&self, profile: ProfileRow) -> AppResult<()> {
        if self.failure == Failure::ProfileInsert {
            return Err(forced());
        }
        self.inner.insert_profile(profile).await
    }

    async fn update_profile(
        &self,
        id: &UserId,
        username: &str,
        avatar_url: Option<&str>,
    ) -> AppResult<()> {
        if self.failure == Failure::ProfileUpdate {
            return Err(forced());
        }
        self.inner.update_profile(id, username, avatar_url).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        DataStore::subscribe(self.inner.as_ref())
    }
}

/// Data store that delays like writes, for observing the optimistic patch
/// while the remote round trip is still in flight.
pub struct SlowLikes {
    inner: Arc<MemoryBackend>,
    delay: Duration,
}

impl SlowLikes {
    pub fn new(inner: Arc<MemoryBackend>, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl DataStore for SlowLikes {
    async fn select_posts(
        &self,
        author: Option<&UserId>,
    ) -> AppResult<Vec<(PostRow, ProfileRow)>> {
        self.inner.select_posts(author).await
    }

    async fn insert_post(&self, post: NewPost) -> AppResult<PostRow> {
        self.inner.insert_post(post).await
    }

    async fn update_post(
        &self,
        id: &PostId,
        caption: Option<String>,
        image_url: Option<String>,
    ) -> AppResult<()> {
        self.inner.update_post(id, caption, image_url).await
    }

    async fn delete_post(&self, id: &PostId) -> AppResult<()> {
        self.inner.delete_post(id).await
    }

    async fn like_counts(&self, posts: &[PostId]) -> AppResult<HashMap<PostId, u64>> {
        self.inner.like_counts(posts).await
    }

    async fn liked_by(&self, posts: &[PostId], user: &UserId) -> AppResult<HashSet<PostId>> {
        self.inner.liked_by(posts, user).await
    }

    async fn insert_like(&self, post: &PostId, user: &UserId) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert_like(post, user).await
    }

    async fn delete_like(&self, post: &PostId, user: &UserId) -> AppResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.delete_like(post, user).await
    }

    async fn insert_profile(&self, profile: ProfileRow) -> AppResult<()> {
        self.inner.insert_profile(profile).await
    }

    async fn update_profile(
        &self,
        id: &UserId,
        username: &str,
        avatar_url: Option<&str>,
    ) -> AppResult<()> {
        self.inner.update_profile(id, username, avatar_url).await
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        DataStore::subscribe(self.inner.as_ref())
    }
}

/// Auth provider delegating to a [`MemoryBackend`] but rejecting metadata
/// updates, for exercising the dual-write short circuit.
pub struct FailingMetadataAuth {
    inner: Arc<MemoryBackend>,
}

impl FailingMetadataAuth {
    pub fn new(inner: Arc<MemoryBackend>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl AuthProvider for FailingMetadataAuth {
    async fn current_session(&self) -> AppResult<Option<Session>> {
        self.inner.current_session().await
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> AppResult<AuthUser> {
        self.inner.sign_up(email, password, metadata).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<AuthUser> {
        self.inner.sign_in(email, password).await
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.inner.sign_out().await
    }

    async fn request_password_reset(&self, email: &str) -> AppResult<()> {
        self.inner.request_password_reset(email).await
    }

    async fn update_current_user(&self, _metadata: UserMetadata) -> AppResult<AuthUser> {
        Err(AppError::Auth("forced metadata failure".into()))
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        AuthProvider::subscribe(self.inner.as_ref())
    }
}
