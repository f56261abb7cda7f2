use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::AppResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PostId(pub String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A row of the remote `posts` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRow {
    pub id: PostId,
    pub user_id: UserId,
    pub caption: Option<String>,
    pub image_url: Option<String>,
    pub likes: i64,
    pub created_at: DateTime<Utc>,
}

/// A row of the remote `profiles` table. One per user, keyed by user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: UserId,
    pub username: String,
    pub avatar_url: Option<String>,
}

/// A row of the remote `likes` table. At most one per (post, user) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LikeRow {
    pub post_id: PostId,
    pub user_id: UserId,
}

/// Fields for a new post; the store assigns id and creation time, the like
/// counter starts at zero.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: UserId,
    pub caption: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Posts,
    Likes,
    Profiles,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Realtime change notification pushed by the data store. Carries enough
/// row identity to evaluate scope filters without refetching first.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub table: Table,
    pub kind: ChangeKind,
    pub post_id: Option<PostId>,
    pub author_id: Option<UserId>,
}

#[async_trait]
pub trait DataStore: Send + Sync {
    /// Posts joined with their author's profile, newest first, optionally
    /// filtered to one author. Posts without a profile row are omitted
    /// (inner join).
    async fn select_posts(&self, author: Option<&UserId>)
        -> AppResult<Vec<(PostRow, ProfileRow)>>;

    async fn insert_post(&self, post: NewPost) -> AppResult<PostRow>;

    /// Overwrite caption and image of an existing post.
    async fn update_post(
        &self,
        id: &PostId,
        caption: Option<String>,
        image_url: Option<String>,
    ) -> AppResult<()>;

    async fn delete_post(&self, id: &PostId) -> AppResult<()>;

    /// Like totals for a whole page of posts in one round trip. Posts with
    /// no likes may be absent from the map.
    async fn like_counts(&self, posts: &[PostId]) -> AppResult<HashMap<PostId, u64>>;

    /// Of the given posts, the subset the user has liked.
    async fn liked_by(&self, posts: &[PostId], user: &UserId) -> AppResult<HashSet<PostId>>;

    async fn insert_like(&self, post: &PostId, user: &UserId) -> AppResult<()>;

    async fn delete_like(&self, post: &PostId, user: &UserId) -> AppResult<()>;

    async fn insert_profile(&self, profile: ProfileRow) -> AppResult<()>;

    async fn update_profile(
        &self,
        id: &UserId,
        username: &str,
        avatar_url: Option<&str>,
    ) -> AppResult<()>;

    /// Change-notification feed across all tables.
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
}

pub type DynDataStore = Arc<dyn DataStore>;
