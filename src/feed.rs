//! Feed synchronization: keeps a per-screen view of remote posts fresh via
//! change notifications and (for the global feed) fixed-interval polling,
//! with optimistic like toggling reconciled by refetch.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

use crate::config::FeedConfig;
use crate::error::AppResult;
use crate::notice::{Notice, NoticeCenter};
use crate::remote::data::{ChangeEvent, PostId, Table, UserId};
use crate::remote::DynDataStore;
use crate::session::SessionStore;

/// What a feed shows: everything, or one author's posts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedScope {
    Global,
    Author(UserId),
}

/// Denormalized author display fields carried on every post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorInfo {
    pub username: String,
    pub avatar_url: Option<String>,
}

/// One feed entry: the post row joined with its author's profile and the
/// viewer-relative like state.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub caption: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub author: AuthorInfo,
    pub likes_count: u64,
    pub liked_by_user: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub posts: Vec<Post>,
    pub loading: bool,
}

/// Issue-order guard for fetches: a resolved fetch publishes only if no
/// newer fetch has published since it was issued, so a slow stale response
/// can never overwrite a fresher one.
struct FetchGate {
    issued: u64,
    applied: u64,
}

impl FetchGate {
    fn new() -> Self {
        Self {
            issued: 0,
            applied: 0,
        }
    }

    fn begin(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    fn try_commit(&mut self, seq: u64) -> bool {
        if seq > self.applied {
            self.applied = seq;
            true
        } else {
            false
        }
    }
}

pub struct Feed {
    data: DynDataStore,
    session: Arc<SessionStore>,
    notices: NoticeCenter,
    state_tx: watch::Sender<FeedState>,
    refresh: Arc<Notify>,
    shutdown_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

impl Feed {
    /// Start a feed worker for the given scope. The first fetch is
    /// triggered immediately; teardown happens when the handle is dropped.
    pub fn spawn(
        scope: FeedScope,
        session: Arc<SessionStore>,
        data: DynDataStore,
        notices: NoticeCenter,
        config: &FeedConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(FeedState {
            posts: Vec::new(),
            loading: true,
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let refresh = Arc::new(Notify::new());
        refresh.notify_one();

        // Subscribe before spawning so no change between spawn and the
        // worker's first poll is lost.
        let changes = data.subscribe();
        let worker = tokio::spawn(run_worker(
            scope,
            session.clone(),
            data.clone(),
            changes,
            state_tx.clone(),
            refresh.clone(),
            shutdown_rx,
            config.poll_interval(),
        ));

        Self {
            data,
            session,
            notices,
            state_tx,
            refresh,
            shutdown_tx,
            worker,
        }
    }

    pub fn state(&self) -> watch::Receiver<FeedState> {
        self.state_tx.subscribe()
    }

    /// Stream view over feed states, for consumers that prefer `Stream`.
    pub fn state_stream(&self) -> WatchStream<FeedState> {
        WatchStream::new(self.state_tx.subscribe())
    }

    pub fn current(&self) -> FeedState {
        self.state_tx.borrow().clone()
    }

    /// Request a refetch; concurrent requests coalesce into one fetch.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    /// Toggle the viewer's like on a post. The local patch lands
    /// immediately; if the remote write fails the patch is reverted and
    /// the failure surfaces as a notice.
    pub async fn toggle_like(&self, post_id: &PostId, currently_liked: bool) {
        let Some(user) = self.session.current_user() else {
            return;
        };

        self.patch_like(post_id, !currently_liked);

        let result = if currently_liked {
            self.data.delete_like(post_id, &user.id).await
        } else {
            self.data.insert_like(post_id, &user.id).await
        };

        if let Err(err) = result {
            tracing::warn!("Toggle like error, reverting: {}", err);
            self.patch_like(post_id, currently_liked);
            self.notices.error("Could not update like", &err);
        }
    }

    /// Delete one of the viewer's posts and refresh.
    pub async fn delete_post(&self, post_id: &PostId) -> AppResult<()> {
        match self.data.delete_post(post_id).await {
            Ok(()) => {
                self.notices.publish(Notice::success("Post deleted"));
                self.request_refresh();
                Ok(())
            }
            Err(err) => {
                self.notices.error("Delete failed", &err);
                Err(err)
            }
        }
    }

    fn patch_like(&self, post_id: &PostId, liked_now: bool) {
        self.state_tx.send_modify(|state| {
            if let Some(post) = state.posts.iter_mut().find(|p| p.id == *post_id) {
                post.liked_by_user = liked_now;
                if liked_now {
                    post.likes_count += 1;
                } else {
                    post.likes_count = post.likes_count.saturating_sub(1);
                }
            }
        });
    }
}

impl Drop for Feed {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.worker.abort();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker(
    scope: FeedScope,
    session: Arc<SessionStore>,
    data: DynDataStore,
    mut changes: broadcast::Receiver<ChangeEvent>,
    state_tx: watch::Sender<FeedState>,
    refresh: Arc<Notify>,
    mut shutdown_rx: watch::Receiver<bool>,
    poll_interval: Duration,
) {
    // Only the global feed polls; author feeds rely on change events.
    let poll_enabled = matches!(scope, FeedScope::Global);
    let mut ticker = tokio::time::interval_at(
        tokio::time::Instant::now() + poll_interval,
        poll_interval,
    );
    let mut gate = FetchGate::new();

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            _ = refresh.notified() => {
                fetch_and_publish(&data, &scope, &session, &state_tx, &mut gate).await;
            }
            event = changes.recv() => match event {
                Ok(event) => {
                    let relevant =
                        event_triggers_refetch(&scope, &event, &state_tx.borrow().posts);
                    if relevant {
                        fetch_and_publish(&data, &scope, &session, &state_tx, &mut gate).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Missed notifications; refetch unconditionally.
                    tracing::warn!("Change stream lagged by {} events", skipped);
                    fetch_and_publish(&data, &scope, &session, &state_tx, &mut gate).await;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = ticker.tick(), if poll_enabled => {
                fetch_and_publish(&data, &scope, &session, &state_tx, &mut gate).await;
            }
        }
    }
}

async fn fetch_and_publish(
    data: &DynDataStore,
    scope: &FeedScope,
    session: &SessionStore,
    state_tx: &watch::Sender<FeedState>,
    gate: &mut FetchGate,
) {
    let seq = gate.begin();
    let viewer = session.current_user().map(|u| u.id);

    match assemble_feed(data, scope, viewer.as_ref()).await {
        Ok(posts) => {
            if gate.try_commit(seq) {
                state_tx.send_replace(FeedState {
                    posts,
                    loading: false,
                });
            } else {
                tracing::debug!("Discarding stale fetch (seq {})", seq);
            }
        }
        Err(err) => {
            // Background refresh failure: keep showing the last good view.
            tracing::error!("Fetch posts error: {}", err);
            state_tx.send_modify(|state| state.loading = false);
        }
    }
}

/// Fetch and assemble the composite view: posts joined with author
/// profiles, enriched with like totals and viewer membership for the whole
/// page in one round trip each. Ordering (newest first) comes from the
/// posts query and is preserved through assembly.
async fn assemble_feed(
    data: &DynDataStore,
    scope: &FeedScope,
    viewer: Option<&UserId>,
) -> AppResult<Vec<Post>> {
    let author = match scope {
        FeedScope::Global => None,
        FeedScope::Author(id) => Some(id),
    };
    let rows = data.select_posts(author).await?;
    let ids: Vec<PostId> = rows.iter().map(|(post, _)| post.id.clone()).collect();

    let (counts, liked) = futures::future::try_join(data.like_counts(&ids), async {
        match viewer {
            Some(user) => data.liked_by(&ids, user).await,
            None => Ok(HashSet::new()),
        }
    })
    .await?;

    Ok(rows
        .into_iter()
        .map(|(post, profile)| Post {
            likes_count: counts.get(&post.id).copied().unwrap_or(0),
            liked_by_user: liked.contains(&post.id),
            id: post.id,
            author_id: post.user_id,
            caption: post.caption,
            image_url: post.image_url,
            created_at: post.created_at,
            author: AuthorInfo {
                username: profile.username,
                avatar_url: profile.avatar_url,
            },
        })
        .collect())
}

/// Whether a change notification warrants a refetch for this scope.
fn event_triggers_refetch(scope: &FeedScope, event: &ChangeEvent, visible: &[Post]) -> bool {
    match scope {
        // The global feed refetches on any posts change; like freshness is
        // covered by the polling interval.
        FeedScope::Global => event.table == Table::Posts,
        FeedScope::Author(author) => match event.table {
            Table::Posts => event.author_id.as_ref() == Some(author),
            // Like changes only matter for posts currently in view.
            Table::Likes => event
                .post_id
                .as_ref()
                .map_or(false, |id| visible.iter().any(|p| p.id == *id)),
            Table::Profiles => false,
        },
    }
}

// --- Time formatting ---

pub fn format_relative_time(dt: &DateTime<Utc>) -> String {
    let now = Utc::now();
    let diff = now.signed_duration_since(*dt);

    let seconds = diff.num_seconds();
    if seconds < 60 {
        return "just now".to_string();
    }

    let minutes = diff.num_minutes();
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }

    let hours = diff.num_hours();
    if hours < 24 {
        return format!("{}h ago", hours);
    }

    let days = diff.num_days();
    if days < 7 {
        return format!("{}d ago", days);
    }

    dt.format("%b %-d, %Y").to_string()
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::data::ChangeKind;

    fn post(id: &str) -> Post {
        Post {
            id: PostId::new(id),
            author_id: UserId::new("author-1"),
            caption: None,
            image_url: None,
            created_at: Utc::now(),
            author: AuthorInfo {
                username: "alice".into(),
                avatar_url: None,
            },
            likes_count: 0,
            liked_by_user: false,
        }
    }

    fn event(table: Table, post_id: Option<&str>, author_id: Option<&str>) -> ChangeEvent {
        ChangeEvent {
            table,
            kind: ChangeKind::Insert,
            post_id: post_id.map(PostId::new),
            author_id: author_id.map(UserId::new),
        }
    }

    #[test]
    fn gate_commits_in_issue_order() {
        let mut gate = FetchGate::new();
        let first = gate.begin();
        let second = gate.begin();
        assert!(gate.try_commit(first));
        assert!(gate.try_commit(second));
    }

    #[test]
    fn gate_discards_stale_results() {
        let mut gate = FetchGate::new();
        let slow = gate.begin();
        let fast = gate.begin();
        // The later-issued fetch resolves first; the earlier one is stale.
        assert!(gate.try_commit(fast));
        assert!(!gate.try_commit(slow));
    }

    #[test]
    fn gate_rejects_replays() {
        let mut gate = FetchGate::new();
        let seq = gate.begin();
        assert!(gate.try_commit(seq));
        assert!(!gate.try_commit(seq));
    }

    #[test]
    fn global_scope_refetches_on_posts_changes_only() {
        let scope = FeedScope::Global;
        assert!(event_triggers_refetch(
            &scope,
            &event(Table::Posts, Some("p1"), Some("a1")),
            &[]
        ));
        assert!(!event_triggers_refetch(
            &scope,
            &event(Table::Likes, Some("p1"), None),
            &[]
        ));
        assert!(!event_triggers_refetch(
            &scope,
            &event(Table::Profiles, None, Some("a1")),
            &[]
        ));
    }

    #[test]
    fn author_scope_filters_posts_by_author() {
        let scope = FeedScope::Author(UserId::new("a1"));
        assert!(event_triggers_refetch(
            &scope,
            &event(Table::Posts, Some("p1"), Some("a1")),
            &[]
        ));
        assert!(!event_triggers_refetch(
            &scope,
            &event(Table::Posts, Some("p2"), Some("someone-else")),
            &[]
        ));
    }

    #[test]
    fn author_scope_filters_likes_to_visible_posts() {
        let scope = FeedScope::Author(UserId::new("a1"));
        let visible = vec![post("p1")];
        assert!(event_triggers_refetch(
            &scope,
            &event(Table::Likes, Some("p1"), None),
            &visible
        ));
        assert!(!event_triggers_refetch(
            &scope,
            &event(Table::Likes, Some("p-offscreen"), None),
            &visible
        ));
    }

    #[test]
    fn format_relative_time_just_now() {
        assert_eq!(format_relative_time(&Utc::now()), "just now");
    }

    #[test]
    fn format_relative_time_minutes() {
        let dt = Utc::now() - chrono::Duration::minutes(5);
        assert_eq!(format_relative_time(&dt), "5m ago");
    }

    #[test]
    fn format_relative_time_hours() {
        let dt = Utc::now() - chrono::Duration::hours(3);
        assert_eq!(format_relative_time(&dt), "3h ago");
    }

    #[test]
    fn format_relative_time_days() {
        let dt = Utc::now() - chrono::Duration::days(2);
        assert_eq!(format_relative_time(&dt), "2d ago");
    }

    #[test]
    fn format_relative_time_old_date() {
        let dt = chrono::NaiveDate::from_ymd_opt(2025, 1, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(format_relative_time(&dt), "Jan 15, 2025");
    }
}
