use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::error::AppError;

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Error,
    Info,
}

/// A dismissable transient notice: short title, optional detail drawn from
/// the underlying error's message. No retry, no blocking modal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub detail: Option<String>,
}

impl Notice {
    pub fn new(kind: NoticeKind, title: String, detail: Option<String>) -> Self {
        Self { kind, title, detail }
    }

    pub fn success(title: impl Into<String>) -> Self {
        Self::new(NoticeKind::Success, title.into(), None)
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(NoticeKind::Info, title.into(), None)
    }
}

/// Fan-out point for notices. Every remote-call failure is converted to a
/// notice at the boundary where it was issued; nothing propagates further.
#[derive(Clone)]
pub struct NoticeCenter {
    tx: broadcast::Sender<Notice>,
}

impl NoticeCenter {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(64);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Stream view over the notice feed, for consumers that prefer `Stream`.
    pub fn stream(&self) -> BroadcastStream<Notice> {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub fn publish(&self, notice: Notice) {
        // No subscribers is fine; notices are fire-and-forget.
        let _ = self.tx.send(notice);
    }

    /// Publish a failure notice titled `title` with the error's message as
    /// detail.
    pub fn error(&self, title: &str, err: &AppError) {
        tracing::warn!("{}: {}", title, err);
        self.publish(Notice::new(
            NoticeKind::Error,
            title.to_string(),
            Some(err.message().to_string()),
        ));
    }
}

impl Default for NoticeCenter {
    fn default() -> Self {
        Self::new()
    }
}
