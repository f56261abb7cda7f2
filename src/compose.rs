//! Post authoring: validates and submits new or edited posts, uploading a
//! local image before the row write. Form state survives failures and
//! resets only on success or when the surface changes target.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::feed::Post;
use crate::notice::{Notice, NoticeCenter, NoticeKind};
use crate::remote::data::{NewPost, PostId};
use crate::remote::upload::is_remote_url;
use crate::remote::{DynDataStore, DynImageUploader};
use crate::session::SessionStore;

#[derive(Debug, Clone, Default)]
struct ComposerForm {
    caption: String,
    /// Local file path, or a remote URL when editing an uploaded post.
    image: Option<String>,
    /// Set when editing an existing post.
    editing: Option<PostId>,
}

pub struct PostComposer {
    session: Arc<SessionStore>,
    data: DynDataStore,
    uploader: DynImageUploader,
    notices: NoticeCenter,
    form: Mutex<ComposerForm>,
}

impl PostComposer {
    pub fn new(
        session: Arc<SessionStore>,
        data: DynDataStore,
        uploader: DynImageUploader,
        notices: NoticeCenter,
    ) -> Self {
        Self {
            session,
            data,
            uploader,
            notices,
            form: Mutex::new(ComposerForm::default()),
        }
    }

    /// Open the surface for a new post. Clears anything left over from a
    /// previous edit target.
    pub async fn open_new(&self) {
        *self.form.lock().await = ComposerForm::default();
    }

    /// Open the surface pre-filled for editing an existing post.
    pub async fn open_edit(&self, post: &Post) {
        *self.form.lock().await = ComposerForm {
            caption: post.caption.clone().unwrap_or_default(),
            image: post.image_url.clone(),
            editing: Some(post.id.clone()),
        };
    }

    /// The surface lost focus without saving; nothing may leak into the
    /// next target.
    pub async fn blur(&self) {
        *self.form.lock().await = ComposerForm::default();
    }

    pub async fn set_caption(&self, caption: impl Into<String>) {
        self.form.lock().await.caption = caption.into();
    }

    pub async fn set_image(&self, image: Option<String>) {
        self.form.lock().await.image = image;
    }

    pub async fn caption(&self) -> String {
        self.form.lock().await.caption.clone()
    }

    pub async fn image(&self) -> Option<String> {
        self.form.lock().await.image.clone()
    }

    pub async fn editing(&self) -> Option<PostId> {
        self.form.lock().await.editing.clone()
    }

    /// Validate and submit. Uploads the image first if it is still a local
    /// reference; an already-remote URL is never re-uploaded. On success
    /// the form resets; on any failure it is left untouched so the user
    /// can retry.
    pub async fn submit(&self) -> AppResult<()> {
        let mut form = self.form.lock().await;

        if form.caption.trim().is_empty() && form.image.is_none() {
            let err = AppError::Validation("Add text or an image".into());
            self.notices
                .publish(Notice::new(NoticeKind::Error, err.message().into(), None));
            return Err(err);
        }

        let Some(user) = self.session.current_user() else {
            let err = AppError::Auth("Not signed in".into());
            self.notices.error("Post failed", &err);
            return Err(err);
        };

        let editing = form.editing.clone();
        let failure_title = if editing.is_some() {
            "Update failed"
        } else {
            "Post failed"
        };

        let mut image_url = form.image.clone();
        if let Some(reference) = &form.image {
            if !is_remote_url(reference) {
                match self.uploader.upload(Path::new(reference)).await {
                    Ok(url) => image_url = Some(url),
                    Err(err) => {
                        self.notices.error(failure_title, &err);
                        return Err(err);
                    }
                }
            }
        }

        let caption = Some(form.caption.clone()).filter(|c| !c.trim().is_empty());

        let result = match &editing {
            Some(post_id) => self.data.update_post(post_id, caption, image_url).await,
            None => self
                .data
                .insert_post(NewPost {
                    user_id: user.id,
                    caption,
                    image_url,
                })
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => {
                *form = ComposerForm::default();
                self.notices.publish(Notice::success(if editing.is_some() {
                    "Post updated!"
                } else {
                    "Post created!"
                }));
                Ok(())
            }
            Err(err) => {
                self.notices.error(failure_title, &err);
                Err(err)
            }
        }
    }
}

