//! Profile editing: avatar upload and the ordered dual write of display
//! fields to the auth provider's metadata and the profile row.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{AppError, AppResult};
use crate::notice::{Notice, NoticeCenter};
use crate::remote::auth::UserMetadata;
use crate::remote::{DynAuthProvider, DynDataStore, DynImageUploader};
use crate::session::SessionStore;

#[derive(Debug, Clone, Default)]
struct ProfileFields {
    username: String,
    avatar_url: Option<String>,
}

pub struct ProfileEditor {
    session: Arc<SessionStore>,
    auth: DynAuthProvider,
    data: DynDataStore,
    uploader: DynImageUploader,
    notices: NoticeCenter,
    fields: Mutex<ProfileFields>,
}

impl ProfileEditor {
    /// Open the editor pre-filled from the signed-in user, if any.
    pub fn new(
        session: Arc<SessionStore>,
        auth: DynAuthProvider,
        data: DynDataStore,
        uploader: DynImageUploader,
        notices: NoticeCenter,
    ) -> Self {
        let fields = match session.current_user() {
            Some(user) => ProfileFields {
                username: user.username,
                avatar_url: user.avatar_url,
            },
            None => ProfileFields::default(),
        };
        Self {
            session,
            auth,
            data,
            uploader,
            notices,
            fields: Mutex::new(fields),
        }
    }

    pub async fn set_username(&self, username: impl Into<String>) {
        self.fields.lock().await.username = username.into();
    }

    pub async fn username(&self) -> String {
        self.fields.lock().await.username.clone()
    }

    pub async fn avatar_url(&self) -> Option<String> {
        self.fields.lock().await.avatar_url.clone()
    }

    /// Upload a newly picked avatar and publish the resulting URL into both
    /// the editor and the session store, so other open views pick it up
    /// immediately — independent of whether `save` follows.
    pub async fn update_avatar(&self, local_image: &Path) -> AppResult<String> {
        let url = match self.uploader.upload(local_image).await {
            Ok(url) => url,
            Err(err) => {
                self.notices.error("Upload failed", &err);
                return Err(err);
            }
        };

        self.fields.lock().await.avatar_url = Some(url.clone());
        self.session.set_avatar_url(&url);
        self.notices.publish(Notice::success("Avatar updated!"));
        Ok(url)
    }

    /// Write username and avatar to the auth provider's metadata, then to
    /// the profile row. The row write is not attempted if the metadata
    /// write fails; the session store updates only after both succeed.
    pub async fn save(&self) -> AppResult<()> {
        let Some(user) = self.session.current_user() else {
            let err = AppError::Auth("No user logged in".into());
            self.notices.error("Update failed", &err);
            return Err(err);
        };

        let fields = self.fields.lock().await.clone();

        if let Err(err) = self
            .auth
            .update_current_user(UserMetadata {
                username: Some(fields.username.clone()),
                avatar_url: fields.avatar_url.clone(),
            })
            .await
        {
            self.notices.error("Update failed", &err);
            return Err(err);
        }

        if let Err(err) = self
            .data
            .update_profile(&user.id, &fields.username, fields.avatar_url.as_deref())
            .await
        {
            // Metadata already diverged from the profile row here; there is
            // no compensating rollback.
            tracing::error!("Profile update error: {}", err);
            self.notices.error("Update failed", &err);
            return Err(err);
        }

        self.session
            .apply_profile(&fields.username, fields.avatar_url.as_deref());
        self.notices
            .publish(Notice::success("Profile updated successfully!"));
        Ok(())
    }
}
