use crate::notice::{Notice, NoticeKind};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("No internet connection")]
    Offline,

    #[error("Auth error: {0}")]
    Auth(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Upload error: {0}")]
    Upload(String),
}

impl AppError {
    /// The underlying message, without the class prefix.
    pub fn message(&self) -> &str {
        match self {
            AppError::Validation(msg) => msg,
            AppError::Offline => "No internet connection",
            AppError::Auth(msg) => msg,
            AppError::Data(msg) => msg,
            AppError::Upload(msg) => msg,
        }
    }

    /// Convert into a user-facing notice with the given title. Validation
    /// errors carry their message as the title itself (they are reported
    /// inline at the origin, not as a remote failure).
    pub fn into_notice(self, title: &str) -> Notice {
        match &self {
            AppError::Validation(msg) => Notice::new(NoticeKind::Error, msg.clone(), None),
            _ => Notice::new(
                NoticeKind::Error,
                title.to_string(),
                Some(self.message().to_string()),
            ),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upload(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
