use async_trait::async_trait;
use reqwest::multipart;
use std::path::Path;
use std::sync::Arc;
use url::Url;

use crate::config::UploadConfig;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Upload a local image and return its durable public URL.
    async fn upload(&self, path: &Path) -> AppResult<String>;
}

pub type DynImageUploader = Arc<dyn ImageUploader>;

/// Whether an image reference already points at the image host (as opposed
/// to a local file that still needs uploading).
pub fn is_remote_url(reference: &str) -> bool {
    match Url::parse(reference) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Unsigned multipart upload against a Cloudinary-style endpoint: one file
/// part plus a fixed `upload_preset` field, public HTTPS URL in the
/// response's `secure_url`.
pub struct HttpImageUploader {
    client: reqwest::Client,
    endpoint: Url,
    preset: String,
}

impl HttpImageUploader {
    pub fn new(config: &UploadConfig) -> AppResult<Self> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|e| AppError::Upload(format!("Invalid upload endpoint: {}", e)))?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            preset: config.preset.clone(),
        })
    }
}

#[async_trait]
impl ImageUploader for HttpImageUploader {
    async fn upload(&self, path: &Path) -> AppResult<String> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Upload(format!("Could not read {}: {}", path.display(), e)))?;

        let file_name = part_file_name(path);
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(mime.essence_str())?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("upload_preset", self.preset.clone());

        tracing::info!("Uploading {} to {}", file_name, self.endpoint);
        let response = self
            .client
            .post(self.endpoint.clone())
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AppError::Upload(format!("Malformed upload response: {}", e)))?;

        if !status.is_success() {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("Upload failed")
                .to_string();
            tracing::error!("Upload rejected ({}): {}", status, message);
            return Err(AppError::Upload(message));
        }

        body["secure_url"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| AppError::Upload("Upload response missing secure_url".into()))
    }
}

/// File name to send in the multipart part; the host keys derived asset
/// names off it.
fn part_file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload.jpg")
        .to_string()
}
