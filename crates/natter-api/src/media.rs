use anyhow::{Context, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use serde::Deserialize;
use sha1::{Digest, Sha1};

use crate::error::ApiError;

/// Stores an encoded image and hands back a durable URL.
#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload_image(&self, data: &str) -> anyhow::Result<String>;
}

/// Cloudinary signed upload.
pub struct CloudinaryClient {
    http: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl CloudinaryClient {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }
}

#[async_trait]
impl MediaHost for CloudinaryClient {
    async fn upload_image(&self, data: &str) -> anyhow::Result<String> {
        let url = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.cloud_name
        );
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(&[("timestamp", timestamp.as_str())], &self.api_secret);

        let response: UploadResponse = self
            .http
            .post(&url)
            .form(&[
                ("file", data),
                ("api_key", self.api_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
            ])
            .send()
            .await
            .context("Cloudinary upload failed")?
            .error_for_status()
            .context("Cloudinary rejected the upload")?
            .json()
            .await
            .context("Cloudinary response was not valid JSON")?;

        if response.secure_url.is_empty() {
            return Err(anyhow!("Cloudinary returned an empty URL"));
        }
        Ok(response.secure_url)
    }
}

/// Cloudinary request signature: SHA-1 hex of the sorted `k=v&...` string
/// followed by the API secret.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha1::new();
    hasher.update(joined.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn is_remote_url(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}

/// Audio is kept opaque, but must be a URL or decodable base64
/// (bare or as a `data:` URI).
pub fn validate_audio(audio: &str) -> Result<(), ApiError> {
    if is_remote_url(audio) {
        return Ok(());
    }

    let invalid = || ApiError::BadRequest("audio must be a URL or base64 data".into());
    let encoded = match audio.strip_prefix("data:") {
        Some(rest) => rest.split_once(";base64,").map(|(_, data)| data).ok_or_else(invalid)?,
        None => audio,
    };

    B64.decode(encoded.trim()).map(|_| ()).map_err(|_| invalid())
}
