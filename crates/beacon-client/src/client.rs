//! Async REST client for the recognition backend.

use std::path::Path;
use std::time::Duration;

use beacon_core::{GeoFix, RawDetection};
use reqwest::multipart;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::api::{BatchResponse, FrameResponse, FrameSubmission};

/// Per-request deadline. Frame submissions race the next tick anyway;
/// uploads of large videos get the same ceiling.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// How much of an error body to keep in messages.
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("invalid backend url: {0}")]
    BadUrl(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not read upload file: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for the face-recognition backend's detection endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    base: reqwest::Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base = reqwest::Url::parse(base_url)
            .map_err(|e| ClientError::BadUrl(format!("{base_url}: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, base })
    }

    fn endpoint(&self, path: &str) -> Result<reqwest::Url, ClientError> {
        self.base
            .join(path)
            .map_err(|e| ClientError::BadUrl(format!("{path}: {e}")))
    }

    /// Submit one live frame for matching.
    pub async fn process_frame(
        &self,
        submission: &FrameSubmission,
    ) -> Result<FrameResponse, ClientError> {
        let response = self
            .http
            .post(self.endpoint("detect/frame")?)
            .json(submission)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Upload an image file for matching.
    pub async fn upload_image(
        &self,
        path: &Path,
        location: Option<GeoFix>,
    ) -> Result<Vec<RawDetection>, ClientError> {
        self.upload("detect/image", path, location).await
    }

    /// Upload a video file for matching.
    pub async fn upload_video(
        &self,
        path: &Path,
        location: Option<GeoFix>,
    ) -> Result<Vec<RawDetection>, ClientError> {
        self.upload("detect/video", path, location).await
    }

    /// Fetch the backend's detection history for aggregator seeding.
    pub async fn detection_history(&self) -> Result<Vec<RawDetection>, ClientError> {
        let response = self
            .http
            .get(self.endpoint("detections/history")?)
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn upload(
        &self,
        path_segment: &str,
        file: &Path,
        location: Option<GeoFix>,
    ) -> Result<Vec<RawDetection>, ClientError> {
        let bytes = tokio::fs::read(file).await?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        tracing::debug!(file = %file.display(), bytes = bytes.len(), "uploading media file");

        let mut form = multipart::Form::new()
            .part("file", multipart::Part::bytes(bytes).file_name(file_name));
        if let Some(fix) = location {
            form = form
                .text("lat", fix.lat.to_string())
                .text("lon", fix.lon.to_string());
            if let Some(accuracy) = fix.accuracy {
                form = form.text("accuracy", accuracy.to_string());
            }
        }

        let response = self
            .http
            .post(self.endpoint(path_segment)?)
            .multipart(form)
            .send()
            .await?;
        let batch: BatchResponse = Self::parse(response).await?;
        Ok(batch.matches)
    }

    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            body.truncate(ERROR_BODY_LIMIT);
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}
