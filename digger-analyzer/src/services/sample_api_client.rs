//! HTTP client for the identification / sample lookup service
//!
//! Endpoints (relative to the configured base URL):
//! - `POST /music/` with a multipart `file` field → `{song, artist, img_url}`
//! - `GET /music/scrape-samples/?song_title=..&artist=..` → `{samples: [{song, artist, year}]}`

use super::analysis_service::{AnalysisService, ServiceError};
use crate::recording::AudioPayload;
use async_trait::async_trait;
use digger_common::{IdentifiedTrack, Sample};
use serde::{Deserialize, Deserializer};
use std::time::Duration;

const USER_AGENT: &str = concat!("crate-digger/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct IdentifyResponse {
    song: String,
    artist: String,
    #[serde(default)]
    img_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SamplesResponse {
    #[serde(default)]
    samples: Vec<SampleRecord>,
}

#[derive(Debug, Deserialize)]
struct SampleRecord {
    song: String,
    artist: String,
    #[serde(default, deserialize_with = "string_or_number")]
    year: String,
}

/// Years come back as strings from some scrapers and numbers from others
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

impl IdentifyResponse {
    fn into_track(self) -> Result<IdentifiedTrack, ServiceError> {
        if self.song.trim().is_empty() || self.artist.trim().is_empty() {
            return Err(ServiceError::Parse(
                "identify response is missing song or artist".to_string(),
            ));
        }
        let artwork_url = self.img_url.filter(|url| !url.trim().is_empty());
        Ok(IdentifiedTrack::new(self.song, self.artist, artwork_url))
    }
}

impl From<SampleRecord> for Sample {
    fn from(record: SampleRecord) -> Self {
        Sample::new(record.song, record.artist, record.year)
    }
}

/// reqwest-backed [`AnalysisService`]
pub struct SampleApiClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl SampleApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn identify_url(&self) -> String {
        format!("{}/music/", self.base_url)
    }

    fn samples_url(&self) -> String {
        format!("{}/music/scrape-samples/", self.base_url)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("Unknown status").to_string()
        } else {
            body
        };
        Err(ServiceError::Status(status.as_u16(), message))
    }
}

#[async_trait]
impl AnalysisService for SampleApiClient {
    async fn identify(&self, payload: &AudioPayload) -> Result<IdentifiedTrack, ServiceError> {
        let part = reqwest::multipart::Part::bytes(payload.bytes.clone())
            .file_name(payload.file_name())
            .mime_str(payload.mime())
            .map_err(|e| ServiceError::InvalidRequest(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        tracing::debug!(bytes = payload.len(), url = %self.identify_url(), "Submitting recording for identification");

        let response = self
            .http_client
            .post(self.identify_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let response = Self::check_status(response).await?;

        let body: IdentifyResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        let track = body.into_track()?;
        tracing::info!(title = %track.title, artist = %track.artist, "Identification succeeded");
        Ok(track)
    }

    async fn lookup_samples(&self, title: &str, artist: &str) -> Result<Vec<Sample>, ServiceError> {
        if title.is_empty() || artist.is_empty() {
            return Err(ServiceError::InvalidRequest(
                "sample lookup needs a non-empty title and artist".to_string(),
            ));
        }

        tracing::debug!(title = %title, artist = %artist, "Querying sample lookup");

        let response = self
            .http_client
            .get(self.samples_url())
            .query(&[("song_title", title), ("artist", artist)])
            .send()
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        let response = Self::check_status(response).await?;

        let body: SamplesResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::Parse(e.to_string()))?;

        let samples: Vec<Sample> = body.samples.into_iter().map(Sample::from).collect();
        tracing::info!(title = %title, count = samples.len(), "Sample lookup succeeded");
        Ok(samples)
    }
}
