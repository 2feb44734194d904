//! AssemblyAI upload and transcription

use super::{ensure_success, http_client};
use crate::config::ServicesConfig;
use crate::error::{Result as SatbResult, SatbError};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct AssemblyAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    max_polls: u32,
}

impl AssemblyAiClient {
    pub fn new(config: &ServicesConfig, api_key: String) -> SatbResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            base_url: config.assemblyai_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls.max(1),
        })
    }

    /// Upload raw audio; returns the URL the transcription job reads from
    pub async fn upload(&self, bytes: Vec<u8>) -> SatbResult<String> {
        let response = self
            .client
            .post(format!("{}/upload", self.base_url))
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .body(bytes)
            .send()
            .await?;
        let upload: UploadResponse = ensure_success(response, "AssemblyAI upload")
            .await?
            .json()
            .await?;
        Ok(upload.upload_url)
    }

    /// Submit a transcription job and poll until it finishes
    pub async fn transcribe(&self, audio_url: &str) -> SatbResult<String> {
        let response = self
            .client
            .post(format!("{}/transcript", self.base_url))
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .json(&json!({ "audio_url": audio_url }))
            .send()
            .await?;
        let job: TranscriptResponse = ensure_success(response, "AssemblyAI transcription request")
            .await?
            .json()
            .await?;
        tracing::info!("Transcript ID: {}", job.id);

        let polling_endpoint = format!("{}/transcript/{}", self.base_url, job.id);
        for attempt in 0..self.max_polls {
            let response = self
                .client
                .get(&polling_endpoint)
                .header(reqwest::header::AUTHORIZATION, &self.api_key)
                .send()
                .await?;
            let status: TranscriptResponse = ensure_success(response, "AssemblyAI polling")
                .await?
                .json()
                .await?;

            match status.status.as_str() {
                "completed" => return Ok(status.text.unwrap_or_default()),
                "error" => {
                    return Err(SatbError::ServiceError(format!(
                        "AssemblyAI transcription failed: {}",
                        status.error.unwrap_or_else(|| "unknown error".to_string())
                    )))
                }
                other => {
                    tracing::debug!("  poll {}: status {}", attempt + 1, other);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(SatbError::ServiceError(format!(
            "AssemblyAI transcript {} not ready after {} polls",
            job.id, self.max_polls
        )))
    }
}
