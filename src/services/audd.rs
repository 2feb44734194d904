//! AudD music recognition

use super::{ensure_success, http_client};
use crate::config::ServicesConfig;
use crate::error::Result as SatbResult;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

/// A recognized song
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recognition {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    /// Raw Spotify metadata attached by AudD
    #[serde(default)]
    pub spotify: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AuddResponse {
    #[serde(default)]
    result: Option<AuddResult>,
}

#[derive(Debug, Deserialize)]
struct AuddResult {
    title: Option<String>,
    artist: Option<String>,
    #[serde(default)]
    album: Option<String>,
    #[serde(default)]
    spotify: Option<serde_json::Value>,
}

pub struct AuddClient {
    client: reqwest::Client,
    url: String,
    api_token: String,
}

impl AuddClient {
    pub fn new(config: &ServicesConfig, api_token: String) -> SatbResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            url: format!("{}/", config.audd_url.trim_end_matches('/')),
            api_token,
        })
    }

    /// Recognize a recording; `Ok(None)` when AudD has no match
    pub async fn recognize(&self, bytes: Vec<u8>, filename: &str) -> SatbResult<Option<Recognition>> {
        let form = Form::new()
            .text("api_token", self.api_token.clone())
            .text("return", "spotify")
            .part("file", Part::bytes(bytes).file_name(filename.to_string()));

        let response = self.client.post(&self.url).multipart(form).send().await?;
        let body: AuddResponse = ensure_success(response, "AudD recognition")
            .await?
            .json()
            .await?;

        Ok(body.result.and_then(|r| match (r.title, r.artist) {
            (Some(title), Some(artist)) => Some(Recognition {
                title,
                artist,
                album: r.album,
                spotify: r.spotify,
            }),
            _ => None,
        }))
    }
}
