//! Song recognition and lookup clients
//!
//! Three remote services are involved: AudD fingerprints a recording, AssemblyAI
//! transcribes sung lyrics, and Spotify search turns the lyrics into tracks.
//! Base URLs come from [`ServicesConfig`] so tests can point them at a local
//! server; secrets come only from the environment.

pub mod assemblyai;
pub mod audd;
pub mod spotify;

pub use assemblyai::AssemblyAiClient;
pub use audd::{AuddClient, Recognition};
pub use spotify::{SpotifyClient, TrackSummary};

use crate::config::{Config, ServicesConfig};
use crate::error::{Result as SatbResult, SatbError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Artist reported for hits from the local filename table
pub const DEMO_ARTIST: &str = "Demo Artist";

/// API secrets read from the environment
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub assemblyai_api_key: Option<String>,
    pub audd_api_token: Option<String>,
}

impl Credentials {
    /// `CLIENT_ID`, `CLIENT_SECRET`, `API_KEY` and `AUDD_API_TOKEN`; empty values count as unset
    pub fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            spotify_client_id: var("CLIENT_ID"),
            spotify_client_secret: var("CLIENT_SECRET"),
            assemblyai_api_key: var("API_KEY"),
            audd_api_token: var("AUDD_API_TOKEN"),
        }
    }

    pub fn spotify(&self) -> SatbResult<(&str, &str)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => Ok((id.as_str(), secret.as_str())),
            _ => Err(SatbError::MissingCredentials(
                "Spotify requires CLIENT_ID and CLIENT_SECRET".to_string(),
            )),
        }
    }

    pub fn assemblyai(&self) -> SatbResult<&str> {
        self.assemblyai_api_key
            .as_deref()
            .ok_or_else(|| SatbError::MissingCredentials("AssemblyAI requires API_KEY".to_string()))
    }
}

/// HTTP client with the configured request timeout
pub fn http_client(config: &ServicesConfig) -> SatbResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_sec.max(1)))
        .build()?)
}

/// Turn a non-success response into an `E014` error carrying status and body
pub(crate) async fn ensure_success(
    response: reqwest::Response,
    what: &str,
) -> SatbResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SatbError::ServiceError(format!("{} failed ({}): {}", what, status, body.trim())))
}

/// Recognizes a recording with AudD, falling back to a filename table
pub struct SongMatcher {
    audd: Option<AuddClient>,
    known_songs: HashMap<String, String>,
}

impl SongMatcher {
    pub fn new(config: &Config, credentials: &Credentials) -> SatbResult<Self> {
        let audd = match &credentials.audd_api_token {
            Some(token) => Some(AuddClient::new(&config.services, token.clone())?),
            None => None,
        };
        Ok(Self {
            audd,
            known_songs: config.recognition.known_songs.clone(),
        })
    }

    /// Identify the song in `path`; `Ok(None)` when nothing matches
    pub async fn recognize(&self, path: &Path) -> SatbResult<Option<Recognition>> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        if let Some(audd) = &self.audd {
            let bytes = tokio::fs::read(path).await?;
            match audd.recognize(bytes, &filename).await {
                Ok(Some(hit)) => return Ok(Some(hit)),
                Ok(None) => tracing::debug!("AudD found no match for {}", filename),
                Err(e) => tracing::warn!("AudD lookup failed, using filename table: {}", e),
            }
        }

        Ok(self.lookup_known(&filename))
    }

    /// Filename table lookup
    pub fn lookup_known(&self, filename: &str) -> Option<Recognition> {
        self.known_songs.get(filename).map(|title| Recognition {
            title: title.clone(),
            artist: DEMO_ARTIST.to_string(),
            album: None,
            spotify: None,
        })
    }
}

/// Outcome of the lyrics-based identification flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identification {
    pub music_text: String,
    pub tracks: Vec<TrackSummary>,
}

/// Upload a recording, transcribe what is sung, and search Spotify for it
pub async fn identify_recording(
    path: &Path,
    config: &Config,
    credentials: &Credentials,
) -> SatbResult<Identification> {
    let api_key = credentials.assemblyai()?;
    let (client_id, client_secret) = credentials.spotify()?;

    let assembly = AssemblyAiClient::new(&config.services, api_key.to_string())?;
    let bytes = tokio::fs::read(path).await?;
    let audio_url = assembly.upload(bytes).await?;
    let music_text = assembly.transcribe(&audio_url).await?;
    tracing::info!("Transcribed {} characters from {}", music_text.len(), path.display());

    let tracks = if music_text.trim().is_empty() {
        tracing::warn!("Transcription is empty, skipping Spotify search");
        Vec::new()
    } else {
        let spotify = SpotifyClient::new(&config.services, client_id.to_string(), client_secret.to_string())?;
        let token = spotify.get_access_token().await?;
        spotify
            .search_track(&token, &music_text, config.services.search_limit)
            .await?
    };

    Ok(Identification { music_text, tracks })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials() {
        let creds = Credentials::default();
        assert!(creds.spotify().unwrap_err().to_string().starts_with("E015"));
        assert!(creds.assemblyai().is_err());

        let creds = Credentials {
            spotify_client_id: Some("id".into()),
            spotify_client_secret: Some("secret".into()),
            ..Credentials::default()
        };
        assert_eq!(creds.spotify().unwrap(), ("id", "secret"));
    }

    #[test]
    fn test_filename_table_fallback() {
        let matcher = SongMatcher::new(&Config::default(), &Credentials::default()).unwrap();
        let hit = matcher
            .lookup_known("Michael_W_Smith_-_Above_All-Powers-www.CeeNaija.com__satb.mp3")
            .unwrap();
        assert_eq!(hit.title, "Michael W. Smith - Above All Powers");
        assert_eq!(hit.artist, DEMO_ARTIST);
        assert!(matcher.lookup_known("other.mp3").is_none());
    }
}
