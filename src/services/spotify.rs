//! Spotify Web API: client-credentials token and track search

use super::{ensure_success, http_client};
use crate::config::ServicesConfig;
use crate::error::{Result as SatbResult, SatbError};
use base64::Engine;
use serde::{Deserialize, Serialize};

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSummary {
    pub name: String,
    /// Artist names joined with ", "
    pub artists: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<TrackItem>,
}

#[derive(Debug, Deserialize)]
struct TrackItem {
    name: String,
    #[serde(default)]
    artists: Vec<ArtistItem>,
    #[serde(default)]
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct ArtistItem {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: String,
}

impl From<TrackItem> for TrackSummary {
    fn from(item: TrackItem) -> Self {
        let artists: Vec<String> = item.artists.into_iter().map(|a| a.name).collect();
        Self {
            name: item.name,
            artists: artists.join(", "),
            url: item.external_urls.spotify,
        }
    }
}

pub struct SpotifyClient {
    client: reqwest::Client,
    accounts_url: String,
    api_url: String,
    client_id: String,
    client_secret: String,
}

impl SpotifyClient {
    pub fn new(config: &ServicesConfig, client_id: String, client_secret: String) -> SatbResult<Self> {
        Ok(Self {
            client: http_client(config)?,
            accounts_url: config.spotify_accounts_url.trim_end_matches('/').to_string(),
            api_url: config.spotify_api_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
        })
    }

    /// `Basic` authorization value for the token endpoint
    fn basic_auth(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.client_secret);
        format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(raw))
    }

    /// Client-credentials grant
    pub async fn get_access_token(&self) -> SatbResult<String> {
        let response = self
            .client
            .post(format!("{}/api/token", self.accounts_url))
            .header(reqwest::header::AUTHORIZATION, self.basic_auth())
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        let token: TokenResponse = ensure_success(response, "Spotify token request")
            .await?
            .json()
            .await?;
        Ok(token.access_token)
    }

    /// Search tracks matching `query`
    pub async fn search_track(&self, token: &str, query: &str, limit: u32) -> SatbResult<Vec<TrackSummary>> {
        if query.trim().is_empty() {
            return Err(SatbError::InputValidationError("empty search query".to_string()));
        }

        let limit = limit.to_string();
        let response = self
            .client
            .get(format!("{}/search", self.api_url))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .send()
            .await?;
        let page: SearchResponse = ensure_success(response, "Spotify search")
            .await?
            .json()
            .await?;

        let tracks: Vec<TrackSummary> = page
            .tracks
            .map(|t| t.items)
            .unwrap_or_default()
            .into_iter()
            .map(TrackSummary::from)
            .collect();
        tracing::debug!("Spotify returned {} tracks for {:?}", tracks.len(), query);
        Ok(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_auth_header() {
        let client = SpotifyClient::new(&ServicesConfig::default(), "id".into(), "secret".into()).unwrap();
        // base64("id:secret")
        assert_eq!(client.basic_auth(), "Basic aWQ6c2VjcmV0");
    }

    #[test]
    fn test_search_response_mapping() {
        let json = r#"{"tracks":{"items":[{"name":"Above All","artists":[{"name":"Michael W. Smith"},{"name":"Lenny LeBlanc"}],"external_urls":{"spotify":"https://open.spotify.com/track/x"}}]}}"#;
        let page: SearchResponse = serde_json::from_str(json).unwrap();
        let tracks: Vec<TrackSummary> = page.tracks.unwrap().items.into_iter().map(TrackSummary::from).collect();
        assert_eq!(
            tracks,
            vec![TrackSummary {
                name: "Above All".into(),
                artists: "Michael W. Smith, Lenny LeBlanc".into(),
                url: "https://open.spotify.com/track/x".into(),
            }]
        );
    }
}
