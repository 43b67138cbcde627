use crate::error::{CatalogError, Result, SyncError};
use crate::gateway::CatalogClient;
use crate::model::{Page, PlaylistSummary, Track, TrackRef};
use async_trait::async_trait;
use hyper::StatusCode;
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

const API_BASE: &str = "https://api.spotify.com/v1";
const TRACKS_PER_PAGE: u32 = 100;
const PLAYLISTS_PER_PAGE: u32 = 50;

/// Read-only Spotify Web API client used as the source catalog.
///
/// Page tokens are the `next` URLs returned by the API.
pub struct SpotifyClient {
    http: reqwest::Client,
    token: String,
}

#[derive(Deserialize, Debug)]
struct Paging<T> {
    items: Vec<T>,
    next: Option<String>,
}

#[derive(Deserialize, Debug)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Deserialize, Debug)]
struct SpotifyTrack {
    id: Option<String>,
    name: String,
    duration_ms: Option<u64>,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
    #[serde(default)]
    is_local: bool,
}

#[derive(Deserialize, Debug)]
struct SpotifyArtist {
    name: String,
}

#[derive(Deserialize, Debug)]
struct SpotifyPlaylist {
    id: String,
    name: String,
}

impl SpotifyClient {
    pub fn new(token: impl Into<String>) -> std::result::Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SyncError::Client(e.to_string()))?;

        Ok(Self {
            http,
            token: token.into(),
        })
    }

    /// Reads the bearer token from the environment variable named `var`.
    pub fn from_env(var: &str) -> std::result::Result<Self, SyncError> {
        let token = std::env::var(var).map_err(|_| SyncError::MissingEnv(var.to_string()))?;
        Self::new(token)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str, resource: &str) -> Result<T> {
        debug!("GET {}", url);
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| CatalogError::Decode(e.to_string()));
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(CatalogError::RateLimited { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        Err(CatalogError::from_status(status, resource, body))
    }
}

fn convert_track(item: PlaylistItem) -> Option<Track> {
    let track = item.track?;
    if track.is_local {
        return None;
    }
    let id = track.id?;

    Some(Track::from_source(
        TrackRef::new(id),
        track.name,
        track.artists.into_iter().map(|a| a.name).collect(),
        track.duration_ms.map(|ms| ((ms + 500) / 1000) as u32),
    ))
}

#[async_trait]
impl CatalogClient for SpotifyClient {
    fn name(&self) -> &str {
        "spotify"
    }

    async fn playlist_tracks_page(
        &self,
        playlist_id: &str,
        page: Option<String>,
    ) -> Result<Page<Track>> {
        let url = page.unwrap_or_else(|| {
            format!("{API_BASE}/playlists/{playlist_id}/tracks?limit={TRACKS_PER_PAGE}")
        });
        let paging: Paging<PlaylistItem> = self
            .get_json(&url, &format!("playlist {playlist_id}"))
            .await?;

        Ok(Page {
            items: paging.items.into_iter().filter_map(convert_track).collect(),
            next: paging.next,
        })
    }

    async fn playlists_page(&self, page: Option<String>) -> Result<Page<PlaylistSummary>> {
        let url = page.unwrap_or_else(|| format!("{API_BASE}/me/playlists?limit={PLAYLISTS_PER_PAGE}"));
        let paging: Paging<Option<SpotifyPlaylist>> = self.get_json(&url, "playlists").await?;

        Ok(Page {
            items: paging
                .items
                .into_iter()
                .flatten()
                .map(|p| PlaylistSummary {
                    id: p.id,
                    name: p.name,
                })
                .collect(),
            next: paging.next,
        })
    }
}
